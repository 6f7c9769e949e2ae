//! Records exchanged with the rendering and UI layers.
//!
//! Each record lives under its own key prefix and converts to and from
//! [`Value`] explicitly, so a malformed entry is a conversion error rather
//! than a panic in the caller.

use serde::Deserialize;
use serde::Serialize;

use crate::from_value;
use crate::to_value;
use crate::Session;
use crate::SharedCollection;
use crate::Value;
use crate::ValueError;

pub const AVATAR_PREFIX: &str = "avatar.";
pub const SELECTION_PREFIX: &str = "selection.";

/// One tracked part of a player's avatar (head, hands, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvatarComponent {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<[f64; 3]>,
    /// Quaternion `[x, y, z, w]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<[f64; 4]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvatarRecord {
    pub player_id: String,
    #[serde(default)]
    pub components: Vec<AvatarComponent>,
}

impl AvatarRecord {
    pub fn key(&self) -> String {
        avatar_key(&self.player_id)
    }
}

pub fn avatar_key(player_id: &str) -> String {
    format!("{AVATAR_PREFIX}{player_id}")
}

/// A named group of particles and how it should be rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// `None` selects everything
    #[serde(default)]
    pub particle_ids: Option<Vec<u64>>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub interactable: bool,
}

impl SelectionRecord {
    pub fn key(&self) -> String {
        selection_key(&self.id)
    }
}

pub fn selection_key(id: &str) -> String {
    format!("{SELECTION_PREFIX}{id}")
}

macro_rules! value_conversions {
    ($record:ty) => {
        impl TryFrom<&$record> for Value {
            type Error = ValueError;

            fn try_from(record: &$record) -> Result<Self, Self::Error> {
                to_value(record)
            }
        }

        impl TryFrom<&Value> for $record {
            type Error = ValueError;

            fn try_from(value: &Value) -> Result<Self, Self::Error> {
                from_value(value)
            }
        }
    };
}

value_conversions!(AvatarRecord);
value_conversions!(SelectionRecord);

/// Every avatar currently in the shared state.
pub fn avatar_collection(session: &Session) -> SharedCollection<AvatarRecord> {
    session.get_collection(AVATAR_PREFIX)
}

/// Every selection currently in the shared state.
pub fn selection_collection(session: &Session) -> SharedCollection<SelectionRecord> {
    session.get_collection(SELECTION_PREFIX)
}
