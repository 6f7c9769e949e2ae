use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::from_value;
use crate::to_value;
use crate::Result;
use crate::Value;

type Deserializer<T> = Arc<dyn Fn(&str, &Value) -> Option<T> + Send + Sync>;
type Serializer<T> = Arc<dyn Fn(&T) -> Result<Value> + Send + Sync>;

/// Pluggable conversion between raw mirror values and collection items.
///
/// The deserializer gets the key as well, so one codec can reject entries
/// based on their key shape.
pub struct CollectionCodec<T> {
    deserialize: Deserializer<T>,
    serialize: Serializer<T>,
}

impl<T> Clone for CollectionCodec<T> {
    fn clone(&self) -> Self {
        Self {
            deserialize: self.deserialize.clone(),
            serialize: self.serialize.clone(),
        }
    }
}

impl<T> fmt::Debug for CollectionCodec<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str("CollectionCodec")
    }
}

impl<T> CollectionCodec<T> {
    pub fn new<D, S>(
        deserialize: D,
        serialize: S,
    ) -> Self
    where
        D: Fn(&str, &Value) -> Option<T> + Send + Sync + 'static,
        S: Fn(&T) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            deserialize: Arc::new(deserialize),
            serialize: Arc::new(serialize),
        }
    }

    pub fn deserialize(
        &self,
        key: &str,
        value: &Value,
    ) -> Option<T> {
        (self.deserialize)(key, value)
    }

    pub fn serialize(
        &self,
        item: &T,
    ) -> Result<Value> {
        (self.serialize)(item)
    }
}

impl<T> CollectionCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Codec backed by the item's serde implementation.
    pub fn serde() -> Self {
        Self::new(
            |_, value| from_value(value).ok(),
            |item| Ok(to_value(item)?),
        )
    }
}
