use std::collections::btree_map;
use std::collections::BTreeMap;

use super::null_proto_value;
use super::Value;
use crate::proto::StateUpdate;

/// One batch of changes to the shared state.
///
/// `Some(value)` upserts the key, `None` removes it. Upserting
/// [`Value::Null`] is the same as removing, matching the wire sentinel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateChanges {
    changes: BTreeMap<String, Option<Value>>,
}

impl StateChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        let value = value.into();
        let change = if value.is_null() { None } else { Some(value) };
        self.changes.insert(key.into(), change);
        self
    }

    pub fn remove(
        &mut self,
        key: impl Into<String>,
    ) -> &mut Self {
        self.changes.insert(key.into(), None);
        self
    }

    pub fn with_upsert(
        mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.upsert(key, value);
        self
    }

    pub fn with_removal(
        mut self,
        key: impl Into<String>,
    ) -> Self {
        self.remove(key);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<&Option<Value>> {
        self.changes.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.changes.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// Folds a later batch into this one; the later change wins per key.
    pub fn merge(
        &mut self,
        later: StateChanges,
    ) {
        self.changes.extend(later.changes);
    }

    pub fn into_proto(self) -> prost_types::Struct {
        prost_types::Struct {
            fields: self
                .changes
                .into_iter()
                .map(|(k, v)| (k, v.map(prost_types::Value::from).unwrap_or_else(null_proto_value)))
                .collect(),
        }
    }

    pub fn from_proto(s: prost_types::Struct) -> Self {
        let mut changes = StateChanges::new();
        for (key, value) in s.fields {
            changes.upsert(key, Value::from(value));
        }
        changes
    }
}

impl IntoIterator for StateChanges {
    type Item = (String, Option<Value>);
    type IntoIter = btree_map::IntoIter<String, Option<Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl FromIterator<(String, Option<Value>)> for StateChanges {
    fn from_iter<I: IntoIterator<Item = (String, Option<Value>)>>(iter: I) -> Self {
        let mut changes = StateChanges::new();
        for (key, value) in iter {
            match value {
                Some(value) => changes.upsert(key, value),
                None => changes.remove(key),
            };
        }
        changes
    }
}

impl From<StateUpdate> for StateChanges {
    fn from(update: StateUpdate) -> Self {
        update.changed_keys.map(StateChanges::from_proto).unwrap_or_default()
    }
}

impl From<StateChanges> for StateUpdate {
    fn from(changes: StateChanges) -> Self {
        StateUpdate {
            changed_keys: Some(changes.into_proto()),
        }
    }
}
