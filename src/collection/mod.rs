//! Typed view over every mirror key sharing a prefix
//!
//! Membership follows the session mirror: an entry shows up once its value
//! decodes, and leaves when the key is removed or its value stops decoding.
//! Entries that fail to decode stay in the raw mirror; the collection only
//! counts and lists them.

mod codec;

pub use codec::*;


use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;

use parking_lot::RwLock;
use tracing::debug;

use crate::session::Observers;
use crate::PendingWrite;
use crate::Result;
use crate::Session;
use crate::StateChange;
use crate::Subscription;
use crate::Value;
use crate::ValueError;

#[derive(Debug, Clone, PartialEq)]
pub enum CollectionEvent<T> {
    Updated { key: String, item: T },
    Removed { key: String },
}

struct Members<T> {
    items: HashMap<String, T>,
    rejected: HashSet<String>,
}

struct CollectionShared<T> {
    prefix: String,
    session: Session,
    codec: CollectionCodec<T>,
    members: RwLock<Members<T>>,
    rejected_count: AtomicU64,
    observers: Observers<CollectionEvent<T>>,
    _mirror_subscription: Subscription,
}

/// Typed dictionary over the keys starting with one prefix.
///
/// Cloning shares the same view.
pub struct SharedCollection<T> {
    shared: Arc<CollectionShared<T>>,
}

impl<T> Clone for SharedCollection<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for SharedCollection<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SharedCollection")
            .field("prefix", &self.shared.prefix)
            .field("len", &self.shared.members.read().items.len())
            .finish()
    }
}

impl<T> SharedCollection<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        session: Session,
        prefix: String,
        codec: CollectionCodec<T>,
    ) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<CollectionShared<T>>| {
            let weak = weak.clone();
            let subscription = session.on_change(move |change| {
                if let Some(shared) = weak.upgrade() {
                    shared.apply(change);
                }
            });

            CollectionShared {
                prefix,
                session: session.clone(),
                codec,
                members: RwLock::new(Members {
                    items: HashMap::new(),
                    rejected: HashSet::new(),
                }),
                rejected_count: AtomicU64::new(0),
                observers: Observers::new(),
                _mirror_subscription: subscription,
            }
        });

        shared.seed();
        Self { shared }
    }

    pub fn prefix(&self) -> &str {
        &self.shared.prefix
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<T> {
        self.shared.members.read().items.get(key).cloned()
    }

    pub fn contains_key(
        &self,
        key: &str,
    ) -> bool {
        self.shared.members.read().items.contains_key(key)
    }

    /// Copy of the current typed view.
    pub fn items(&self) -> HashMap<String, T> {
        self.shared.members.read().items.clone()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.shared.members.read().items.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.shared.members.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prefix-matched keys whose current value does not decode.
    pub fn rejected_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.shared.members.read().rejected.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of values rejected by the codec since the collection was
    /// created. Never decreases.
    pub fn rejected_count(&self) -> u64 {
        self.shared.rejected_count.load(Ordering::Relaxed)
    }

    /// Serializes `item` and writes it under `key` (fire-and-forget).
    pub fn update_value(
        &self,
        key: &str,
        item: &T,
    ) -> Result<PendingWrite> {
        self.check_prefix(key)?;
        let value = self.shared.codec.serialize(item)?;
        Ok(self.shared.session.set_shared_state(key, value))
    }

    /// Removes `key` from the shared state (fire-and-forget).
    pub fn remove_value(
        &self,
        key: &str,
    ) -> Result<PendingWrite> {
        self.check_prefix(key)?;
        Ok(self.shared.session.remove_shared_state_key(key))
    }

    pub fn on_event<F>(
        &self,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&CollectionEvent<T>) + Send + Sync + 'static,
    {
        self.shared.observers.subscribe(callback)
    }

    fn check_prefix(
        &self,
        key: &str,
    ) -> Result<()> {
        if !key.starts_with(&self.shared.prefix) {
            return Err(ValueError::KeyOutsidePrefix {
                key: key.to_string(),
                prefix: self.shared.prefix.clone(),
            }
            .into());
        }
        Ok(())
    }
}

impl<T> CollectionShared<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Fills the view from the mirror.
    ///
    /// Runs under the members lock so that a change delivered concurrently
    /// is applied after the seed, never before it.
    fn seed(&self) {
        let mut events = Vec::new();
        {
            let mut members = self.members.write();
            for (key, value) in self.session.entries_with_prefix(&self.prefix) {
                if let Some(event) = self.upsert(&mut members, key, &value) {
                    events.push(event);
                }
            }
        }
        for event in &events {
            self.observers.notify(event);
        }
    }

    fn apply(
        &self,
        change: &StateChange,
    ) {
        if !change.key().starts_with(&self.prefix) {
            return;
        }

        let event = {
            let mut members = self.members.write();
            match change {
                StateChange::Updated { key, value } => self.upsert(&mut members, key.clone(), value),
                StateChange::Removed { key } => {
                    members.rejected.remove(key);
                    members
                        .items
                        .remove(key)
                        .map(|_| CollectionEvent::Removed { key: key.clone() })
                }
            }
        };

        if let Some(event) = event {
            self.observers.notify(&event);
        }
    }

    fn upsert(
        &self,
        members: &mut Members<T>,
        key: String,
        value: &Value,
    ) -> Option<CollectionEvent<T>> {
        match self.codec.deserialize(&key, value) {
            Some(item) => {
                members.rejected.remove(&key);
                members.items.insert(key.clone(), item.clone());
                Some(CollectionEvent::Updated { key, item })
            }
            None => {
                self.rejected_count.fetch_add(1, Ordering::Relaxed);
                debug!(prefix = %self.prefix, key = %key, "entry rejected by collection codec");
                let was_member = members.items.remove(&key).is_some();
                members.rejected.insert(key.clone());
                was_member.then_some(CollectionEvent::Removed { key })
            }
        }
    }
}
