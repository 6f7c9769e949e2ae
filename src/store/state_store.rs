use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use super::ChangeBuffer;
use super::LockRequest;
use super::LockTable;
use crate::metrics::ACTIVE_SUBSCRIBERS;
use crate::metrics::BROADCASTS_SENT;
use crate::metrics::LOCK_BATCHES;
use crate::metrics::OUTCOME_APPLIED;
use crate::metrics::OUTCOME_REJECTED;
use crate::metrics::STATE_BATCHES;
use crate::proto::StateUpdate;
use crate::AccessToken;
use crate::ServerConfig;
use crate::StateChanges;
use crate::Value;

/// Authoritative key/value state plus the lock table guarding it.
///
/// Every `update_state` / `update_locks` batch is all-or-nothing. Batches are
/// serialized per key through latches taken in key order, so batches over
/// disjoint keys never wait on each other.
///
/// Subscribers get a private [`ChangeBuffer`] and a flush task that pushes
/// one merged [`StateUpdate`] per tick. Applying a batch and publishing it to
/// the buffers happens under the registry read lock; registering a new
/// subscriber (and snapshotting the entries for it) takes the write lock. A
/// subscriber therefore sees every change exactly once: either in its
/// initial snapshot or in a later batch.
#[derive(Debug)]
pub struct StateStore {
    config: ServerConfig,
    entries: DashMap<String, Value>,
    locks: LockTable,
    latches: DashMap<String, Arc<Mutex<()>>>,
    subscribers: RwLock<HashMap<u64, Arc<ChangeBuffer>>>,
    next_subscriber_id: AtomicU64,
    shutdown: CancellationToken,
}

impl StateStore {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            locks: LockTable::new(),
            latches: DashMap::new(),
            subscribers: RwLock::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Applies `changes` on behalf of `token`.
    ///
    /// Fails as a whole (returns `false`, nothing applied) when any key is
    /// locked by another token.
    pub fn update_state(
        &self,
        token: &AccessToken,
        changes: StateChanges,
    ) -> bool {
        let keys = changes.keys().map(str::to_string).collect();
        self.latched(keys, || {
            let now = Instant::now();
            if let Some(key) = changes.keys().find(|key| !self.locks.is_available_to(key, token, now)) {
                debug!(%token, key, "state batch rejected: key locked by another session");
                STATE_BATCHES.with_label_values(&[OUTCOME_REJECTED]).inc();
                return false;
            }

            self.apply(now, changes);
            STATE_BATCHES.with_label_values(&[OUTCOME_APPLIED]).inc();
            true
        })
    }

    /// Grants or releases every lock in `requests` on behalf of `token`.
    ///
    /// Fails as a whole when any key is held by another token. That includes
    /// releasing a lock somebody else holds.
    pub fn update_locks(
        &self,
        token: &AccessToken,
        requests: BTreeMap<String, LockRequest>,
    ) -> bool {
        let keys = requests.keys().cloned().collect();
        self.latched(keys, || {
            let now = Instant::now();
            if let Some(key) = requests.keys().find(|key| !self.locks.is_available_to(key, token, now)) {
                debug!(%token, key, "lock batch rejected: key locked by another session");
                LOCK_BATCHES.with_label_values(&[OUTCOME_REJECTED]).inc();
                return false;
            }

            for (key, request) in requests {
                match request {
                    LockRequest::Acquire(duration) => {
                        let duration = duration.min(self.config.max_lock_duration());
                        trace!(%token, key, ?duration, "lock granted");
                        self.locks.grant(&key, token, now + duration);
                    }
                    LockRequest::Release => {
                        trace!(%token, key, "lock released");
                        self.locks.release(&key, token);
                    }
                }
            }
            LOCK_BATCHES.with_label_values(&[OUTCOME_APPLIED]).inc();
            true
        })
    }

    /// Wire form of [`StateStore::update_locks`]: values are lock durations
    /// in seconds or `null`.
    pub fn update_locks_from_values(
        &self,
        token: &AccessToken,
        lock_keys: BTreeMap<String, Value>,
    ) -> bool {
        let max = self.config.max_lock_duration();
        let requests = lock_keys
            .into_iter()
            .map(|(key, value)| {
                let request = LockRequest::from_value(&value, max);
                (key, request)
            })
            .collect();
        self.update_locks(token, requests)
    }

    /// Server-side write that ignores locks.
    pub fn force_update(
        &self,
        changes: StateChanges,
    ) {
        let keys = changes.keys().map(str::to_string).collect();
        self.latched(keys, || self.apply(Instant::now(), changes));
    }

    /// Drops the locks on `keys` whoever holds them. Returns how many locks
    /// were removed.
    pub fn force_release<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> usize {
        let keys: Vec<String> = keys.into_iter().map(str::to_string).collect();
        let released = self.latched(keys.clone(), || {
            keys.iter().filter(|key| self.locks.force_release(key)).count()
        });
        debug!(released, "locks force released");
        released
    }

    /// Drops every lock held by `token`, e.g. after its session went away.
    pub fn release_all(
        &self,
        token: &AccessToken,
    ) -> Vec<String> {
        let released = self.locks.release_all(token);
        debug!(%token, count = released.len(), "released all locks of session");
        released
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn lock_holder(
        &self,
        key: &str,
    ) -> Option<AccessToken> {
        self.locks.holder(key, Instant::now())
    }

    pub fn live_lock_count(&self) -> usize {
        self.locks.live_count(Instant::now())
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Opens a subscription that flushes changes every `requested_interval`
    /// (floored at the configured minimum).
    ///
    /// The first message carries the current contents of the store, if any.
    /// The subscription ends when the receiver is dropped or the store shuts
    /// down.
    pub fn subscribe(
        self: &Arc<Self>,
        requested_interval: Duration,
    ) -> mpsc::Receiver<StateUpdate> {
        let (tx, rx) = mpsc::channel(self.config.subscriber_buffer_size());
        let buffer = Arc::new(ChangeBuffer::new());
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut subscribers = self.subscribers.write();
            let snapshot: StateChanges = self
                .entries
                .iter()
                .map(|entry| (entry.key().clone(), Some(entry.value().clone())))
                .collect();
            buffer.push(Instant::now(), snapshot);
            subscribers.insert(id, buffer.clone());
        }
        ACTIVE_SUBSCRIBERS.inc();

        let interval = requested_interval.max(self.config.min_broadcast_interval());
        debug!(subscriber = id, ?interval, "subscriber registered");

        let registration = Registration {
            store: Arc::downgrade(self),
            id,
        };
        let latency = self.config.broadcast_latency();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let _registration = registration;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tx.closed() => break,
                    _ = ticker.tick() => {
                        let Some(changes) = buffer.drain_ready(Instant::now(), latency) else {
                            continue;
                        };
                        trace!(subscriber = id, keys = changes.len(), "broadcasting state update");

                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            sent = tx.send(StateUpdate::from(changes)) => {
                                if sent.is_err() {
                                    break;
                                }
                                BROADCASTS_SENT.inc();
                            }
                        }
                    }
                }
            }
        });

        rx
    }

    /// Ends every subscription. Entries and locks stay readable.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn apply(
        &self,
        now: Instant,
        changes: StateChanges,
    ) {
        if changes.is_empty() {
            return;
        }

        let subscribers = self.subscribers.read();
        for (key, change) in changes.iter() {
            match change {
                Some(value) => {
                    self.entries.insert(key.to_string(), value.clone());
                }
                None => {
                    self.entries.remove(key);
                }
            }
        }
        for buffer in subscribers.values() {
            buffer.push(now, changes.clone());
        }
    }

    /// Runs `critical` holding the latch of every key in `keys`.
    ///
    /// Latches are taken in sorted key order. A latch nobody else is waiting
    /// on is dropped from the map afterwards, so the map only holds keys with
    /// a batch in flight.
    fn latched<R>(
        &self,
        mut keys: Vec<String>,
        critical: impl FnOnce() -> R,
    ) -> R {
        keys.sort_unstable();
        keys.dedup();

        let latches: Vec<Arc<Mutex<()>>> = keys
            .iter()
            .map(|key| self.latches.entry(key.clone()).or_default().clone())
            .collect();
        let result = {
            let _guards: Vec<_> = latches.iter().map(|latch| latch.lock()).collect();
            critical()
        };
        drop(latches);

        // The map's own reference is the only one left when nobody waits.
        for key in &keys {
            self.latches.remove_if(key, |_, latch| Arc::strong_count(latch) == 1);
        }
        result
    }

    #[cfg(test)]
    pub(crate) fn latch_count(&self) -> usize {
        self.latches.len()
    }

    fn unregister(
        &self,
        id: u64,
    ) {
        if self.subscribers.write().remove(&id).is_some() {
            ACTIVE_SUBSCRIBERS.dec();
            debug!(subscriber = id, "subscriber unregistered");
        }
    }
}

/// Removes a subscriber's buffer when its flush task ends.
struct Registration {
    store: Weak<StateStore>,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.unregister(self.id);
        }
    }
}
