//! Typed single-key accessor with an optimistic lock state machine
//!
//! ```text
//!            obtain_lock()            success
//! Unlocked ──────────────> Pending ───────────> Locked
//!    ^                        │                    │
//!    └──── rejected ──────────┘                    │
//!    └──── release_lock() ─────────────────────────┘
//! ```
//!
//! [`SharedResource::value`] is the value last confirmed by the server (the
//! session mirror). Local edits made with
//! [`SharedResource::update_value_with_lock`] are only visible through
//! [`SharedResource::predicted_value`] until the server echoes them back.
//!
//! All requests of one resource go through a single worker task, so a
//! release can never overtake the acquire issued before it. The worker also
//! commits edits and refreshes the lock every `commit_interval`.

mod worker;


use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use crate::from_value;
use crate::session::Observers;
use crate::Result;
use crate::Session;
use crate::StateChange;
use crate::Subscription;
use crate::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    /// Requested, answer not yet received
    Pending,
    Locked,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent<T> {
    /// The confirmed value changed; `None` when the key was removed or can no
    /// longer be decoded as `T`.
    ValueChanged(Option<T>),
    LockAcquired,
    /// The server refused the lock (or a write made under it). Local edits
    /// were discarded.
    LockRejected,
    LockReleased,
}

pub(crate) enum Command {
    Lock { generation: u64 },
    Release,
    Flush,
}

pub(crate) struct ResourceState<T> {
    pub(crate) lock_state: LockState,
    pub(crate) local_value: Option<T>,
    pub(crate) dirty: bool,
    /// Bumped whenever the lock state is reset so that answers to requests
    /// issued before the reset are ignored.
    pub(crate) generation: u64,
    pub(crate) lock_confirmed_at: Option<Instant>,
}

impl<T> ResourceState<T> {
    fn reset(&mut self) {
        self.lock_state = LockState::Unlocked;
        self.local_value = None;
        self.dirty = false;
        self.generation += 1;
        self.lock_confirmed_at = None;
    }
}

pub(crate) struct ResourceShared<T> {
    pub(crate) key: String,
    pub(crate) session: Session,
    pub(crate) state: Mutex<ResourceState<T>>,
    pub(crate) observers: Observers<ResourceEvent<T>>,
    _mirror_subscription: Subscription,
}

/// Typed accessor for one shared key.
///
/// Clones share state. When the last clone is dropped while the lock is
/// held, the lock is released.
pub struct SharedResource<T> {
    shared: Arc<ResourceShared<T>>,
    commands: mpsc::UnboundedSender<Command>,
}

impl<T> Clone for SharedResource<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            commands: self.commands.clone(),
        }
    }
}

impl<T> fmt::Debug for SharedResource<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SharedResource")
            .field("key", &self.shared.key)
            .field("lock_state", &self.shared.state.lock().lock_state)
            .finish()
    }
}

impl<T> SharedResource<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        session: Session,
        key: String,
    ) -> Result<Self> {
        let shared = Arc::new_cyclic(|weak: &std::sync::Weak<ResourceShared<T>>| {
            let weak = weak.clone();
            let watched = key.clone();
            let subscription = session.on_change(move |change| {
                if change.key() != watched {
                    return;
                }
                if let Some(shared) = weak.upgrade() {
                    let value = match change {
                        StateChange::Updated { value, .. } => decode(&shared.key, value),
                        StateChange::Removed { .. } => None,
                    };
                    shared.observers.notify(&ResourceEvent::ValueChanged(value));
                }
            });

            ResourceShared {
                key,
                session: session.clone(),
                state: Mutex::new(ResourceState {
                    lock_state: LockState::Unlocked,
                    local_value: None,
                    dirty: false,
                    generation: 0,
                    lock_confirmed_at: None,
                }),
                observers: Observers::new(),
                _mirror_subscription: subscription,
            }
        });

        let (commands, rx) = mpsc::unbounded_channel();
        session.client().spawn(worker::run(shared.clone(), rx))?;

        Ok(Self { shared, commands })
    }

    pub fn key(&self) -> &str {
        &self.shared.key
    }

    pub fn lock_state(&self) -> LockState {
        self.shared.state.lock().lock_state
    }

    /// Last value confirmed by the server, decoded as `T`.
    pub fn value(&self) -> Option<T> {
        self.shared
            .session
            .get_shared_state(&self.shared.key)
            .and_then(|value| decode(&self.shared.key, &value))
    }

    /// Undecoded confirmed value.
    pub fn raw_value(&self) -> Option<Value> {
        self.shared.session.get_shared_state(&self.shared.key)
    }

    /// The local edit while one is outstanding, otherwise the confirmed value.
    pub fn predicted_value(&self) -> Option<T> {
        let local = {
            let state = self.shared.state.lock();
            match state.lock_state {
                LockState::Unlocked => None,
                LockState::Pending | LockState::Locked => state.local_value.clone(),
            }
        };
        local.or_else(|| self.value())
    }

    /// Requests the lock. Only valid from [`LockState::Unlocked`]; returns
    /// `false` (and does nothing) otherwise.
    pub fn obtain_lock(&self) -> bool {
        let generation = {
            let mut state = self.shared.state.lock();
            if state.lock_state != LockState::Unlocked {
                return false;
            }
            state.lock_state = LockState::Pending;
            state.generation += 1;
            state.generation
        };

        debug!(key = %self.shared.key, "lock requested");
        self.send(Command::Lock { generation });
        true
    }

    /// Gives the lock up. The resource is `Unlocked` as soon as this returns,
    /// whatever the server answers. Pending local edits are dropped.
    pub fn release_lock(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.lock_state == LockState::Unlocked {
                return;
            }
            state.reset();
        }

        debug!(key = %self.shared.key, "lock released");
        self.send(Command::Release);
        self.shared.observers.notify(&ResourceEvent::LockReleased);
    }

    /// Writes `value` under the lock, requesting the lock first when the
    /// resource is unlocked.
    ///
    /// [`SharedResource::value`] does not change until the server echoes the
    /// write back.
    pub fn update_value_with_lock(
        &self,
        value: T,
    ) {
        if self.lock_state() == LockState::Unlocked {
            self.obtain_lock();
        }

        {
            let mut state = self.shared.state.lock();
            state.local_value = Some(value);
            state.dirty = true;
        }
        self.send(Command::Flush);
    }

    pub fn on_event<F>(
        &self,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&ResourceEvent<T>) + Send + Sync + 'static,
    {
        self.shared.observers.subscribe(callback)
    }

    fn send(
        &self,
        command: Command,
    ) {
        if self.commands.send(command).is_err() {
            debug!(key = %self.shared.key, "resource worker stopped; request dropped");
        }
    }
}

pub(crate) fn decode<T: DeserializeOwned>(
    key: &str,
    value: &Value,
) -> Option<T> {
    match from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            debug!(key, "value does not decode: {:?}", e);
            None
        }
    }
}
