use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::Command;
use super::LockState;
use super::ResourceEvent;
use super::ResourceShared;
use crate::to_value;
use crate::LockRequest;
use crate::StateChanges;

/// Serializes every request of one resource.
///
/// Runs until the last [`super::SharedResource`] handle is dropped (then
/// gives a held lock back) or the session's client scope is cancelled.
pub(super) async fn run<T>(
    shared: Arc<ResourceShared<T>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(shared.session.config().commit_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Lock { generation }) => shared.acquire(generation).await,
                Some(Command::Release) => shared.release().await,
                Some(Command::Flush) => shared.flush().await,
                None => break,
            },
            _ = ticker.tick() => shared.on_tick().await,
        }
    }

    let held = shared.state.lock().lock_state != LockState::Unlocked;
    if held {
        debug!(key = %shared.key, "resource dropped while holding its lock");
        shared.release().await;
    }
    trace!(key = %shared.key, "resource worker stopped");
}

impl<T> ResourceShared<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Requests (or refreshes) the lock for the state generation it was
    /// issued in.
    async fn acquire(
        &self,
        generation: u64,
    ) {
        let duration = self.session.config().lock_duration();
        let mut requests = BTreeMap::new();
        requests.insert(self.key.clone(), LockRequest::Acquire(duration));
        let outcome = self.session.request_locks(requests).await;
        let failed = outcome.is_err();

        let event = {
            let mut state = self.state.lock();
            if state.generation != generation {
                trace!(key = %self.key, "stale lock answer ignored");
                return;
            }

            match outcome {
                Ok(true) => {
                    let newly_acquired = state.lock_state == LockState::Pending;
                    state.lock_state = LockState::Locked;
                    state.lock_confirmed_at = Some(Instant::now());
                    newly_acquired.then_some(ResourceEvent::LockAcquired)
                }
                Ok(false) => {
                    debug!(key = %self.key, "lock rejected");
                    state.reset();
                    Some(ResourceEvent::LockRejected)
                }
                Err(e) => {
                    warn!(key = %self.key, "lock request failed: {:?}", e);
                    state.reset();
                    Some(ResourceEvent::LockRejected)
                }
            }
        };

        if let Some(event) = event {
            self.observers.notify(&event);
        }
        // The server may have granted the lock before the answer got lost.
        if failed {
            self.release().await;
        }
    }

    async fn release(&self) {
        let mut requests = BTreeMap::new();
        requests.insert(self.key.clone(), LockRequest::Release);
        match self.session.request_locks(requests).await {
            Ok(true) => {}
            Ok(false) => debug!(key = %self.key, "lock release refused"),
            Err(e) => warn!(key = %self.key, "lock release failed: {:?}", e),
        }
    }

    /// Sends the local edit if there is one that has not been sent yet.
    async fn flush(&self) {
        let (value, generation) = {
            let mut state = self.state.lock();
            if !state.dirty || state.lock_state == LockState::Unlocked {
                return;
            }
            state.dirty = false;
            (state.local_value.clone(), state.generation)
        };
        let Some(value) = value else {
            return;
        };

        let encoded = match to_value(&value) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = %self.key, "local value can not be encoded: {:?}", e);
                return;
            }
        };

        let outcome = self
            .session
            .request_update(StateChanges::new().with_upsert(self.key.clone(), encoded))
            .await;
        if matches!(outcome, Ok(true)) {
            return;
        }
        if let Err(e) = &outcome {
            warn!(key = %self.key, "write under lock failed: {:?}", e);
        }

        let rejected = {
            let mut state = self.state.lock();
            if state.generation != generation {
                false
            } else {
                state.reset();
                true
            }
        };
        if rejected {
            debug!(key = %self.key, "write under lock rejected");
            self.observers.notify(&ResourceEvent::LockRejected);
            // Give up the lock as well so it does not linger until it expires.
            self.release().await;
        }
    }

    /// Periodic commit of outstanding edits and lock refresh before half the
    /// lock duration has passed.
    async fn on_tick(&self) {
        self.flush().await;

        let refresh = {
            let state = self.state.lock();
            let half_life = self.session.config().lock_duration() / 2;
            match (state.lock_state, state.lock_confirmed_at) {
                (LockState::Locked, Some(at)) if at.elapsed() >= half_life => Some(state.generation),
                _ => None,
            }
        };

        if let Some(generation) = refresh {
            trace!(key = %self.key, "refreshing lock");
            self.acquire(generation).await;
        }
    }
}
