use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::StateChanges;

/// Changes waiting to be flushed to one subscriber.
///
/// Batches keep store-apply order. A batch becomes eligible once it is older
/// than the configured broadcast latency; eligible batches are merged so
/// repeated writes to one key collapse to the last value.
#[derive(Debug, Default)]
pub(crate) struct ChangeBuffer {
    pending: Mutex<VecDeque<(Instant, StateChanges)>>,
}

impl ChangeBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(
        &self,
        applied_at: Instant,
        changes: StateChanges,
    ) {
        if changes.is_empty() {
            return;
        }
        self.pending.lock().push_back((applied_at, changes));
    }

    /// Takes every batch applied at least `latency` before `now`.
    ///
    /// Returns `None` when nothing is ready, so idle ticks send nothing.
    pub(crate) fn drain_ready(
        &self,
        now: Instant,
        latency: Duration,
    ) -> Option<StateChanges> {
        let mut pending = self.pending.lock();
        let mut merged: Option<StateChanges> = None;

        while let Some((applied_at, _)) = pending.front() {
            let due = applied_at.checked_add(latency);
            if due.map_or(true, |due| due > now) {
                break;
            }
            if let Some((_, changes)) = pending.pop_front() {
                match merged.as_mut() {
                    Some(acc) => acc.merge(changes),
                    None => merged = Some(changes),
                }
            }
        }

        merged
    }
}
