use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

/// Logs the latency of one unary state call (`update_state` or
/// `update_locks`) under the `timing` target when dropped.
///
/// A call abandoned by cancellation still logs, with `completed = false`.
pub(crate) struct ScopedTimer {
    start: Instant,
    call: &'static str,
    completed: bool,
}

impl ScopedTimer {
    pub(crate) fn new(call: &'static str) -> Self {
        Self {
            start: Instant::now(),
            call,
            completed: false,
        }
    }

    /// Marks the call as answered, successfully or not.
    pub(crate) fn complete(&mut self) {
        self.completed = true;
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        trace!(
            target: "timing",
            call = self.call,
            completed = self.completed,
            elapsed_ms = self.elapsed().as_millis() as u64,
            "unary state call finished"
        );
    }
}
