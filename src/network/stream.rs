use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::Scope;

/// Handle to one open server stream.
///
/// Dropping the handle cancels the stream. Sibling streams of the same
/// client are never affected.
#[derive(Debug)]
pub struct StateStream {
    scope: Scope,
}

impl StateStream {
    pub(super) fn new(scope: Scope) -> Self {
        Self { scope }
    }

    pub fn cancel(&self) {
        self.scope.cancel();
    }

    /// Cancels the stream and waits for its reader task to stop.
    pub async fn close(&self) {
        self.scope.close().await;
    }

    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }

    pub fn cancellation_token(&self) -> Result<CancellationToken> {
        self.scope.cancellation_token()
    }

    /// Resolves once the stream has been cancelled for any reason.
    pub async fn cancelled(&self) {
        self.scope.cancelled().await
    }
}
