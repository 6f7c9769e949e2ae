use std::future::Future;

use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use crate::network::StateClient;
use crate::Result;
use crate::ScopeError;
use crate::ScopeKind;

/// Handle to a fire-and-forget request.
///
/// The request is already on its way when the handle is returned. Callers may
/// ignore it (the outcome is logged) or await [`PendingWrite::outcome`].
/// Dropping the handle never cancels the request and nothing is retried.
#[derive(Debug)]
pub struct PendingWrite {
    operation: &'static str,
    handle: Result<JoinHandle<Option<Result<bool>>>>,
}

impl PendingWrite {
    pub(crate) fn spawn<F>(
        client: &StateClient,
        operation: &'static str,
        request: F,
    ) -> Self
    where
        F: Future<Output = Result<bool>> + Send + 'static,
    {
        let handle = client.spawn(async move {
            let outcome = request.await;
            match &outcome {
                Ok(true) => {}
                Ok(false) => debug!(operation, "request rejected by server"),
                Err(e) => warn!(operation, "request failed: {:?}", e),
            }
            outcome
        });

        if let Err(e) = &handle {
            warn!(operation, "request not sent: {:?}", e);
        }

        Self { operation, handle }
    }

    /// Waits for the server's answer: `Ok(false)` is a rejected batch.
    pub async fn outcome(self) -> Result<bool> {
        let handle = self.handle?;
        match handle.await? {
            Some(outcome) => outcome,
            None => Err(ScopeError::Cancelled {
                scope: ScopeKind::Client,
                operation: self.operation,
            }
            .into()),
        }
    }

    /// True once the request has completed, failed or was never sent.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}
