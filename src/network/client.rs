use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use super::Connection;
use super::StateStream;
use super::StateTransport;
use crate::proto::StateUpdate;
use crate::proto::SubscribeStateUpdatesRequest;
use crate::proto::UpdateLocksRequest;
use crate::proto::UpdateLocksResponse;
use crate::proto::UpdateStateRequest;
use crate::proto::UpdateStateResponse;
use crate::utils::scoped_timer::ScopedTimer;
use crate::Result;
use crate::Scope;
use crate::ScopeKind;

/// One logical user of a [`Connection`].
///
/// Unary calls issued on a cancelled client fail with a scope error instead
/// of waiting on the wire. Cloning shares the same client scope.
#[derive(Clone)]
pub struct StateClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    scope: Scope,
    transport: Arc<dyn StateTransport>,
    // Keeps the connection alive for as long as any client uses it
    _connection: Connection,
}

impl fmt::Debug for StateClient {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("StateClient")
            .field("cancelled", &self.inner.scope.is_cancelled())
            .finish()
    }
}

impl StateClient {
    pub(super) fn new(
        scope: Scope,
        transport: Arc<dyn StateTransport>,
        connection: Connection,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                scope,
                transport,
                _connection: connection,
            }),
        }
    }

    pub async fn update_state(
        &self,
        request: UpdateStateRequest,
    ) -> Result<UpdateStateResponse> {
        let mut timer = ScopedTimer::new("update_state");
        let answer = self
            .inner
            .scope
            .run("update_state", self.inner.transport.update_state(request))
            .await?;
        timer.complete();
        answer
    }

    pub async fn update_locks(
        &self,
        request: UpdateLocksRequest,
    ) -> Result<UpdateLocksResponse> {
        let mut timer = ScopedTimer::new("update_locks");
        let answer = self
            .inner
            .scope
            .run("update_locks", self.inner.transport.update_locks(request))
            .await?;
        timer.complete();
        answer
    }

    /// Opens a server stream and feeds every [`StateUpdate`] to `on_update`,
    /// in arrival order, from a single reader task.
    ///
    /// The returned [`StateStream`] is cancelled when the server ends the
    /// stream, when the stream fails, or when this client (or its
    /// connection) is cancelled.
    pub async fn open_stream<F>(
        &self,
        request: SubscribeStateUpdatesRequest,
        mut on_update: F,
    ) -> Result<StateStream>
    where
        F: FnMut(StateUpdate) + Send + 'static,
    {
        let scope = self.inner.scope.child(ScopeKind::Stream)?;
        let mut updates = scope
            .run(
                "subscribe_state_updates",
                self.inner.transport.subscribe_state_updates(request),
            )
            .await??;

        let token = scope.cancellation_token()?;
        scope.spawn(async move {
            while let Some(item) = updates.next().await {
                match item {
                    Ok(update) => on_update(update),
                    Err(e) => {
                        warn!("state update stream failed: {:?}", e);
                        break;
                    }
                }
            }
            debug!("state update stream ended");
            token.cancel();
        })?;

        Ok(StateStream::new(scope))
    }

    /// Runs `task` in this client's scope. It is stopped when the client is
    /// cancelled.
    pub fn spawn<F>(
        &self,
        task: F,
    ) -> Result<JoinHandle<Option<F::Output>>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.scope.spawn(task)
    }

    pub fn cancel(&self) {
        self.inner.scope.cancel();
    }

    pub async fn close(&self) {
        self.inner.scope.close().await;
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.scope.is_cancelled()
    }

    pub fn cancellation_token(&self) -> Result<CancellationToken> {
        self.inner.scope.cancellation_token()
    }
}
