use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::GrpcTransport;
use super::LocalTransport;
use super::StateClient;
use super::StateTransport;
use crate::ClientConfig;
use crate::Result;
use crate::Scope;
use crate::ScopeKind;
use crate::StateStore;

/// Outermost scope of the hierarchy: one physical channel to the server.
///
/// Cheap to clone; all clones share the channel and its scope. The scope is
/// cancelled once the last clone (including the ones held by its clients) is
/// dropped.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    scope: Scope,
    transport: Arc<dyn StateTransport>,
}

impl fmt::Debug for Connection {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Connection")
            .field("cancelled", &self.inner.scope.is_cancelled())
            .finish()
    }
}

impl Connection {
    /// Dials the gRPC server at `address:port`.
    pub async fn connect(
        address: &str,
        port: u16,
        config: &ClientConfig,
    ) -> Result<Self> {
        let transport = GrpcTransport::connect(address, port, config).await?;
        info!(address, port, "connected to shared state server");
        Ok(Self::with_transport(Arc::new(transport)))
    }

    /// Connects straight to an in-process store.
    pub fn local(store: Arc<StateStore>) -> Self {
        Self::with_transport(Arc::new(LocalTransport::new(store)))
    }

    pub fn with_transport(transport: Arc<dyn StateTransport>) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                scope: Scope::root(ScopeKind::Connection),
                transport,
            }),
        }
    }

    /// Creates a client bound to this connection.
    ///
    /// Fails with [`crate::ScopeError::AlreadyClosed`] once the connection is
    /// cancelled.
    pub fn client(&self) -> Result<StateClient> {
        let scope = self.inner.scope.child(ScopeKind::Client)?;
        Ok(StateClient::new(scope, self.inner.transport.clone(), self.clone()))
    }

    /// Cancels the connection and everything created from it.
    pub fn cancel(&self) {
        self.inner.scope.cancel();
    }

    /// Cancels the connection and waits for every client and stream task to
    /// finish.
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
