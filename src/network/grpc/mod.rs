//! gRPC binding of the state service
//!
//! [`grpc_transport::GrpcTransport`] is the client half, [`StateServer`] the
//! server half. [`start_rpc_server`] / [`serve_with_listener`] boot a tonic
//! server with the health service next to it.

mod grpc_state_service;
pub(crate) mod grpc_transport;

pub use grpc_state_service::*;


//-------------------------------------------------------------------------------
// Start RPC Server
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::codec::CompressionEncoding;
use tonic::transport::server::Router;
use tonic_health::server::health_reporter;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::proto::state_service_server::StateServiceServer;
use crate::Result;
use crate::ServerConfig;
use crate::StateStore;

/// Serves the state service on `config.listen_address` until the shutdown
/// signal fires.
pub async fn start_rpc_server(
    store: Arc<StateStore>,
    config: &ServerConfig,
    mut shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    let listen_address = config.listen_address;
    let router = build_router(store.clone(), config).await;

    // Subscriptions only end once the store stops them, and graceful
    // shutdown waits for every open response stream.
    let stopping = store.clone();

    info!("state service listening on {}", listen_address);
    if let Err(e) = router
        .serve_with_shutdown(
            listen_address,
            shutdown_signal.changed().map(move |_| {
                warn!("Stopping RPC server. {}", listen_address);
                stopping.shutdown();
            }),
        )
        .await
    {
        error!("error to start rpc server :{:?}.", e);
        return Err(e.into());
    }

    debug!("rpc service finished!");
    Ok(())
}

/// Like [`start_rpc_server`] but on an already bound listener, e.g. one
/// bound to port 0.
pub async fn serve_with_listener(
    store: Arc<StateStore>,
    listener: TcpListener,
    config: &ServerConfig,
    mut shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    let local_addr: Option<SocketAddr> = listener.local_addr().ok();
    let router = build_router(store.clone(), config).await;
    let stopping = store.clone();

    info!(?local_addr, "state service listening");
    if let Err(e) = router
        .serve_with_incoming_shutdown(
            TcpListenerStream::new(listener),
            shutdown_signal.changed().map(move |_| {
                warn!(?local_addr, "Stopping RPC server");
                stopping.shutdown();
            }),
        )
        .await
    {
        error!("error to start rpc server :{:?}.", e);
        return Err(e.into());
    }

    debug!("rpc service finished!");
    Ok(())
}

async fn build_router(
    store: Arc<StateStore>,
    config: &ServerConfig,
) -> Router {
    let (mut health_reporter, health_service) = health_reporter();
    health_reporter.set_serving::<StateServiceServer<StateServer>>().await;

    let mut service = StateServiceServer::new(StateServer::new(store));
    if config.enable_compression {
        service = service
            .accept_compressed(CompressionEncoding::Gzip)
            .send_compressed(CompressionEncoding::Gzip);
    }

    tonic::transport::Server::builder()
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .tcp_nodelay(true)
        .add_service(health_service)
        .add_service(service)
}
