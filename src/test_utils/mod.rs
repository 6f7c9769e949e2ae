//! Helpers shared by the unit tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

use crate::Connection;
use crate::ServerConfig;
use crate::Session;
use crate::SessionConfig;
use crate::StateStore;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

pub(crate) fn test_server_config() -> ServerConfig {
    ServerConfig {
        min_broadcast_interval_in_ms: 10,
        ..Default::default()
    }
}

pub(crate) fn test_session_config() -> SessionConfig {
    SessionConfig {
        update_interval_in_ms: 10,
        commit_interval_in_ms: 10,
        lock_duration_in_ms: 1_000,
        release_locks_on_close: true,
    }
}

pub(crate) fn test_store(config: ServerConfig) -> Arc<StateStore> {
    Arc::new(StateStore::new(config))
}

/// Opens a session on its own in-process connection to `store`.
pub(crate) async fn local_session(
    store: &Arc<StateStore>,
    config: SessionConfig,
) -> Session {
    let connection = Connection::local(store.clone());
    Session::open(&connection, config).await.unwrap()
}

/// Polls `condition` until it holds; panics after `limit`.
pub(crate) async fn wait_until<F>(
    limit: Duration,
    mut condition: F,
) where
    F: FnMut() -> bool,
{
    let polled = timeout(limit, async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "condition not met within {limit:?}");
}
