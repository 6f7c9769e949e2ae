use std::sync::Arc;
use std::time::Duration;

use shared_state::grpc::serve_with_listener;
use shared_state::ClientConfig;
use shared_state::Connection;
use shared_state::ServerConfig;
use shared_state::Session;
use shared_state::SessionConfig;
use shared_state::StateStore;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

// Upper bound for any condition the tests wait on
pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for integration test.");
}

/// A state server bound to an ephemeral localhost port.
pub struct TestServer {
    pub store: Arc<StateStore>,
    pub port: u16,
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(config: ServerConfig) -> TestServer {
        enable_logger();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let store = Arc::new(StateStore::new(config.clone()));
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let serving = store.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = serve_with_listener(serving, listener, &config, shutdown_rx).await {
                eprintln!("test server stopped: {e:?}");
            }
        });

        TestServer {
            store,
            port,
            shutdown_tx,
            handle,
        }
    }

    pub async fn connect(&self) -> Connection {
        Connection::connect("127.0.0.1", self.port, &ClientConfig::default())
            .await
            .unwrap()
    }

    pub async fn session(&self) -> Session {
        self.session_with(session_config()).await
    }

    pub async fn session_with(
        &self,
        config: SessionConfig,
    ) -> Session {
        let connection = self.connect().await;
        Session::open(&connection, config).await.unwrap()
    }

    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        timeout(WAIT_LIMIT, self.handle)
            .await
            .expect("server did not stop")
            .unwrap();
    }
}

pub fn server_config() -> ServerConfig {
    ServerConfig {
        min_broadcast_interval_in_ms: 10,
        ..Default::default()
    }
}

pub fn session_config() -> SessionConfig {
    SessionConfig {
        update_interval_in_ms: 10,
        commit_interval_in_ms: 20,
        lock_duration_in_ms: 2_000,
        release_locks_on_close: true,
    }
}

/// Polls `condition` until it holds; panics after [`WAIT_LIMIT`].
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let polled = timeout(WAIT_LIMIT, async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "condition not met within {WAIT_LIMIT:?}");
}
