use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

pub const OUTCOME_APPLIED: &str = "applied";
pub const OUTCOME_REJECTED: &str = "rejected";

lazy_static! {
    pub static ref STATE_BATCHES: IntCounterVec = IntCounterVec::new(
        Opts::new("state_batches_total", "UpdateState batches by outcome"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref LOCK_BATCHES: IntCounterVec = IntCounterVec::new(
        Opts::new("lock_batches_total", "UpdateLocks batches by outcome"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref BROADCASTS_SENT: IntCounter = IntCounter::new(
        "broadcasts_sent_total",
        "StateUpdate messages pushed to subscribers"
    )
    .expect("metric can not be created");

    pub static ref ACTIVE_SUBSCRIBERS: IntGauge = IntGauge::new(
        "active_subscribers",
        "Currently open state update subscriptions"
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        register_custom_metrics(&registry);
        registry
    };
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(STATE_BATCHES.clone()),
        Box::new(LOCK_BATCHES.clone()),
        Box::new(BROADCASTS_SENT.clone()),
        Box::new(ACTIVE_SUBSCRIBERS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            error!("collector can not be registered: {:?}", e);
        }
    }
}

/// Renders every registered metric in the Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("custom metrics could not be from_utf8'd: {}", e);
        String::default()
    })
}

/// Serves `/metrics` until the shutdown signal fires.
pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    info!("metrics endpoint listening on port {}", port);
    let (_, server) = warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
        let _ = shutdown_signal.changed().await;
    });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(encode_metrics())
}

#[cfg(test)]
mod metrics_test;
