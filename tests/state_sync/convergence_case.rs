use std::sync::Arc;

use parking_lot::Mutex;
use shared_state::ServerConfig;
use shared_state::StateChange;
use shared_state::StateChanges;
use shared_state::Value;

use crate::common::server_config;
use crate::common::wait_until;
use crate::common::TestServer;

#[tokio::test]
async fn sessions_converge_over_grpc() {
    let server = TestServer::start(server_config()).await;
    let writer = server.session().await;
    let reader = server.session().await;

    assert!(writer.set_shared_state("abc", 1.2).outcome().await.unwrap());
    wait_until(|| reader.get_shared_state("abc") == Some(Value::Number(1.2))).await;
    wait_until(|| writer.get_shared_state("abc") == Some(Value::Number(1.2))).await;

    writer.close().await;
    reader.close().await;
    server.stop().await;
}

#[tokio::test]
async fn structured_values_survive_the_wire() {
    let server = TestServer::start(server_config()).await;
    let session = server.session().await;

    let changes = StateChanges::new()
        .with_upsert("list", vec![1.0, 2.0])
        .with_upsert("text", "hello")
        .with_upsert("flag", false);
    assert!(session.update_shared_state(changes).outcome().await.unwrap());

    wait_until(|| session.shared_state().len() == 3).await;
    assert_eq!(
        session.get_shared_state("list"),
        Some(Value::List(vec![Value::Number(1.0), Value::Number(2.0)]))
    );
    assert_eq!(session.get_shared_state("text"), Some(Value::String("hello".into())));

    session.close().await;
    server.stop().await;
}

#[tokio::test]
async fn removals_reach_every_mirror() {
    let server = TestServer::start(server_config()).await;
    let writer = server.session().await;
    let reader = server.session().await;
    let removed = Arc::new(Mutex::new(Vec::new()));
    let sink = removed.clone();
    let _sub = reader.on_change(move |change| {
        if let StateChange::Removed { key } = change {
            sink.lock().push(key.clone());
        }
    });

    writer.set_shared_state("gone", 1.0);
    wait_until(|| reader.contains_key("gone")).await;
    writer.remove_shared_state_key("gone");
    wait_until(|| !reader.contains_key("gone")).await;

    assert_eq!(removed.lock().as_slice(), &["gone".to_string()]);
    server.stop().await;
}

#[tokio::test]
async fn latecomer_sees_snapshot_after_latency() {
    let config = ServerConfig {
        broadcast_latency_in_ms: 200,
        ..server_config()
    };
    let server = TestServer::start(config).await;
    server.store.force_update(StateChanges::new().with_upsert("abc", 1.2));

    let session = server.session().await;
    assert_eq!(session.get_shared_state("abc"), None);
    wait_until(|| session.get_shared_state("abc").is_some()).await;

    server.stop().await;
}
