use std::time::Duration;

use shared_state::LockRequest;
use shared_state::LockState;
use shared_state::StateChanges;

use crate::common::server_config;
use crate::common::wait_until;
use crate::common::TestServer;

fn acquire(key: &str) -> (String, LockRequest) {
    (key.to_string(), LockRequest::Acquire(Duration::from_secs(2)))
}

#[tokio::test]
async fn only_one_session_obtains_a_lock() {
    let server = TestServer::start(server_config()).await;
    let alice = server.session().await;
    let bob = server.session().await;

    let a = alice.get_shared_resource::<f64>("x").unwrap();
    let b = bob.get_shared_resource::<f64>("x").unwrap();
    assert!(a.obtain_lock());
    wait_until(|| a.lock_state() == LockState::Locked).await;

    assert!(b.obtain_lock());
    wait_until(|| b.lock_state() == LockState::Unlocked).await;

    a.update_value_with_lock(4.0);
    wait_until(|| b.value() == Some(4.0)).await;

    a.release_lock();
    wait_until(|| server.store.lock_holder("x").is_none()).await;
    assert!(b.obtain_lock());
    wait_until(|| b.lock_state() == LockState::Locked).await;

    server.stop().await;
}

#[tokio::test]
async fn lock_batch_is_all_or_nothing() {
    let server = TestServer::start(server_config()).await;
    let alice = server.session().await;
    let bob = server.session().await;

    assert!(alice.update_locks([acquire("b")]).outcome().await.unwrap());
    assert!(!bob.update_locks([acquire("a"), acquire("b")]).outcome().await.unwrap());

    assert_eq!(server.store.lock_holder("a"), None);
    assert_eq!(server.store.lock_holder("b"), Some(alice.access_token().clone()));
    server.stop().await;
}

#[tokio::test]
async fn locked_key_rejects_foreign_writes() {
    let server = TestServer::start(server_config()).await;
    let alice = server.session().await;
    let bob = server.session().await;

    assert!(alice.update_locks([acquire("k")]).outcome().await.unwrap());
    let batch = StateChanges::new().with_upsert("free", 1.0).with_upsert("k", 1.0);
    assert!(!bob.update_shared_state(batch).outcome().await.unwrap());
    assert_eq!(server.store.get("free"), None);

    alice.close().await;
    assert_eq!(server.store.lock_holder("k"), None);
    assert!(bob.set_shared_state("k", 2.0).outcome().await.unwrap());

    server.stop().await;
}
