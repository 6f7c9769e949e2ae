use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::timeout;

use super::*;
use crate::Error;

#[tokio::test]
async fn cancel_twice_leaves_scope_cancelled() {
    let scope = Scope::root(ScopeKind::Connection);
    scope.cancel();
    scope.cancel();
    assert!(scope.is_cancelled());
}

#[tokio::test]
async fn cancellation_token_fails_after_cancel() {
    let scope = Scope::root(ScopeKind::Client);
    assert!(scope.cancellation_token().is_ok());

    scope.cancel();
    match scope.cancellation_token() {
        Err(Error::Scope(ScopeError::AlreadyClosed { scope })) => {
            assert_eq!(scope, ScopeKind::Client)
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn cancelling_parent_cascades_to_all_descendants() {
    let connection = Scope::root(ScopeKind::Connection);
    let client_a = connection.child(ScopeKind::Client).unwrap();
    let client_b = connection.child(ScopeKind::Client).unwrap();
    let stream_a = client_a.child(ScopeKind::Stream).unwrap();
    let stream_b = client_b.child(ScopeKind::Stream).unwrap();

    connection.cancel();

    assert!(client_a.is_cancelled());
    assert!(client_b.is_cancelled());
    assert!(stream_a.is_cancelled());
    assert!(stream_b.is_cancelled());
}

#[tokio::test]
async fn cancelling_client_leaves_siblings_and_parent_running() {
    let connection = Scope::root(ScopeKind::Connection);
    let client_a = connection.child(ScopeKind::Client).unwrap();
    let client_b = connection.child(ScopeKind::Client).unwrap();
    let stream_a = client_a.child(ScopeKind::Stream).unwrap();
    let stream_b = client_b.child(ScopeKind::Stream).unwrap();

    client_a.cancel();

    assert!(stream_a.is_cancelled());
    assert!(!connection.is_cancelled());
    assert!(!client_b.is_cancelled());
    assert!(!stream_b.is_cancelled());
}

#[tokio::test]
async fn cancelling_stream_leaves_sibling_streams_running() {
    let client = Scope::root(ScopeKind::Client);
    let stream_a = client.child(ScopeKind::Stream).unwrap();
    let stream_b = client.child(ScopeKind::Stream).unwrap();

    stream_a.cancel();

    assert!(stream_a.is_cancelled());
    assert!(!stream_b.is_cancelled());
    assert!(!client.is_cancelled());
}

#[tokio::test]
async fn child_of_cancelled_scope_is_rejected() {
    let connection = Scope::root(ScopeKind::Connection);
    connection.cancel();

    match connection.child(ScopeKind::Client) {
        Err(Error::Scope(ScopeError::AlreadyClosed { scope })) => {
            assert_eq!(scope, ScopeKind::Connection)
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn spawn_on_cancelled_scope_fails_fast() {
    let scope = Scope::root(ScopeKind::Client);
    scope.cancel();
    assert!(scope.spawn(async {}).is_err());
}

#[tokio::test]
async fn spawned_task_is_stopped_by_cancel() {
    let scope = Scope::root(ScopeKind::Client);
    let handle = scope
        .spawn(async {
            sleep(Duration::from_secs(3600)).await;
        })
        .unwrap();

    scope.cancel();
    let output = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    assert!(output.is_none());
}

#[tokio::test]
async fn run_fails_instead_of_hanging_when_cancelled_mid_flight() {
    let scope = Arc::new(Scope::root(ScopeKind::Client));
    let canceller = scope.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let result = timeout(
        Duration::from_secs(1),
        scope.run("update_state", sleep(Duration::from_secs(3600))),
    )
    .await
    .unwrap();

    assert!(matches!(
        result,
        Err(Error::Scope(ScopeError::Cancelled {
            scope: ScopeKind::Client,
            operation: "update_state"
        }))
    ));
}

#[tokio::test]
async fn close_waits_for_descendant_tasks() {
    let connection = Scope::root(ScopeKind::Connection);
    let client = connection.child(ScopeKind::Client).unwrap();
    let finished = Arc::new(AtomicBool::new(false));

    // The task may be cancelled before its first poll, so the guard is owned
    // by the future from the start and set once the future is dropped.
    struct SetOnDrop(Arc<AtomicBool>);
    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }
    let guard = SetOnDrop(finished.clone());
    client
        .spawn(async move {
            let _guard = guard;
            sleep(Duration::from_secs(3600)).await;
        })
        .unwrap();

    timeout(Duration::from_secs(1), connection.close()).await.unwrap();
    assert!(finished.load(Ordering::SeqCst));
    assert!(client.is_cancelled());
}

#[tokio::test]
async fn concurrent_close_completes_for_every_caller() {
    let scope = Arc::new(Scope::root(ScopeKind::Connection));
    let child = scope.child(ScopeKind::Client).unwrap();
    child
        .spawn(async {
            sleep(Duration::from_millis(50)).await;
        })
        .unwrap();

    let a = scope.clone();
    let b = scope.clone();
    let (ra, rb) = tokio::join!(
        timeout(Duration::from_secs(1), async move { a.close().await }),
        timeout(Duration::from_secs(1), async move { b.close().await }),
    );
    assert!(ra.is_ok());
    assert!(rb.is_ok());

    // A third, sequential close is a no-op.
    timeout(Duration::from_secs(1), scope.close()).await.unwrap();
    assert!(scope.is_cancelled());
}

#[tokio::test]
async fn dropping_scope_cancels_children() {
    let connection = Scope::root(ScopeKind::Connection);
    let client = connection.child(ScopeKind::Client).unwrap();
    drop(connection);
    assert!(client.is_cancelled());
}
