use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tonic::Code;
use tonic::Status;

use super::*;
use crate::proto::StateUpdate;
use crate::proto::SubscribeStateUpdatesRequest;
use crate::proto::UpdateLocksRequest;
use crate::proto::UpdateLocksResponse;
use crate::proto::UpdateStateRequest;
use crate::Error;
use crate::NetworkError;
use crate::ScopeError;
use crate::ScopeKind;
use crate::ServerConfig;
use crate::StateChanges;
use crate::StateStore;
use crate::Value;

fn mock_connection(mock: MockStateTransport) -> Connection {
    Connection::with_transport(Arc::new(mock))
}

fn pending_stream() -> StateUpdateStream {
    futures::stream::pending().boxed()
}

fn subscribe_request() -> SubscribeStateUpdatesRequest {
    SubscribeStateUpdatesRequest { update_interval: 0.01 }
}

fn update_of(
    key: &str,
    value: f64,
) -> StateUpdate {
    StateChanges::new().with_upsert(key, value).into()
}

#[tokio::test]
async fn unary_call_on_cancelled_client_fails_fast() {
    let mut mock = MockStateTransport::new();
    mock.expect_update_state().never();
    let connection = mock_connection(mock);
    let client = connection.client().unwrap();

    client.cancel();
    let err = client.update_state(UpdateStateRequest::default()).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Scope(ScopeError::AlreadyClosed {
            scope: ScopeKind::Client
        })
    ));
}

#[tokio::test]
async fn client_on_cancelled_connection_is_rejected() {
    let connection = mock_connection(MockStateTransport::new());
    connection.cancel();

    let err = connection.client().unwrap_err();
    assert!(err.is_scope_closed());
    assert!(connection.cancellation_token().is_err());
}

#[tokio::test]
async fn stream_on_cancelled_client_is_rejected() {
    let mut mock = MockStateTransport::new();
    mock.expect_subscribe_state_updates().never();
    let connection = mock_connection(mock);
    let client = connection.client().unwrap();
    client.cancel();

    let result = client.open_stream(subscribe_request(), |_| {}).await;
    assert!(matches!(result, Err(e) if e.is_scope_closed()));
}

#[tokio::test]
async fn unary_call_forwards_request_and_response() {
    let mut mock = MockStateTransport::new();
    mock.expect_update_locks()
        .withf(|req| req.access_token == "alice")
        .times(1)
        .returning(|_| Ok(UpdateLocksResponse { success: true }));
    let client = mock_connection(mock).client().unwrap();

    let response = client
        .update_locks(UpdateLocksRequest {
            access_token: "alice".to_string(),
            lock_keys: None,
        })
        .await
        .unwrap();
    assert!(response.success);
}

#[tokio::test]
async fn connection_cancel_cascades_to_clients_and_streams() {
    let mut mock = MockStateTransport::new();
    mock.expect_subscribe_state_updates().returning(|_| Ok(pending_stream()));
    let connection = mock_connection(mock);

    let first = connection.client().unwrap();
    let second = connection.client().unwrap();
    let s1 = first.open_stream(subscribe_request(), |_| {}).await.unwrap();
    let s2 = second.open_stream(subscribe_request(), |_| {}).await.unwrap();

    connection.cancel();

    assert!(first.is_cancelled());
    assert!(second.is_cancelled());
    assert!(s1.is_cancelled());
    assert!(s2.is_cancelled());
    timeout(Duration::from_secs(1), connection.close()).await.unwrap();
}

#[tokio::test]
async fn client_cancel_leaves_sibling_clients_alone() {
    let mut mock = MockStateTransport::new();
    mock.expect_subscribe_state_updates().returning(|_| Ok(pending_stream()));
    let connection = mock_connection(mock);

    let first = connection.client().unwrap();
    let second = connection.client().unwrap();
    let s1 = first.open_stream(subscribe_request(), |_| {}).await.unwrap();
    let s2 = second.open_stream(subscribe_request(), |_| {}).await.unwrap();

    first.close().await;

    assert!(s1.is_cancelled());
    assert!(!second.is_cancelled());
    assert!(!s2.is_cancelled());
    assert!(!connection.is_cancelled());
}

#[tokio::test]
async fn stream_cancel_leaves_sibling_streams_alone() {
    let mut mock = MockStateTransport::new();
    mock.expect_subscribe_state_updates().returning(|_| Ok(pending_stream()));
    let client = mock_connection(mock).client().unwrap();

    let s1 = client.open_stream(subscribe_request(), |_| {}).await.unwrap();
    let s2 = client.open_stream(subscribe_request(), |_| {}).await.unwrap();

    s1.cancel();
    s1.cancel();

    assert!(s1.is_cancelled());
    assert!(!s2.is_cancelled());
    assert!(!client.is_cancelled());
}

#[tokio::test]
async fn updates_are_delivered_in_arrival_order() {
    let mut mock = MockStateTransport::new();
    mock.expect_subscribe_state_updates().returning(|_| {
        let updates = vec![Ok(update_of("n", 1.0)), Ok(update_of("n", 2.0)), Ok(update_of("n", 3.0))];
        Ok(futures::stream::iter(updates).chain(futures::stream::pending()).boxed())
    });
    let client = mock_connection(mock).client().unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _stream = client
        .open_stream(subscribe_request(), move |update| {
            let _ = tx.send(update);
        })
        .await
        .unwrap();

    for expected in [1.0, 2.0, 3.0] {
        let changes = StateChanges::from(rx.recv().await.unwrap());
        assert_eq!(changes.get("n"), Some(&Some(Value::Number(expected))));
    }
}

#[tokio::test]
async fn stream_scope_ends_when_server_closes_stream() {
    let mut mock = MockStateTransport::new();
    mock.expect_subscribe_state_updates()
        .returning(|_| Ok(futures::stream::empty().boxed()));
    let client = mock_connection(mock).client().unwrap();

    let stream = client.open_stream(subscribe_request(), |_| {}).await.unwrap();
    timeout(Duration::from_secs(1), stream.cancelled()).await.unwrap();

    assert!(!client.is_cancelled());
}

#[tokio::test]
async fn stream_failure_cancels_stream() {
    let mut mock = MockStateTransport::new();
    mock.expect_subscribe_state_updates().returning(|_| {
        let failure: Vec<crate::Result<StateUpdate>> = vec![Err(Status::unavailable("gone").into())];
        Ok(futures::stream::iter(failure).chain(futures::stream::pending()).boxed())
    });
    let client = mock_connection(mock).client().unwrap();

    let stream = client.open_stream(subscribe_request(), |_| {}).await.unwrap();
    timeout(Duration::from_secs(1), stream.cancelled()).await.unwrap();
}

#[tokio::test]
async fn subscribe_failure_is_returned_to_caller() {
    let mut mock = MockStateTransport::new();
    mock.expect_subscribe_state_updates()
        .returning(|_| Err(Status::unavailable("down").into()));
    let client = mock_connection(mock).client().unwrap();

    let result = client.open_stream(subscribe_request(), |_| {}).await;
    assert!(matches!(result, Err(Error::Network(NetworkError::TonicStatusError(_)))));
}

#[tokio::test]
async fn connection_close_waits_for_client_tasks() {
    struct SetOnDrop(Arc<AtomicBool>);
    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    let connection = mock_connection(MockStateTransport::new());
    let client = connection.client().unwrap();
    let finished = Arc::new(AtomicBool::new(false));
    let guard = SetOnDrop(finished.clone());
    client
        .spawn(async move {
            let _guard = guard;
            futures::future::pending::<()>().await;
        })
        .unwrap();

    connection.close().await;
    assert!(finished.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn local_transport_round_trip() {
    let store = Arc::new(StateStore::new(ServerConfig::default()));
    let client = Connection::local(store.clone()).client().unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _stream = client
        .open_stream(subscribe_request(), move |update| {
            let _ = tx.send(update);
        })
        .await
        .unwrap();

    let response = client
        .update_state(UpdateStateRequest {
            access_token: "alice".to_string(),
            update: Some(update_of("abc", 1.2)),
        })
        .await
        .unwrap();
    assert!(response.success);

    let changes = StateChanges::from(rx.recv().await.unwrap());
    assert_eq!(changes.get("abc"), Some(&Some(Value::Number(1.2))));
    assert_eq!(store.get("abc"), Some(Value::Number(1.2)));
}

#[tokio::test]
async fn local_transport_rejects_empty_token() {
    let store = Arc::new(StateStore::new(ServerConfig::default()));
    let client = Connection::local(store).client().unwrap();

    let err = client.update_state(UpdateStateRequest::default()).await.unwrap_err();
    match err {
        Error::Network(NetworkError::TonicStatusError(status)) => {
            assert_eq!(status.code(), Code::InvalidArgument)
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
