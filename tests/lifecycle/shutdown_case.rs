use shared_state::Session;

use crate::common::server_config;
use crate::common::session_config;
use crate::common::wait_until;
use crate::common::TestServer;

#[tokio::test]
async fn closing_connection_closes_sessions() {
    let server = TestServer::start(server_config()).await;
    let connection = server.connect().await;
    let first = Session::open(&connection, session_config()).await.unwrap();
    let second = Session::open(&connection, session_config()).await.unwrap();
    wait_until(|| first.is_streaming() && second.is_streaming()).await;

    connection.close().await;

    assert!(first.is_closed());
    assert!(second.is_closed());
    assert!(!first.is_streaming());
    assert!(first.set_shared_state("k", 1.0).outcome().await.unwrap_err().is_scope_closed());
    assert!(Session::open(&connection, session_config()).await.is_err());

    server.stop().await;
}

#[tokio::test]
async fn server_shutdown_ends_streams() {
    let server = TestServer::start(server_config()).await;
    let session = server.session().await;
    wait_until(|| server.store.subscriber_count() == 1).await;

    server.stop().await;

    wait_until(|| !session.is_streaming()).await;
    assert!(!session.is_closed());
}

#[tokio::test]
async fn closed_session_unsubscribes_on_server() {
    let server = TestServer::start(server_config()).await;
    let session = server.session().await;
    wait_until(|| server.store.subscriber_count() == 1).await;

    session.close().await;
    wait_until(|| server.store.subscriber_count() == 0).await;

    server.stop().await;
}
