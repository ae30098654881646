//! Cancellation and timeout scenarios.
//!
//! Every operation takes a `CancelContext`. A context that has already fired
//! is refused up front and leaves the session alone; one that fires while
//! the operation is in flight tears the session down.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use mysql_client::{
    CancelContext, CancelReason, CancellationToken, Config, Error, Negotiated, Session, TxOptions,
};
use mysql_protocol::Command;
use mysql_testing::fixtures::users_table;
use mysql_testing::mock_server::{MockMySqlServer, MockResponse, MockStatement};
use tokio::net::TcpStream;

async fn session(server: &MockMySqlServer, config: Config) -> Session<TcpStream> {
    let negotiated = Negotiated::new(server.capabilities()).connection_id(9);
    Session::new(server.connect().await.unwrap(), negotiated, config)
}

async fn stalling_server() -> MockMySqlServer {
    MockMySqlServer::builder()
        .with_response("SELECT SLEEP(60)", MockResponse::Stall)
        .build()
        .await
        .unwrap()
}

// =============================================================================
// Context Fired Before the Operation
// =============================================================================

#[tokio::test]
async fn test_fired_token_is_refused_without_io() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let mut session = session(&server, Config::new()).await;

    let token = CancellationToken::new();
    token.cancel();
    let ctx = CancelContext::new(token);

    let err = session.exec(&ctx, "DELETE FROM t", &[]).await.unwrap_err();
    assert!(matches!(err, Error::Canceled(CancelReason::Canceled)));
    assert_eq!(err.cancel_reason(), Some(CancelReason::Canceled));
    assert_eq!(err.to_string(), "operation canceled");

    assert!(server.commands().is_empty());
    assert!(!session.is_closed());
    session.ping(&CancelContext::none()).await.unwrap();
}

#[tokio::test]
async fn test_expired_deadline_is_refused_for_every_operation() {
    let server = MockMySqlServer::builder()
        .with_statement("SELECT 1", MockStatement::new(0))
        .build()
        .await
        .unwrap();
    let mut session = session(&server, Config::new()).await;
    let expired = CancelContext::none().with_deadline(tokio::time::Instant::now());

    assert!(matches!(
        session.ping(&expired).await.unwrap_err(),
        Error::Canceled(CancelReason::DeadlineExceeded)
    ));
    assert!(matches!(
        session.query(&expired, "SELECT 1", &[]).await.unwrap_err(),
        Error::Canceled(_)
    ));
    assert!(matches!(
        session.prepare(&expired, "SELECT 1").await.unwrap_err(),
        Error::Canceled(_)
    ));
    assert!(matches!(
        session.begin_transaction(&expired, TxOptions::new()).await.unwrap_err(),
        Error::Canceled(_)
    ));

    assert!(server.commands().is_empty());
    assert!(session.is_valid());
}

// =============================================================================
// Context Fired In Flight
// =============================================================================

#[tokio::test]
async fn test_deadline_during_query_invalidates_session() {
    let server = stalling_server().await;
    let mut session = session(&server, Config::new()).await;

    let ctx = CancelContext::none().with_timeout(Duration::from_millis(50));
    let err = session.exec(&ctx, "SELECT SLEEP(60)", &[]).await.unwrap_err();

    assert!(matches!(err, Error::Canceled(CancelReason::DeadlineExceeded)));
    assert!(err.is_terminal());
    assert!(session.is_closed());
    assert!(!session.is_valid());

    let next = session.ping(&CancelContext::none()).await.unwrap_err();
    assert!(next.is_bad_connection());
}

#[tokio::test]
async fn test_token_cancelled_from_another_task() {
    let server = stalling_server().await;
    let mut session = session(&server, Config::new()).await;

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });

    let err = session
        .query(&CancelContext::new(token), "SELECT SLEEP(60)", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Canceled(CancelReason::Canceled)));
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_cancel_while_reading_rows() {
    let users = users_table();
    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::truncated(users.response(), 6))
        .build()
        .await
        .unwrap();
    let mut session = session(&server, Config::new()).await;

    let token = CancellationToken::new();
    let ctx = CancelContext::new(token.clone());
    let mut rows = session.query(&ctx, "SELECT * FROM users", &[]).await.unwrap();
    // Header, three columns, EOF and the first row were sent.
    assert!(rows.next_row().await.unwrap().is_some());

    token.cancel();
    // The watcher runs on its own task; give it a chance to fire.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = rows.next_row().await.unwrap_err();
    assert!(matches!(err, Error::Canceled(CancelReason::Canceled)));
    drop(rows);
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_completed_operation_is_not_invalidated_later() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let mut session = session(&server, Config::new()).await;

    let ctx = CancelContext::none().with_timeout(Duration::from_millis(30));
    session.ping(&ctx).await.unwrap();

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(!session.is_closed());
    session.ping(&CancelContext::none()).await.unwrap();
}

#[tokio::test]
async fn test_dropped_rows_disarm_the_watcher() {
    let users = users_table();
    let server = MockMySqlServer::builder()
        .with_response(users.select_all_sql(), users.response())
        .build()
        .await
        .unwrap();
    let mut session = session(&server, Config::new()).await;

    let ctx = CancelContext::none().with_timeout(Duration::from_millis(30));
    let rows = session.query(&ctx, "SELECT * FROM users", &[]).await.unwrap();
    drop(rows);

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(!session.is_closed());
    // The unread rows are drained before the ping.
    session.ping(&CancelContext::none()).await.unwrap();
    assert!(session.is_valid());
}

#[tokio::test]
async fn test_slow_prepare_is_cancelled() {
    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::delayed(Duration::from_secs(30), MockResponse::ok()))
        .build()
        .await
        .unwrap();
    let mut session = session(&server, Config::new()).await;

    let ctx = CancelContext::none().with_timeout(Duration::from_millis(40));
    let err = session.prepare(&ctx, "SELECT 1").await.unwrap_err();
    assert!(matches!(err, Error::Canceled(CancelReason::DeadlineExceeded)));
    assert!(session.is_closed());
}

// =============================================================================
// Read Timeouts and Close Handles
// =============================================================================

#[tokio::test]
async fn test_read_timeout_invalidates_connection() {
    let server = stalling_server().await;
    let mut session = session(&server, Config::new().read_timeout(Duration::from_millis(50))).await;

    let err = session
        .exec(&CancelContext::none(), "SELECT SLEEP(60)", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConnection));
    assert_eq!(err.cancel_reason(), None);
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_close_handle_aborts_blocked_read() {
    let server = stalling_server().await;
    let mut session = session(&server, Config::new()).await;
    let handle = session.close_handle();

    let closer = handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        closer.close();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        session.exec(&CancelContext::none(), "SELECT SLEEP(60)", &[]),
    )
    .await
    .expect("close handle should abort the read")
    .unwrap_err();
    assert!(matches!(err, Error::InvalidConnection));
    assert!(handle.is_closed());
    assert!(session.is_closed());

    // Closing again is harmless and sends nothing.
    handle.close();
    session.close().await;
    assert_eq!(server.count(Command::Quit), 0);
}
