//! Failure classification and pool lifecycle tests.
//!
//! Transport failures close the session. Whether the caller may retry
//! elsewhere depends on how far the failing command got.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use bytes::Bytes;
use mysql_client::{
    CancelContext, Config, ConnectionLifecycle, DynConnectionLifecycle, Error, Negotiated,
    Session, check_health,
};
use mysql_codec::CodecError;
use mysql_protocol::{CapabilityFlags, ProtocolError};
use mysql_testing::fixtures::users_table;
use mysql_testing::mock_server::{MockMySqlServer, MockResponse, default_capabilities};
use tokio::net::TcpStream;

async fn session(server: &MockMySqlServer, config: Config) -> Session<TcpStream> {
    Session::new(
        server.connect().await.unwrap(),
        Negotiated::new(server.capabilities()).connection_id(3),
        config,
    )
}

fn none() -> CancelContext {
    CancelContext::none()
}

/// Wait until the peer's close is visible to a liveness probe.
async fn wait_for_peer_close(session: &Session<TcpStream>) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while session.check_liveness().is_ok() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("peer close should become visible");
}

// =============================================================================
// Transport Failures
// =============================================================================

#[tokio::test]
async fn test_write_to_dead_peer_is_bad_connection() {
    let (client, peer) = tokio::io::duplex(64);
    drop(peer);
    let mut session = Session::new(client, Negotiated::new(default_capabilities()), Config::new());

    let err = session.ping(&none()).await.unwrap_err();
    assert!(err.is_bad_connection());
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_truncated_response_is_invalid_connection() {
    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::truncated(users_table().response(), 2))
        .build()
        .await
        .unwrap();
    let mut session = session(&server, Config::new()).await;

    let err = session.query(&none(), "SELECT * FROM users", &[]).await.unwrap_err();
    assert!(matches!(err, Error::InvalidConnection));
    assert!(err.is_terminal());
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_disconnect_before_reply_is_invalid_connection() {
    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::Disconnect)
        .build()
        .await
        .unwrap();
    let mut session = session(&server, Config::new()).await;

    let err = session.exec(&none(), "UPDATE t SET x = 1", &[]).await.unwrap_err();
    // The statement may have run; it is not safe to retry.
    assert!(matches!(err, Error::InvalidConnection));
    assert!(!err.is_bad_connection());
}

#[tokio::test]
async fn test_malformed_reply_closes_session() {
    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::Raw(vec![Bytes::from_static(&[0x00])]))
        .build()
        .await
        .unwrap();
    let mut session = session(&server, Config::new()).await;

    let err = session.exec(&none(), "DO 1", &[]).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_absurd_column_count_closes_session() {
    // 2^60 columns as an 8-byte length-encoded integer.
    let header = Bytes::from_static(&[0xFE, 0, 0, 0, 0, 0, 0, 0, 0x10]);
    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::Raw(vec![header]))
        .build()
        .await
        .unwrap();
    let mut session = session(&server, Config::new()).await;

    let err = session.query(&none(), "SELECT *", &[]).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(ProtocolError::TooManyColumns(n)) if n == 1 << 60));
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_column_count_above_server_limit_closes_session() {
    // 8193 columns as a 2-byte length-encoded integer.
    let header = Bytes::from_static(&[0xFC, 0x01, 0x20]);
    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::Raw(vec![header]))
        .build()
        .await
        .unwrap();
    let mut session = session(&server, Config::new()).await;

    let err = session.exec(&none(), "SELECT *", &[]).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(ProtocolError::TooManyColumns(8193))));
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_oversized_command_keeps_session() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let mut session = session(&server, Config::new().max_allowed_packet(64)).await;

    let sql = format!("SELECT '{}'", "x".repeat(100));
    let err = session.exec(&none(), &sql, &[]).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Codec(CodecError::PacketTooLarge { .. })
    ));
    assert!(!err.is_terminal());
    assert!(session.is_valid());
    session.ping(&none()).await.unwrap();
}

#[tokio::test]
async fn test_operations_after_close_are_bad_connection() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let mut session = session(&server, Config::new()).await;
    session.close().await;

    assert!(session.ping(&none()).await.unwrap_err().is_bad_connection());
    assert!(session.exec(&none(), "DO 1", &[]).await.unwrap_err().is_bad_connection());
    assert!(session.prepare(&none(), "DO 1").await.unwrap_err().is_bad_connection());
    assert!(session.reset_for_reuse().unwrap_err().is_bad_connection());
}

#[tokio::test]
async fn test_deprecate_eof_session() {
    let users = users_table();
    let server = MockMySqlServer::builder()
        .with_capabilities(default_capabilities() | CapabilityFlags::DEPRECATE_EOF)
        .with_response(users.select_all_sql(), users.response())
        .build()
        .await
        .unwrap();
    let mut session = session(&server, Config::new()).await;

    let mut rows = session.query(&none(), "SELECT * FROM users", &[]).await.unwrap();
    assert_eq!(rows.collect_rows().await.unwrap().len(), 3);
    drop(rows);
    assert!(session.is_valid());
}

// =============================================================================
// Pool Lifecycle
// =============================================================================

#[tokio::test]
async fn test_reset_for_reuse_on_healthy_session() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let mut session = session(&server, Config::new()).await;

    session.ping(&none()).await.unwrap();
    session.reset_for_reuse().unwrap();
    ConnectionLifecycle::reset(&mut session).await.unwrap();
    assert!(ConnectionLifecycle::is_valid(&session));
}

#[tokio::test]
async fn test_reset_detects_closed_peer() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let session = session(&server, Config::new()).await;
    server.stop();

    wait_for_peer_close(&session).await;
    assert!(session.reset_for_reuse().unwrap_err().is_bad_connection());
}

#[tokio::test]
async fn test_liveness_probe_can_be_disabled() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let session = session(&server, Config::new().check_conn_liveness(false)).await;
    server.stop();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Without the probe the dead peer goes unnoticed until the next command.
    session.reset_for_reuse().unwrap();
}

#[tokio::test]
async fn test_check_health() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let mut session = session(&server, Config::new()).await;

    let healthy = check_health(&mut session).await;
    assert!(healthy.healthy);
    assert!(healthy.error.is_none());

    session.close().await;
    let unhealthy = check_health(&mut session).await;
    assert!(!unhealthy.healthy);
    assert_eq!(unhealthy.error.as_deref(), Some("bad connection"));
}

#[tokio::test]
async fn test_dyn_lifecycle_trait_object() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let mut conn: Box<dyn DynConnectionLifecycle> = Box::new(session(&server, Config::new()).await);

    conn.health_check().await.unwrap();
    conn.reset().await.unwrap();
    assert!(conn.is_valid());
}
