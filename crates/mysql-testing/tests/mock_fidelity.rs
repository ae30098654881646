//! Mock MySQL Server Fidelity Tests
//!
//! These tests drive the mock server with raw packets through the same codec
//! the client uses, checking that its replies decode the way a real server's
//! would.
//!
//! ```bash
//! cargo test -p mysql-testing --test mock_fidelity
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use mysql_codec::PacketCodec;
use mysql_protocol::{
    CapabilityFlags, ColumnDefinition, Command, EofPacket, ExtendedCapabilityFlags, FieldType,
    PrepareOk, ResultHeader, decode_binary_row, decode_text_row,
};
use mysql_testing::fixtures::users_table;
use mysql_testing::mock_server::{MockMySqlServer, MockResponse, MockStatement, default_capabilities};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

type Client = Framed<TcpStream, PacketCodec>;

async fn connect(server: &MockMySqlServer) -> Client {
    Framed::new(server.connect().await.unwrap(), PacketCodec::new())
}

async fn command(client: &mut Client, command: Command, body: &[u8]) {
    client.codec_mut().reset_sequence();
    let mut payload = BytesMut::with_capacity(body.len() + 1);
    payload.put_u8(command as u8);
    payload.put_slice(body);
    client.send(payload.freeze()).await.unwrap();
}

async fn read(client: &mut Client) -> Bytes {
    tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("reply within timeout")
        .expect("connection open")
        .unwrap()
}

fn header(payload: &[u8], caps: CapabilityFlags) -> ResultHeader {
    ResultHeader::decode(payload, caps, ExtendedCapabilityFlags::empty()).unwrap()
}

// =============================================================================
// Mock Server Structure Tests
// =============================================================================

#[tokio::test]
async fn test_mock_server_starts_and_listens() {
    let server = MockMySqlServer::builder()
        .build()
        .await
        .expect("Server should start");

    assert!(server.port() > 0, "Should have valid port");
    assert_eq!(server.host(), "127.0.0.1", "Should listen on localhost");
    assert_eq!(server.connection_count().await, 0, "Should start with no connections");
    assert_eq!(server.capabilities(), default_capabilities());

    server.stop();
}

#[tokio::test]
async fn test_multiple_mock_servers() {
    let a = MockMySqlServer::builder().build().await.unwrap();
    let b = MockMySqlServer::builder().build().await.unwrap();
    assert_ne!(a.port(), b.port());
}

#[tokio::test]
async fn test_connections_are_counted() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let mut client = connect(&server).await;
    command(&mut client, Command::Ping, &[]).await;
    read(&mut client).await;

    assert_eq!(server.connections_accepted(), 1);
    assert_eq!(server.connection_count().await, 1);

    command(&mut client, Command::Quit, &[]).await;
    assert!(client.next().await.is_none());
}

// =============================================================================
// Text Protocol
// =============================================================================

#[tokio::test]
async fn test_ok_response() {
    let server = MockMySqlServer::builder()
        .with_response("DELETE FROM t", MockResponse::insert(4, 9))
        .build()
        .await
        .unwrap();
    let mut client = connect(&server).await;

    command(&mut client, Command::Query, b"DELETE FROM t").await;
    match header(&read(&mut client).await, server.capabilities()) {
        ResultHeader::Ok(ok) => {
            assert_eq!(ok.affected_rows, 4);
            assert_eq!(ok.last_insert_id, 9);
        }
        other => panic!("expected OK, got {other:?}"),
    }
    assert_eq!(server.queries(), vec!["DELETE FROM t".to_string()]);
}

#[tokio::test]
async fn test_error_response() {
    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::error_with_state(1146, "42S02", "Table 'x' doesn't exist"))
        .build()
        .await
        .unwrap();
    let mut client = connect(&server).await;

    command(&mut client, Command::Query, b"SELECT * FROM x").await;
    match header(&read(&mut client).await, server.capabilities()) {
        ResultHeader::Err(err) => {
            assert_eq!(err.code, 1146);
            assert_eq!(err.sql_state.as_deref(), Some("42S02"));
        }
        other => panic!("expected ERR, got {other:?}"),
    }
}

#[tokio::test]
async fn test_text_result_set_layout() {
    let users = users_table();
    let server = MockMySqlServer::builder()
        .with_response(users.select_all_sql(), users.response())
        .build()
        .await
        .unwrap();
    let caps = server.capabilities();
    let mut client = connect(&server).await;

    command(&mut client, Command::Query, users.select_all_sql().as_bytes()).await;
    let ResultHeader::ResultSet { column_count, .. } = header(&read(&mut client).await, caps) else {
        panic!("expected a result set");
    };
    assert_eq!(column_count, 3);

    for expected in &users.columns {
        let column = ColumnDefinition::decode(&read(&mut client).await).unwrap();
        assert_eq!(&column, expected);
    }
    // Classic EOF after the column definitions.
    EofPacket::decode(&read(&mut client).await, caps).unwrap();

    let first = decode_text_row(&read(&mut client).await, 3).unwrap();
    assert_eq!(first[1].as_deref(), Some(&b"alice"[..]));
    let second = decode_text_row(&read(&mut client).await, 3).unwrap();
    assert!(second[2].is_none());
    read(&mut client).await;

    let eof = EofPacket::decode(&read(&mut client).await, caps).unwrap();
    assert!(!eof.status.more_results());
}

#[tokio::test]
async fn test_deprecate_eof_layout() {
    let caps = default_capabilities() | CapabilityFlags::DEPRECATE_EOF;
    let server = MockMySqlServer::builder()
        .with_capabilities(caps)
        .with_default_response(MockResponse::scalar("7"))
        .build()
        .await
        .unwrap();
    let mut client = connect(&server).await;

    command(&mut client, Command::Query, b"SELECT 7").await;
    read(&mut client).await;
    ColumnDefinition::decode(&read(&mut client).await).unwrap();
    // No EOF between metadata and rows.
    let row = decode_text_row(&read(&mut client).await, 1).unwrap();
    assert_eq!(row[0].as_deref(), Some(&b"7"[..]));
    let terminator = read(&mut client).await;
    assert_eq!(terminator[0], 0xFE);
    EofPacket::decode(&terminator, caps).unwrap();
}

#[tokio::test]
async fn test_multi_result_flags() {
    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::multi(vec![
            MockResponse::affected(1),
            MockResponse::scalar("x"),
            MockResponse::affected(2),
        ]))
        .build()
        .await
        .unwrap();
    let caps = server.capabilities();
    let mut client = connect(&server).await;

    command(&mut client, Command::Query, b"CALL p()").await;
    let ResultHeader::Ok(first) = header(&read(&mut client).await, caps) else {
        panic!("expected OK");
    };
    assert!(first.status.more_results());

    read(&mut client).await; // column count
    read(&mut client).await; // column
    read(&mut client).await; // EOF
    read(&mut client).await; // row
    let eof = EofPacket::decode(&read(&mut client).await, caps).unwrap();
    assert!(eof.status.more_results());

    let ResultHeader::Ok(last) = header(&read(&mut client).await, caps) else {
        panic!("expected OK");
    };
    assert_eq!(last.affected_rows, 2);
    assert!(!last.status.more_results());
}

#[tokio::test]
async fn test_custom_response_sees_sql() {
    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::custom(|sql| {
            MockResponse::affected(sql.len() as u64)
        }))
        .build()
        .await
        .unwrap();
    let mut client = connect(&server).await;

    command(&mut client, Command::Query, b"UPDATE t").await;
    let ResultHeader::Ok(ok) = header(&read(&mut client).await, server.capabilities()) else {
        panic!("expected OK");
    };
    assert_eq!(ok.affected_rows, 8);
}

// =============================================================================
// Prepared Statements
// =============================================================================

#[tokio::test]
async fn test_prepare_and_execute() {
    let columns = vec![ColumnDefinition::new("n", FieldType::LongLong)];
    let server = MockMySqlServer::builder()
        .with_statement(
            "SELECT ? + 1",
            MockStatement::new(1)
                .with_columns(columns.clone())
                .with_response(MockResponse::binary_rows(columns.clone(), vec![vec![Some("42".into())]])),
        )
        .build()
        .await
        .unwrap();
    let caps = server.capabilities();
    let mut client = connect(&server).await;

    command(&mut client, Command::StmtPrepare, b"SELECT ? + 1").await;
    let ok = PrepareOk::decode(&read(&mut client).await).unwrap();
    assert_eq!(ok.statement_id, 1);
    assert_eq!(ok.param_count, 1);
    assert_eq!(ok.column_count, 1);
    read(&mut client).await; // param
    read(&mut client).await; // EOF
    read(&mut client).await; // column
    read(&mut client).await; // EOF

    command(&mut client, Command::StmtExecute, &ok.statement_id.to_le_bytes()).await;
    read(&mut client).await; // column count
    read(&mut client).await; // column
    read(&mut client).await; // EOF
    let row = decode_binary_row(&read(&mut client).await, &columns).unwrap();
    assert_eq!(row[0].as_deref(), Some(&b"42"[..]));
    EofPacket::decode(&read(&mut client).await, caps).unwrap();
}

#[tokio::test]
async fn test_unknown_statement_is_rejected() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let mut client = connect(&server).await;

    command(&mut client, Command::StmtPrepare, b"SELECT nothing").await;
    assert!(matches!(
        header(&read(&mut client).await, server.capabilities()),
        ResultHeader::Err(err) if err.code == 1064
    ));

    command(&mut client, Command::StmtExecute, &7u32.to_le_bytes()).await;
    assert!(matches!(
        header(&read(&mut client).await, server.capabilities()),
        ResultHeader::Err(err) if err.code == 1243
    ));
}

#[tokio::test]
async fn test_close_gets_no_reply() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let mut client = connect(&server).await;

    command(&mut client, Command::StmtClose, &1u32.to_le_bytes()).await;
    command(&mut client, Command::Ping, &[]).await;
    // The first reply belongs to the ping.
    let reply = read(&mut client).await;
    assert!(matches!(header(&reply, server.capabilities()), ResultHeader::Ok(_)));
    assert_eq!(server.count(Command::StmtClose), 1);
}

// =============================================================================
// Failure Injection
// =============================================================================

#[tokio::test]
async fn test_disconnect_response() {
    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::Disconnect)
        .build()
        .await
        .unwrap();
    let mut client = connect(&server).await;

    command(&mut client, Command::Query, b"SELECT 1").await;
    assert!(client.next().await.is_none());
}

#[tokio::test]
async fn test_truncated_response() {
    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::truncated(users_table().response(), 2))
        .build()
        .await
        .unwrap();
    let mut client = connect(&server).await;

    command(&mut client, Command::Query, b"SELECT * FROM users").await;
    read(&mut client).await;
    read(&mut client).await;
    assert!(client.next().await.is_none());
}

#[tokio::test]
async fn test_stall_never_answers() {
    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::Stall)
        .build()
        .await
        .unwrap();
    let mut client = connect(&server).await;

    command(&mut client, Command::Query, b"SELECT SLEEP(10)").await;
    let waited = tokio::time::timeout(Duration::from_millis(100), client.next()).await;
    assert!(waited.is_err(), "stalled server should not reply");
}

#[tokio::test]
async fn test_local_infile_handshake() {
    let server = MockMySqlServer::builder()
        .with_default_response(MockResponse::LocalInfile("/tmp/data.csv".into()))
        .build()
        .await
        .unwrap();
    let caps = server.capabilities();
    let mut client = connect(&server).await;

    command(&mut client, Command::Query, b"LOAD DATA LOCAL INFILE '/tmp/data.csv' INTO TABLE t").await;
    match header(&read(&mut client).await, caps) {
        ResultHeader::LocalInfile(name) => assert_eq!(&name[..], b"/tmp/data.csv"),
        other => panic!("expected infile request, got {other:?}"),
    }
    client.send(Bytes::new()).await.unwrap();
    assert!(matches!(header(&read(&mut client).await, caps), ResultHeader::Ok(_)));
}

#[tokio::test]
async fn test_mock_server_stop_closes_connections() {
    let server = MockMySqlServer::builder().build().await.unwrap();
    let mut client = connect(&server).await;
    command(&mut client, Command::Ping, &[]).await;
    read(&mut client).await;

    server.stop();
    let closed = tokio::time::timeout(Duration::from_secs(5), client.next()).await.unwrap();
    assert!(closed.is_none());
}
