//! Mock MySQL server for unit testing.
//!
//! The server skips the handshake: a client connects and immediately starts
//! sending commands, which matches a session built on an already
//! authenticated transport.
//!
//! ## Features
//!
//! - Configurable responses for `COM_QUERY` text, keyed by SQL
//! - Prepared statements with scripted execute responses
//! - Multi-result responses, `LOAD DATA LOCAL INFILE` requests
//! - Failure injection: stalls, delays, truncated responses, disconnects
//! - Every received command is recorded for assertions
//!
//! ## Example
//!
//! ```rust,ignore
//! use mysql_testing::mock_server::{MockMySqlServer, MockResponse};
//!
//! let server = MockMySqlServer::builder()
//!     .with_response("SELECT 1", MockResponse::scalar("1"))
//!     .build()
//!     .await
//!     .unwrap();
//!
//! let stream = tokio::net::TcpStream::connect(server.addr()).await.unwrap();
//! // Wrap `stream` in a session negotiated with `server.capabilities()`...
//! ```

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use mysql_codec::{CodecError, PacketCodec};
use mysql_protocol::codec::{NULL_MARKER, write_lenenc_bytes, write_lenenc_int};
use mysql_protocol::response::{EOF_HEADER, ERR_HEADER, LOCAL_INFILE_HEADER, OK_HEADER};
use mysql_protocol::{
    CapabilityFlags, ColumnDefinition, Command, ExtendedCapabilityFlags, FieldType, PrepareOk,
    StatusFlags,
};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};
use tokio_util::codec::Framed;

/// Largest payload the mock writes or accepts.
const MAX_MOCK_PACKET: usize = 1 << 30;

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

/// Mock response configuration.
#[derive(Clone)]
pub enum MockResponse {
    /// An OK packet.
    Ok {
        /// Affected rows.
        affected_rows: u64,
        /// Last insert id.
        last_insert_id: u64,
        /// Status flags; `MORE_RESULTS_EXISTS` is managed by the server.
        status: StatusFlags,
    },

    /// An ERR packet.
    Error {
        /// Error code.
        code: u16,
        /// SQL state.
        sql_state: String,
        /// Error message.
        message: String,
    },

    /// A text protocol result set.
    Rows {
        /// Column definitions.
        columns: Vec<ColumnDefinition>,
        /// Cells in text form, `None` for NULL.
        rows: Vec<Vec<Option<String>>>,
    },

    /// A binary protocol result set, as sent in reply to an execute.
    BinaryRows {
        /// Column definitions.
        columns: Vec<ColumnDefinition>,
        /// Cells in text form, encoded according to the column type.
        rows: Vec<Vec<Option<String>>>,
        /// Whether column definitions are sent. Only meaningful when the
        /// metadata cache is negotiated.
        send_metadata: bool,
    },

    /// Several results in one response, flagged with `MORE_RESULTS_EXISTS`.
    Multi(Vec<MockResponse>),

    /// Ask the client for a local file, then answer with OK.
    LocalInfile(String),

    /// Pre-encoded payloads, sent as consecutive packets.
    Raw(Vec<Bytes>),

    /// Send only the first packets of a response, then disconnect.
    Truncated {
        /// Response to cut short.
        response: Box<MockResponse>,
        /// Packets sent before disconnecting.
        packets: usize,
    },

    /// Wait before answering.
    Delayed(Duration, Box<MockResponse>),

    /// Never answer; close once the client sends anything or hangs up.
    Stall,

    /// Close the connection without answering.
    Disconnect,

    /// Compute the response from the SQL text.
    Custom(Arc<dyn Fn(&str) -> MockResponse + Send + Sync>),
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok {
                affected_rows,
                last_insert_id,
                status,
            } => f
                .debug_struct("Ok")
                .field("affected_rows", affected_rows)
                .field("last_insert_id", last_insert_id)
                .field("status", status)
                .finish(),
            Self::Error { code, message, .. } => f
                .debug_struct("Error")
                .field("code", code)
                .field("message", message)
                .finish(),
            Self::Rows { columns, rows } | Self::BinaryRows { columns, rows, .. } => f
                .debug_struct("Rows")
                .field("columns", &columns.len())
                .field("rows", &rows.len())
                .finish(),
            Self::Multi(parts) => f.debug_tuple("Multi").field(parts).finish(),
            Self::LocalInfile(name) => f.debug_tuple("LocalInfile").field(name).finish(),
            Self::Raw(packets) => f.debug_tuple("Raw").field(&packets.len()).finish(),
            Self::Truncated { response, packets } => f
                .debug_struct("Truncated")
                .field("response", response)
                .field("packets", packets)
                .finish(),
            Self::Delayed(delay, inner) => f.debug_tuple("Delayed").field(delay).field(inner).finish(),
            Self::Stall => f.write_str("Stall"),
            Self::Disconnect => f.write_str("Disconnect"),
            Self::Custom(_) => f.debug_tuple("Custom").field(&"<fn>").finish(),
        }
    }
}

impl MockResponse {
    /// An OK packet with no affected rows.
    pub fn ok() -> Self {
        Self::affected(0)
    }

    /// An OK packet reporting `count` affected rows.
    pub fn affected(count: u64) -> Self {
        Self::insert(count, 0)
    }

    /// An OK packet reporting affected rows and an insert id.
    pub fn insert(affected_rows: u64, last_insert_id: u64) -> Self {
        Self::Ok {
            affected_rows,
            last_insert_id,
            status: StatusFlags::AUTOCOMMIT,
        }
    }

    /// An OK packet carrying specific status flags.
    pub fn ok_with_status(status: StatusFlags) -> Self {
        Self::Ok {
            affected_rows: 0,
            last_insert_id: 0,
            status,
        }
    }

    /// An ERR packet.
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            sql_state: "HY000".into(),
            message: message.into(),
        }
    }

    /// An ERR packet with a specific SQL state.
    pub fn error_with_state(code: u16, sql_state: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            sql_state: sql_state.into(),
            message: message.into(),
        }
    }

    /// A text result set.
    pub fn rows(columns: Vec<ColumnDefinition>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self::Rows { columns, rows }
    }

    /// A single-column, single-row text result set.
    pub fn scalar(value: impl Into<String>) -> Self {
        Self::rows(
            vec![ColumnDefinition::new("value", FieldType::VarString)],
            vec![vec![Some(value.into())]],
        )
    }

    /// A binary result set.
    pub fn binary_rows(columns: Vec<ColumnDefinition>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self::BinaryRows {
            columns,
            rows,
            send_metadata: true,
        }
    }

    /// Several results in one response.
    pub fn multi(parts: Vec<MockResponse>) -> Self {
        Self::Multi(parts)
    }

    /// Answer after `delay`.
    pub fn delayed(delay: Duration, response: MockResponse) -> Self {
        Self::Delayed(delay, Box::new(response))
    }

    /// Send `packets` packets of `response`, then disconnect.
    pub fn truncated(response: MockResponse, packets: usize) -> Self {
        Self::Truncated {
            response: Box::new(response),
            packets,
        }
    }

    /// Compute the response from the SQL text.
    pub fn custom(f: impl Fn(&str) -> MockResponse + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }
}

/// A statement the mock server can prepare.
#[derive(Debug, Clone)]
pub struct MockStatement {
    /// Number of `?` parameters.
    pub params: u16,
    /// Result columns reported at prepare time.
    pub columns: Vec<ColumnDefinition>,
    /// Response to every execute.
    pub response: MockResponse,
}

impl MockStatement {
    /// A statement with `params` parameters that answers OK.
    pub fn new(params: u16) -> Self {
        Self {
            params,
            columns: Vec::new(),
            response: MockResponse::ok(),
        }
    }

    /// Set the result columns reported at prepare time.
    #[must_use]
    pub fn with_columns(mut self, columns: Vec<ColumnDefinition>) -> Self {
        self.columns = columns;
        self
    }

    /// Set the execute response.
    #[must_use]
    pub fn with_response(mut self, response: MockResponse) -> Self {
        self.response = response;
        self
    }
}

/// A command received by the server.
#[derive(Debug, Clone)]
pub struct RecordedCommand {
    /// Connection that sent it, numbered from 1 in accept order.
    pub connection: usize,
    /// Command opcode.
    pub command: u8,
    /// Full payload including the opcode.
    pub payload: Bytes,
}

impl RecordedCommand {
    /// The statement text of a `COM_QUERY` or `COM_STMT_PREPARE`.
    pub fn sql(&self) -> Option<String> {
        let opcode = Command::from_u8(self.command).ok()?;
        matches!(opcode, Command::Query | Command::StmtPrepare)
            .then(|| String::from_utf8_lossy(&self.payload[1..]).into_owned())
    }
}

/// Configuration for the mock server.
pub struct MockServerConfig {
    responses: HashMap<String, MockResponse>,
    statements: HashMap<String, MockStatement>,
    default_response: MockResponse,
    capabilities: CapabilityFlags,
    ext_capabilities: ExtendedCapabilityFlags,
}

/// Builder for [`MockMySqlServer`].
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: MockServerConfig {
                responses: HashMap::new(),
                statements: HashMap::new(),
                default_response: MockResponse::ok(),
                capabilities: default_capabilities(),
                ext_capabilities: ExtendedCapabilityFlags::empty(),
            },
        }
    }

    /// Add a response for a specific SQL text.
    pub fn with_response(mut self, sql: impl Into<String>, response: MockResponse) -> Self {
        self.config.responses.insert(sql.into(), response);
        self
    }

    /// Register a statement that can be prepared.
    pub fn with_statement(mut self, sql: impl Into<String>, statement: MockStatement) -> Self {
        self.config.statements.insert(sql.into(), statement);
        self
    }

    /// Set the response for unmatched queries.
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.config.default_response = response;
        self
    }

    /// Set the capabilities the server encodes its replies for.
    pub fn with_capabilities(mut self, capabilities: CapabilityFlags) -> Self {
        self.config.capabilities = capabilities;
        self
    }

    /// Set the MariaDB extended capabilities.
    pub fn with_ext_capabilities(mut self, flags: ExtendedCapabilityFlags) -> Self {
        self.config.ext_capabilities = flags;
        self
    }

    /// Build and start the mock server.
    pub async fn build(self) -> Result<MockMySqlServer> {
        MockMySqlServer::start(self.config).await
    }
}

impl Default for MockServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Capabilities the mock assumes unless told otherwise.
pub fn default_capabilities() -> CapabilityFlags {
    CapabilityFlags::PROTOCOL_41
        | CapabilityFlags::TRANSACTIONS
        | CapabilityFlags::SECURE_CONNECTION
        | CapabilityFlags::MULTI_STATEMENTS
        | CapabilityFlags::MULTI_RESULTS
        | CapabilityFlags::PS_MULTI_RESULTS
}

/// Shared between the accept loop and connection tasks.
struct ServerState {
    config: MockServerConfig,
    recorded: parking_lot::Mutex<Vec<RecordedCommand>>,
    accepted: AtomicUsize,
    active: Mutex<usize>,
}

impl ServerState {
    fn record(&self, connection: usize, payload: &Bytes) {
        self.recorded.lock().push(RecordedCommand {
            connection,
            command: payload[0],
            payload: payload.clone(),
        });
    }

    fn response_for(&self, sql: &str) -> MockResponse {
        let response = self
            .config
            .responses
            .get(sql)
            .unwrap_or(&self.config.default_response);
        match response {
            MockResponse::Custom(f) => f(sql),
            other => other.clone(),
        }
    }
}

/// A mock MySQL server for testing.
pub struct MockMySqlServer {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    state: Arc<ServerState>,
}

impl MockMySqlServer {
    /// Create a new builder for the mock server.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Start the mock server on an available port.
    pub async fn start(config: MockServerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = Arc::new(ServerState {
            config,
            recorded: parking_lot::Mutex::new(Vec::new()),
            accepted: AtomicUsize::new(0),
            active: Mutex::new(0),
        });

        let server = Self {
            addr,
            shutdown_tx: shutdown_tx.clone(),
            state: Arc::clone(&state),
        };

        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _peer_addr)) => {
                                let state = Arc::clone(&state);
                                let shutdown = shutdown_tx.subscribe();
                                let id = state.accepted.fetch_add(1, Ordering::SeqCst) + 1;
                                tokio::spawn(async move {
                                    *state.active.lock().await += 1;
                                    if let Err(e) = handle_connection(stream, id, &state, shutdown).await {
                                        tracing::debug!("Connection error: {}", e);
                                    }
                                    let mut active = state.active.lock().await;
                                    *active = active.saturating_sub(1);
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Ok(server)
    }

    /// Get the server's listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the server's host.
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Get the server's port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Capabilities the server encodes its replies for.
    pub fn capabilities(&self) -> CapabilityFlags {
        self.state.config.capabilities
    }

    /// MariaDB extended capabilities.
    pub fn ext_capabilities(&self) -> ExtendedCapabilityFlags {
        self.state.config.ext_capabilities
    }

    /// Open a client connection to the server.
    pub async fn connect(&self) -> Result<TcpStream> {
        let stream = TcpStream::connect(self.addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Number of connections currently open.
    pub async fn connection_count(&self) -> usize {
        *self.state.active.lock().await
    }

    /// Number of connections accepted since start.
    pub fn connections_accepted(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    /// Every command received so far, in arrival order.
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state.recorded.lock().clone()
    }

    /// Statement texts of received `COM_QUERY` commands.
    pub fn queries(&self) -> Vec<String> {
        self.state
            .recorded
            .lock()
            .iter()
            .filter(|c| c.command == Command::Query as u8)
            .filter_map(RecordedCommand::sql)
            .collect()
    }

    /// How many times `command` was received.
    pub fn count(&self, command: Command) -> usize {
        self.state
            .recorded
            .lock()
            .iter()
            .filter(|c| c.command == command as u8)
            .count()
    }

    /// Stop accepting and close every open connection.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for MockMySqlServer {
    fn drop(&mut self) {
        self.stop();
    }
}

type MockFramed = Framed<TcpStream, PacketCodec>;

/// Serve one client connection.
async fn handle_connection(
    stream: TcpStream,
    connection: usize,
    state: &ServerState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let codec = PacketCodec::new().with_max_packet_size(MAX_MOCK_PACKET);
    let mut framed = Framed::new(stream, codec);
    let mut prepared: HashMap<u32, MockStatement> = HashMap::new();
    let mut next_statement_id = 1u32;

    loop {
        framed.codec_mut().reset_sequence();
        let packet = tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            next = framed.next() => match next {
                None => return Ok(()),
                Some(packet) => packet?,
            },
        };
        let Some(&opcode) = packet.first() else {
            return Err(MockServerError::Protocol("empty command packet".into()));
        };
        state.record(connection, &packet);
        let command = Command::from_u8(opcode)
            .map_err(|e| MockServerError::Protocol(e.to_string()))?;
        tracing::trace!(connection, command = command.name(), "mock received command");

        let response = match command {
            Command::Quit => return Ok(()),
            Command::StmtSendLongData => continue,
            Command::StmtClose => {
                if let Some(id) = statement_id(&packet) {
                    prepared.remove(&id);
                }
                continue;
            }
            Command::Ping | Command::InitDb | Command::ResetConnection | Command::StmtReset => {
                MockResponse::ok()
            }
            Command::Query => state.response_for(&String::from_utf8_lossy(&packet[1..])),
            Command::StmtPrepare => {
                let sql = String::from_utf8_lossy(&packet[1..]).into_owned();
                match state.config.statements.get(&sql) {
                    Some(statement) => {
                        let id = next_statement_id;
                        next_statement_id += 1;
                        let payloads = prepare_payloads(id, statement, state.config.capabilities);
                        prepared.insert(id, statement.clone());
                        send_payloads(&mut framed, payloads).await?;
                        continue;
                    }
                    // Only errors and failure injection apply to an
                    // unregistered statement.
                    None => match state.response_for(&sql) {
                        response @ (MockResponse::Error { .. }
                        | MockResponse::Disconnect
                        | MockResponse::Stall
                        | MockResponse::Delayed(..)
                        | MockResponse::Truncated { .. }) => response,
                        _ => MockResponse::error_with_state(
                            1064,
                            "42000",
                            format!("mock cannot prepare: {sql}"),
                        ),
                    },
                }
            }
            Command::StmtExecute => match statement_id(&packet).and_then(|id| prepared.get(&id)) {
                Some(statement) => statement.response.clone(),
                None => MockResponse::error(1243, "Unknown prepared statement handler"),
            },
        };

        if !respond(&mut framed, response, state, &mut shutdown).await? {
            return Ok(());
        }
    }
}

fn statement_id(packet: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = packet.get(1..5)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Send a response. Returns `false` when the connection should close.
async fn respond(
    framed: &mut MockFramed,
    mut response: MockResponse,
    state: &ServerState,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<bool> {
    while let MockResponse::Delayed(delay, inner) = response {
        tokio::select! {
            _ = shutdown.recv() => return Ok(false),
            () = tokio::time::sleep(delay) => {}
        }
        response = *inner;
    }

    let caps = state.config.capabilities;
    let ext = state.config.ext_capabilities;
    match response {
        MockResponse::Stall => {
            tokio::select! {
                _ = shutdown.recv() => {}
                _ = framed.next() => {}
            }
            Ok(false)
        }
        MockResponse::Disconnect => Ok(false),
        MockResponse::Truncated { response, packets } => {
            let mut payloads = Vec::new();
            encode_response(&response, caps, ext, false, &mut payloads);
            payloads.truncate(packets);
            send_payloads(framed, payloads).await?;
            Ok(false)
        }
        MockResponse::LocalInfile(name) => {
            let mut request = BytesMut::with_capacity(name.len() + 1);
            request.put_u8(LOCAL_INFILE_HEADER);
            request.put_slice(name.as_bytes());
            framed.send(request.freeze()).await?;
            // File content packets until an empty one.
            loop {
                match framed.next().await {
                    Some(Ok(packet)) if packet.is_empty() => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(false),
                }
            }
            framed.send(ok_payload(OK_HEADER, 0, 0, StatusFlags::AUTOCOMMIT)).await?;
            Ok(true)
        }
        other => {
            let mut payloads = Vec::new();
            encode_response(&other, caps, ext, false, &mut payloads);
            send_payloads(framed, payloads).await?;
            Ok(true)
        }
    }
}

async fn send_payloads(framed: &mut MockFramed, payloads: Vec<Bytes>) -> Result<()> {
    for payload in payloads {
        framed.feed(payload).await?;
    }
    framed.flush().await?;
    Ok(())
}

fn status_for(status: StatusFlags, more: bool) -> StatusFlags {
    if more {
        status | StatusFlags::MORE_RESULTS_EXISTS
    } else {
        status - StatusFlags::MORE_RESULTS_EXISTS
    }
}

/// Encode `response` as the packets a server would send.
fn encode_response(
    response: &MockResponse,
    caps: CapabilityFlags,
    ext: ExtendedCapabilityFlags,
    more: bool,
    out: &mut Vec<Bytes>,
) {
    match response {
        MockResponse::Ok {
            affected_rows,
            last_insert_id,
            status,
        } => out.push(ok_payload(
            OK_HEADER,
            *affected_rows,
            *last_insert_id,
            status_for(*status, more),
        )),
        MockResponse::Error {
            code,
            sql_state,
            message,
        } => out.push(err_payload(*code, sql_state, message)),
        MockResponse::Rows { columns, rows } => {
            encode_result_header(columns.len(), ext, true, out);
            encode_columns(columns, caps, out);
            for row in rows {
                out.push(text_row(row));
            }
            out.push(terminator(caps, status_for(StatusFlags::AUTOCOMMIT, more)));
        }
        MockResponse::BinaryRows {
            columns,
            rows,
            send_metadata,
        } => {
            let send_metadata =
                *send_metadata || !ext.contains(ExtendedCapabilityFlags::CACHE_METADATA);
            encode_result_header(columns.len(), ext, send_metadata, out);
            if send_metadata {
                encode_columns(columns, caps, out);
            }
            for row in rows {
                out.push(binary_row(columns, row));
            }
            out.push(terminator(caps, status_for(StatusFlags::AUTOCOMMIT, more)));
        }
        MockResponse::Multi(parts) => {
            for (i, part) in parts.iter().enumerate() {
                encode_response(part, caps, ext, more || i + 1 < parts.len(), out);
            }
        }
        MockResponse::Raw(packets) => out.extend(packets.iter().cloned()),
        MockResponse::Custom(_)
        | MockResponse::LocalInfile(_)
        | MockResponse::Truncated { .. }
        | MockResponse::Delayed(..)
        | MockResponse::Stall
        | MockResponse::Disconnect => {
            tracing::warn!(?response, "response kind cannot be nested, skipped");
        }
    }
}

fn prepare_payloads(id: u32, statement: &MockStatement, caps: CapabilityFlags) -> Vec<Bytes> {
    let mut out = Vec::new();
    let mut ok = BytesMut::with_capacity(12);
    PrepareOk {
        statement_id: id,
        column_count: u16::try_from(statement.columns.len()).unwrap_or(u16::MAX),
        param_count: statement.params,
        warnings: 0,
    }
    .encode(&mut ok);
    out.push(ok.freeze());

    if statement.params > 0 {
        let params: Vec<_> = (0..statement.params)
            .map(|_| ColumnDefinition::new("?", FieldType::VarString))
            .collect();
        encode_columns(&params, caps, &mut out);
    }
    if !statement.columns.is_empty() {
        encode_columns(&statement.columns, caps, &mut out);
    }
    out
}

fn encode_result_header(
    columns: usize,
    ext: ExtendedCapabilityFlags,
    metadata_follows: bool,
    out: &mut Vec<Bytes>,
) {
    let mut header = BytesMut::with_capacity(10);
    write_lenenc_int(&mut header, columns as u64);
    if ext.contains(ExtendedCapabilityFlags::CACHE_METADATA) {
        header.put_u8(u8::from(metadata_follows));
    }
    out.push(header.freeze());
}

fn encode_columns(columns: &[ColumnDefinition], caps: CapabilityFlags, out: &mut Vec<Bytes>) {
    for column in columns {
        let mut buf = BytesMut::with_capacity(64);
        column.encode(&mut buf);
        out.push(buf.freeze());
    }
    if !caps.contains(CapabilityFlags::DEPRECATE_EOF) {
        out.push(eof_payload(StatusFlags::AUTOCOMMIT));
    }
}

/// Encode an OK packet (`header` is `0xFE` for a row stream terminator).
pub fn ok_payload(header: u8, affected_rows: u64, last_insert_id: u64, status: StatusFlags) -> Bytes {
    let mut buf = BytesMut::with_capacity(16);
    buf.put_u8(header);
    write_lenenc_int(&mut buf, affected_rows);
    write_lenenc_int(&mut buf, last_insert_id);
    buf.put_u16_le(status.bits());
    buf.put_u16_le(0);
    buf.freeze()
}

/// Encode a classic EOF packet.
pub fn eof_payload(status: StatusFlags) -> Bytes {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(EOF_HEADER);
    buf.put_u16_le(0);
    buf.put_u16_le(status.bits());
    buf.freeze()
}

/// Encode an ERR packet.
pub fn err_payload(code: u16, sql_state: &str, message: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(9 + message.len());
    buf.put_u8(ERR_HEADER);
    buf.put_u16_le(code);
    buf.put_u8(b'#');
    buf.put_slice(&sql_state.as_bytes()[..sql_state.len().min(5)]);
    buf.put_slice(message.as_bytes());
    buf.freeze()
}

fn terminator(caps: CapabilityFlags, status: StatusFlags) -> Bytes {
    if caps.contains(CapabilityFlags::DEPRECATE_EOF) {
        ok_payload(EOF_HEADER, 0, 0, status)
    } else {
        eof_payload(status)
    }
}

/// Encode a text protocol row.
pub fn text_row(cells: &[Option<String>]) -> Bytes {
    let mut buf = BytesMut::new();
    for cell in cells {
        match cell {
            Some(value) => write_lenenc_bytes(&mut buf, value.as_bytes()),
            None => buf.put_u8(NULL_MARKER),
        }
    }
    buf.freeze()
}

/// Encode a binary protocol row; cells are parsed according to the column
/// type, and types without a fixed-size encoding are sent as strings.
pub fn binary_row(columns: &[ColumnDefinition], cells: &[Option<String>]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(OK_HEADER);
    let mut bitmap = vec![0u8; (cells.len() + 7 + 2) / 8];
    for (i, cell) in cells.iter().enumerate() {
        if cell.is_none() {
            bitmap[(i + 2) / 8] |= 1 << ((i + 2) % 8);
        }
    }
    buf.put_slice(&bitmap);

    for (column, cell) in columns.iter().zip(cells) {
        let Some(value) = cell else { continue };
        let int = || value.parse::<i64>().unwrap_or_default();
        match column.field_type {
            FieldType::Tiny => buf.put_u8(int() as u8),
            FieldType::Short | FieldType::Year => buf.put_u16_le(int() as u16),
            FieldType::Long | FieldType::Int24 => buf.put_u32_le(int() as u32),
            FieldType::LongLong if column.is_unsigned() => {
                buf.put_u64_le(value.parse::<u64>().unwrap_or_default());
            }
            FieldType::LongLong => buf.put_i64_le(int()),
            FieldType::Float => buf.put_f32_le(value.parse().unwrap_or_default()),
            FieldType::Double => buf.put_f64_le(value.parse().unwrap_or_default()),
            FieldType::Null => {}
            FieldType::Date
            | FieldType::NewDate
            | FieldType::DateTime
            | FieldType::DateTime2
            | FieldType::Timestamp
            | FieldType::Timestamp2 => put_binary_date_time(&mut buf, value),
            FieldType::Time | FieldType::Time2 => put_binary_time(&mut buf, value),
            _ => write_lenenc_bytes(&mut buf, value.as_bytes()),
        }
    }
    buf.freeze()
}

fn numbers(text: &str) -> Vec<u32> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse().unwrap_or_default())
        .collect()
}

/// `YYYY-MM-DD[ HH:MM:SS[.ffffff]]` in binary form.
fn put_binary_date_time(buf: &mut BytesMut, text: &str) {
    let mut parts = numbers(text);
    let len: u8 = match parts.len() {
        0..=3 => 4,
        4..=6 => 7,
        _ => 11,
    };
    parts.resize(7, 0);
    buf.put_u8(len);
    buf.put_u16_le(parts[0] as u16);
    buf.put_u8(parts[1] as u8);
    buf.put_u8(parts[2] as u8);
    if len >= 7 {
        buf.put_u8(parts[3] as u8);
        buf.put_u8(parts[4] as u8);
        buf.put_u8(parts[5] as u8);
    }
    if len == 11 {
        buf.put_u32_le(parts[6]);
    }
}

/// `[-]HH:MM:SS` in binary form; hours past a day roll into the day count.
fn put_binary_time(buf: &mut BytesMut, text: &str) {
    let mut parts = numbers(text);
    parts.resize(3, 0);
    buf.put_u8(8);
    buf.put_u8(u8::from(text.starts_with('-')));
    buf.put_u32_le(parts[0] / 24);
    buf.put_u8((parts[0] % 24) as u8);
    buf.put_u8(parts[1] as u8);
    buf.put_u8(parts[2] as u8);
}
