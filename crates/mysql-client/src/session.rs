//! The session: one authenticated connection and the commands run over it.
//!
//! A [`Session`] owns the framed transport, the negotiated capabilities and
//! the bookkeeping that keeps the half-duplex exchange in step. It is used by
//! one task at a time (every command takes `&mut self`); the only concurrent
//! actor is the cancellation watcher, which may close the session from its
//! own task.
//!
//! ## Failure classification
//!
//! Every transport failure closes the session. What the caller sees depends
//! on how far the failing command got:
//!
//! | Situation                                  | Error                         |
//! |--------------------------------------------|-------------------------------|
//! | session already closed                     | [`Error::BadConnection`]      |
//! | write failed before any byte was sent      | [`Error::BadConnection`]      |
//! | write failed part-way, or any read failure | [`Error::InvalidConnection`]  |
//! | cancellation watcher fired                 | [`Error::Canceled`]           |
//! | server sent an ERR packet                  | [`Error::Server`], session ok |

use std::sync::Arc;

use bytes::{BufMut, Bytes};
use mysql_codec::{CodecError, Compressor, Connection, PacketCodec, StoredOnly, Transport};
use mysql_protocol::{
    CapabilityFlags, ColumnDefinition, Command, DEFAULT_MAX_ALLOWED_PACKET, EofPacket, ErrPacket,
    ExtendedCapabilityFlags, MAX_COLUMNS, MAX_PAYLOAD_SIZE, OkPacket, ProtocolError, ResultHeader,
    StatusFlags, decode_binary_row, decode_text_row, is_eof_packet, is_err_packet,
};
use mysql_types::Value;

use crate::buffer::CommandBuffer;
use crate::cancel::{
    CancelContext, CloseHandle, SessionShared, WatchMessage, WatcherHandle, spawn_watcher,
};
use crate::config::{Config, Negotiated};
use crate::error::{Error, Result, SkipReason};
use crate::interpolate::{InterpolateOptions, interpolate_params};
use crate::rows::{ExecResult, RowFormat, Rows};
use crate::state::PendingResult;
use crate::statement::Statement;
use crate::transaction::{Transaction, TxOptions};

/// Shape of a result set announced by a result header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ResultSetHeader {
    /// Column count; zero when the header was an OK packet.
    pub(crate) columns: usize,
    /// Whether column definitions follow on the wire.
    pub(crate) metadata_follows: bool,
}

/// A client session over an authenticated connection.
///
/// The handshake is done elsewhere; a session starts from the transport it
/// left behind plus what it [negotiated](Negotiated).
pub struct Session<T: Transport> {
    pub(crate) io: Option<Connection<T>>,
    pub(crate) config: Arc<Config>,
    pub(crate) negotiated: Negotiated,
    pub(crate) status: StatusFlags,
    pub(crate) max_allowed_packet: usize,
    pub(crate) shared: Arc<SessionShared>,
    watcher: Option<WatcherHandle>,
    watching: bool,
    pub(crate) pending: PendingResult,
    pub(crate) buf: CommandBuffer,
    result: ExecResult,
}

impl<T: Transport> Session<T> {
    /// Wrap an authenticated transport.
    ///
    /// The cancellation watcher is started on the current Tokio runtime. A
    /// session created outside a runtime still works but ignores
    /// cancellation contexts.
    ///
    /// A configured `max_allowed_packet` of `0` is only resolved by
    /// [`establish`](Self::establish); a session built here assumes
    /// [`DEFAULT_MAX_ALLOWED_PACKET`] instead.
    pub fn new(transport: T, negotiated: Negotiated, config: impl Into<Arc<Config>>) -> Self {
        Self::with_compressor(transport, negotiated, config, StoredOnly)
    }

    /// Wrap an authenticated transport, using `compressor` for outgoing
    /// frames when compression was negotiated.
    pub fn with_compressor(
        transport: T,
        negotiated: Negotiated,
        config: impl Into<Arc<Config>>,
        compressor: impl Compressor + 'static,
    ) -> Self {
        let config = config.into();
        // 0 means "ask the server", which only `establish` does.
        let max_allowed_packet = match config.max_allowed_packet {
            0 => DEFAULT_MAX_ALLOWED_PACKET,
            size => size,
        };

        let mut codec = PacketCodec::new().with_max_packet_size(max_allowed_packet);
        if negotiated.compress {
            codec = codec.with_compression(compressor);
        }

        let shared = Arc::new(SessionShared::new(negotiated.connection_id));
        let io = Connection::new(transport, codec)
            .with_timeouts(config.read_timeout, config.write_timeout)
            .with_abort(shared.teardown().clone());
        let watcher = spawn_watcher(&shared);

        tracing::debug!(
            conn_id = negotiated.connection_id,
            compress = negotiated.compress,
            max_allowed_packet,
            "session created"
        );

        Self {
            io: Some(io),
            config,
            status: negotiated.status,
            negotiated,
            max_allowed_packet,
            shared,
            watcher,
            watching: false,
            pending: PendingResult::Idle,
            buf: CommandBuffer::new(),
            result: ExecResult::default(),
        }
    }

    /// Create a session and finish establishing it.
    ///
    /// Resolves `max_allowed_packet` from the server when the configuration
    /// leaves it at `0`, then applies the configured session variables. The
    /// session is closed if either step fails.
    pub async fn establish(
        transport: T,
        negotiated: Negotiated,
        config: impl Into<Arc<Config>>,
    ) -> Result<Self> {
        let config = config.into();
        config.validate()?;

        let mut session = Self::new(transport, negotiated, config);
        if let Err(e) = session.finish_establish().await {
            session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    async fn finish_establish(&mut self) -> Result<()> {
        if self.config.max_allowed_packet == 0 {
            let raw = self
                .system_variable("max_allowed_packet")
                .await?
                .ok_or_else(|| Error::Config("server reported NULL max_allowed_packet".into()))?;
            let value: usize = std::str::from_utf8(&raw)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| {
                    Error::Config(format!(
                        "unparsable max_allowed_packet: {:?}",
                        String::from_utf8_lossy(&raw)
                    ))
                })?;
            self.set_max_allowed_packet(value.saturating_sub(1));
        }
        self.apply_params().await
    }

    fn set_max_allowed_packet(&mut self, size: usize) {
        self.max_allowed_packet = size;
        if let Some(io) = self.io.as_mut() {
            io.codec_mut().set_max_packet_size(size);
        }
        tracing::debug!(conn_id = self.connection_id(), size, "max_allowed_packet resolved");
    }

    async fn apply_params(&mut self) -> Result<()> {
        if self.config.params.is_empty() {
            return Ok(());
        }
        let mut sql = String::from("SET ");
        for (i, (name, value)) in self.config.params.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(name);
            sql.push_str(" = ");
            sql.push_str(value);
        }
        self.exec_text(&sql, &[]).await.map(drop)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Server thread id.
    #[must_use]
    pub fn connection_id(&self) -> u32 {
        self.negotiated.connection_id
    }

    /// Server version string from the handshake.
    #[must_use]
    pub fn server_version(&self) -> &str {
        &self.negotiated.server_version
    }

    /// Negotiated capability flags.
    #[must_use]
    pub fn capabilities(&self) -> CapabilityFlags {
        self.negotiated.capabilities
    }

    /// Negotiated MariaDB extended capability flags.
    #[must_use]
    pub fn ext_capabilities(&self) -> ExtendedCapabilityFlags {
        self.negotiated.ext_capabilities
    }

    /// Status flags from the most recent OK or EOF packet.
    #[must_use]
    pub fn status(&self) -> StatusFlags {
        self.status
    }

    /// The session configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Largest packet the server accepts, as far as the session knows.
    #[must_use]
    pub fn max_allowed_packet(&self) -> usize {
        self.max_allowed_packet
    }

    /// Largest payload written in a single frame.
    #[must_use]
    pub fn max_write_size(&self) -> usize {
        match self.max_allowed_packet {
            0 => MAX_PAYLOAD_SIZE,
            size => size.min(MAX_PAYLOAD_SIZE),
        }
    }

    /// Whether the compressed protocol is active.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.io.as_ref().is_some_and(Connection::is_compressed)
    }

    /// Whether the session was closed, by its owner or by the watcher.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Whether the session can take another command: open, no unread
    /// response, no buffered input.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.shared.is_closed()
            && !self.buf.is_busy()
            && self.io.as_ref().is_some_and(|io| !io.has_buffered_input())
    }

    /// A handle that closes this session from another task.
    #[must_use]
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle::new(Arc::clone(&self.shared))
    }

    pub(crate) fn caches_metadata(&self) -> bool {
        self.negotiated
            .ext_capabilities
            .contains(ExtendedCapabilityFlags::CACHE_METADATA)
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Round-trip a `COM_PING`.
    pub async fn ping(&mut self, ctx: &CancelContext) -> Result<()> {
        self.ensure_open()?;
        self.watch_cancel(ctx)?;
        let result = self.ping_inner().await;
        self.finish();
        result
    }

    async fn ping_inner(&mut self) -> Result<()> {
        self.begin_command().await?;
        self.buf.start(Command::Ping);
        self.send().await?;
        self.read_ok().await
    }

    /// Execute a statement that returns no rows.
    ///
    /// With arguments, the statement is interpolated client-side; if
    /// interpolation is disabled or the arguments cannot be inlined the
    /// call fails with [`Error::Skip`] and nothing is sent.
    pub async fn exec(
        &mut self,
        ctx: &CancelContext,
        sql: &str,
        args: &[Value],
    ) -> Result<ExecResult> {
        self.ensure_open()?;
        if !args.is_empty() && !self.config.interpolate_params {
            return Err(Error::Skip(SkipReason::InterpolationDisabled));
        }
        self.watch_cancel(ctx)?;
        let result = self.exec_text(sql, args).await;
        self.finish();
        result
    }

    /// Run a statement and stream its rows.
    ///
    /// Result sets without columns at the head of the response are skipped,
    /// so the cursor starts on the first set that has columns.
    pub async fn query(
        &mut self,
        ctx: &CancelContext,
        sql: &str,
        args: &[Value],
    ) -> Result<Rows<'_, T>> {
        self.ensure_open()?;
        if !args.is_empty() && !self.config.interpolate_params {
            return Err(Error::Skip(SkipReason::InterpolationDisabled));
        }
        self.watch_cancel(ctx)?;
        match self.start_text_query(sql, args).await {
            Ok(columns) => Ok(Rows::new(self, columns, RowFormat::Text)),
            Err(e) => {
                self.finish();
                Err(e)
            }
        }
    }

    /// Prepare a server-side statement.
    ///
    /// Connection failures while preparing surface as
    /// [`Error::BadConnection`]: preparing has no side effects, so it is
    /// always safe to retry elsewhere.
    pub async fn prepare(&mut self, ctx: &CancelContext, sql: &str) -> Result<Statement> {
        self.ensure_open()?;
        self.watch_cancel(ctx)?;
        let result = self.prepare_inner(sql).await.map_err(retry_safe);
        self.finish();
        let mut stmt = result?;

        if let Some(reason) = ctx.reason() {
            // The statement exists but the caller gave up on it.
            if let Err(e) = self.close_statement(&mut stmt).await {
                tracing::debug!(conn_id = self.connection_id(), error = %e, "closing abandoned statement failed");
            }
            return Err(Error::Canceled(reason));
        }
        Ok(stmt)
    }

    /// Start a transaction.
    pub async fn begin_transaction(
        &mut self,
        ctx: &CancelContext,
        options: TxOptions,
    ) -> Result<Transaction<'_, T>> {
        self.ensure_open()?;
        self.watch_cancel(ctx)?;
        let result = self.begin_inner(options).await;
        self.finish();
        result?;
        tracing::debug!(
            conn_id = self.connection_id(),
            isolation = ?options.isolation,
            read_only = options.read_only,
            "transaction started"
        );
        Ok(Transaction::new(self))
    }

    async fn begin_inner(&mut self, options: TxOptions) -> Result<()> {
        if let Some(level) = options.isolation.as_sql()? {
            self.exec_text(&format!("SET TRANSACTION ISOLATION LEVEL {level}"), &[])
                .await?;
        }
        let sql = if options.read_only {
            "START TRANSACTION READ ONLY"
        } else {
            "START TRANSACTION"
        };
        self.exec_text(sql, &[]).await.map(drop)
    }

    /// Read a server variable with `SELECT @@name`.
    pub async fn system_variable(&mut self, name: &str) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        self.begin_command().await?;
        self.buf
            .start(Command::Query)
            .put_slice(format!("SELECT @@{name}").as_bytes());
        self.send().await?;

        let header = self.read_result_header().await?;
        if header.columns == 0 {
            self.drain_pending().await?;
            return Ok(None);
        }
        let columns = self.result_columns(header, None).await?;
        let value = self
            .read_row(&columns, RowFormat::Text)
            .await?
            .and_then(|row| row.into_iter().next())
            .flatten();
        self.drain_pending().await?;
        Ok(value)
    }

    /// Whether an idle session can be handed out again.
    ///
    /// Fails with [`Error::BadConnection`] if the session is closed or was
    /// abandoned mid-exchange, or if the liveness probe finds the peer gone.
    pub fn reset_for_reuse(&self) -> Result<()> {
        if self.shared.is_closed() || self.buf.is_busy() {
            return Err(Error::BadConnection);
        }
        self.check_liveness()
    }

    /// Probe an idle session without blocking.
    ///
    /// A no-op when `check_conn_liveness` is off.
    pub fn check_liveness(&self) -> Result<()> {
        if self.shared.is_closed() {
            return Err(Error::BadConnection);
        }
        if !self.config.check_conn_liveness {
            return Ok(());
        }
        let Some(io) = self.io.as_ref() else {
            return Err(Error::BadConnection);
        };
        if let Err(e) = io.probe_liveness() {
            tracing::warn!(conn_id = self.connection_id(), error = %e, "closing bad idle connection");
            return Err(Error::BadConnection);
        }
        Ok(())
    }

    /// Close the session.
    ///
    /// Sends `COM_QUIT` if the session is still open, then releases the
    /// transport. Idempotent; a failed quit is ignored.
    pub async fn close(&mut self) {
        if !self.shared.is_closed() {
            if let Some(io) = self.io.as_mut() {
                io.reset_sequence();
                match io.write_packet(&[Command::Quit as u8]).await {
                    Ok(()) => {
                        let _ = io.shutdown().await;
                    }
                    Err(e) => {
                        tracing::debug!(conn_id = self.negotiated.connection_id, error = %e, "COM_QUIT failed");
                    }
                }
            }
        }
        self.cleanup();
        self.pending = PendingResult::Idle;
        self.result.clear();
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    /// Arm the watcher for one operation.
    pub(crate) fn watch_cancel(&mut self, ctx: &CancelContext) -> Result<()> {
        if self.watching {
            // The previous operation never finished; its context may still
            // fire at any moment.
            tracing::warn!(conn_id = self.connection_id(), "watcher still armed, closing session");
            self.cleanup();
            return Ok(());
        }
        if let Some(reason) = ctx.reason() {
            return Err(Error::Canceled(reason));
        }
        if !ctx.can_cancel() {
            return Ok(());
        }
        let Some(watcher) = self.watcher.as_ref() else {
            return Ok(());
        };
        if watcher.send(WatchMessage::Arm(ctx.clone())).is_ok() {
            self.watching = true;
        }
        Ok(())
    }

    /// Disarm the watcher after an operation.
    pub(crate) fn finish(&mut self) {
        if !self.watching {
            return;
        }
        if let Some(watcher) = self.watcher.as_ref() {
            if watcher.send(WatchMessage::Finished).is_ok() {
                self.watching = false;
            }
        }
    }

    // =========================================================================
    // Command plumbing
    // =========================================================================

    pub(crate) fn ensure_open(&mut self) -> Result<()> {
        if self.shared.is_closed() {
            self.cleanup();
            return Err(Error::BadConnection);
        }
        Ok(())
    }

    /// Prepare to write a new command: drain what the last one left unread
    /// and refuse to continue after an abandoned exchange.
    pub(crate) async fn begin_command(&mut self) -> Result<()> {
        if self.shared.is_closed() {
            self.cleanup();
            return Err(Error::BadConnection);
        }
        if self.pending.is_pending() {
            tracing::trace!(conn_id = self.connection_id(), pending = ?self.pending, "draining unread results");
            self.drain_pending().await?;
        } else if self.buf.is_busy() {
            tracing::warn!(
                conn_id = self.connection_id(),
                "previous command was abandoned mid-exchange, closing session"
            );
            self.cleanup();
            return Err(Error::BadConnection);
        }
        self.result.clear();
        Ok(())
    }

    /// Write the command in the command buffer as a fresh exchange.
    pub(crate) async fn send(&mut self) -> Result<()> {
        let Some(io) = self.io.as_mut() else {
            return Err(Error::BadConnection);
        };
        io.reset_sequence();
        self.buf.mark_busy();
        tracing::trace!(
            conn_id = self.negotiated.connection_id,
            command = self.buf.packet().first().copied().unwrap_or_default(),
            len = self.buf.packet().len(),
            "sending command"
        );
        match io.write_packet(self.buf.packet()).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.write_failed(e)),
        }
    }

    /// Write a follow-up packet in the current exchange.
    async fn send_continuation(&mut self, payload: &[u8]) -> Result<()> {
        let Some(io) = self.io.as_mut() else {
            return Err(self.closed_error());
        };
        match io.write_packet(payload).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.write_failed(e)),
        }
    }

    pub(crate) async fn read_packet(&mut self) -> Result<Bytes> {
        let Some(io) = self.io.as_mut() else {
            return Err(self.closed_error());
        };
        match io.read_packet().await {
            Ok(packet) => Ok(packet),
            Err(e) => Err(self.read_failed(e)),
        }
    }

    /// Read a bare OK/ERR reply.
    async fn read_ok(&mut self) -> Result<()> {
        let packet = self.read_packet().await?;
        if is_err_packet(&packet) {
            let err = self.decode_err(&packet)?;
            return Err(self.server_error(err));
        }
        let ok = OkPacket::decode(&packet, self.negotiated.capabilities)
            .map_err(|e| self.protocol_failed(e))?;
        self.handle_ok(&ok);
        Ok(())
    }

    pub(crate) async fn exec_text(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.begin_command().await?;
        self.build_query(sql, args)?;
        self.send().await?;
        self.read_exec_response(None).await
    }

    async fn start_text_query(
        &mut self,
        sql: &str,
        args: &[Value],
    ) -> Result<Option<Vec<ColumnDefinition>>> {
        self.begin_command().await?;
        self.build_query(sql, args)?;
        self.send().await?;
        let header = self.read_result_header().await?;
        if header.columns > 0 {
            return self.result_columns(header, None).await.map(Some);
        }
        self.next_result_columns().await
    }

    fn build_query(&mut self, sql: &str, args: &[Value]) -> Result<()> {
        if args.is_empty() {
            self.buf.start(Command::Query).put_slice(sql.as_bytes());
            return Ok(());
        }
        if !self.config.interpolate_params {
            return Err(Error::Skip(SkipReason::InterpolationDisabled));
        }
        let options = self.interpolate_options();
        interpolate_params(self.buf.start(Command::Query), sql, args, &options)
    }

    pub(crate) fn interpolate_options(&self) -> InterpolateOptions {
        InterpolateOptions::new(self.max_allowed_packet)
            .no_backslash_escapes(self.status.no_backslash_escapes())
            .time_zone(self.config.time_zone)
            .time_truncate(self.config.time_truncate)
    }

    async fn prepare_inner(&mut self, sql: &str) -> Result<Statement> {
        self.begin_command().await?;
        self.buf.start(Command::StmtPrepare).put_slice(sql.as_bytes());
        self.send().await?;

        let packet = self.read_packet().await?;
        if is_err_packet(&packet) {
            let err = self.decode_err(&packet)?;
            return Err(self.server_error(err));
        }
        let ok = mysql_protocol::PrepareOk::decode(&packet).map_err(|e| self.protocol_failed(e))?;

        if ok.param_count > 0 {
            self.skip_columns(usize::from(ok.param_count)).await?;
        }
        let mut columns = Vec::new();
        if ok.column_count > 0 {
            if self.caches_metadata() {
                columns = self.read_columns(usize::from(ok.column_count)).await?;
            } else {
                self.skip_columns(usize::from(ok.column_count)).await?;
            }
        }
        self.set_pending(PendingResult::Idle);

        tracing::debug!(
            conn_id = self.connection_id(),
            statement_id = ok.statement_id,
            params = ok.param_count,
            columns = ok.column_count,
            "statement prepared"
        );
        Ok(Statement::new(
            ok.statement_id,
            usize::from(ok.param_count),
            columns,
            Arc::downgrade(&self.shared),
        ))
    }

    // =========================================================================
    // Response reading
    // =========================================================================

    /// Read the first packet of a command response.
    pub(crate) async fn read_result_header(&mut self) -> Result<ResultSetHeader> {
        let packet = self.read_packet().await?;
        let header = ResultHeader::decode(
            &packet,
            self.negotiated.capabilities,
            self.negotiated.ext_capabilities,
        )
        .map_err(|e| self.protocol_failed(e))?;

        match header {
            ResultHeader::Ok(ok) => {
                self.handle_ok(&ok);
                Ok(ResultSetHeader::default())
            }
            ResultHeader::Err(err) => Err(self.server_error(err)),
            ResultHeader::LocalInfile(name) => Err(self.decline_local_infile(&name).await),
            ResultHeader::ResultSet {
                column_count,
                metadata_follows,
            } => {
                let columns = usize::try_from(column_count)
                    .ok()
                    .filter(|&n| n <= MAX_COLUMNS)
                    .ok_or_else(|| {
                        self.protocol_failed(ProtocolError::TooManyColumns(column_count))
                    })?;
                self.pending = PendingResult::Rows;
                Ok(ResultSetHeader {
                    columns,
                    metadata_follows,
                })
            }
        }
    }

    /// Refuse a `LOAD DATA LOCAL INFILE` request and read the server's
    /// verdict. Always yields an error for the caller.
    async fn decline_local_infile(&mut self, name: &[u8]) -> Error {
        tracing::warn!(
            conn_id = self.connection_id(),
            file = %String::from_utf8_lossy(name),
            "declining LOCAL INFILE request"
        );
        // An empty packet tells the server no file content follows.
        if let Err(e) = self.send_continuation(&[]).await {
            return e;
        }
        let packet = match self.read_packet().await {
            Ok(packet) => packet,
            Err(e) => return e,
        };
        if is_err_packet(&packet) {
            return match self.decode_err(&packet) {
                Ok(err) => self.server_error(err),
                Err(e) => e,
            };
        }
        match OkPacket::decode(&packet, self.negotiated.capabilities) {
            Ok(ok) => self.handle_ok(&ok),
            Err(e) => return self.protocol_failed(e),
        }
        Error::Statement("LOAD DATA LOCAL INFILE is not supported".into())
    }

    /// Column definitions for a result set, honouring the metadata cache.
    ///
    /// When the server skipped the definitions, `cache` supplies them. When
    /// it sent them and metadata caching is on, `cache` is refreshed.
    pub(crate) async fn result_columns(
        &mut self,
        header: ResultSetHeader,
        cache: Option<&mut Vec<ColumnDefinition>>,
    ) -> Result<Vec<ColumnDefinition>> {
        if header.metadata_follows {
            let columns = self.read_columns(header.columns).await?;
            if let Some(cache) = cache {
                if self.caches_metadata() {
                    cache.clone_from(&columns);
                }
            }
            return Ok(columns);
        }
        match cache {
            Some(cached) if cached.len() == header.columns => Ok(cached.clone()),
            _ => Err(self.protocol_failed(ProtocolError::UnexpectedEof("cached column metadata"))),
        }
    }

    pub(crate) async fn read_columns(&mut self, count: usize) -> Result<Vec<ColumnDefinition>> {
        let mut columns = Vec::with_capacity(count.min(MAX_COLUMNS));
        for _ in 0..count {
            let packet = self.read_packet().await?;
            let column = ColumnDefinition::decode(&packet).map_err(|e| self.protocol_failed(e))?;
            columns.push(column);
        }
        self.read_metadata_terminator().await?;
        Ok(columns)
    }

    pub(crate) async fn skip_columns(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            self.read_packet().await?;
        }
        self.read_metadata_terminator().await
    }

    async fn read_metadata_terminator(&mut self) -> Result<()> {
        if self
            .negotiated
            .capabilities
            .contains(CapabilityFlags::DEPRECATE_EOF)
        {
            return Ok(());
        }
        let packet = self.read_packet().await?;
        if !is_eof_packet(&packet, self.negotiated.capabilities) {
            let first = packet.first().copied().unwrap_or_default();
            return Err(self.protocol_failed(ProtocolError::UnexpectedPacket(first)));
        }
        Ok(())
    }

    /// Next row packet of the current result set, or `None` at its end.
    async fn next_row_packet(&mut self) -> Result<Option<Bytes>> {
        if self.pending != PendingResult::Rows {
            return Ok(None);
        }
        let packet = self.read_packet().await?;
        if is_err_packet(&packet) {
            let err = self.decode_err(&packet)?;
            return Err(self.server_error(err));
        }
        if is_eof_packet(&packet, self.negotiated.capabilities) {
            // With DEPRECATE_EOF this is an OK packet; only its status
            // matters for a row stream.
            let eof = EofPacket::decode(&packet, self.negotiated.capabilities)
                .map_err(|e| self.protocol_failed(e))?;
            self.status = eof.status;
            self.set_pending(PendingResult::after_result(eof.status.more_results()));
            return Ok(None);
        }
        Ok(Some(packet))
    }

    pub(crate) async fn read_row(
        &mut self,
        columns: &[ColumnDefinition],
        format: RowFormat,
    ) -> Result<Option<Vec<Option<Bytes>>>> {
        let Some(packet) = self.next_row_packet().await? else {
            return Ok(None);
        };
        let values = match format {
            RowFormat::Text => decode_text_row(&packet, columns.len()),
            RowFormat::Binary => decode_binary_row(&packet, columns),
        }
        .map_err(|e| self.protocol_failed(e))?;
        Ok(Some(values))
    }

    pub(crate) async fn skip_rows(&mut self) -> Result<()> {
        while self.next_row_packet().await?.is_some() {}
        Ok(())
    }

    /// Advance to the next result set that has columns.
    ///
    /// Unread rows of the current set are discarded, and so are result sets
    /// without columns (their OK packets still count towards the result).
    pub(crate) async fn next_result_columns(&mut self) -> Result<Option<Vec<ColumnDefinition>>> {
        loop {
            match self.pending {
                PendingResult::Idle => return Ok(None),
                PendingResult::Rows => self.skip_rows().await?,
                PendingResult::MoreResults => {
                    let header = self.read_result_header().await?;
                    if header.columns > 0 {
                        return self.result_columns(header, None).await.map(Some);
                    }
                }
            }
        }
    }

    /// Read the rest of the current response.
    pub(crate) async fn drain_pending(&mut self) -> Result<()> {
        loop {
            match self.pending {
                PendingResult::Idle => return Ok(()),
                PendingResult::Rows => self.skip_rows().await?,
                PendingResult::MoreResults => {
                    let header = self.read_result_header().await?;
                    if header.columns > 0 && header.metadata_follows {
                        self.skip_columns(header.columns).await?;
                    }
                }
            }
        }
    }

    /// Read a response whose rows, if any, are discarded.
    pub(crate) async fn read_exec_response(
        &mut self,
        cache: Option<&mut Vec<ColumnDefinition>>,
    ) -> Result<ExecResult> {
        let header = self.read_result_header().await?;
        if header.columns > 0 {
            if header.metadata_follows {
                match cache {
                    Some(cache) if self.caches_metadata() => {
                        *cache = self.read_columns(header.columns).await?;
                    }
                    _ => self.skip_columns(header.columns).await?,
                }
            }
            self.skip_rows().await?;
        }
        self.drain_pending().await?;
        Ok(std::mem::take(&mut self.result))
    }

    fn handle_ok(&mut self, ok: &OkPacket) {
        self.status = ok.status;
        self.result.push(ok.affected_rows, ok.last_insert_id);
        self.set_pending(PendingResult::after_result(ok.status.more_results()));
    }

    pub(crate) fn set_pending(&mut self, pending: PendingResult) {
        self.pending = pending;
        if !pending.is_pending() {
            self.buf.release();
        }
    }

    fn decode_err(&mut self, packet: &[u8]) -> Result<ErrPacket> {
        ErrPacket::decode(packet, self.negotiated.capabilities).map_err(|e| self.protocol_failed(e))
    }

    // =========================================================================
    // Failure handling
    // =========================================================================

    /// A server ERR packet ends the response; the session stays usable.
    pub(crate) fn server_error(&mut self, err: ErrPacket) -> Error {
        tracing::debug!(
            conn_id = self.connection_id(),
            code = err.code,
            sql_state = err.sql_state.as_deref().unwrap_or("HY000"),
            message = %err.message,
            "server returned error"
        );
        self.set_pending(PendingResult::Idle);
        Error::from(err)
    }

    pub(crate) fn protocol_failed(&mut self, err: ProtocolError) -> Error {
        tracing::warn!(conn_id = self.connection_id(), error = %err, "malformed packet, closing session");
        self.cleanup();
        Error::Protocol(err)
    }

    fn write_failed(&mut self, err: CodecError) -> Error {
        if !err.is_fatal() {
            // Rejected before any byte was produced; the stream is intact.
            self.buf.release();
            return Error::Codec(err);
        }
        let written = self.io.as_ref().map_or(0, Connection::bytes_written);
        self.cleanup();
        if let Some(reason) = self.shared.cancel_reason() {
            return Error::Canceled(reason);
        }
        if written == 0 {
            tracing::debug!(conn_id = self.connection_id(), error = %err, "write failed before sending");
            Error::BadConnection
        } else {
            tracing::warn!(conn_id = self.connection_id(), error = %err, written, "write failed mid-command");
            Error::InvalidConnection
        }
    }

    fn read_failed(&mut self, err: CodecError) -> Error {
        self.cleanup();
        if let Some(reason) = self.shared.cancel_reason() {
            return Error::Canceled(reason);
        }
        match err {
            CodecError::SequenceMismatch { .. } => {
                tracing::warn!(conn_id = self.connection_id(), error = %err, "packets out of sync");
                Error::Codec(err)
            }
            other => {
                tracing::warn!(conn_id = self.connection_id(), error = %other, "read failed, closing session");
                Error::InvalidConnection
            }
        }
    }

    fn closed_error(&self) -> Error {
        self.shared
            .cancel_reason()
            .map_or(Error::InvalidConnection, Error::Canceled)
    }

    /// Close the session without talking to the server.
    pub(crate) fn cleanup(&mut self) {
        if self.shared.mark_closed() {
            tracing::debug!(conn_id = self.connection_id(), "session closed");
        }
        // Dropping the connection closes the transport; `take` makes that
        // happen once.
        drop(self.io.take());
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.shared.mark_closed();
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection_id", &self.negotiated.connection_id)
            .field("closed", &self.shared.is_closed())
            .field("pending", &self.pending)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Connection failures while preparing are always safe to retry.
fn retry_safe(err: Error) -> Error {
    if err.is_terminal() && err.cancel_reason().is_none() {
        Error::BadConnection
    } else {
        err
    }
}
