//! Server-side prepared statements.
//!
//! A [`Statement`] is a handle to a statement id on one session. It does not
//! borrow the session; every operation takes the session explicitly, and a
//! handle used with a session other than the one that prepared it is
//! rejected.

use std::sync::{Arc, Weak};

use bytes::{BufMut, Bytes, BytesMut};
use mysql_codec::Transport;
use mysql_protocol::codec::write_lenenc_bytes;
use mysql_protocol::{
    ColumnDefinition, Command, ExecuteParam, FieldType, ProtocolError, encode_execute,
    encode_long_data,
};
use mysql_types::{Value, append_date, append_date_time};

use crate::cancel::{CancelContext, SessionShared};
use crate::error::{Error, Result};
use crate::interpolate::InterpolateOptions;
use crate::rows::{ExecResult, RowFormat, Rows};
use crate::session::Session;

/// Opcode, statement id and parameter index in front of each long data chunk.
const LONG_DATA_HEADER: usize = 1 + 4 + 2;

/// A prepared statement.
#[derive(Debug)]
pub struct Statement {
    id: u32,
    param_count: usize,
    pub(crate) columns: Vec<ColumnDefinition>,
    owner: Weak<SessionShared>,
    closed: bool,
}

impl Statement {
    pub(crate) fn new(
        id: u32,
        param_count: usize,
        columns: Vec<ColumnDefinition>,
        owner: Weak<SessionShared>,
    ) -> Self {
        Self {
            id,
            param_count,
            columns,
            owner,
            closed: false,
        }
    }

    /// Server-side statement id.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Number of `?` parameters.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// Cached result column definitions.
    ///
    /// Only populated when the MariaDB metadata cache was negotiated.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    /// Whether [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Execute the statement, discarding any rows.
    pub async fn exec<T: Transport>(
        &mut self,
        session: &mut Session<T>,
        ctx: &CancelContext,
        args: &[Value],
    ) -> Result<ExecResult> {
        session.exec_statement(ctx, self, args).await
    }

    /// Execute the statement and stream its rows.
    pub async fn query<'s, T: Transport>(
        &mut self,
        session: &'s mut Session<T>,
        ctx: &CancelContext,
        args: &[Value],
    ) -> Result<Rows<'s, T>> {
        session.query_statement(ctx, self, args).await
    }

    /// Deallocate the statement on the server.
    ///
    /// `COM_STMT_CLOSE` has no reply. Closing twice is a no-op.
    pub async fn close<T: Transport>(&mut self, session: &mut Session<T>) -> Result<()> {
        session.close_statement(self).await
    }

    fn check_usable<T: Transport>(&self, session: &Session<T>) -> Result<()> {
        if self.closed {
            return Err(Error::Statement("statement is closed".into()));
        }
        let owned = self
            .owner
            .upgrade()
            .is_some_and(|owner| Arc::ptr_eq(&owner, &session.shared));
        if !owned {
            return Err(Error::Statement(
                "statement was prepared on a different session".into(),
            ));
        }
        Ok(())
    }

    fn check_arity(&self, args: &[Value]) -> Result<()> {
        if args.len() != self.param_count {
            return Err(Error::Statement(format!(
                "argument count mismatch (got: {}; has: {})",
                args.len(),
                self.param_count
            )));
        }
        Ok(())
    }
}

/// A parameter after conversion to the binary protocol.
enum Bound {
    /// Fixed-size or NULL; always sent inline.
    Fixed(ExecuteParam),
    /// Variable-length; inline or streamed as long data depending on size.
    Variable { field_type: FieldType, data: Bytes },
}

fn fixed(field_type: FieldType, unsigned: bool, value: &[u8]) -> Bound {
    Bound::Fixed(ExecuteParam {
        field_type,
        unsigned,
        value: Some(Bytes::copy_from_slice(value)),
        long_data: false,
    })
}

fn bind_param(arg: &Value, options: &InterpolateOptions) -> Result<Bound> {
    let bound = match arg {
        Value::Null => Bound::Fixed(ExecuteParam::null()),
        Value::Int(v) => fixed(FieldType::LongLong, false, &v.to_le_bytes()),
        Value::UInt(v) => fixed(FieldType::LongLong, true, &v.to_le_bytes()),
        Value::Float(v) => fixed(FieldType::Double, false, &v.to_le_bytes()),
        Value::Bool(v) => fixed(FieldType::Tiny, false, &[u8::from(*v)]),
        Value::Text(s) | Value::RawText(s) => Bound::Variable {
            field_type: FieldType::String,
            data: Bytes::copy_from_slice(s.as_bytes()),
        },
        Value::Bytes(b) => Bound::Variable {
            field_type: FieldType::Blob,
            data: b.clone(),
        },
        Value::DateTime(v) => {
            let mut text = BytesMut::with_capacity(32);
            let local = v.with_timezone(&options.time_zone).naive_local();
            append_date_time(&mut text, local, options.time_truncate)?;
            temporal(text)
        }
        Value::NaiveDateTime(v) => {
            let mut text = BytesMut::with_capacity(32);
            append_date_time(&mut text, *v, options.time_truncate)?;
            temporal(text)
        }
        Value::Date(v) => {
            let mut text = BytesMut::with_capacity(10);
            append_date(&mut text, *v)?;
            temporal(text)
        }
        Value::ZeroDateTime => temporal(BytesMut::from(&b"0000-00-00"[..])),
        other => {
            return Err(Error::Statement(format!(
                "cannot bind {} as a statement parameter",
                other.type_name()
            )));
        }
    };
    Ok(bound)
}

fn temporal(text: BytesMut) -> Bound {
    Bound::Variable {
        field_type: FieldType::String,
        data: text.freeze(),
    }
}

impl<T: Transport> Session<T> {
    pub(crate) async fn exec_statement(
        &mut self,
        ctx: &CancelContext,
        stmt: &mut Statement,
        args: &[Value],
    ) -> Result<ExecResult> {
        self.ensure_open()?;
        stmt.check_usable(self)?;
        stmt.check_arity(args)?;
        self.watch_cancel(ctx)?;
        let result = self.exec_statement_inner(stmt, args).await;
        self.finish();
        result
    }

    async fn exec_statement_inner(
        &mut self,
        stmt: &mut Statement,
        args: &[Value],
    ) -> Result<ExecResult> {
        self.begin_command().await?;
        self.send_execute(stmt, args).await?;
        self.read_exec_response(Some(&mut stmt.columns)).await
    }

    pub(crate) async fn query_statement(
        &mut self,
        ctx: &CancelContext,
        stmt: &mut Statement,
        args: &[Value],
    ) -> Result<Rows<'_, T>> {
        self.ensure_open()?;
        stmt.check_usable(self)?;
        stmt.check_arity(args)?;
        self.watch_cancel(ctx)?;
        match self.start_statement_query(stmt, args).await {
            Ok(columns) => Ok(Rows::new(self, columns, RowFormat::Binary)),
            Err(e) => {
                self.finish();
                Err(e)
            }
        }
    }

    async fn start_statement_query(
        &mut self,
        stmt: &mut Statement,
        args: &[Value],
    ) -> Result<Option<Vec<ColumnDefinition>>> {
        self.begin_command().await?;
        self.send_execute(stmt, args).await?;
        let header = self.read_result_header().await?;
        if header.columns > 0 {
            return self
                .result_columns(header, Some(&mut stmt.columns))
                .await
                .map(Some);
        }
        self.next_result_columns().await
    }

    pub(crate) async fn close_statement(&mut self, stmt: &mut Statement) -> Result<()> {
        if stmt.closed {
            return Ok(());
        }
        if self.shared.is_closed() {
            // The server dropped the statement along with the connection.
            stmt.closed = true;
            return Err(Error::BadConnection);
        }
        stmt.check_usable(self)?;
        // Best effort: the handle is unusable whether or not the notice lands.
        stmt.closed = true;
        self.begin_command().await?;
        self.buf.start(Command::StmtClose).put_u32_le(stmt.id);
        self.send().await?;
        self.buf.release();
        tracing::debug!(conn_id = self.connection_id(), statement_id = stmt.id, "statement closed");
        Ok(())
    }

    async fn send_execute(&mut self, stmt: &Statement, args: &[Value]) -> Result<()> {
        let long_data_threshold = self.max_allowed_packet / (stmt.param_count + 1);
        let options = self.interpolate_options();

        // Convert everything before the first byte goes out, so a bad
        // argument leaves the exchange untouched.
        let bound = args
            .iter()
            .map(|arg| bind_param(arg, &options))
            .collect::<Result<Vec<_>>>()?;

        let mut params = Vec::with_capacity(bound.len());
        for (index, bound) in bound.into_iter().enumerate() {
            let param = match bound {
                Bound::Fixed(param) => param,
                Bound::Variable { field_type, data } if data.len() >= long_data_threshold => {
                    self.send_long_data(stmt.id, index, &data).await?;
                    ExecuteParam {
                        field_type,
                        unsigned: false,
                        value: None,
                        long_data: true,
                    }
                }
                Bound::Variable { field_type, data } => {
                    let mut value = BytesMut::with_capacity(data.len() + 9);
                    write_lenenc_bytes(&mut value, &data);
                    ExecuteParam {
                        field_type,
                        unsigned: false,
                        value: Some(value.freeze()),
                        long_data: false,
                    }
                }
            };
            params.push(param);
        }

        if let Err(e) = encode_execute(self.buf.start(Command::StmtExecute), stmt.id, &params) {
            // Long data has no reply, so nothing is left on the wire.
            self.buf.release();
            return Err(e.into());
        }
        self.send().await
    }

    /// Stream one parameter in chunks, each its own no-reply command.
    async fn send_long_data(&mut self, statement_id: u32, index: usize, data: &[u8]) -> Result<()> {
        let param_index = u16::try_from(index)
            .map_err(|_| Error::Protocol(ProtocolError::TooManyParameters(index + 1)))?;
        let chunk_size = self
            .max_write_size()
            .saturating_sub(LONG_DATA_HEADER)
            .max(1);

        tracing::debug!(
            conn_id = self.connection_id(),
            statement_id,
            param_index,
            len = data.len(),
            "streaming long data"
        );

        // An empty value still needs one packet so the server sees the
        // parameter as supplied.
        let mut chunks = data.chunks(chunk_size).peekable();
        if chunks.peek().is_none() {
            encode_long_data(
                self.buf.start(Command::StmtSendLongData),
                statement_id,
                param_index,
                &[],
            );
            self.send().await?;
        }
        for chunk in chunks {
            encode_long_data(
                self.buf.start(Command::StmtSendLongData),
                statement_id,
                param_index,
                chunk,
            );
            self.send().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};

    fn options() -> InterpolateOptions {
        InterpolateOptions::new(1 << 20)
    }

    fn inline(bound: Bound) -> ExecuteParam {
        match bound {
            Bound::Fixed(param) => param,
            Bound::Variable { .. } => panic!("expected a fixed parameter"),
        }
    }

    fn variable(bound: Bound) -> (FieldType, Bytes) {
        match bound {
            Bound::Variable { field_type, data } => (field_type, data),
            Bound::Fixed(_) => panic!("expected a variable parameter"),
        }
    }

    #[test]
    fn test_bind_integers() {
        let param = inline(bind_param(&Value::Int(-2), &options()).unwrap());
        assert_eq!(param.field_type, FieldType::LongLong);
        assert!(!param.unsigned);
        assert_eq!(param.value.unwrap().as_ref(), &(-2i64).to_le_bytes());

        let param = inline(bind_param(&Value::UInt(u64::MAX), &options()).unwrap());
        assert!(param.unsigned);
        assert_eq!(param.value.unwrap().as_ref(), &[0xFF; 8]);
    }

    #[test]
    fn test_bind_scalars() {
        let param = inline(bind_param(&Value::Bool(true), &options()).unwrap());
        assert_eq!(param.field_type, FieldType::Tiny);
        assert_eq!(param.value.unwrap().as_ref(), &[1]);

        let param = inline(bind_param(&Value::Float(1.5), &options()).unwrap());
        assert_eq!(param.field_type, FieldType::Double);
        assert_eq!(param.value.unwrap().as_ref(), &1.5f64.to_le_bytes());

        let param = inline(bind_param(&Value::Null, &options()).unwrap());
        assert_eq!(param.value, None);
    }

    #[test]
    fn test_bind_strings_and_bytes() {
        let (ty, data) = variable(bind_param(&Value::Text("héllo".into()), &options()).unwrap());
        assert_eq!(ty, FieldType::String);
        assert_eq!(data.as_ref(), "héllo".as_bytes());

        let (ty, data) = variable(bind_param(&Value::Bytes(Bytes::from_static(b"\x00\x01")), &options()).unwrap());
        assert_eq!(ty, FieldType::Blob);
        assert_eq!(data.as_ref(), b"\x00\x01");
    }

    #[test]
    fn test_bind_temporal_as_text() {
        let zone = FixedOffset::east_opt(3600).unwrap();
        let opts = options().time_zone(zone);
        let instant = Utc.with_ymd_and_hms(2024, 5, 1, 23, 30, 0).unwrap();
        let (_, data) = variable(bind_param(&Value::DateTime(instant), &opts).unwrap());
        assert_eq!(data.as_ref(), b"2024-05-02 00:30:00");

        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let (_, data) = variable(bind_param(&Value::Date(date), &opts).unwrap());
        assert_eq!(data.as_ref(), b"2024-02-29");

        let (_, data) = variable(bind_param(&Value::ZeroDateTime, &opts).unwrap());
        assert_eq!(data.as_ref(), b"0000-00-00");
    }

    #[test]
    fn test_bind_unsupported() {
        let err = bind_param(&Value::Unsupported("Point"), &options()).err().unwrap();
        assert!(matches!(err, Error::Statement(msg) if msg.contains("Point")));
    }

    #[test]
    fn test_arity_check() {
        let stmt = Statement::new(1, 2, Vec::new(), Weak::new());
        assert!(stmt.check_arity(&[Value::Int(1), Value::Null]).is_ok());
        let err = stmt.check_arity(&[Value::Int(1)]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "statement error: argument count mismatch (got: 1; has: 2)"
        );
    }
}
