//! Transaction support.
//!
//! This module provides isolation levels, savepoints and the
//! [`Transaction`] guard returned by [`Session::begin_transaction`].

use mysql_codec::Transport;
use mysql_types::Value;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::cancel::CancelContext;
use crate::error::{Error, Result};
use crate::rows::{ExecResult, Rows};
use crate::session::Session;

/// Transaction isolation level.
///
/// The full set a caller may ask for. MySQL implements four of them;
/// requesting any other level fails before anything is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum IsolationLevel {
    /// Whatever the server is configured with; no `SET` is issued.
    #[default]
    Default,
    /// Read uncommitted (dirty reads allowed).
    ReadUncommitted,
    /// Read committed.
    ReadCommitted,
    /// Write committed. Not supported by MySQL.
    WriteCommitted,
    /// Repeatable read (the InnoDB default).
    RepeatableRead,
    /// Snapshot. Not supported by MySQL.
    Snapshot,
    /// Serializable.
    Serializable,
    /// Linearizable. Not supported by MySQL.
    Linearizable,
}

impl IsolationLevel {
    /// The level as it appears in `SET TRANSACTION ISOLATION LEVEL`.
    ///
    /// `Ok(None)` for [`IsolationLevel::Default`], an error for levels
    /// MySQL does not implement.
    pub fn as_sql(&self) -> Result<Option<&'static str>> {
        match self {
            Self::Default => Ok(None),
            Self::ReadUncommitted => Ok(Some("READ UNCOMMITTED")),
            Self::ReadCommitted => Ok(Some("READ COMMITTED")),
            Self::RepeatableRead => Ok(Some("REPEATABLE READ")),
            Self::Serializable => Ok(Some("SERIALIZABLE")),
            Self::WriteCommitted | Self::Snapshot | Self::Linearizable => Err(Error::Transaction(
                format!("unsupported isolation level: {}", self.name()),
            )),
        }
    }

    /// Human-readable name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::WriteCommitted => "WRITE COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Snapshot => "SNAPSHOT",
            Self::Serializable => "SERIALIZABLE",
            Self::Linearizable => "LINEARIZABLE",
        }
    }
}

/// Options for [`Session::begin_transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub struct TxOptions {
    /// Isolation level for the transaction.
    pub isolation: IsolationLevel,
    /// Start a read-only transaction.
    pub read_only: bool,
}

impl TxOptions {
    /// Default options: server isolation level, read-write.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the isolation level.
    #[must_use]
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = level;
        self
    }

    /// Request a read-only transaction.
    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

/// A savepoint within a transaction.
///
/// The name is validated when the savepoint is created.
#[derive(Debug, Clone)]
pub struct SavePoint {
    name: String,
}

impl SavePoint {
    /// Get the savepoint name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn validate_identifier(name: &str) -> Result<()> {
    static IDENTIFIER_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_$]{0,63}$").unwrap());

    if !IDENTIFIER_RE.is_match(name) {
        return Err(Error::Transaction(format!(
            "invalid savepoint name '{name}': must start with a letter or underscore, \
             contain only alphanumerics, _ and $, and be 1-64 characters"
        )));
    }
    Ok(())
}

/// An open transaction.
///
/// Borrows the session until [`commit`](Self::commit) or
/// [`rollback`](Self::rollback). Dropping it without either leaves the
/// transaction open on the server.
pub struct Transaction<'a, T: Transport> {
    session: &'a mut Session<T>,
    finished: bool,
}

impl<'a, T: Transport> Transaction<'a, T> {
    pub(crate) fn new(session: &'a mut Session<T>) -> Self {
        Self {
            session,
            finished: false,
        }
    }

    /// Execute a statement inside the transaction.
    pub async fn exec(
        &mut self,
        ctx: &CancelContext,
        sql: &str,
        args: &[Value],
    ) -> Result<ExecResult> {
        self.session.exec(ctx, sql, args).await
    }

    /// Run a query inside the transaction.
    pub async fn query(
        &mut self,
        ctx: &CancelContext,
        sql: &str,
        args: &[Value],
    ) -> Result<Rows<'_, T>> {
        self.session.query(ctx, sql, args).await
    }

    /// The session this transaction runs on.
    pub fn session(&mut self) -> &mut Session<T> {
        self.session
    }

    /// Create a savepoint.
    pub async fn save_point(&mut self, name: &str) -> Result<SavePoint> {
        validate_identifier(name)?;
        self.session.exec_text(&format!("SAVEPOINT {name}"), &[]).await?;
        Ok(SavePoint {
            name: name.to_owned(),
        })
    }

    /// Roll back to a savepoint, keeping the transaction open.
    pub async fn rollback_to(&mut self, savepoint: &SavePoint) -> Result<()> {
        self.session
            .exec_text(&format!("ROLLBACK TO SAVEPOINT {}", savepoint.name), &[])
            .await
            .map(drop)
    }

    /// Commit the transaction.
    pub async fn commit(mut self) -> Result<()> {
        self.finish("COMMIT").await
    }

    /// Roll the transaction back.
    pub async fn rollback(mut self) -> Result<()> {
        self.finish("ROLLBACK").await
    }

    async fn finish(&mut self, sql: &str) -> Result<()> {
        self.finished = true;
        if self.session.is_closed() {
            return Err(Error::InvalidConnection);
        }
        self.session.exec_text(sql, &[]).await?;
        tracing::debug!(conn_id = self.session.connection_id(), sql, "transaction finished");
        Ok(())
    }
}

impl<T: Transport> Drop for Transaction<'_, T> {
    fn drop(&mut self) {
        if !self.finished && !self.session.is_closed() {
            tracing::warn!(
                conn_id = self.session.connection_id(),
                "transaction dropped without commit or rollback"
            );
        }
    }
}

impl<T: Transport> std::fmt::Debug for Transaction<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("connection_id", &self.session.connection_id())
            .field("finished", &self.finished)
            .finish()
    }
}
