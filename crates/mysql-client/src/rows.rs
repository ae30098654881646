//! Command results: affected-row counts and streamed rows.

use std::sync::Arc;

use bytes::Bytes;
use mysql_codec::Transport;
use mysql_protocol::ColumnDefinition;
use mysql_types::FromColumn;

use crate::error::{Error, Result};
use crate::session::Session;
use crate::state::PendingResult;

/// Outcome of a statement that returns no rows.
///
/// A multi-statement batch produces one OK packet per statement; every one
/// of them is recorded, and the single-value accessors report the last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    affected_rows: Vec<u64>,
    insert_ids: Vec<u64>,
}

impl ExecResult {
    /// Rows affected by the last statement.
    #[must_use]
    pub fn rows_affected(&self) -> u64 {
        self.affected_rows.last().copied().unwrap_or_default()
    }

    /// `LAST_INSERT_ID()` reported by the last statement.
    #[must_use]
    pub fn last_insert_id(&self) -> u64 {
        self.insert_ids.last().copied().unwrap_or_default()
    }

    /// Rows affected by each statement, in order.
    #[must_use]
    pub fn all_rows_affected(&self) -> &[u64] {
        &self.affected_rows
    }

    /// Insert id reported by each statement, in order.
    #[must_use]
    pub fn all_last_insert_ids(&self) -> &[u64] {
        &self.insert_ids
    }

    pub(crate) fn push(&mut self, affected_rows: u64, last_insert_id: u64) {
        self.affected_rows.push(affected_rows);
        self.insert_ids.push(last_insert_id);
    }

    pub(crate) fn clear(&mut self) {
        self.affected_rows.clear();
        self.insert_ids.clear();
    }
}

/// Wire format of the rows being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowFormat {
    /// Text protocol (`COM_QUERY`).
    Text,
    /// Binary protocol (`COM_STMT_EXECUTE`).
    Binary,
}

/// One row of a result set.
///
/// Cells are kept in their text form; binary-protocol rows are rendered to
/// the same form while decoding.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[ColumnDefinition]>,
    values: Vec<Option<Bytes>>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[ColumnDefinition]>, values: Vec<Option<Bytes>>) -> Self {
        Self { columns, values }
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column metadata for this row.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    /// Raw cell bytes, `None` for NULL or an index out of range.
    #[must_use]
    pub fn raw(&self, index: usize) -> Option<&[u8]> {
        self.values.get(index)?.as_deref()
    }

    /// Whether the cell is NULL.
    #[must_use]
    pub fn is_null(&self, index: usize) -> bool {
        matches!(self.values.get(index), Some(None))
    }

    /// Convert the cell at `index`.
    pub fn get<V: FromColumn>(&self, index: usize) -> Result<V> {
        let cell = self.values.get(index).ok_or_else(|| {
            Error::Statement(format!(
                "column index {index} out of range ({} columns)",
                self.values.len()
            ))
        })?;
        V::from_column(cell.as_deref()).map_err(Error::from)
    }

    /// Convert the cell of the column named `name`.
    pub fn get_by_name<V: FromColumn>(&self, name: &str) -> Result<V> {
        let index = self
            .columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::Statement(format!("no column named {name:?}")))?;
        self.get(index)
    }

    /// Like [`get`](Self::get) but `None` on any failure.
    #[must_use]
    pub fn try_get<V: FromColumn>(&self, index: usize) -> Option<V> {
        self.get(index).ok()
    }

    /// Consume the row, returning its cells.
    #[must_use]
    pub fn into_values(self) -> Vec<Option<Bytes>> {
        self.values
    }
}

/// A cursor over the rows of a query.
///
/// The cursor borrows its session exclusively. Dropping it before the end
/// is fine: the rest of the response stays on the wire, the session reports
/// itself [not valid](Session::is_valid), and the next command drains it
/// before writing.
pub struct Rows<'a, T: Transport> {
    session: &'a mut Session<T>,
    columns: Arc<[ColumnDefinition]>,
    format: RowFormat,
    done: bool,
}

impl<'a, T: Transport> Rows<'a, T> {
    pub(crate) fn new(
        session: &'a mut Session<T>,
        columns: Option<Vec<ColumnDefinition>>,
        format: RowFormat,
    ) -> Self {
        let done = columns.is_none();
        Self {
            session,
            columns: columns.unwrap_or_default().into(),
            format,
            done,
        }
    }

    /// Columns of the current result set.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    /// The next row of the current result set.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        match self.session.read_row(&self.columns, self.format).await {
            Ok(Some(values)) => Ok(Some(Row::new(Arc::clone(&self.columns), values))),
            Ok(None) => Ok(None),
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    /// Whether the server announced another result set.
    #[must_use]
    pub fn has_next_result_set(&self) -> bool {
        !self.done && self.session.pending == PendingResult::MoreResults
    }

    /// Move to the next result set that has columns.
    ///
    /// Unread rows of the current set are discarded. Returns `false` once
    /// the response is exhausted.
    pub async fn next_result_set(&mut self) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        match self.session.next_result_columns().await {
            Ok(Some(columns)) => {
                self.columns = columns.into();
                Ok(true)
            }
            Ok(None) => {
                self.done = true;
                Ok(false)
            }
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    /// Read the remaining rows of the current result set.
    pub async fn collect_rows(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Read and discard the rest of the response.
    pub async fn close(mut self) -> Result<()> {
        self.done = true;
        self.session.drain_pending().await
    }
}

impl<T: Transport> Drop for Rows<'_, T> {
    fn drop(&mut self) {
        self.session.finish();
    }
}

impl<T: Transport> std::fmt::Debug for Rows<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows")
            .field("columns", &self.columns.len())
            .field("format", &self.format)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
