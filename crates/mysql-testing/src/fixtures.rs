//! Test fixture utilities.

use mysql_protocol::{ColumnDefinition, ColumnFlags, FieldType};

use crate::mock_server::MockResponse;

/// Column definitions from `(name, type)` pairs.
pub fn columns(specs: &[(&str, FieldType)]) -> Vec<ColumnDefinition> {
    specs
        .iter()
        .map(|(name, field_type)| ColumnDefinition::new(*name, *field_type))
        .collect()
}

/// An unsigned column definition.
pub fn unsigned_column(name: &str, field_type: FieldType) -> ColumnDefinition {
    let mut column = ColumnDefinition::new(name, field_type);
    column.flags |= ColumnFlags::UNSIGNED;
    column
}

/// Rows of non-NULL text cells.
pub fn text_rows(rows: &[&[&str]]) -> Vec<Vec<Option<String>>> {
    rows.iter()
        .map(|row| row.iter().map(|cell| Some((*cell).to_owned())).collect())
        .collect()
}

/// A table with fixed contents that a mock server can serve.
#[derive(Debug, Clone)]
pub struct TableFixture {
    /// Table name.
    pub name: String,
    /// Column definitions.
    pub columns: Vec<ColumnDefinition>,
    /// Rows in text form.
    pub rows: Vec<Vec<Option<String>>>,
}

impl TableFixture {
    /// Create an empty table fixture.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDefinition>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Add a row.
    #[must_use]
    pub fn with_row(mut self, row: Vec<Option<String>>) -> Self {
        self.rows.push(row);
        self
    }

    /// The `SELECT *` statement this fixture answers.
    #[must_use]
    pub fn select_all_sql(&self) -> String {
        format!("SELECT * FROM {}", self.name)
    }

    /// The table contents as a text result set.
    #[must_use]
    pub fn response(&self) -> MockResponse {
        MockResponse::rows(self.columns.clone(), self.rows.clone())
    }

    /// The table contents as a binary result set.
    #[must_use]
    pub fn binary_response(&self) -> MockResponse {
        MockResponse::binary_rows(self.columns.clone(), self.rows.clone())
    }
}

/// `users(id BIGINT, name VARCHAR, email VARCHAR NULL)` with three rows.
pub fn users_table() -> TableFixture {
    TableFixture::new(
        "users",
        columns(&[
            ("id", FieldType::LongLong),
            ("name", FieldType::VarString),
            ("email", FieldType::VarString),
        ]),
    )
    .with_row(vec![Some("1".into()), Some("alice".into()), Some("alice@example.com".into())])
    .with_row(vec![Some("2".into()), Some("bob".into()), None])
    .with_row(vec![Some("3".into()), Some("carol".into()), Some("carol@example.com".into())])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_users_table() {
        let users = users_table();
        assert_eq!(users.select_all_sql(), "SELECT * FROM users");
        assert_eq!(users.columns.len(), 3);
        assert_eq!(users.rows.len(), 3);
        assert!(users.rows[1][2].is_none());
    }

    #[test]
    fn test_unsigned_column() {
        assert!(unsigned_column("n", FieldType::LongLong).is_unsigned());
        assert!(!columns(&[("n", FieldType::LongLong)])[0].is_unsigned());
    }
}
