//! Statement parameter values.

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// A statement parameter.
///
/// This is the closed set of values a statement can bind or inline. Types
/// outside it are represented by [`Value::Unsupported`], which makes the
/// client fall back to a server-side prepared statement instead of guessing
/// a literal.
#[derive(Debug, Clone, PartialEq, Default)]
#[non_exhaustive]
pub enum Value {
    /// SQL NULL.
    #[default]
    Null,
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point number.
    Float(f64),
    /// Boolean, rendered as `1`/`0`.
    Bool(bool),
    /// An instant, rendered in the session time zone.
    DateTime(DateTime<Utc>),
    /// A wall-clock date and time, rendered as is.
    NaiveDateTime(NaiveDateTime),
    /// A calendar date.
    Date(NaiveDate),
    /// MySQL's zero date `0000-00-00`.
    ZeroDateTime,
    /// Binary string.
    Bytes(Bytes),
    /// Text that was already validated (for example a JSON document).
    RawText(String),
    /// Text string.
    Text(String),
    /// A value with no literal representation; names the offending type.
    Unsupported(&'static str),
}

impl Value {
    /// Whether this is SQL NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short type name used in logs and errors.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Int(_) => "BIGINT",
            Self::UInt(_) => "BIGINT UNSIGNED",
            Self::Float(_) => "DOUBLE",
            Self::Bool(_) => "BOOLEAN",
            Self::DateTime(_) | Self::NaiveDateTime(_) | Self::ZeroDateTime => "DATETIME",
            Self::Date(_) => "DATE",
            Self::Bytes(_) => "BLOB",
            Self::RawText(_) | Self::Text(_) => "TEXT",
            Self::Unsupported(name) => *name,
        }
    }

    /// Byte length of variable-size payloads, used to decide on long data.
    #[must_use]
    pub fn payload_len(&self) -> Option<usize> {
        match self {
            Self::Bytes(b) => Some(b.len()),
            Self::RawText(s) | Self::Text(s) => Some(s.len()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.type_name(), "NULL");
        assert_eq!(Value::UInt(1).type_name(), "BIGINT UNSIGNED");
        assert_eq!(Value::Unsupported("Uuid").type_name(), "Uuid");
    }

    #[test]
    fn test_payload_len() {
        assert_eq!(Value::Text("héllo".into()).payload_len(), Some(6));
        assert_eq!(Value::Bytes(Bytes::from_static(b"abc")).payload_len(), Some(3));
        assert_eq!(Value::Int(5).payload_len(), None);
        assert!(Value::default().is_null());
    }
}
