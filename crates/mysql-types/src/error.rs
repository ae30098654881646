//! Type conversion error types.

use thiserror::Error;

/// Errors that can occur while rendering a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TypeError {
    /// Invalid date/time value.
    #[error("invalid date/time: {0}")]
    InvalidDateTime(String),

    /// NULL where the target type cannot represent it.
    #[error("unexpected NULL value")]
    UnexpectedNull,

    /// A cell could not be parsed as the target type.
    #[error("cannot parse {value:?} as {target_type}")]
    Parse {
        /// Target type name.
        target_type: &'static str,
        /// Cell text, lossily decoded.
        value: String,
    },

    /// Value is out of range for target type.
    #[error("value out of range for {target_type}")]
    OutOfRange {
        /// Target type name.
        target_type: &'static str,
    },
}

/// Result type for type operations.
pub type Result<T> = std::result::Result<T, TypeError>;
