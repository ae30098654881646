//! Client error types.
//!
//! Errors fall into three tiers that tell a pooling layer what to do next:
//!
//! 1. [`Error::BadConnection`]: the connection is unusable but nothing of
//!    the failing command reached the server. Retrying on a fresh
//!    connection is safe.
//! 2. [`Error::Skip`]: this path cannot handle the request as given. Fall
//!    back to another strategy (usually a server-side prepared statement).
//! 3. Everything else: surfaced verbatim. [`Error::is_terminal`] reports the
//!    subset that also left the session unusable.

use std::fmt;

use mysql_protocol::ErrPacket;
use thiserror::Error;

/// Why a session was invalidated by its cancellation watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CancelReason {
    /// The cancellation token fired.
    Canceled,
    /// The operation deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canceled => f.write_str("operation canceled"),
            Self::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

/// Why a request was declined with [`Error::Skip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SkipReason {
    /// Placeholder count differs from the argument count.
    ArgumentCountMismatch {
        /// `?` markers in the statement.
        placeholders: usize,
        /// Arguments supplied.
        arguments: usize,
    },
    /// An argument has no literal representation.
    UnsupportedArgument(&'static str),
    /// Arguments were supplied but client-side interpolation is disabled.
    InterpolationDisabled,
    /// The interpolated statement would exceed `max_allowed_packet`.
    PacketTooLarge,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArgumentCountMismatch {
                placeholders,
                arguments,
            } => write!(
                f,
                "{placeholders} placeholders but {arguments} arguments"
            ),
            Self::UnsupportedArgument(name) => write!(f, "unsupported argument type {name}"),
            Self::InterpolationDisabled => f.write_str("client-side interpolation is disabled"),
            Self::PacketTooLarge => f.write_str("interpolated statement exceeds max_allowed_packet"),
        }
    }
}

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The connection is unusable, and the failed operation did not reach
    /// the server. Safe to retry on another connection.
    #[error("bad connection")]
    BadConnection,

    /// The connection broke after part of a command was sent.
    #[error("invalid connection")]
    InvalidConnection,

    /// The operation was cut short by its cancellation context. If the
    /// context fired while the operation was in flight, the session was
    /// invalidated as well.
    #[error("{0}")]
    Canceled(CancelReason),

    /// The request cannot be handled on this path; use a fallback.
    #[error("skipped: {0}")]
    Skip(SkipReason),

    /// The server returned an error packet.
    #[error("server error {code} ({state}): {message}", state = .sql_state.as_deref().unwrap_or("HY000"))]
    Server {
        /// MySQL error code.
        code: u16,
        /// SQL state, when reported.
        sql_state: Option<String>,
        /// Error message.
        message: String,
    },

    /// Framing error.
    #[error("codec error: {0}")]
    Codec(#[from] mysql_codec::CodecError),

    /// Malformed payload.
    #[error("protocol error: {0}")]
    Protocol(#[from] mysql_protocol::ProtocolError),

    /// Value rendering or conversion error.
    #[error("type error: {0}")]
    Type(#[from] mysql_types::TypeError),

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Prepared statement misuse.
    #[error("statement error: {0}")]
    Statement(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the failure is retry-safe on a different connection.
    #[must_use]
    pub fn is_bad_connection(&self) -> bool {
        matches!(self, Self::BadConnection)
    }

    /// Whether the caller should fall back to another strategy.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }

    /// Check if this is a server error with a specific code.
    #[must_use]
    pub fn is_server_error(&self, code: u16) -> bool {
        matches!(self, Self::Server { code: c, .. } if *c == code)
    }

    /// Whether the session cannot be used after this error.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::BadConnection | Self::InvalidConnection | Self::Canceled(_) => true,
            Self::Codec(e) => e.is_fatal(),
            Self::Protocol(_) => true,
            _ => false,
        }
    }

    /// The cancellation reason, if the operation was canceled.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            Self::Canceled(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl From<ErrPacket> for Error {
    fn from(packet: ErrPacket) -> Self {
        Self::Server {
            code: packet.code,
            sql_state: packet.sql_state,
            message: packet.message,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiers() {
        assert!(Error::BadConnection.is_bad_connection());
        assert!(Error::Skip(SkipReason::InterpolationDisabled).is_skip());
        assert!(!Error::InvalidConnection.is_bad_connection());
        assert!(Error::InvalidConnection.is_terminal());
        assert!(!Error::Skip(SkipReason::PacketTooLarge).is_terminal());
    }

    #[test]
    fn test_server_error_from_packet() {
        let err = Error::from(ErrPacket {
            code: 1064,
            sql_state: Some("42000".into()),
            message: "syntax".into(),
        });
        assert!(err.is_server_error(1064));
        assert!(!err.is_terminal());
        assert_eq!(err.to_string(), "server error 1064 (42000): syntax");
    }

    #[test]
    fn test_cancel_reason_is_preserved() {
        let err = Error::Canceled(CancelReason::DeadlineExceeded);
        assert_eq!(err.cancel_reason(), Some(CancelReason::DeadlineExceeded));
        assert_eq!(err.to_string(), "deadline exceeded");
        assert_eq!(Error::BadConnection.cancel_reason(), None);
    }

    #[test]
    fn test_skip_display() {
        let err = Error::Skip(SkipReason::ArgumentCountMismatch {
            placeholders: 2,
            arguments: 1,
        });
        assert_eq!(err.to_string(), "skipped: 2 placeholders but 1 arguments");
    }
}
