//! Codec error types.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the framing layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// I/O error on the underlying transport.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Protocol decoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] mysql_protocol::ProtocolError),

    /// The peer used an unexpected sequence id.
    #[error("packet out of order: expected sequence {expected}, got {actual}")]
    SequenceMismatch {
        /// Sequence id the codec expected.
        expected: u8,
        /// Sequence id found on the wire.
        actual: u8,
    },

    /// An outgoing packet exceeds the negotiated maximum.
    #[error("packet too large: {size} bytes exceeds max_allowed_packet {max}")]
    PacketTooLarge {
        /// Payload size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A compressed frame could not be inflated.
    #[error("compression error: {0}")]
    Compression(String),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// A single read or write exceeded its deadline.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// `"read"` or `"write"`.
        operation: &'static str,
        /// Deadline that was exceeded.
        timeout: Duration,
    },

    /// The owner tore the connection down while I/O was pending.
    #[error("connection aborted")]
    Aborted,
}

impl CodecError {
    /// Whether the byte stream can no longer be trusted.
    ///
    /// Every codec failure leaves the framing state undefined except an
    /// outgoing packet rejected for size before any byte was produced.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::PacketTooLarge { .. })
    }
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
