//! Protocol-level error type.

use thiserror::Error;

/// Errors raised while decoding or encoding protocol payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// Not enough bytes were available to decode a fixed-size structure.
    #[error("incomplete packet: expected {expected} bytes, got {actual}")]
    IncompletePacket {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// A variable-length field ran past the end of the payload.
    #[error("unexpected end of payload while reading {0}")]
    UnexpectedEof(&'static str),

    /// Unknown command opcode.
    #[error("unknown command opcode: 0x{0:02X}")]
    InvalidCommand(u8),

    /// The first byte of a response did not match what the exchange expects.
    #[error("unexpected packet with header byte 0x{0:02X}")]
    UnexpectedPacket(u8),

    /// Reserved length-encoded integer prefix.
    #[error("invalid length-encoded integer prefix 0x{0:02X}")]
    InvalidLengthEncoding(u8),

    /// Unknown column type code.
    #[error("unknown field type: 0x{0:02X}")]
    InvalidFieldType(u8),

    /// An empty payload where at least a header byte is required.
    #[error("empty packet")]
    EmptyPacket,

    /// Too many parameters for the prepared statement encoding.
    #[error("too many statement parameters: {0}")]
    TooManyParameters(usize),

    /// A result set announced more columns than the server can produce.
    #[error("result set announces {0} columns")]
    TooManyColumns(u64),
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
