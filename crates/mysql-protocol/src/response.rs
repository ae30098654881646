//! Generic response packets.
//!
//! Every command reply starts with a header byte: `0x00` for OK, `0xFF` for
//! ERR, `0xFB` for a LOAD DATA LOCAL request, `0xFE` for EOF in row streams,
//! and anything else is the column count of a result set.

use bytes::{Buf, Bytes};

use crate::codec::{read_lenenc_bytes, read_lenenc_u64};
use crate::error::{ProtocolError, Result};
use crate::flags::{CapabilityFlags, ExtendedCapabilityFlags, StatusFlags};
use crate::packet::MAX_PAYLOAD_SIZE;

/// OK header byte.
pub const OK_HEADER: u8 = 0x00;
/// ERR header byte.
pub const ERR_HEADER: u8 = 0xFF;
/// EOF header byte.
pub const EOF_HEADER: u8 = 0xFE;
/// LOAD DATA LOCAL INFILE request header byte.
pub const LOCAL_INFILE_HEADER: u8 = 0xFB;

/// Whether `payload` is an ERR packet.
#[must_use]
pub fn is_err_packet(payload: &[u8]) -> bool {
    payload.first() == Some(&ERR_HEADER)
}

/// Whether `payload` terminates a column or row stream.
///
/// Without `DEPRECATE_EOF` the terminator is a short EOF packet. With it, the
/// terminator is an OK packet using the EOF header byte; a text row can only
/// start with `0xFE` when its first value is at least 2^24 bytes long, so the
/// payload length tells the two apart.
#[must_use]
pub fn is_eof_packet(payload: &[u8], capabilities: CapabilityFlags) -> bool {
    if payload.first() != Some(&EOF_HEADER) {
        return false;
    }
    if capabilities.contains(CapabilityFlags::DEPRECATE_EOF) {
        payload.len() < MAX_PAYLOAD_SIZE
    } else {
        payload.len() < 9
    }
}

/// OK packet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OkPacket {
    /// Rows affected by the statement.
    pub affected_rows: u64,
    /// Last generated auto-increment id.
    pub last_insert_id: u64,
    /// Server status after the statement.
    pub status: StatusFlags,
    /// Warning count.
    pub warnings: u16,
    /// Human readable info string.
    pub info: String,
}

impl OkPacket {
    /// Decode an OK packet (header byte `0x00`, or `0xFE` for terminators).
    pub fn decode(payload: &[u8], capabilities: CapabilityFlags) -> Result<Self> {
        let mut src = payload;
        if !src.has_remaining() {
            return Err(ProtocolError::EmptyPacket);
        }
        let header = src.get_u8();
        if header != OK_HEADER && header != EOF_HEADER {
            return Err(ProtocolError::UnexpectedPacket(header));
        }

        let affected_rows = read_lenenc_u64(&mut src)?;
        let last_insert_id = read_lenenc_u64(&mut src)?;

        let mut status = StatusFlags::empty();
        let mut warnings = 0;
        if capabilities.contains(CapabilityFlags::PROTOCOL_41) {
            if src.remaining() < 4 {
                return Err(ProtocolError::UnexpectedEof("OK status"));
            }
            status = StatusFlags::from_bits_retain(src.get_u16_le());
            warnings = src.get_u16_le();
        } else if capabilities.contains(CapabilityFlags::TRANSACTIONS) {
            if src.remaining() < 2 {
                return Err(ProtocolError::UnexpectedEof("OK status"));
            }
            status = StatusFlags::from_bits_retain(src.get_u16_le());
        }

        let info = if capabilities.contains(CapabilityFlags::SESSION_TRACK) && src.has_remaining()
        {
            read_lenenc_bytes(&mut src)
                .ok()
                .flatten()
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .unwrap_or_default()
        } else {
            String::from_utf8_lossy(src).into_owned()
        };

        Ok(Self {
            affected_rows,
            last_insert_id,
            status,
            warnings,
            info,
        })
    }
}

/// ERR packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    /// Server error code.
    pub code: u16,
    /// Five character SQL state, when the 4.1 protocol is in use.
    pub sql_state: Option<String>,
    /// Error message.
    pub message: String,
}

impl ErrPacket {
    /// Decode an ERR packet.
    pub fn decode(payload: &[u8], capabilities: CapabilityFlags) -> Result<Self> {
        let mut src = payload;
        if src.remaining() < 3 {
            return Err(ProtocolError::IncompletePacket {
                expected: 3,
                actual: src.remaining(),
            });
        }
        let header = src.get_u8();
        if header != ERR_HEADER {
            return Err(ProtocolError::UnexpectedPacket(header));
        }
        let code = src.get_u16_le();

        let mut sql_state = None;
        if capabilities.contains(CapabilityFlags::PROTOCOL_41)
            && src.first() == Some(&b'#')
            && src.len() >= 6
        {
            sql_state = Some(String::from_utf8_lossy(&src[1..6]).into_owned());
            src.advance(6);
        }

        Ok(Self {
            code,
            sql_state,
            message: String::from_utf8_lossy(src).into_owned(),
        })
    }
}

/// EOF packet (or the OK packet that replaces it under `DEPRECATE_EOF`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EofPacket {
    /// Warning count.
    pub warnings: u16,
    /// Server status.
    pub status: StatusFlags,
}

impl EofPacket {
    /// Decode a stream terminator.
    pub fn decode(payload: &[u8], capabilities: CapabilityFlags) -> Result<Self> {
        if capabilities.contains(CapabilityFlags::DEPRECATE_EOF) {
            let ok = OkPacket::decode(payload, capabilities)?;
            return Ok(Self {
                warnings: ok.warnings,
                status: ok.status,
            });
        }

        let mut src = payload;
        if !src.has_remaining() {
            return Err(ProtocolError::EmptyPacket);
        }
        let header = src.get_u8();
        if header != EOF_HEADER {
            return Err(ProtocolError::UnexpectedPacket(header));
        }
        if capabilities.contains(CapabilityFlags::PROTOCOL_41) && src.remaining() >= 4 {
            let warnings = src.get_u16_le();
            let status = StatusFlags::from_bits_retain(src.get_u16_le());
            return Ok(Self { warnings, status });
        }
        Ok(Self::default())
    }
}

/// First packet of a command response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultHeader {
    /// The command completed without a result set.
    Ok(OkPacket),
    /// The server rejected the command.
    Err(ErrPacket),
    /// The server asks for a local file (LOAD DATA LOCAL INFILE).
    LocalInfile(Bytes),
    /// A result set with `column_count` columns follows.
    ResultSet {
        /// Number of column definitions.
        column_count: u64,
        /// Whether column definitions follow. Only false when the MariaDB
        /// metadata cache is negotiated and the server skipped them.
        metadata_follows: bool,
    },
}

impl ResultHeader {
    /// Decode a result header.
    pub fn decode(
        payload: &[u8],
        capabilities: CapabilityFlags,
        ext_capabilities: ExtendedCapabilityFlags,
    ) -> Result<Self> {
        let Some(&first) = payload.first() else {
            return Err(ProtocolError::EmptyPacket);
        };
        match first {
            OK_HEADER => Ok(Self::Ok(OkPacket::decode(payload, capabilities)?)),
            ERR_HEADER => Ok(Self::Err(ErrPacket::decode(payload, capabilities)?)),
            LOCAL_INFILE_HEADER => Ok(Self::LocalInfile(Bytes::copy_from_slice(&payload[1..]))),
            _ => {
                let mut src = payload;
                let column_count = read_lenenc_u64(&mut src)?;
                let metadata_follows = if ext_capabilities
                    .contains(ExtendedCapabilityFlags::CACHE_METADATA)
                    && src.has_remaining()
                {
                    src.get_u8() != 0
                } else {
                    true
                };
                Ok(Self::ResultSet {
                    column_count,
                    metadata_follows,
                })
            }
        }
    }
}
