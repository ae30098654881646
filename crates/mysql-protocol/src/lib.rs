//! # mysql-protocol
//!
//! Pure implementation of the MySQL client/server wire protocol pieces a
//! client session needs once the handshake is done.
//!
//! This crate provides packet headers, command opcodes, capability and status
//! flags, length-encoded helpers and the response packets (OK, ERR, EOF,
//! result-set headers, column definitions, prepared statement replies).
//!
//! ## Design Philosophy
//!
//! This crate is intentionally IO-agnostic. It contains no networking logic and
//! makes no assumptions about the async runtime. `mysql-codec` frames these
//! payloads on the wire and `mysql-client` drives the exchanges.
//!
//! ## Example
//!
//! ```rust
//! use mysql_protocol::{CapabilityFlags, ExtendedCapabilityFlags, ResultHeader};
//!
//! let payload = [0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00];
//! let header = ResultHeader::decode(
//!     &payload,
//!     CapabilityFlags::PROTOCOL_41,
//!     ExtendedCapabilityFlags::empty(),
//! )
//! .unwrap();
//! assert!(matches!(header, ResultHeader::Ok(ok) if ok.affected_rows == 1));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod column;
pub mod command;
pub mod error;
pub mod flags;
pub mod packet;
pub mod response;
pub mod row;
pub mod statement;

pub use column::{ColumnDefinition, ColumnFlags, FieldType, MAX_COLUMNS};
pub use command::Command;
pub use error::ProtocolError;
pub use flags::{CapabilityFlags, ExtendedCapabilityFlags, StatusFlags};
pub use packet::{
    COMPRESSED_HEADER_SIZE, CompressedHeader, DEFAULT_MAX_ALLOWED_PACKET, MAX_PAYLOAD_SIZE,
    PACKET_HEADER_SIZE, PacketHeader,
};
pub use response::{EofPacket, ErrPacket, OkPacket, ResultHeader, is_eof_packet, is_err_packet};
pub use row::{decode_binary_row, decode_text_row};
pub use statement::{ExecuteParam, PrepareOk, encode_execute, encode_long_data};
