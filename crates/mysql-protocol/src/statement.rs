//! Prepared statement payloads.
//!
//! Encoders here produce the command body without the opcode byte; the
//! session prefixes the [`Command`](crate::Command) when it writes the packet.

use bytes::{Buf, BufMut, Bytes};

use crate::column::FieldType;
use crate::error::{ProtocolError, Result};
use crate::response::OK_HEADER;

/// Reply to `COM_STMT_PREPARE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareOk {
    /// Server-side statement id.
    pub statement_id: u32,
    /// Number of result columns.
    pub column_count: u16,
    /// Number of `?` parameters.
    pub param_count: u16,
    /// Warning count.
    pub warnings: u16,
}

impl PrepareOk {
    /// Decode a prepare reply.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut src = payload;
        if src.remaining() < 9 {
            return Err(ProtocolError::IncompletePacket {
                expected: 9,
                actual: src.remaining(),
            });
        }
        let header = src.get_u8();
        if header != OK_HEADER {
            return Err(ProtocolError::UnexpectedPacket(header));
        }
        let statement_id = src.get_u32_le();
        let column_count = src.get_u16_le();
        let param_count = src.get_u16_le();
        let warnings = if src.remaining() >= 3 {
            src.advance(1);
            src.get_u16_le()
        } else {
            0
        };

        Ok(Self {
            statement_id,
            column_count,
            param_count,
            warnings,
        })
    }

    /// Encode the reply as a server would send it.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(OK_HEADER);
        dst.put_u32_le(self.statement_id);
        dst.put_u16_le(self.column_count);
        dst.put_u16_le(self.param_count);
        dst.put_u8(0);
        dst.put_u16_le(self.warnings);
    }
}

/// One bound parameter for `COM_STMT_EXECUTE`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteParam {
    /// Declared type of the bound value.
    pub field_type: FieldType,
    /// Whether an integer value is unsigned.
    pub unsigned: bool,
    /// Binary-protocol encoding of the value, `None` for NULL.
    pub value: Option<Bytes>,
    /// The value was already streamed with `COM_STMT_SEND_LONG_DATA`.
    pub long_data: bool,
}

impl ExecuteParam {
    /// A NULL parameter.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            field_type: FieldType::Null,
            unsigned: false,
            value: None,
            long_data: false,
        }
    }
}

/// Cursor flag for a plain (non-cursor) execute.
pub const CURSOR_TYPE_NO_CURSOR: u8 = 0x00;

/// Encode the body of `COM_STMT_EXECUTE`.
pub fn encode_execute(
    dst: &mut impl BufMut,
    statement_id: u32,
    params: &[ExecuteParam],
) -> Result<()> {
    if params.len() > usize::from(u16::MAX) {
        return Err(ProtocolError::TooManyParameters(params.len()));
    }

    dst.put_u32_le(statement_id);
    dst.put_u8(CURSOR_TYPE_NO_CURSOR);
    // Iteration count, always 1.
    dst.put_u32_le(1);

    if params.is_empty() {
        return Ok(());
    }

    let mut null_bitmap = vec![0u8; params.len().div_ceil(8)];
    for (i, param) in params.iter().enumerate() {
        if param.value.is_none() && !param.long_data {
            null_bitmap[i / 8] |= 1 << (i % 8);
        }
    }
    dst.put_slice(&null_bitmap);

    // New parameters bound.
    dst.put_u8(1);
    for param in params {
        dst.put_u8(param.field_type as u8);
        dst.put_u8(if param.unsigned { 0x80 } else { 0x00 });
    }

    for param in params {
        if param.long_data {
            continue;
        }
        if let Some(value) = &param.value {
            dst.put_slice(value);
        }
    }
    Ok(())
}

/// Encode the body of `COM_STMT_SEND_LONG_DATA`.
pub fn encode_long_data(dst: &mut impl BufMut, statement_id: u32, param_index: u16, data: &[u8]) {
    dst.put_u32_le(statement_id);
    dst.put_u16_le(param_index);
    dst.put_slice(data);
}
