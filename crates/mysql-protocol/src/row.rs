//! Row payloads.
//!
//! Text rows carry every value as a length-encoded string. Binary rows from
//! prepared statements are rendered to the same textual form so callers see
//! one cell representation regardless of the protocol that produced it.

use std::fmt::Write as _;

use bytes::{Buf, Bytes};

use crate::codec::read_lenenc_bytes;
use crate::column::{ColumnDefinition, FieldType};
use crate::error::{ProtocolError, Result};

/// Header byte of a binary protocol row.
const BINARY_ROW_HEADER: u8 = 0x00;

/// The binary row NULL bitmap starts at bit 2.
const NULL_BITMAP_OFFSET: usize = 2;

/// Split a text protocol row into its column values. `None` is SQL NULL.
pub fn decode_text_row(payload: &Bytes, column_count: usize) -> Result<Vec<Option<Bytes>>> {
    let mut src = payload.clone();
    let mut values = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        values.push(read_lenenc_bytes(&mut src)?);
    }
    if !src.is_empty() {
        return Err(ProtocolError::UnexpectedPacket(src[0]));
    }
    Ok(values)
}

/// Decode a binary protocol row, rendering each value as text.
pub fn decode_binary_row(
    payload: &Bytes,
    columns: &[ColumnDefinition],
) -> Result<Vec<Option<Bytes>>> {
    let mut src = payload.clone();
    if !src.has_remaining() {
        return Err(ProtocolError::EmptyPacket);
    }
    let header = src.get_u8();
    if header != BINARY_ROW_HEADER {
        return Err(ProtocolError::UnexpectedPacket(header));
    }

    let bitmap_len = (columns.len() + 7 + NULL_BITMAP_OFFSET) / 8;
    let bitmap = take(&mut src, bitmap_len, "null bitmap")?;

    let mut values = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        let bit = i + NULL_BITMAP_OFFSET;
        if bitmap[bit / 8] & (1 << (bit % 8)) != 0 {
            values.push(None);
            continue;
        }
        values.push(decode_binary_value(&mut src, column)?);
    }
    if src.has_remaining() {
        return Err(ProtocolError::UnexpectedPacket(src[0]));
    }
    Ok(values)
}

fn take(src: &mut Bytes, n: usize, what: &'static str) -> Result<Bytes> {
    if src.remaining() < n {
        return Err(ProtocolError::UnexpectedEof(what));
    }
    Ok(src.split_to(n))
}

fn decode_binary_value(src: &mut Bytes, column: &ColumnDefinition) -> Result<Option<Bytes>> {
    let unsigned = column.is_unsigned();
    let text = match column.field_type {
        FieldType::Null => return Ok(None),
        FieldType::Tiny => {
            let v = take(src, 1, "tiny")?.get_u8();
            if unsigned { v.to_string() } else { (v as i8).to_string() }
        }
        FieldType::Short | FieldType::Year => {
            let v = take(src, 2, "short")?.get_u16_le();
            if unsigned { v.to_string() } else { (v as i16).to_string() }
        }
        FieldType::Int24 | FieldType::Long => {
            let v = take(src, 4, "long")?.get_u32_le();
            if unsigned { v.to_string() } else { (v as i32).to_string() }
        }
        FieldType::LongLong => {
            let v = take(src, 8, "longlong")?.get_u64_le();
            if unsigned { v.to_string() } else { (v as i64).to_string() }
        }
        FieldType::Float => take(src, 4, "float")?.get_f32_le().to_string(),
        FieldType::Double => take(src, 8, "double")?.get_f64_le().to_string(),
        FieldType::Date | FieldType::NewDate => {
            let mut text = binary_date_time(src)?;
            text.truncate(10);
            text
        }
        FieldType::DateTime
        | FieldType::DateTime2
        | FieldType::Timestamp
        | FieldType::Timestamp2 => binary_date_time(src)?,
        FieldType::Time | FieldType::Time2 => binary_time(src)?,
        _ => return read_lenenc_bytes(src),
    };
    Ok(Some(Bytes::from(text)))
}

fn binary_date_time(src: &mut Bytes) -> Result<String> {
    let len = take(src, 1, "datetime length")?.get_u8() as usize;
    let mut body = take(src, len, "datetime")?;
    let (mut year, mut month, mut day) = (0u16, 0u8, 0u8);
    let (mut hour, mut minute, mut second, mut micros) = (0u8, 0u8, 0u8, 0u32);
    match len {
        0 => {}
        4 | 7 | 11 => {
            year = body.get_u16_le();
            month = body.get_u8();
            day = body.get_u8();
            if len >= 7 {
                hour = body.get_u8();
                minute = body.get_u8();
                second = body.get_u8();
            }
            if len == 11 {
                micros = body.get_u32_le();
            }
        }
        _ => return Err(ProtocolError::UnexpectedEof("datetime")),
    }
    let mut text = format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}");
    if micros != 0 {
        let _ = write!(text, ".{micros:06}");
    }
    Ok(text)
}

fn binary_time(src: &mut Bytes) -> Result<String> {
    let len = take(src, 1, "time length")?.get_u8() as usize;
    let mut body = take(src, len, "time")?;
    if len == 0 {
        return Ok("00:00:00".to_owned());
    }
    if len != 8 && len != 12 {
        return Err(ProtocolError::UnexpectedEof("time"));
    }
    let negative = body.get_u8() == 1;
    let days = body.get_u32_le();
    let hours = u64::from(days) * 24 + u64::from(body.get_u8());
    let minute = body.get_u8();
    let second = body.get_u8();
    let micros = if len == 12 { body.get_u32_le() } else { 0 };

    let sign = if negative { "-" } else { "" };
    let mut text = format!("{sign}{hours:02}:{minute:02}:{second:02}");
    if micros != 0 {
        let _ = write!(text, ".{micros:06}");
    }
    Ok(text)
}
