//! Codec utilities for length-encoded values.
//!
//! MySQL encodes most variable-length fields with a length-encoded integer
//! prefix: values below 251 take one byte, `0xFC`/`0xFD`/`0xFE` introduce
//! 2, 3 and 8 byte little-endian integers, and `0xFB` marks SQL NULL in rows.

use bytes::{Buf, BufMut, Bytes};

use crate::error::{ProtocolError, Result};

/// Prefix marking a NULL column value in text rows.
pub const NULL_MARKER: u8 = 0xFB;

fn ensure(src: &impl Buf, needed: usize, what: &'static str) -> Result<()> {
    if src.remaining() < needed {
        return Err(ProtocolError::UnexpectedEof(what));
    }
    Ok(())
}

/// Read a length-encoded integer. `None` means the NULL marker.
pub fn read_lenenc_int(src: &mut impl Buf) -> Result<Option<u64>> {
    ensure(src, 1, "length-encoded integer")?;
    match src.get_u8() {
        NULL_MARKER => Ok(None),
        0xFC => {
            ensure(src, 2, "length-encoded integer")?;
            Ok(Some(u64::from(src.get_u16_le())))
        }
        0xFD => {
            ensure(src, 3, "length-encoded integer")?;
            let lo = u64::from(src.get_u16_le());
            let hi = u64::from(src.get_u8());
            Ok(Some(lo | (hi << 16)))
        }
        0xFE => {
            ensure(src, 8, "length-encoded integer")?;
            Ok(Some(src.get_u64_le()))
        }
        0xFF => Err(ProtocolError::InvalidLengthEncoding(0xFF)),
        small => Ok(Some(u64::from(small))),
    }
}

/// Read a length-encoded integer where NULL is not allowed.
pub fn read_lenenc_u64(src: &mut impl Buf) -> Result<u64> {
    read_lenenc_int(src)?.ok_or(ProtocolError::InvalidLengthEncoding(NULL_MARKER))
}

/// Read a length-encoded byte string. `None` means SQL NULL.
pub fn read_lenenc_bytes(src: &mut impl Buf) -> Result<Option<Bytes>> {
    let Some(len) = read_lenenc_int(src)? else {
        return Ok(None);
    };
    let len = usize::try_from(len).map_err(|_| ProtocolError::UnexpectedEof("length-encoded string"))?;
    ensure(src, len, "length-encoded string")?;
    Ok(Some(src.copy_to_bytes(len)))
}

/// Read a length-encoded string, replacing invalid UTF-8.
pub fn read_lenenc_string(src: &mut impl Buf) -> Result<String> {
    let bytes = read_lenenc_bytes(src)?.unwrap_or_default();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read bytes up to (and consuming) a NUL terminator, or to the end.
pub fn read_null_terminated(src: &mut impl Buf) -> Bytes {
    let chunk = src.chunk();
    if let Some(pos) = chunk.iter().position(|&b| b == 0) {
        let out = src.copy_to_bytes(pos);
        src.advance(1);
        return out;
    }

    let mut out = Vec::new();
    while src.has_remaining() {
        let b = src.get_u8();
        if b == 0 {
            break;
        }
        out.push(b);
    }
    Bytes::from(out)
}

/// Encoded size of a length-encoded integer.
#[must_use]
pub const fn lenenc_int_len(value: u64) -> usize {
    if value < 251 {
        1
    } else if value < 1 << 16 {
        3
    } else if value < 1 << 24 {
        4
    } else {
        9
    }
}

/// Write a length-encoded integer.
pub fn write_lenenc_int(dst: &mut impl BufMut, value: u64) {
    if value < 251 {
        dst.put_u8(value as u8);
    } else if value < 1 << 16 {
        dst.put_u8(0xFC);
        dst.put_u16_le(value as u16);
    } else if value < 1 << 24 {
        dst.put_u8(0xFD);
        dst.put_u16_le((value & 0xFFFF) as u16);
        dst.put_u8((value >> 16) as u8);
    } else {
        dst.put_u8(0xFE);
        dst.put_u64_le(value);
    }
}

/// Write a length-encoded byte string.
pub fn write_lenenc_bytes(dst: &mut impl BufMut, value: &[u8]) {
    write_lenenc_int(dst, value.len() as u64);
    dst.put_slice(value);
}
