//! String literal escaping.
//!
//! Which function applies depends on the `NO_BACKSLASH_ESCAPES` server
//! status flag: without it backslash sequences are interpreted, with it only
//! a doubled quote is.

use bytes::{BufMut, BytesMut};

/// Escape for the default SQL mode, where backslash sequences are active.
pub fn escape_backslash(buf: &mut BytesMut, value: &[u8]) {
    buf.reserve(value.len() * 2);
    for &byte in value {
        match byte {
            0x00 => buf.put_slice(b"\\0"),
            b'\n' => buf.put_slice(b"\\n"),
            b'\r' => buf.put_slice(b"\\r"),
            0x1a => buf.put_slice(b"\\Z"),
            b'\'' => buf.put_slice(b"\\'"),
            b'"' => buf.put_slice(b"\\\""),
            b'\\' => buf.put_slice(b"\\\\"),
            other => buf.put_u8(other),
        }
    }
}

/// Escape for `NO_BACKSLASH_ESCAPES` mode: only single quotes are doubled.
pub fn escape_quotes(buf: &mut BytesMut, value: &[u8]) {
    buf.reserve(value.len() * 2);
    for &byte in value {
        if byte == b'\'' {
            buf.put_slice(b"''");
        } else {
            buf.put_u8(byte);
        }
    }
}
