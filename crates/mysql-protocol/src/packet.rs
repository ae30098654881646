//! Packet header definitions.
//!
//! Every frame on the wire starts with a 3-byte little-endian payload length
//! followed by a 1-byte sequence id. With the compressed protocol enabled the
//! plain frames are carried inside compressed frames with a 7-byte header.

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// Plain packet header size in bytes.
pub const PACKET_HEADER_SIZE: usize = 4;

/// Compressed packet header size in bytes.
pub const COMPRESSED_HEADER_SIZE: usize = 7;

/// Largest payload a single frame can carry (2^24 - 1).
///
/// A payload of exactly this length means the logical packet continues in
/// the next frame.
pub const MAX_PAYLOAD_SIZE: usize = 0x00FF_FFFF;

/// Default `max_allowed_packet` assumed before the server reports one.
pub const DEFAULT_MAX_ALLOWED_PACKET: usize = 64 << 20;

/// Plain packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeader {
    /// Payload length (24 bits).
    pub length: u32,
    /// Sequence id (wraps at 255).
    pub sequence: u8,
}

impl PacketHeader {
    /// Create a new packet header.
    #[must_use]
    pub const fn new(length: u32, sequence: u8) -> Self {
        Self { length, sequence }
    }

    /// Parse a packet header from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < PACKET_HEADER_SIZE {
            return Err(ProtocolError::IncompletePacket {
                expected: PACKET_HEADER_SIZE,
                actual: src.remaining(),
            });
        }

        let length = get_u24_le(src);
        let sequence = src.get_u8();

        Ok(Self { length, sequence })
    }

    /// Encode the packet header to bytes.
    pub fn encode(&self, dst: &mut impl BufMut) {
        put_u24_le(dst, self.length);
        dst.put_u8(self.sequence);
    }

    /// Payload length as `usize`.
    #[must_use]
    pub const fn payload_length(&self) -> usize {
        self.length as usize
    }

    /// Whether the logical packet continues in the next frame.
    #[must_use]
    pub const fn has_continuation(&self) -> bool {
        self.length as usize == MAX_PAYLOAD_SIZE
    }
}

/// Compressed packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompressedHeader {
    /// Length of the (possibly compressed) body that follows.
    pub compressed_length: u32,
    /// Compression sequence id.
    pub sequence: u8,
    /// Length after inflating, or 0 when the body is stored uncompressed.
    pub uncompressed_length: u32,
}

impl CompressedHeader {
    /// Parse a compressed header from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < COMPRESSED_HEADER_SIZE {
            return Err(ProtocolError::IncompletePacket {
                expected: COMPRESSED_HEADER_SIZE,
                actual: src.remaining(),
            });
        }

        let compressed_length = get_u24_le(src);
        let sequence = src.get_u8();
        let uncompressed_length = get_u24_le(src);

        Ok(Self {
            compressed_length,
            sequence,
            uncompressed_length,
        })
    }

    /// Encode the compressed header to bytes.
    pub fn encode(&self, dst: &mut impl BufMut) {
        put_u24_le(dst, self.compressed_length);
        dst.put_u8(self.sequence);
        put_u24_le(dst, self.uncompressed_length);
    }

    /// Whether the body is stored without compression.
    #[must_use]
    pub const fn is_stored(&self) -> bool {
        self.uncompressed_length == 0
    }
}

fn get_u24_le(src: &mut impl Buf) -> u32 {
    let lo = u32::from(src.get_u16_le());
    let hi = u32::from(src.get_u8());
    lo | (hi << 16)
}

fn put_u24_le(dst: &mut impl BufMut, value: u32) {
    dst.put_u16_le((value & 0xFFFF) as u16);
    dst.put_u8(((value >> 16) & 0xFF) as u8);
}
