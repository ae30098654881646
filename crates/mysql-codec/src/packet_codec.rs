//! MySQL packet codec implementation.

use bytes::{BufMut, Bytes, BytesMut};
use mysql_protocol::{DEFAULT_MAX_ALLOWED_PACKET, MAX_PAYLOAD_SIZE, PACKET_HEADER_SIZE, PacketHeader};
use tokio_util::codec::{Decoder, Encoder};

use crate::compress::{Compression, Compressor};
use crate::error::CodecError;
use crate::message::MessageAssembler;

/// MySQL packet codec for tokio-util framing.
///
/// Decoding yields whole logical packets (frames reassembled). Every frame
/// read or written advances the shared sequence id, which is reset at the
/// start of each command.
pub struct PacketCodec {
    /// Next expected/assigned sequence id.
    sequence: u8,
    /// Largest payload accepted for writing.
    max_packet_size: usize,
    /// Frame reassembly state.
    assembler: MessageAssembler,
    /// Compressed protocol state, when negotiated.
    compression: Option<Compression>,
}

impl PacketCodec {
    /// Create a new codec with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sequence: 0,
            max_packet_size: DEFAULT_MAX_ALLOWED_PACKET,
            assembler: MessageAssembler::new(),
            compression: None,
        }
    }

    /// Set the largest payload this codec will write.
    #[must_use]
    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Enable the compressed protocol.
    #[must_use]
    pub fn with_compression(mut self, compressor: impl Compressor + 'static) -> Self {
        self.compression = Some(Compression::new(Box::new(compressor)));
        self
    }

    /// Update the largest payload this codec will write.
    pub fn set_max_packet_size(&mut self, size: usize) {
        self.max_packet_size = size;
    }

    /// Largest payload this codec will write.
    #[must_use]
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Whether the compressed protocol is active.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.compression.is_some()
    }

    /// Current packet sequence id.
    #[must_use]
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Current compressed frame sequence id.
    #[must_use]
    pub fn compress_sequence(&self) -> Option<u8> {
        self.compression.as_ref().map(|c| c.sequence)
    }

    /// Reset both counters at the start of a command.
    pub fn reset_sequence(&mut self) {
        self.sequence = 0;
        if let Some(compression) = &mut self.compression {
            compression.sequence = 0;
        }
    }

    /// Fold the compressed counter into the packet counter.
    ///
    /// Must run once after a write is flushed and before the reply is read.
    /// A no-op without compression.
    pub fn sync_sequence(&mut self) {
        if let Some(compression) = &mut self.compression {
            self.sequence = compression.sequence;
            compression.reset();
        }
    }

    /// Whether decoded bytes are buffered that no caller consumed yet.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.assembler.has_partial()
            || self
                .compression
                .as_ref()
                .is_some_and(|c| !c.inflated.is_empty())
    }

    /// Frame `payload` into `dst`, splitting at the maximum frame size.
    pub fn encode_payload(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<(), CodecError> {
        if payload.len() > self.max_packet_size {
            return Err(CodecError::PacketTooLarge {
                size: payload.len(),
                max: self.max_packet_size,
            });
        }

        match &mut self.compression {
            None => encode_frames(&mut self.sequence, payload, dst),
            Some(compression) => {
                let mut plain = BytesMut::with_capacity(payload.len() + PACKET_HEADER_SIZE);
                encode_frames(&mut self.sequence, payload, &mut plain);
                compression.wrap(&plain, dst);
            }
        }
        Ok(())
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_frames(sequence: &mut u8, payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(payload.len() + PACKET_HEADER_SIZE * (payload.len() / MAX_PAYLOAD_SIZE + 1));
    let mut rest = payload;
    loop {
        let len = rest.len().min(MAX_PAYLOAD_SIZE);
        PacketHeader::new(len as u32, *sequence).encode(dst);
        dst.put_slice(&rest[..len]);
        tracing::trace!(seq = *sequence, len, "encoded packet");
        *sequence = sequence.wrapping_add(1);
        rest = &rest[len..];
        if len < MAX_PAYLOAD_SIZE {
            break;
        }
    }
}

fn decode_frames(
    sequence: &mut u8,
    assembler: &mut MessageAssembler,
    src: &mut BytesMut,
) -> Result<Option<Bytes>, CodecError> {
    loop {
        if src.len() < PACKET_HEADER_SIZE {
            return Ok(None);
        }
        let header = PacketHeader::decode(&mut &src[..PACKET_HEADER_SIZE])?;
        let frame_len = PACKET_HEADER_SIZE + header.payload_length();
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        if header.sequence != *sequence {
            return Err(CodecError::SequenceMismatch {
                expected: *sequence,
                actual: header.sequence,
            });
        }
        *sequence = sequence.wrapping_add(1);

        let mut frame = src.split_to(frame_len);
        let payload = frame.split_off(PACKET_HEADER_SIZE);
        tracing::trace!(seq = header.sequence, len = payload.len(), "decoded packet");

        if let Some(packet) = assembler.push(payload) {
            return Ok(Some(packet));
        }
    }
}

impl Decoder for PacketCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(compression) = &mut self.compression else {
            return decode_frames(&mut self.sequence, &mut self.assembler, src);
        };

        loop {
            if let Some(packet) =
                decode_frames(&mut self.sequence, &mut self.assembler, &mut compression.inflated)?
            {
                return Ok(Some(packet));
            }
            if !compression.unwrap_frame(src)? {
                return Ok(None);
            }
        }
    }
}

impl Encoder<Bytes> for PacketCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_payload(&item, dst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::compress::StoredOnly;
    use proptest::prelude::*;

    #[test]
    fn test_encode_single_frame() {
        let mut codec = PacketCodec::new();
        let mut dst = BytesMut::new();
        codec.encode_payload(&[0x0e], &mut dst).unwrap();
        assert_eq!(&dst[..], &[0x01, 0x00, 0x00, 0x00, 0x0e]);
        assert_eq!(codec.sequence(), 1);
    }

    #[test]
    fn test_decode_checks_sequence() {
        let mut codec = PacketCodec::new();
        codec.reset_sequence();
        let mut src = BytesMut::from(&[0x01, 0x00, 0x00, 0x03, 0x00][..]);
        let err = codec.decode(&mut src).unwrap_err();
        assert!(matches!(
            err,
            CodecError::SequenceMismatch {
                expected: 0,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_decode_waits_for_complete_frame() {
        let mut codec = PacketCodec::new();
        let mut src = BytesMut::from(&[0x03, 0x00, 0x00, 0x00, b'a'][..]);
        assert!(codec.decode(&mut src).unwrap().is_none());
        src.extend_from_slice(b"bc");
        assert_eq!(&codec.decode(&mut src).unwrap().unwrap()[..], b"abc");
        assert_eq!(codec.sequence(), 1);
    }

    #[test]
    fn test_exact_max_payload_gets_empty_trailer() {
        let mut writer = PacketCodec::new().with_max_packet_size(usize::MAX);
        let payload = vec![0x5a; MAX_PAYLOAD_SIZE];
        let mut wire = BytesMut::new();
        writer.encode_payload(&payload, &mut wire).unwrap();
        assert_eq!(wire.len(), MAX_PAYLOAD_SIZE + 2 * PACKET_HEADER_SIZE);
        assert_eq!(writer.sequence(), 2);

        let mut reader = PacketCodec::new();
        let packet = reader.decode(&mut wire).unwrap().unwrap();
        assert_eq!(packet.len(), MAX_PAYLOAD_SIZE);
        assert_eq!(reader.sequence(), 2);
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let mut codec = PacketCodec::new().with_max_packet_size(4);
        let mut dst = BytesMut::new();
        let err = codec.encode_payload(b"hello", &mut dst).unwrap_err();
        assert!(matches!(err, CodecError::PacketTooLarge { size: 5, max: 4 }));
        assert!(!err.is_fatal());
        assert!(dst.is_empty());
        assert_eq!(codec.sequence(), 0);
    }

    #[test]
    fn test_compressed_write_then_sync() {
        let mut codec = PacketCodec::new().with_compression(StoredOnly);
        let mut wire = BytesMut::new();
        codec.encode_payload(&[0x03, b'x'], &mut wire).unwrap();
        assert_eq!(
            &wire[..],
            &[6, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0, 0x03, b'x'],
            "one stored compressed frame wrapping one packet"
        );
        assert_eq!(codec.sequence(), 1);
        assert_eq!(codec.compress_sequence(), Some(1));

        codec.sync_sequence();
        assert_eq!(codec.sequence(), 1);

        // Reply: compressed seq 1 wrapping packet seq 1.
        let mut reply = BytesMut::from(&[5u8, 0, 0, 1, 0, 0, 0, 1, 0, 0, 1, 0x00][..]);
        let packet = codec.decode(&mut reply).unwrap().unwrap();
        assert_eq!(&packet[..], &[0x00]);
        assert_eq!(codec.compress_sequence(), Some(2));
        assert!(!codec.has_pending());
    }

    #[test]
    fn test_sync_is_noop_without_compression() {
        let mut codec = PacketCodec::new();
        let mut wire = BytesMut::new();
        codec.encode_payload(b"abc", &mut wire).unwrap();
        codec.sync_sequence();
        assert_eq!(codec.sequence(), 1);
        assert_eq!(codec.compress_sequence(), None);
    }

    proptest! {
        #[test]
        fn prop_sequence_wraps_modulo_256(frames in 0usize..700) {
            let mut writer = PacketCodec::new();
            let mut reader = PacketCodec::new();
            let mut wire = BytesMut::new();
            for _ in 0..frames {
                writer.encode_payload(b"x", &mut wire).unwrap();
            }
            for _ in 0..frames {
                prop_assert!(reader.decode(&mut wire).unwrap().is_some());
            }
            prop_assert_eq!(usize::from(writer.sequence()), frames % 256);
            prop_assert_eq!(usize::from(reader.sequence()), frames % 256);
        }
    }
}
