//! Compressed protocol framing.
//!
//! When `CLIENT_COMPRESS` is negotiated every write is wrapped in one or more
//! compressed frames carrying their own sequence id. A frame whose
//! uncompressed length field is zero stores its body as is.

use bytes::{BufMut, BytesMut};
use mysql_protocol::{COMPRESSED_HEADER_SIZE, CompressedHeader, MAX_PAYLOAD_SIZE};

use crate::error::{CodecError, Result};

/// Payloads shorter than this are always stored uncompressed.
pub const MIN_COMPRESS_LENGTH: usize = 150;

/// Pluggable deflate implementation.
pub trait Compressor: Send + Sync {
    /// Compress `input`. Returning `None` stores the frame uncompressed.
    fn compress(&mut self, input: &[u8]) -> Option<Vec<u8>>;

    /// Inflate a frame body to exactly `uncompressed_len` bytes.
    fn decompress(&mut self, input: &[u8], uncompressed_len: usize) -> Result<Vec<u8>>;
}

/// Compressor that never deflates and rejects deflated input.
///
/// Servers honour stored frames, so this is enough to run the compressed
/// framing as long as the server does not compress its replies.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredOnly;

impl Compressor for StoredOnly {
    fn compress(&mut self, _input: &[u8]) -> Option<Vec<u8>> {
        None
    }

    fn decompress(&mut self, _input: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        Err(CodecError::Compression(format!(
            "received a deflated frame ({uncompressed_len} bytes) but no deflate implementation is installed"
        )))
    }
}

/// State of the compression layer.
pub(crate) struct Compression {
    /// Compressed frame sequence id.
    pub(crate) sequence: u8,
    /// Inflated bytes not yet consumed by the packet decoder.
    pub(crate) inflated: BytesMut,
    compressor: Box<dyn Compressor>,
}

impl Compression {
    pub(crate) fn new(compressor: Box<dyn Compressor>) -> Self {
        Self {
            sequence: 0,
            inflated: BytesMut::new(),
            compressor,
        }
    }

    /// Wrap already framed packets into compressed frames.
    pub(crate) fn wrap(&mut self, plain: &[u8], dst: &mut BytesMut) {
        for chunk in plain.chunks(MAX_PAYLOAD_SIZE) {
            let deflated = if chunk.len() >= MIN_COMPRESS_LENGTH {
                self.compressor
                    .compress(chunk)
                    .filter(|out| out.len() < chunk.len())
            } else {
                None
            };

            let (body, uncompressed_length) = match &deflated {
                Some(out) => (out.as_slice(), chunk.len() as u32),
                None => (chunk, 0),
            };

            dst.reserve(COMPRESSED_HEADER_SIZE + body.len());
            CompressedHeader {
                compressed_length: body.len() as u32,
                sequence: self.sequence,
                uncompressed_length,
            }
            .encode(dst);
            dst.put_slice(body);

            tracing::trace!(
                seq = self.sequence,
                len = body.len(),
                uncompressed = uncompressed_length,
                "encoded compressed frame"
            );
            self.sequence = self.sequence.wrapping_add(1);
        }
    }

    /// Move one complete compressed frame from `src` into the inflated buffer.
    ///
    /// Returns `false` when `src` does not yet hold a whole frame.
    pub(crate) fn unwrap_frame(&mut self, src: &mut BytesMut) -> Result<bool> {
        if src.len() < COMPRESSED_HEADER_SIZE {
            return Ok(false);
        }
        let header = CompressedHeader::decode(&mut &src[..COMPRESSED_HEADER_SIZE])?;
        let body_len = header.compressed_length as usize;
        if src.len() < COMPRESSED_HEADER_SIZE + body_len {
            src.reserve(COMPRESSED_HEADER_SIZE + body_len - src.len());
            return Ok(false);
        }

        let frame = src.split_to(COMPRESSED_HEADER_SIZE + body_len);
        let body = &frame[COMPRESSED_HEADER_SIZE..];

        // An early server error (packet too large) can carry a lagging id.
        if header.sequence != self.sequence {
            tracing::trace!(
                expected = self.sequence,
                actual = header.sequence,
                "compressed sequence mismatch"
            );
        }
        self.sequence = header.sequence.wrapping_add(1);

        if header.is_stored() {
            self.inflated.extend_from_slice(body);
        } else {
            let expected = header.uncompressed_length as usize;
            let out = self.compressor.decompress(body, expected)?;
            if out.len() != expected {
                return Err(CodecError::Compression(format!(
                    "inflated {} bytes, header announced {expected}",
                    out.len()
                )));
            }
            self.inflated.extend_from_slice(&out);
        }
        Ok(true)
    }

    pub(crate) fn reset(&mut self) {
        self.inflated.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Run-length "compressor" so the deflated path is exercised.
    struct RunLength;

    impl Compressor for RunLength {
        fn compress(&mut self, input: &[u8]) -> Option<Vec<u8>> {
            input.iter().all(|&b| b == input[0]).then(|| vec![input[0]])
        }

        fn decompress(&mut self, input: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
            Ok(vec![input[0]; uncompressed_len])
        }
    }

    #[test]
    fn test_short_payload_is_stored() {
        let mut comp = Compression::new(Box::new(RunLength));
        let mut out = BytesMut::new();
        comp.wrap(&[1, 1, 1], &mut out);
        assert_eq!(&out[..], &[3, 0, 0, 0, 0, 0, 0, 1, 1, 1]);
        assert_eq!(comp.sequence, 1);
    }

    #[test]
    fn test_deflated_frame_roundtrip() {
        let mut writer = Compression::new(Box::new(RunLength));
        let mut wire = BytesMut::new();
        let plain = vec![9u8; 400];
        writer.wrap(&plain, &mut wire);
        assert_eq!(wire.len(), COMPRESSED_HEADER_SIZE + 1);

        let mut reader = Compression::new(Box::new(RunLength));
        assert!(reader.unwrap_frame(&mut wire).unwrap());
        assert_eq!(&reader.inflated[..], &plain[..]);
        assert_eq!(reader.sequence, 1);
    }

    #[test]
    fn test_stored_only_rejects_deflated_input() {
        let mut reader = Compression::new(Box::new(StoredOnly));
        let mut wire = BytesMut::from(&[1u8, 0, 0, 0, 10, 0, 0, 0xAB][..]);
        assert!(matches!(
            reader.unwrap_frame(&mut wire),
            Err(CodecError::Compression(_))
        ));
    }

    #[test]
    fn test_partial_frame_waits() {
        let mut reader = Compression::new(Box::new(StoredOnly));
        let mut wire = BytesMut::from(&[4u8, 0, 0, 0, 0, 0, 0, 1, 2][..]);
        assert!(!reader.unwrap_frame(&mut wire).unwrap());
        assert_eq!(wire.len(), 9);
    }
}
