//! Logical packet reassembly.
//!
//! A payload of `0xFFFFFF` bytes or more is split into maximum-size frames
//! followed by a shorter (possibly empty) frame. This module buffers frames
//! until that shorter frame arrives.

use bytes::{Bytes, BytesMut};
use mysql_protocol::MAX_PAYLOAD_SIZE;

/// Reassembles frames into logical packets.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    /// Payload bytes of the frames seen so far.
    buffer: BytesMut,
    /// Frames accumulated for the current packet.
    frame_count: usize,
}

impl MessageAssembler {
    /// Create an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame payload. Returns the logical packet once complete.
    pub fn push(&mut self, payload: BytesMut) -> Option<Bytes> {
        let last = payload.len() < MAX_PAYLOAD_SIZE;
        if self.frame_count == 0 && last {
            return Some(payload.freeze());
        }

        self.buffer.extend_from_slice(&payload);
        self.frame_count += 1;
        if !last {
            return None;
        }

        tracing::trace!(frames = self.frame_count, len = self.buffer.len(), "reassembled packet");
        self.frame_count = 0;
        Some(self.buffer.split().freeze())
    }

    /// Whether a partial packet is buffered.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        self.frame_count > 0
    }

    /// Drop any partial packet.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.frame_count = 0;
    }
}
