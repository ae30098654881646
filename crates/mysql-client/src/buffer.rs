//! Reusable per-command scratch buffer.

use bytes::{BufMut, BytesMut};
use mysql_protocol::Command;

const INITIAL_CAPACITY: usize = 4096;
/// Buffers that grew past this are released after a command.
const RETAIN_LIMIT: usize = 1 << 20;

/// The outgoing command buffer, reused across commands.
///
/// It is marked busy from the moment a command is written until its
/// response has been read completely. A session whose buffer is still busy
/// when the next command starts was abandoned mid-exchange.
#[derive(Debug)]
pub(crate) struct CommandBuffer {
    data: BytesMut,
    busy: bool,
}

impl CommandBuffer {
    pub(crate) fn new() -> Self {
        Self {
            data: BytesMut::with_capacity(INITIAL_CAPACITY),
            busy: false,
        }
    }

    /// Clear the buffer and start a packet with `command`.
    pub(crate) fn start(&mut self, command: Command) -> &mut BytesMut {
        self.data.clear();
        self.data.put_u8(command as u8);
        &mut self.data
    }

    /// The packet built so far.
    pub(crate) fn packet(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.busy
    }

    pub(crate) fn mark_busy(&mut self) {
        self.busy = true;
    }

    /// The response was read completely.
    pub(crate) fn release(&mut self) {
        self.busy = false;
        if self.data.capacity() > RETAIN_LIMIT {
            self.data = BytesMut::with_capacity(INITIAL_CAPACITY);
        }
    }
}
