//! Timed, abortable packet I/O over a transport.

use std::future::Future;
use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;

use crate::error::CodecError;
use crate::packet_codec::PacketCodec;
use crate::transport::Transport;

const READ_BUFFER_CAPACITY: usize = 16 * 1024;

/// A framed MySQL connection.
///
/// Every individual read or write on the transport gets its own deadline
/// (when configured), and all of them race against the abort token so a
/// session torn down from another task stops waiting immediately.
pub struct Connection<T> {
    transport: T,
    codec: PacketCodec,
    read_buf: BytesMut,
    write_buf: BytesMut,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    abort: CancellationToken,
    /// Bytes handed to the transport since the last sequence reset.
    written: usize,
    /// The last operation was a write; sync sequences before reading.
    pending_sync: bool,
}

impl<T: Transport> Connection<T> {
    /// Create a new connection from a transport and codec.
    pub fn new(transport: T, codec: PacketCodec) -> Self {
        Self {
            transport,
            codec,
            read_buf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            write_buf: BytesMut::new(),
            read_timeout: None,
            write_timeout: None,
            abort: CancellationToken::new(),
            written: 0,
            pending_sync: false,
        }
    }

    /// Set per-I/O read and write deadlines.
    #[must_use]
    pub fn with_timeouts(mut self, read: Option<Duration>, write: Option<Duration>) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    /// Abort pending and future I/O once `token` is cancelled.
    #[must_use]
    pub fn with_abort(mut self, token: CancellationToken) -> Self {
        self.abort = token;
        self
    }

    /// The packet codec.
    #[must_use]
    pub fn codec(&self) -> &PacketCodec {
        &self.codec
    }

    /// Mutable access to the packet codec.
    pub fn codec_mut(&mut self) -> &mut PacketCodec {
        &mut self.codec
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether the compressed protocol is active.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.codec.is_compressed()
    }

    /// Reset sequence counters at the start of a command.
    pub fn reset_sequence(&mut self) {
        self.codec.reset_sequence();
        self.written = 0;
        self.pending_sync = false;
    }

    /// Fold the compression counter into the packet counter.
    pub fn sync_sequence(&mut self) {
        self.codec.sync_sequence();
        self.pending_sync = false;
    }

    /// Bytes that reached the transport since the last [`reset_sequence`].
    ///
    /// [`reset_sequence`]: Self::reset_sequence
    #[must_use]
    pub fn bytes_written(&self) -> usize {
        self.written
    }

    /// Whether unread input is buffered.
    #[must_use]
    pub fn has_buffered_input(&self) -> bool {
        !self.read_buf.is_empty() || self.codec.has_pending()
    }

    /// Check an idle connection for a closed or chatty peer.
    pub fn probe_liveness(&self) -> io::Result<()> {
        if self.has_buffered_input() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unread data on idle connection",
            ));
        }
        self.transport.probe_liveness()
    }

    /// Write one logical packet and flush it.
    pub async fn write_packet(&mut self, payload: &[u8]) -> Result<(), CodecError> {
        self.write_buf.clear();
        self.codec.encode_payload(payload, &mut self.write_buf)?;
        self.pending_sync = true;

        let mut offset = 0;
        while offset < self.write_buf.len() {
            let n = guarded(
                self.transport.write(&self.write_buf[offset..]),
                self.write_timeout,
                &self.abort,
                "write",
            )
            .await?;
            if n == 0 {
                return Err(CodecError::Io(io::ErrorKind::WriteZero.into()));
            }
            offset += n;
            self.written += n;
        }

        guarded(
            self.transport.flush(),
            self.write_timeout,
            &self.abort,
            "write",
        )
        .await?;
        Ok(())
    }

    /// Read one logical packet.
    pub async fn read_packet(&mut self) -> Result<Bytes, CodecError> {
        if self.pending_sync {
            self.sync_sequence();
        }

        loop {
            if let Some(packet) = self.codec.decode(&mut self.read_buf)? {
                return Ok(packet);
            }

            self.read_buf.reserve(READ_BUFFER_CAPACITY / 4);
            let n = guarded(
                self.transport.read_buf(&mut self.read_buf),
                self.read_timeout,
                &self.abort,
                "read",
            )
            .await?;
            if n == 0 {
                return Err(CodecError::ConnectionClosed);
            }
        }
    }

    /// Shut down the write side of the transport.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.transport.shutdown().await
    }

    /// Consume the connection, returning the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }
}

async fn guarded<F, R>(
    io: F,
    limit: Option<Duration>,
    abort: &CancellationToken,
    operation: &'static str,
) -> Result<R, CodecError>
where
    F: Future<Output = io::Result<R>>,
{
    let timed = async move {
        match limit {
            Some(timeout) => match tokio::time::timeout(timeout, io).await {
                Ok(result) => result.map_err(CodecError::Io),
                Err(_) => Err(CodecError::Timeout { operation, timeout }),
            },
            None => io.await.map_err(CodecError::Io),
        }
    };

    tokio::select! {
        biased;
        () = abort.cancelled() => Err(CodecError::Aborted),
        result = timed => result,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::compress::StoredOnly;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_test::io::Builder;

    impl Transport for tokio_test::io::Mock {}

    #[tokio::test]
    async fn test_write_then_read() {
        let mock = Builder::new()
            .write(&[0x01, 0x00, 0x00, 0x00, 0x0e])
            .read(&[0x07, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00])
            .build();
        let mut conn = Connection::new(mock, PacketCodec::new());

        conn.reset_sequence();
        conn.write_packet(&[0x0e]).await.unwrap();
        assert_eq!(conn.bytes_written(), 5);

        let reply = conn.read_packet().await.unwrap();
        assert_eq!(reply[0], 0x00);
        assert_eq!(conn.codec().sequence(), 2);
        assert!(!conn.has_buffered_input());
    }

    #[tokio::test]
    async fn test_out_of_order_reply() {
        let mock = Builder::new()
            .write(&[0x01, 0x00, 0x00, 0x00, 0x0e])
            .read(&[0x01, 0x00, 0x00, 0x05, 0x00])
            .build();
        let mut conn = Connection::new(mock, PacketCodec::new());
        conn.write_packet(&[0x0e]).await.unwrap();
        let err = conn.read_packet().await.unwrap_err();
        assert!(matches!(
            err,
            CodecError::SequenceMismatch {
                expected: 1,
                actual: 5
            }
        ));
    }

    #[tokio::test]
    async fn test_peer_close_is_reported() {
        let mock = Builder::new().read(&[0x05, 0x00]).build();
        let mut conn = Connection::new(mock, PacketCodec::new());
        assert!(matches!(
            conn.read_packet().await,
            Err(CodecError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_read_timeout_applies_per_read() {
        let (client, _server) = tokio::io::duplex(64);
        let mut conn = Connection::new(client, PacketCodec::new())
            .with_timeouts(Some(Duration::from_millis(20)), None);
        let err = conn.read_packet().await.unwrap_err();
        assert!(matches!(err, CodecError::Timeout { operation: "read", .. }));
    }

    #[tokio::test]
    async fn test_abort_interrupts_pending_read() {
        let (client, _server) = tokio::io::duplex(64);
        let token = CancellationToken::new();
        let mut conn = Connection::new(client, PacketCodec::new()).with_abort(token.clone());

        let reader = tokio::spawn(async move { conn.read_packet().await });
        tokio::task::yield_now().await;
        token.cancel();
        assert!(matches!(reader.await.unwrap(), Err(CodecError::Aborted)));
    }

    #[tokio::test]
    async fn test_compressed_exchange_over_duplex() {
        let (client, mut server) = tokio::io::duplex(256);
        let mut conn = Connection::new(client, PacketCodec::new().with_compression(StoredOnly));

        conn.reset_sequence();
        conn.write_packet(&[0x0e]).await.unwrap();

        let mut request = [0u8; 12];
        server.read_exact(&mut request).await.unwrap();
        assert_eq!(&request, &[5, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0x0e]);

        server
            .write_all(&[5, 0, 0, 1, 0, 0, 0, 1, 0, 0, 1, 0x00])
            .await
            .unwrap();
        let reply = conn.read_packet().await.unwrap();
        assert_eq!(&reply[..], &[0x00]);
        assert_eq!(conn.codec().compress_sequence(), Some(2));
    }

    #[tokio::test]
    async fn test_probe_reports_buffered_input() {
        let mock = Builder::new()
            .read(&[0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00])
            .build();
        let mut conn = Connection::new(mock, PacketCodec::new());
        conn.read_packet().await.unwrap();
        assert!(conn.has_buffered_input());
        assert!(conn.probe_liveness().is_err());
    }
}
