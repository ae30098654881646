//! Byte transports a session can run over.

use std::io;

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::TcpStream;

/// A bidirectional byte stream carrying the protocol.
///
/// `probe_liveness` must not block. Implementations wrapping TLS should
/// probe the underlying socket rather than the encrypted stream.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// Detect a peer that closed or sent unsolicited data while idle.
    ///
    /// The default implementation reports the transport as alive.
    fn probe_liveness(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Interpret a non-blocking one byte read on an idle socket.
fn classify_probe(result: io::Result<usize>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
        Err(e) => Err(e),
        Ok(0) => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by peer",
        )),
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unexpected read from idle connection",
        )),
    }
}

impl Transport for TcpStream {
    fn probe_liveness(&self) -> io::Result<()> {
        let mut byte = [0u8; 1];
        classify_probe(self.try_read(&mut byte))
    }
}

#[cfg(unix)]
impl Transport for tokio::net::UnixStream {
    fn probe_liveness(&self) -> io::Result<()> {
        let mut byte = [0u8; 1];
        classify_probe(self.try_read(&mut byte))
    }
}

impl Transport for DuplexStream {}
