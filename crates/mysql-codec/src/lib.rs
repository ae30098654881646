//! # mysql-codec
//!
//! Async framing layer for MySQL packets.
//!
//! This crate turns a raw byte stream into logical protocol packets. It
//! tracks the per-command sequence id, reassembles payloads split across
//! `0xFFFFFF`-byte frames, and optionally wraps everything in the compressed
//! protocol with its own independent sequence counter.
//!
//! ## Architecture
//!
//! ```text
//! Transport → PacketCodec (compressed frames → frames → packets) → Connection → Session
//! ```
//!
//! [`Connection`] owns the transport and applies the configured read and
//! write timeouts to every individual I/O call, so a server that stalls in
//! the middle of a large result set is still caught. An abort token lets the
//! owner of the session tear down an in-flight exchange from another task.
//!
//! ### Sequence synchronisation
//!
//! With compression active the compressed counter is copied into the packet
//! counter at the first read after a write. [`Connection`] does this
//! automatically, so a flush always precedes the next read.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod compress;
pub mod connection;
pub mod error;
pub mod message;
pub mod packet_codec;
pub mod transport;

pub use compress::{Compressor, MIN_COMPRESS_LENGTH, StoredOnly};
pub use connection::Connection;
pub use error::CodecError;
pub use message::MessageAssembler;
pub use packet_codec::PacketCodec;
pub use transport::Transport;
