//! # mysql-client
//!
//! Async MySQL session layer over an already-authenticated connection.
//!
//! The handshake, TLS and DSN parsing happen elsewhere. This crate takes the
//! transport they produce and runs commands over it: text queries, prepared
//! statements, transactions, pings and the bookkeeping a connection pool
//! needs to decide whether a connection can be reused.
//!
//! ## Features
//!
//! - **Cooperative cancellation**: every operation accepts a
//!   [`CancelContext`]; if it fires mid-operation the session is torn down
//!   instead of leaving a half-read response on the wire
//! - **Client-side interpolation**: arguments can be inlined into the
//!   statement text, with a [`Error::Skip`] fallback signal when that is
//!   not possible
//! - **Multi-result responses**: [`Rows`] walks every result set of a
//!   response, and [`ExecResult`] records every OK packet
//! - **Pool integration**: [`ConnectionLifecycle`] answers is-valid,
//!   reset-for-reuse and health-check questions
//!
//! ## Error tiers
//!
//! ```text
//! BadConnection     nothing reached the server; retry on a fresh connection
//! Skip              this path can't take the request; use a fallback
//! everything else   surfaced as is; is_terminal() says if the session died
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use mysql_client::{CancelContext, Config, Negotiated, Session, TxOptions};
//!
//! let mut session = Session::establish(stream, negotiated, Config::new()).await?;
//! let ctx = CancelContext::none().with_timeout(Duration::from_secs(5));
//!
//! let mut rows = session.query(&ctx, "SELECT id, name FROM users", &[]).await?;
//! while let Some(row) = rows.next_row().await? {
//!     let id: i64 = row.get(0)?;
//!     let name: String = row.get_by_name("name")?;
//! }
//! drop(rows);
//!
//! let mut tx = session.begin_transaction(&ctx, TxOptions::new()).await?;
//! tx.exec(&ctx, "UPDATE users SET active = 1", &[]).await?;
//! tx.commit().await?;
//!
//! session.close().await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod buffer;
pub mod cancel;
pub mod config;
pub mod error;
pub mod interpolate;
pub mod lifecycle;
pub mod rows;
pub mod session;
mod state;
pub mod statement;
pub mod transaction;

pub use cancel::{CancelContext, CloseHandle};
pub use config::{Config, Negotiated};
pub use error::{CancelReason, Error, Result, SkipReason};
pub use interpolate::{InterpolateOptions, interpolate_params};
pub use lifecycle::{ConnectionLifecycle, DynConnectionLifecycle, HealthCheckResult, check_health};
pub use rows::{ExecResult, Row, Rows};
pub use session::Session;
pub use statement::Statement;
pub use transaction::{IsolationLevel, SavePoint, Transaction, TxOptions};

// Re-export the pieces callers need to build a session and bind values.
pub use mysql_codec::{Compressor, StoredOnly, Transport};
pub use mysql_protocol::{CapabilityFlags, ColumnDefinition, ExtendedCapabilityFlags, StatusFlags};
pub use mysql_types::{FromColumn, ToValue, Value};
pub use tokio_util::sync::CancellationToken;
