//! # mysql-types
//!
//! Parameter values for MySQL statements and the literal rules used to
//! inline them into statement text.
//!
//! ## Features
//!
//! - `json`: Convert `serde_json::Value` into a pre-validated raw text value
//!
//! ## Value Kinds
//!
//! | Rust Type | [`Value`] variant | Literal |
//! |-----------|-------------------|---------|
//! | `None` | `Null` | `NULL` |
//! | `i8`..`i64` | `Int` | `-42` |
//! | `u8`..`u64` | `UInt` | `42` |
//! | `f32`/`f64` | `Float` | `1.5`, `1e+100` |
//! | `bool` | `Bool` | `1` / `0` |
//! | `chrono::DateTime<Tz>` | `DateTime` | `'2024-01-02 03:04:05.5'` |
//! | `chrono::NaiveDateTime` | `NaiveDateTime` | `'2024-01-02 03:04:05'` |
//! | `chrono::NaiveDate` | `Date` | `'2024-01-02'` |
//! | `Vec<u8>`/`&[u8]`/`Bytes` | `Bytes` | `_binary'...'` |
//! | `String`/`&str` | `Text` | `'...'` |
//! | `serde_json::Value` | `RawText` | `'...'` |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod datetime;
pub mod error;
pub mod escape;
pub mod from_column;
pub mod to_value;
pub mod value;

pub use datetime::{append_date, append_date_time};
pub use error::TypeError;
pub use escape::{escape_backslash, escape_quotes};
pub use from_column::FromColumn;
pub use to_value::ToValue;
pub use value::Value;
