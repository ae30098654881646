//! Trait for reading result cells into Rust types.
//!
//! Cells arrive as the textual form the server renders (binary protocol
//! rows are rendered to the same form), so conversions parse text.

use std::str::FromStr;

use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Result, TypeError};

/// Trait for types that can be read from a result cell.
pub trait FromColumn: Sized {
    /// Convert a cell; `None` is SQL NULL.
    fn from_column(cell: Option<&[u8]>) -> Result<Self>;
}

fn parse<T: FromStr>(cell: Option<&[u8]>, target_type: &'static str) -> Result<T> {
    let raw = cell.ok_or(TypeError::UnexpectedNull)?;
    let parse_error = || TypeError::Parse {
        target_type,
        value: String::from_utf8_lossy(raw).into_owned(),
    };
    std::str::from_utf8(raw)
        .map_err(|_| parse_error())?
        .parse()
        .map_err(|_| parse_error())
}

macro_rules! impl_parsed {
    ($($t:ty => $name:literal),+ $(,)?) => {
        $(
            impl FromColumn for $t {
                fn from_column(cell: Option<&[u8]>) -> Result<Self> {
                    parse(cell, $name)
                }
            }
        )+
    };
}

impl_parsed!(
    i64 => "i64",
    u64 => "u64",
    f64 => "f64",
    f32 => "f32",
);

macro_rules! impl_narrowed {
    ($wide:ty, $($t:ty => $name:literal),+ $(,)?) => {
        $(
            impl FromColumn for $t {
                fn from_column(cell: Option<&[u8]>) -> Result<Self> {
                    let wide: $wide = parse(cell, $name)?;
                    <$t>::try_from(wide).map_err(|_| TypeError::OutOfRange { target_type: $name })
                }
            }
        )+
    };
}

impl_narrowed!(i64, i8 => "i8", i16 => "i16", i32 => "i32");
impl_narrowed!(u64, u8 => "u8", u16 => "u16", u32 => "u32");

impl FromColumn for bool {
    fn from_column(cell: Option<&[u8]>) -> Result<Self> {
        let v: i64 = parse(cell, "bool")?;
        Ok(v != 0)
    }
}

impl FromColumn for String {
    fn from_column(cell: Option<&[u8]>) -> Result<Self> {
        let raw = cell.ok_or(TypeError::UnexpectedNull)?;
        String::from_utf8(raw.to_vec()).map_err(|e| TypeError::Parse {
            target_type: "String",
            value: String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }
}

impl FromColumn for Vec<u8> {
    fn from_column(cell: Option<&[u8]>) -> Result<Self> {
        cell.map(<[u8]>::to_vec).ok_or(TypeError::UnexpectedNull)
    }
}

impl FromColumn for Bytes {
    fn from_column(cell: Option<&[u8]>) -> Result<Self> {
        cell.map(Bytes::copy_from_slice).ok_or(TypeError::UnexpectedNull)
    }
}

impl FromColumn for NaiveDateTime {
    fn from_column(cell: Option<&[u8]>) -> Result<Self> {
        let text: String = FromColumn::from_column(cell)?;
        let invalid = |_| TypeError::InvalidDateTime(text.clone());
        if text.len() == 10 {
            return NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                .map_err(invalid)
                .map(|date| date.and_time(NaiveTime::MIN));
        }
        NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f").map_err(invalid)
    }
}

impl FromColumn for NaiveDate {
    fn from_column(cell: Option<&[u8]>) -> Result<Self> {
        let text: String = FromColumn::from_column(cell)?;
        let date = text.get(..10).unwrap_or(&text);
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| TypeError::InvalidDateTime(text.clone()))
    }
}

impl<T: FromColumn> FromColumn for Option<T> {
    fn from_column(cell: Option<&[u8]>) -> Result<Self> {
        match cell {
            None => Ok(None),
            Some(raw) => T::from_column(Some(raw)).map(Some),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_integers() {
        assert_eq!(i64::from_column(Some(b"-42")).unwrap(), -42);
        assert_eq!(u8::from_column(Some(b"255")).unwrap(), 255);
        assert_eq!(
            u8::from_column(Some(b"256")),
            Err(TypeError::OutOfRange { target_type: "u8" })
        );
        assert!(matches!(
            i32::from_column(Some(b"abc")),
            Err(TypeError::Parse { target_type: "i32", .. })
        ));
    }

    #[test]
    fn test_null_handling() {
        assert_eq!(i64::from_column(None), Err(TypeError::UnexpectedNull));
        assert_eq!(Option::<i64>::from_column(None).unwrap(), None);
        assert_eq!(Option::<String>::from_column(Some(b"x")).unwrap(), Some("x".into()));
    }

    #[test]
    fn test_temporal() {
        let dt = NaiveDateTime::from_column(Some(b"2024-02-29 07:08:09.5")).unwrap();
        assert_eq!(dt.to_string(), "2024-02-29 07:08:09.500");
        let midnight = NaiveDateTime::from_column(Some(b"2024-02-29")).unwrap();
        assert_eq!(midnight.to_string(), "2024-02-29 00:00:00");
        let date = NaiveDate::from_column(Some(b"2024-02-29 07:08:09")).unwrap();
        assert_eq!(date.to_string(), "2024-02-29");
        assert!(matches!(
            NaiveDate::from_column(Some(b"0000-00-00")),
            Err(TypeError::InvalidDateTime(_))
        ));
    }

    #[test]
    fn test_bool_and_bytes() {
        assert!(bool::from_column(Some(b"1")).unwrap());
        assert!(!bool::from_column(Some(b"0")).unwrap());
        assert_eq!(Vec::<u8>::from_column(Some(b"\x00\x01")).unwrap(), vec![0, 1]);
    }
}
