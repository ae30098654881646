//! Temporal literal formatting.

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use chrono::{Datelike, DurationRound, NaiveDate, NaiveDateTime, TimeDelta, Timelike};

use crate::error::{Result, TypeError};

fn put_padded(buf: &mut BytesMut, value: u32, width: usize) {
    let mut digits = [b'0'; 10];
    let mut v = value;
    for slot in digits[..width].iter_mut().rev() {
        *slot = b'0' + (v % 10) as u8;
        v /= 10;
    }
    buf.put_slice(&digits[..width]);
}

fn checked_year(year: i32) -> Result<u32> {
    if !(1..=9999).contains(&year) {
        return Err(TypeError::InvalidDateTime(format!(
            "year is not in the range [1, 9999]: {year}"
        )));
    }
    Ok(year as u32)
}

fn put_date(buf: &mut BytesMut, year: u32, month: u32, day: u32) {
    put_padded(buf, year, 4);
    buf.put_u8(b'-');
    put_padded(buf, month, 2);
    buf.put_u8(b'-');
    put_padded(buf, day, 2);
}

/// Append `YYYY-MM-DD HH:MM:SS[.fffffffff]` with trailing fraction zeros
/// trimmed, after truncating to a multiple of `truncate` when given.
pub fn append_date_time(
    buf: &mut BytesMut,
    value: NaiveDateTime,
    truncate: Option<Duration>,
) -> Result<()> {
    let value = match truncate {
        Some(step) if !step.is_zero() => {
            let step = TimeDelta::from_std(step)
                .map_err(|e| TypeError::InvalidDateTime(e.to_string()))?;
            value
                .duration_trunc(step)
                .map_err(|e| TypeError::InvalidDateTime(e.to_string()))?
        }
        _ => value,
    };

    let year = checked_year(value.year())?;
    put_date(buf, year, value.month(), value.day());
    buf.put_u8(b' ');
    put_padded(buf, value.hour(), 2);
    buf.put_u8(b':');
    put_padded(buf, value.minute(), 2);
    buf.put_u8(b':');
    put_padded(buf, value.second(), 2);

    // Leap seconds report nanoseconds past 1e9.
    let nanos = value.nanosecond() % 1_000_000_000;
    if nanos != 0 {
        let mut fraction = BytesMut::with_capacity(9);
        put_padded(&mut fraction, nanos, 9);
        let len = fraction.iter().rposition(|&d| d != b'0').map_or(0, |p| p + 1);
        buf.put_u8(b'.');
        buf.put_slice(&fraction[..len]);
    }
    Ok(())
}

/// Append `YYYY-MM-DD`.
pub fn append_date(buf: &mut BytesMut, value: NaiveDate) -> Result<()> {
    let year = checked_year(value.year())?;
    put_date(buf, year, value.month(), value.day());
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn render(value: NaiveDateTime, truncate: Option<Duration>) -> String {
        let mut buf = BytesMut::new();
        append_date_time(&mut buf, value, truncate).unwrap();
        String::from_utf8(buf.to_vec()).unwrap()
    }

    fn at(nanos: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_nano_opt(7, 8, 9, nanos)
            .unwrap()
    }

    #[test]
    fn test_whole_seconds() {
        assert_eq!(render(at(0), None), "2024-02-29 07:08:09");
    }

    #[test]
    fn test_fraction_is_trimmed() {
        assert_eq!(render(at(500_000_000), None), "2024-02-29 07:08:09.5");
        assert_eq!(render(at(123_456_000), None), "2024-02-29 07:08:09.123456");
        assert_eq!(render(at(1), None), "2024-02-29 07:08:09.000000001");
    }

    #[test]
    fn test_truncation() {
        assert_eq!(
            render(at(123_456_789), Some(Duration::from_millis(1))),
            "2024-02-29 07:08:09.123"
        );
        assert_eq!(
            render(at(999_999_999), Some(Duration::from_secs(1))),
            "2024-02-29 07:08:09"
        );
        assert_eq!(render(at(7), Some(Duration::ZERO)), "2024-02-29 07:08:09.000000007");
    }

    #[test]
    fn test_year_out_of_range() {
        let year_zero = NaiveDate::from_ymd_opt(0, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut buf = BytesMut::new();
        assert!(matches!(
            append_date_time(&mut buf, year_zero, None),
            Err(TypeError::InvalidDateTime(_))
        ));
    }

    #[test]
    fn test_date_only() {
        let mut buf = BytesMut::new();
        append_date(&mut buf, NaiveDate::from_ymd_opt(987, 6, 5).unwrap()).unwrap();
        assert_eq!(&buf[..], b"0987-06-05");
    }
}
