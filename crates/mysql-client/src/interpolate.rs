//! Client-side parameter interpolation.
//!
//! Folds `?` placeholders and their arguments into one literal statement,
//! saving the prepare and close round trips of a server-side statement.
//! Anything this module cannot render exactly is declined with
//! [`Error::Skip`] so the caller can fall back to a prepared statement.

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use chrono::{FixedOffset, Offset, Utc};
use mysql_types::{Value, append_date, append_date_time, escape_backslash, escape_quotes};

use crate::error::{Error, Result, SkipReason};

/// Room reserved for the packet header when checking the size limit.
const PACKET_OVERHEAD: usize = 4;

/// Session state that decides how literals are rendered.
#[derive(Debug, Clone, Copy)]
pub struct InterpolateOptions {
    /// Escape by doubling quotes only (`NO_BACKSLASH_ESCAPES` mode).
    pub no_backslash_escapes: bool,
    /// Zone instants are rendered in.
    pub time_zone: FixedOffset,
    /// Truncation applied to temporal values.
    pub time_truncate: Option<Duration>,
    /// Upper bound for the rendered statement.
    pub max_allowed_packet: usize,
}

impl InterpolateOptions {
    /// Options for backslash-escape mode in UTC.
    #[must_use]
    pub fn new(max_allowed_packet: usize) -> Self {
        Self {
            no_backslash_escapes: false,
            time_zone: Utc.fix(),
            time_truncate: None,
            max_allowed_packet,
        }
    }

    /// Select the escaping mode.
    #[must_use]
    pub fn no_backslash_escapes(mut self, enabled: bool) -> Self {
        self.no_backslash_escapes = enabled;
        self
    }

    /// Render instants in `zone`.
    #[must_use]
    pub fn time_zone(mut self, zone: FixedOffset) -> Self {
        self.time_zone = zone;
        self
    }

    /// Truncate temporal values to a multiple of `step`.
    #[must_use]
    pub fn time_truncate(mut self, step: Option<Duration>) -> Self {
        self.time_truncate = step;
        self
    }

    fn escape(&self, dst: &mut BytesMut, value: &[u8]) {
        if self.no_backslash_escapes {
            escape_quotes(dst, value);
        } else {
            escape_backslash(dst, value);
        }
    }
}

/// Append `sql` to `dst` with every `?` replaced by the next argument.
///
/// On error `dst` may hold a partial statement and must be discarded.
pub fn interpolate_params(
    dst: &mut BytesMut,
    sql: &str,
    args: &[Value],
    options: &InterpolateOptions,
) -> Result<()> {
    let placeholders = sql.bytes().filter(|&b| b == b'?').count();
    if placeholders != args.len() {
        return Err(Error::Skip(SkipReason::ArgumentCountMismatch {
            placeholders,
            arguments: args.len(),
        }));
    }

    let start = dst.len();
    let mut pieces = sql.split('?');
    if let Some(head) = pieces.next() {
        dst.put_slice(head.as_bytes());
    }
    for (arg, text) in args.iter().zip(pieces) {
        append_literal(dst, arg, options)?;
        if dst.len() - start + PACKET_OVERHEAD > options.max_allowed_packet {
            return Err(Error::Skip(SkipReason::PacketTooLarge));
        }
        dst.put_slice(text.as_bytes());
    }
    Ok(())
}

fn append_literal(dst: &mut BytesMut, arg: &Value, options: &InterpolateOptions) -> Result<()> {
    match arg {
        Value::Null => dst.put_slice(b"NULL"),
        Value::Int(v) => dst.put_slice(v.to_string().as_bytes()),
        Value::UInt(v) => dst.put_slice(v.to_string().as_bytes()),
        Value::Float(v) => dst.put_slice(format_float(*v).as_bytes()),
        Value::Bool(v) => dst.put_u8(if *v { b'1' } else { b'0' }),
        Value::DateTime(v) => {
            let local = v.with_timezone(&options.time_zone).naive_local();
            dst.put_u8(b'\'');
            append_date_time(dst, local, options.time_truncate)?;
            dst.put_u8(b'\'');
        }
        Value::NaiveDateTime(v) => {
            dst.put_u8(b'\'');
            append_date_time(dst, *v, options.time_truncate)?;
            dst.put_u8(b'\'');
        }
        Value::Date(v) => {
            dst.put_u8(b'\'');
            append_date(dst, *v)?;
            dst.put_u8(b'\'');
        }
        Value::ZeroDateTime => dst.put_slice(b"'0000-00-00'"),
        Value::Bytes(v) => {
            dst.put_slice(b"_binary'");
            options.escape(dst, v);
            dst.put_u8(b'\'');
        }
        Value::RawText(v) | Value::Text(v) => {
            dst.put_u8(b'\'');
            options.escape(dst, v.as_bytes());
            dst.put_u8(b'\'');
        }
        Value::Unsupported(name) => {
            return Err(Error::Skip(SkipReason::UnsupportedArgument(*name)));
        }
        other => {
            return Err(Error::Skip(SkipReason::UnsupportedArgument(other.type_name())));
        }
    }
    Ok(())
}

/// Shortest round-trip rendering in `%g` style: exponent form when the
/// decimal exponent is below -4 or at least 6.
fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_owned();
    }
    if v.is_infinite() {
        return if v > 0.0 { "+Inf" } else { "-Inf" }.to_owned();
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0" } else { "0" }.to_owned();
    }

    // `{:e}` yields the shortest digits that round-trip, e.g. `-1.25e-7`.
    let sci = format!("{v:e}");
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((&sci, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();

    let mut out = String::with_capacity(digits.len() + 8);
    out.push_str(sign);
    if exponent < -4 || exponent >= 6 {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push('e');
        out.push(if exponent < 0 { '-' } else { '+' });
        let magnitude = exponent.unsigned_abs();
        if magnitude < 10 {
            out.push('0');
        }
        out.push_str(&magnitude.to_string());
    } else if exponent < 0 {
        out.push_str("0.");
        for _ in 0..(-exponent - 1) {
            out.push('0');
        }
        out.push_str(&digits);
    } else {
        let int_len = exponent as usize + 1;
        if digits.len() <= int_len {
            out.push_str(&digits);
            for _ in digits.len()..int_len {
                out.push('0');
            }
        } else {
            out.push_str(&digits[..int_len]);
            out.push('.');
            out.push_str(&digits[int_len..]);
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::{NaiveDate, TimeZone};
    use proptest::prelude::*;

    fn render(sql: &str, args: &[Value], options: &InterpolateOptions) -> Result<String> {
        let mut dst = BytesMut::new();
        interpolate_params(&mut dst, sql, args, options)?;
        Ok(String::from_utf8(dst.to_vec()).unwrap())
    }

    fn defaults() -> InterpolateOptions {
        InterpolateOptions::new(1 << 20)
    }

    #[test]
    fn test_scalars() {
        let sql = render(
            "SELECT ?, ?, ?, ?, ?",
            &[
                Value::Int(-42),
                Value::UInt(u64::MAX),
                Value::Bool(true),
                Value::Bool(false),
                Value::Null,
            ],
            &defaults(),
        )
        .unwrap();
        assert_eq!(sql, "SELECT -42, 18446744073709551615, 1, 0, NULL");
    }

    #[test]
    fn test_strings_in_both_modes() {
        let args = [Value::Text("O'Brien\\".into())];
        assert_eq!(
            render("?", &args, &defaults()).unwrap(),
            r"'O\'Brien\\'"
        );
        assert_eq!(
            render("?", &args, &defaults().no_backslash_escapes(true)).unwrap(),
            r"'O''Brien\'"
        );
    }

    #[test]
    fn test_raw_text_and_bytes() {
        let args = [
            Value::RawText(r#"{"a":"b"}"#.into()),
            Value::Bytes(Bytes::from_static(b"\x00'")),
        ];
        assert_eq!(
            render("? ?", &args, &defaults()).unwrap(),
            r#"'{\"a\":\"b\"}' _binary'\0\''"#
        );
    }

    #[test]
    fn test_temporal_values() {
        let zone = FixedOffset::east_opt(9 * 3600).unwrap();
        let instant = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let naive = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_micro_opt(0, 0, 0, 123_456)
            .unwrap();
        let options = defaults()
            .time_zone(zone)
            .time_truncate(Some(Duration::from_millis(1)));
        let sql = render(
            "? ? ? ?",
            &[
                Value::DateTime(instant),
                Value::NaiveDateTime(naive),
                Value::Date(naive.date()),
                Value::ZeroDateTime,
            ],
            &options,
        )
        .unwrap();
        assert_eq!(
            sql,
            "'2024-01-01 09:00:00' '2024-01-01 00:00:00.123' '2024-01-01' '0000-00-00'"
        );
    }

    #[test]
    fn test_count_mismatch_skips() {
        let err = render("SELECT ?, ?", &[Value::Int(1)], &defaults()).unwrap_err();
        assert!(matches!(
            err,
            Error::Skip(SkipReason::ArgumentCountMismatch {
                placeholders: 2,
                arguments: 1
            })
        ));
        assert!(render("SELECT 1", &[Value::Int(1)], &defaults()).unwrap_err().is_skip());
    }

    #[test]
    fn test_unsupported_argument_skips() {
        let err = render("?", &[Value::Unsupported("Uuid")], &defaults()).unwrap_err();
        assert!(matches!(err, Error::Skip(SkipReason::UnsupportedArgument("Uuid"))));
    }

    #[test]
    fn test_size_limit_skips() {
        let options = InterpolateOptions::new(16);
        assert!(render("SELECT ?", &[Value::Int(1)], &options).is_ok());
        let err = render("SELECT ?", &[Value::Text("x".repeat(16))], &options).unwrap_err();
        assert!(matches!(err, Error::Skip(SkipReason::PacketTooLarge)));
    }

    #[test]
    fn test_year_out_of_range_is_an_error() {
        let naive = NaiveDate::from_ymd_opt(10_000, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let err = render("?", &[Value::NaiveDateTime(naive)], &defaults()).unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(format_float(1.5), "1.5");
        assert_eq!(format_float(100.0), "100");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(0.00001), "1e-05");
        assert_eq!(format_float(-2.5e-7), "-2.5e-07");
        assert_eq!(format_float(1e21), "1e+21");
        assert_eq!(format_float(100_000.0), "100000");
        assert_eq!(format_float(1e6), "1e+06");
        assert_eq!(format_float(123_456_789.0), "1.23456789e+08");
        assert_eq!(format_float(1e100), "1e+100");
        assert_eq!(format_float(-0.0), "-0");
    }

    proptest! {
        #[test]
        fn prop_integers_render_verbatim(values in prop::collection::vec(any::<i64>(), 0..8)) {
            let sql = vec!["?"; values.len()].join(",");
            let args: Vec<Value> = values.iter().copied().map(Value::Int).collect();
            let rendered = render(&sql, &args, &defaults()).unwrap();
            let expected: Vec<String> = values.iter().map(i64::to_string).collect();
            prop_assert_eq!(rendered, expected.join(","));
        }

        #[test]
        fn prop_floats_round_trip(v in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
            let text = format_float(v);
            prop_assert_eq!(text.parse::<f64>().unwrap(), v);
        }

        #[test]
        fn prop_placeholders_consumed(s in "[a-z ]{0,20}", n in 0usize..5) {
            let sql = format!("{s}{}", " ?".repeat(n));
            let args = vec![Value::Null; n];
            let rendered = render(&sql, &args, &defaults()).unwrap();
            prop_assert!(!rendered.contains('?'));
            prop_assert_eq!(rendered.matches("NULL").count(), n);
        }
    }
}
