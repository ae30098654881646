#![no_main]

use arbitrary::Arbitrary;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use libfuzzer_sys::fuzz_target;
use mysql_client::{InterpolateOptions, Value, interpolate_params};

#[derive(Debug, Arbitrary)]
enum FuzzValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Timestamp(i64, u32),
    Bytes(Vec<u8>),
    Text(String),
}

#[derive(Debug, Arbitrary)]
struct Input {
    sql: String,
    args: Vec<FuzzValue>,
    no_backslash_escapes: bool,
}

fuzz_target!(|input: Input| {
    let args: Vec<Value> = input
        .args
        .into_iter()
        .map(|v| match v {
            FuzzValue::Null => Value::Null,
            FuzzValue::Int(v) => Value::Int(v),
            FuzzValue::UInt(v) => Value::UInt(v),
            FuzzValue::Float(v) => Value::Float(v),
            FuzzValue::Bool(v) => Value::Bool(v),
            FuzzValue::Timestamp(secs, nanos) => DateTime::<Utc>::from_timestamp(secs, nanos)
                .map(Value::DateTime)
                .unwrap_or(Value::Null),
            FuzzValue::Bytes(v) => Value::Bytes(Bytes::from(v)),
            FuzzValue::Text(v) => Value::Text(v),
        })
        .collect();

    let options = InterpolateOptions::new(1 << 20).no_backslash_escapes(input.no_backslash_escapes);
    let mut buf = BytesMut::new();
    if interpolate_params(&mut buf, &input.sql, &args, &options).is_ok() {
        // Success implies every placeholder was matched.
        let placeholders = input.sql.bytes().filter(|&b| b == b'?').count();
        assert_eq!(placeholders, args.len());
    }
});
