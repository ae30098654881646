#![no_main]

use chrono::{NaiveDate, NaiveDateTime};
use libfuzzer_sys::fuzz_target;
use mysql_types::FromColumn;

fuzz_target!(|data: &[u8]| {
    let cell = Some(data);
    let _ = i64::from_column(cell);
    let _ = u64::from_column(cell);
    let _ = i8::from_column(cell);
    let _ = Vec::<u8>::from_column(cell);
    let _ = f64::from_column(cell);
    let _ = bool::from_column(cell);
    let _ = String::from_column(cell);
    let _ = NaiveDate::from_column(cell);
    let _ = NaiveDateTime::from_column(cell);
});
