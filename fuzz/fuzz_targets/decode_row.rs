#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use mysql_protocol::{ColumnDefinition, FieldType, decode_binary_row, decode_text_row};

#[derive(Debug, Arbitrary)]
struct RowInput {
    column_types: Vec<u8>,
    payload: Vec<u8>,
}

fuzz_target!(|input: RowInput| {
    let columns: Vec<ColumnDefinition> = input
        .column_types
        .iter()
        .take(64)
        .filter_map(|&t| FieldType::from_u8(t).ok())
        .map(|t| ColumnDefinition::new("c", t))
        .collect();
    let payload = Bytes::from(input.payload);

    if let Ok(cells) = decode_text_row(&payload, columns.len()) {
        assert_eq!(cells.len(), columns.len());
    }
    if let Ok(cells) = decode_binary_row(&payload, &columns) {
        assert_eq!(cells.len(), columns.len());
    }
});
