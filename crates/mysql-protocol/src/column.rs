//! Column definition packets (protocol 4.1).

use bitflags::bitflags;
use bytes::{Buf, BufMut};

use crate::codec::{read_lenenc_string, read_lenenc_u64, write_lenenc_bytes};
use crate::error::{ProtocolError, Result};

/// Most columns a MySQL table or result set can have.
pub const MAX_COLUMNS: usize = 4096;

/// Column type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum FieldType {
    Decimal = 0x00,
    Tiny = 0x01,
    Short = 0x02,
    Long = 0x03,
    Float = 0x04,
    Double = 0x05,
    Null = 0x06,
    Timestamp = 0x07,
    LongLong = 0x08,
    Int24 = 0x09,
    Date = 0x0a,
    Time = 0x0b,
    DateTime = 0x0c,
    Year = 0x0d,
    NewDate = 0x0e,
    VarChar = 0x0f,
    Bit = 0x10,
    Timestamp2 = 0x11,
    DateTime2 = 0x12,
    Time2 = 0x13,
    Vector = 0xf2,
    Json = 0xf5,
    NewDecimal = 0xf6,
    Enum = 0xf7,
    Set = 0xf8,
    TinyBlob = 0xf9,
    MediumBlob = 0xfa,
    LongBlob = 0xfb,
    Blob = 0xfc,
    VarString = 0xfd,
    String = 0xfe,
    Geometry = 0xff,
}

impl FieldType {
    /// Create a field type from its wire code.
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0x00 => Self::Decimal,
            0x01 => Self::Tiny,
            0x02 => Self::Short,
            0x03 => Self::Long,
            0x04 => Self::Float,
            0x05 => Self::Double,
            0x06 => Self::Null,
            0x07 => Self::Timestamp,
            0x08 => Self::LongLong,
            0x09 => Self::Int24,
            0x0a => Self::Date,
            0x0b => Self::Time,
            0x0c => Self::DateTime,
            0x0d => Self::Year,
            0x0e => Self::NewDate,
            0x0f => Self::VarChar,
            0x10 => Self::Bit,
            0x11 => Self::Timestamp2,
            0x12 => Self::DateTime2,
            0x13 => Self::Time2,
            0xf2 => Self::Vector,
            0xf5 => Self::Json,
            0xf6 => Self::NewDecimal,
            0xf7 => Self::Enum,
            0xf8 => Self::Set,
            0xf9 => Self::TinyBlob,
            0xfa => Self::MediumBlob,
            0xfb => Self::LongBlob,
            0xfc => Self::Blob,
            0xfd => Self::VarString,
            0xfe => Self::String,
            0xff => Self::Geometry,
            other => return Err(ProtocolError::InvalidFieldType(other)),
        })
    }
}

bitflags! {
    /// Column definition flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ColumnFlags: u16 {
        /// Column can't be NULL.
        const NOT_NULL = 0x0001;
        /// Part of the primary key.
        const PRIMARY_KEY = 0x0002;
        /// Part of a unique key.
        const UNIQUE_KEY = 0x0004;
        /// Part of a non-unique key.
        const MULTIPLE_KEY = 0x0008;
        /// BLOB or TEXT column.
        const BLOB = 0x0010;
        /// Unsigned integer.
        const UNSIGNED = 0x0020;
        /// Zero-filled integer.
        const ZEROFILL = 0x0040;
        /// Binary collation.
        const BINARY = 0x0080;
        /// ENUM column.
        const ENUM = 0x0100;
        /// AUTO_INCREMENT column.
        const AUTO_INCREMENT = 0x0200;
        /// TIMESTAMP column.
        const TIMESTAMP = 0x0400;
        /// SET column.
        const SET = 0x0800;
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    /// Schema name.
    pub schema: String,
    /// Table alias.
    pub table: String,
    /// Physical table name.
    pub org_table: String,
    /// Column alias.
    pub name: String,
    /// Physical column name.
    pub org_name: String,
    /// Character set id.
    pub charset: u16,
    /// Maximum display length.
    pub column_length: u32,
    /// Column type.
    pub field_type: FieldType,
    /// Column flags.
    pub flags: ColumnFlags,
    /// Decimal digits.
    pub decimals: u8,
}

impl ColumnDefinition {
    /// Decode a column definition payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut src = payload;
        let _catalog = read_lenenc_string(&mut src)?;
        let schema = read_lenenc_string(&mut src)?;
        let table = read_lenenc_string(&mut src)?;
        let org_table = read_lenenc_string(&mut src)?;
        let name = read_lenenc_string(&mut src)?;
        let org_name = read_lenenc_string(&mut src)?;

        // Length of the fixed-size block, always 0x0c.
        let _fixed = read_lenenc_u64(&mut src)?;
        if src.remaining() < 10 {
            return Err(ProtocolError::UnexpectedEof("column definition"));
        }
        let charset = src.get_u16_le();
        let column_length = src.get_u32_le();
        let field_type = FieldType::from_u8(src.get_u8())?;
        let flags = ColumnFlags::from_bits_retain(src.get_u16_le());
        let decimals = src.get_u8();

        Ok(Self {
            schema,
            table,
            org_table,
            name,
            org_name,
            charset,
            column_length,
            field_type,
            flags,
            decimals,
        })
    }

    /// Encode this definition as a server would send it.
    pub fn encode(&self, dst: &mut impl BufMut) {
        write_lenenc_bytes(dst, b"def");
        write_lenenc_bytes(dst, self.schema.as_bytes());
        write_lenenc_bytes(dst, self.table.as_bytes());
        write_lenenc_bytes(dst, self.org_table.as_bytes());
        write_lenenc_bytes(dst, self.name.as_bytes());
        write_lenenc_bytes(dst, self.org_name.as_bytes());
        dst.put_u8(0x0c);
        dst.put_u16_le(self.charset);
        dst.put_u32_le(self.column_length);
        dst.put_u8(self.field_type as u8);
        dst.put_u16_le(self.flags.bits());
        dst.put_u8(self.decimals);
        dst.put_u16_le(0);
    }

    /// Minimal definition with a name and type.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            schema: String::new(),
            table: String::new(),
            org_table: String::new(),
            org_name: name.clone(),
            name,
            charset: 45,
            column_length: 0,
            field_type,
            flags: ColumnFlags::empty(),
            decimals: 0,
        }
    }

    /// Whether the column holds unsigned integers.
    #[must_use]
    pub fn is_unsigned(&self) -> bool {
        self.flags.contains(ColumnFlags::UNSIGNED)
    }
}
