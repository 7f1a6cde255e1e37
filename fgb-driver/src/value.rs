//! Column types and the values a row holds.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::geometry::GeometryValue;

/// Declared type of a property column, tagged as in the FlatGeobuf schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Byte,
    UByte,
    Bool,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    String,
    Json,
    DateTime,
    Binary,
}

impl ColumnType {
    /// Maps a schema tag to a column type; unknown tags yield `None`.
    pub fn from_tag(tag: u8) -> Option<ColumnType> {
        use ColumnType::*;
        let value = match tag {
            0 => Byte,
            1 => UByte,
            2 => Bool,
            3 => Short,
            4 => UShort,
            5 => Int,
            6 => UInt,
            7 => Long,
            8 => ULong,
            9 => Float,
            10 => Double,
            11 => String,
            12 => Json,
            13 => DateTime,
            14 => Binary,
            _ => return None,
        };
        Some(value)
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Encoded width in the property block, `None` for length-prefixed types.
    pub fn fixed_width(self) -> Option<usize> {
        use ColumnType::*;
        match self {
            Byte | UByte | Bool => Some(1),
            Short | UShort => Some(2),
            Int | UInt | Float => Some(4),
            Long | ULong | Double => Some(8),
            String | Json | DateTime | Binary => None,
        }
    }
}

impl Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One field of a decoded row.
///
/// `Byte` and `UByte` columns are widened into `SmallInt`, the same
/// representation used for `Short`. `Geometry(None)` is the typed null of
/// the geometry slot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum RowValue {
    #[default]
    Null,
    Geometry(Option<GeometryValue>),
    Bool(bool),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    UnsignedBigInt(u64),
    Real(f32),
    Double(f64),
    Varchar(String),
    Json(String),
    Date(NaiveDate),
    Binary(Vec<u8>),
}

impl RowValue {
    /// True for both the untyped null and the geometry typed null.
    pub fn is_null(&self) -> bool {
        matches!(self, RowValue::Null | RowValue::Geometry(None))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RowValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view over every signed integer variant.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RowValue::SmallInt(v) => Some(*v as i64),
            RowValue::Int(v) => Some(*v as i64),
            RowValue::BigInt(v) => Some(*v),
            RowValue::UnsignedBigInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RowValue::Real(v) => Some(*v as f64),
            RowValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RowValue::Varchar(v) | RowValue::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            RowValue::Date(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_geometry(&self) -> Option<&GeometryValue> {
        match self {
            RowValue::Geometry(v) => v.as_ref(),
            _ => None,
        }
    }
}

impl Display for RowValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowValue::Null | RowValue::Geometry(None) => write!(f, "NULL"),
            RowValue::Geometry(Some(g)) => write!(f, "{}", g),
            RowValue::Bool(v) => write!(f, "{}", v),
            RowValue::SmallInt(v) => write!(f, "{}", v),
            RowValue::Int(v) => write!(f, "{}", v),
            RowValue::BigInt(v) => write!(f, "{}", v),
            RowValue::UnsignedBigInt(v) => write!(f, "{}", v),
            RowValue::Real(v) => write!(f, "{}", v),
            RowValue::Double(v) => write!(f, "{}", v),
            RowValue::Varchar(v) | RowValue::Json(v) => write!(f, "{}", v),
            RowValue::Date(v) => write!(f, "{}", v),
            RowValue::Binary(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}
