//! Decoding of a single feature record into a row.
//!
//! A record is one FlatGeobuf `Feature` table, verified by
//! [`flatgeobuf::root_as_feature`] before any field is read. Its geometry
//! lands in slot 0 of the row; its property block is a run of
//! `(u16 column index, value)` pairs with no padding and no pair count, so
//! the block is consumed until it is exhausted. Column `c` of the schema
//! lands in slot `c + 1`.
//!
//! Decoding is all or nothing: the row is only written once every value of
//! the record decoded successfully. Columns the record does not mention are
//! left untouched, so callers that need nulls for missing properties must
//! reset the row themselves before decoding.

use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::errors::{FgbError, FgbResult};
use crate::geometry::{decode_geometry, embedded_geometry_type, GeometryType, GeometryValue};
use crate::header::FileHeader;
use crate::value::{ColumnType, RowValue};

/// Slot of the geometry in every row.
pub const GEOMETRY_FIELD_INDEX: usize = 0;

/// Decodes one record (without its length prefix) into `row`.
///
/// `row` must hold at least `header.column_count() + 1` values. On error
/// `row` is left exactly as it was.
pub fn decode_record(bytes: &[u8], header: &FileHeader, row: &mut [RowValue]) -> FgbResult<()> {
    let field_count = header.column_count() + 1;
    if row.len() < field_count {
        return Err(FgbError::ColumnOutOfRange {
            column: field_count - 1,
            field_count: row.len(),
        });
    }

    let feature = flatgeobuf::root_as_feature(bytes)
        .map_err(|e| FgbError::malformed(format!("invalid feature table: {}", e)))?;

    let geometry = match feature.geometry() {
        Some(table) => {
            let geometry_type = match header.geometry_type {
                GeometryType::Unknown => embedded_geometry_type(&table)?,
                declared => declared,
            };
            decode_geometry(&table, geometry_type)?
                .map(|geometry| GeometryValue::new(geometry, header.srid))
        }
        None => None,
    };

    let properties = feature.properties().map(|p| p.bytes()).unwrap_or_default();
    let values = decode_properties(properties, header)?;

    row[GEOMETRY_FIELD_INDEX] = RowValue::Geometry(geometry);
    for (slot, value) in values {
        row[slot] = value;
    }
    Ok(())
}

fn truncated(column: usize) -> impl FnOnce(std::io::Error) -> FgbError {
    move |_| FgbError::malformed(format!("property block truncated in column {}", column))
}

/// Decodes the property block into `(slot, value)` pairs.
fn decode_properties(mut block: &[u8], header: &FileHeader) -> FgbResult<Vec<(usize, RowValue)>> {
    let mut values = Vec::new();
    while !block.is_empty() {
        let column = block
            .read_u16::<LittleEndian>()
            .map_err(|_| FgbError::malformed("property block ends inside a column index"))?
            as usize;
        let descriptor = header.columns.get(column).ok_or_else(|| {
            FgbError::malformed(format!(
                "column index {} out of range for {} columns",
                column,
                header.column_count()
            ))
        })?;
        let column_type = descriptor.column_type.ok_or_else(|| {
            FgbError::malformed(format!(
                "column '{}' has an unrecognized type",
                descriptor.name
            ))
        })?;

        let value = decode_value(column_type, column, &mut block)?;
        values.push((column + 1, value));
    }
    Ok(values)
}

fn decode_value(column_type: ColumnType, column: usize, block: &mut &[u8]) -> FgbResult<RowValue> {
    let value = match column_type {
        ColumnType::Byte => RowValue::SmallInt(block.read_i8().map_err(truncated(column))? as i16),
        ColumnType::UByte => RowValue::SmallInt(block.read_u8().map_err(truncated(column))? as i16),
        ColumnType::Bool => RowValue::Bool(block.read_u8().map_err(truncated(column))? != 0),
        ColumnType::Short => {
            RowValue::SmallInt(block.read_i16::<LittleEndian>().map_err(truncated(column))?)
        }
        ColumnType::UShort => {
            RowValue::Int(block.read_u16::<LittleEndian>().map_err(truncated(column))? as i32)
        }
        ColumnType::Int => RowValue::Int(block.read_i32::<LittleEndian>().map_err(truncated(column))?),
        ColumnType::UInt => {
            RowValue::BigInt(block.read_u32::<LittleEndian>().map_err(truncated(column))? as i64)
        }
        ColumnType::Long => {
            RowValue::BigInt(block.read_i64::<LittleEndian>().map_err(truncated(column))?)
        }
        ColumnType::ULong => {
            RowValue::UnsignedBigInt(block.read_u64::<LittleEndian>().map_err(truncated(column))?)
        }
        ColumnType::Float => {
            RowValue::Real(block.read_f32::<LittleEndian>().map_err(truncated(column))?)
        }
        ColumnType::Double => {
            RowValue::Double(block.read_f64::<LittleEndian>().map_err(truncated(column))?)
        }
        ColumnType::String => RowValue::Varchar(read_text(block, column)?.to_string()),
        ColumnType::Json => RowValue::Json(read_text(block, column)?.to_string()),
        ColumnType::DateTime => {
            let text = read_text(block, column)?;
            RowValue::Date(parse_date(text).ok_or_else(|| {
                FgbError::malformed(format!("column {} holds an invalid date '{}'", column, text))
            })?)
        }
        ColumnType::Binary => RowValue::Binary(read_prefixed(block, column)?.to_vec()),
    };
    Ok(value)
}

fn read_prefixed<'a>(block: &mut &'a [u8], column: usize) -> FgbResult<&'a [u8]> {
    let len = block.read_u32::<LittleEndian>().map_err(truncated(column))? as usize;
    if len > block.len() {
        return Err(FgbError::malformed(format!(
            "column {} value of {} bytes exceeds the {} remaining",
            column,
            len,
            block.len()
        )));
    }
    let (value, rest) = block.split_at(len);
    *block = rest;
    Ok(value)
}

fn read_text<'a>(block: &mut &'a [u8], column: usize) -> FgbResult<&'a str> {
    let bytes = read_prefixed(block, column)?;
    std::str::from_utf8(bytes)
        .map_err(|e| FgbError::malformed(format!("column {} is not valid UTF-8: {}", column, e)))
}

/// Parses a date literal: a plain date, an RFC 3339 timestamp or a naive
/// ISO date-time.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|d| d.date_naive()))
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
                .ok()
                .map(|d| d.date())
        })
}
