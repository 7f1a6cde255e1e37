//! Integration tests for record decoding through the driver.

use fgb_driver::fixture::{FgbFileBuilder, FixtureFeature};
use fgb_driver::{ColumnDescriptor, ColumnType, FgbError, Geometry, GeometryType, RowValue};
use fgb_int_test::test_util::{cleanup, create_test_context, run_test};
use std::error::Error;

#[test]
fn test_byte_and_short_decode_alike() {
    let builder = FgbFileBuilder::new()
        .column(ColumnDescriptor::new("as_byte", ColumnType::Byte))
        .column(ColumnDescriptor::new("as_short", ColumnType::Short))
        .feature(
            FixtureFeature::new(Some(Geometry::point(0.0, 0.0)))
                .property(0, RowValue::SmallInt(-1))
                .property(1, RowValue::SmallInt(-1)),
        );
    run_test(
        || create_test_context(&builder),
        |ctx| {
            let mut driver = ctx.open()?;
            let from_byte = driver.get_field(0, 1)?;
            let from_short = driver.get_field(0, 2)?;
            assert_eq!(from_byte, RowValue::SmallInt(-1));
            assert_eq!(from_byte, from_short);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_empty_geometry_is_typed_null() {
    let builder = FgbFileBuilder::new()
        .geometry_type(GeometryType::Polygon)
        .column(ColumnDescriptor::new("id", ColumnType::Int))
        .column(ColumnDescriptor::new("flag", ColumnType::Bool))
        .feature(
            FixtureFeature::with_empty_geometry()
                .property(0, RowValue::Int(7))
                .property(1, RowValue::Bool(true)),
        )
        .feature(FixtureFeature::new(None).property(0, RowValue::Int(8)));
    run_test(
        || create_test_context(&builder),
        |ctx| {
            let mut driver = ctx.open()?;
            assert_eq!(driver.get_field(0, 0)?, RowValue::Geometry(None));
            assert!(driver.get_field(0, 0)?.is_null());
            assert_eq!(driver.get_field(0, 1)?, RowValue::Int(7));
            assert_eq!(driver.get_field(0, 2)?, RowValue::Bool(true));

            // no geometry table at all, and an unmentioned column
            assert_eq!(driver.get_field(1, 0)?, RowValue::Geometry(None));
            assert_eq!(driver.get_field(1, 1)?, RowValue::Int(8));
            assert_eq!(driver.get_field(1, 2)?, RowValue::Null);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_every_column_type() {
    let date = chrono_date("2020-02-29");
    let builder = FgbFileBuilder::new()
        .srid(3857)
        .geometry_type(GeometryType::LineString)
        .column(ColumnDescriptor::new("byte", ColumnType::Byte))
        .column(ColumnDescriptor::new("ubyte", ColumnType::UByte))
        .column(ColumnDescriptor::new("bool", ColumnType::Bool))
        .column(ColumnDescriptor::new("short", ColumnType::Short))
        .column(ColumnDescriptor::new("ushort", ColumnType::UShort))
        .column(ColumnDescriptor::new("int", ColumnType::Int))
        .column(ColumnDescriptor::new("uint", ColumnType::UInt))
        .column(ColumnDescriptor::new("long", ColumnType::Long))
        .column(ColumnDescriptor::new("ulong", ColumnType::ULong))
        .column(ColumnDescriptor::new("float", ColumnType::Float))
        .column(ColumnDescriptor::new("double", ColumnType::Double))
        .column(ColumnDescriptor::new("string", ColumnType::String))
        .column(ColumnDescriptor::new("json", ColumnType::Json))
        .column(ColumnDescriptor::new("date", ColumnType::DateTime))
        .column(ColumnDescriptor::new("binary", ColumnType::Binary))
        .feature(
            FixtureFeature::new(Some(Geometry::line_string(&[(0.0, 0.0), (3.0, 4.0)])))
                .property(0, RowValue::SmallInt(-128))
                .property(1, RowValue::SmallInt(255))
                .property(2, RowValue::Bool(true))
                .property(3, RowValue::SmallInt(-300))
                .property(4, RowValue::Int(65535))
                .property(5, RowValue::Int(i32::MIN))
                .property(6, RowValue::BigInt(u32::MAX as i64))
                .property(7, RowValue::BigInt(i64::MAX))
                .property(8, RowValue::UnsignedBigInt(u64::MAX))
                .property(9, RowValue::Real(0.25))
                .property(10, RowValue::Double(-1.5e300))
                .property(11, RowValue::Varchar("straße".to_string()))
                .property(12, RowValue::Json("{\"k\":[1,2]}".to_string()))
                .property(13, RowValue::Date(date))
                .property(14, RowValue::Binary(vec![0, 1, 2, 255])),
        );
    run_test(
        || create_test_context(&builder),
        |ctx| {
            let mut driver = ctx.open()?;
            assert_eq!(driver.field_count(), 16);
            let row = driver.row(0)?.to_vec();

            let geometry = row[0].as_geometry().unwrap();
            assert_eq!(geometry.srid(), 3857);
            assert_eq!(geometry.geometry(), &Geometry::line_string(&[(0.0, 0.0), (3.0, 4.0)]));

            assert_eq!(row[1], RowValue::SmallInt(-128));
            assert_eq!(row[2], RowValue::SmallInt(255));
            assert_eq!(row[3], RowValue::Bool(true));
            assert_eq!(row[4], RowValue::SmallInt(-300));
            assert_eq!(row[5], RowValue::Int(65535));
            assert_eq!(row[6], RowValue::Int(i32::MIN));
            assert_eq!(row[7], RowValue::BigInt(u32::MAX as i64));
            assert_eq!(row[8], RowValue::BigInt(i64::MAX));
            assert_eq!(row[9], RowValue::UnsignedBigInt(u64::MAX));
            assert_eq!(row[10], RowValue::Real(0.25));
            assert_eq!(row[11], RowValue::Double(-1.5e300));
            assert_eq!(row[12].as_str(), Some("straße"));
            assert_eq!(row[13], RowValue::Json("{\"k\":[1,2]}".to_string()));
            assert_eq!(row[14].as_date(), Some(date));
            assert_eq!(row[15], RowValue::Binary(vec![0, 1, 2, 255]));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

fn chrono_date(text: &str) -> chrono::NaiveDate {
    fgb_driver::record::parse_date(text).unwrap()
}

#[test]
fn test_malformed_record_fails_only_its_row() {
    let builder = FgbFileBuilder::new()
        .column(ColumnDescriptor::new("id", ColumnType::Int))
        .feature(FixtureFeature::new(Some(Geometry::point(0.0, 0.0))).property(0, RowValue::Int(0)))
        // column 5 does not exist
        .feature(
            FixtureFeature::new(Some(Geometry::point(1.0, 1.0)))
                .raw_properties(vec![5, 0, 1, 0, 0, 0]),
        )
        .feature(FixtureFeature::new(Some(Geometry::point(2.0, 2.0))).property(0, RowValue::Int(2)));
    run_test(
        || create_test_context(&builder),
        |ctx| {
            let mut driver = ctx.open()?;
            assert_eq!(driver.get_field(0, 1)?, RowValue::Int(0));

            let err = driver.get_field(1, 1).unwrap_err();
            assert!(err.is_row_not_found());
            let cause = err.source().unwrap();
            assert!(cause.to_string().starts_with("Malformed record"));

            // the bad record is skipped without decoding on the way to row 2
            assert_eq!(driver.get_field(2, 1)?, RowValue::Int(2));
            assert_eq!(driver.get_field(0, 1)?, RowValue::Int(0));
            assert!(driver.get_field(1, 0).unwrap_err().is_row_not_found());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_unrecognized_column_type() {
    let builder = FgbFileBuilder::new()
        .column(ColumnDescriptor::new("id", ColumnType::Int))
        .column_with_tag("future", 42)
        .feature(
            FixtureFeature::new(Some(Geometry::point(0.0, 0.0)))
                .raw_properties(vec![0, 0, 9, 0, 0, 0, 1, 0, 0, 0, 0, 0]),
        )
        .feature(FixtureFeature::new(Some(Geometry::point(1.0, 1.0))).property(0, RowValue::Int(1)));
    run_test(
        || create_test_context(&builder),
        |ctx| {
            let mut driver = ctx.open()?;
            assert_eq!(driver.header().columns[1].column_type, None);

            let err = driver.get_field(0, 1).unwrap_err();
            match &err {
                FgbError::RowNotFound { row: 0, cause: Some(cause) } => assert!(cause.is_malformed()),
                other => panic!("unexpected error {:?}", other),
            }
            assert_eq!(driver.get_field(1, 1)?, RowValue::Int(1));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_invalid_date_is_malformed() {
    let builder = FgbFileBuilder::new()
        .column(ColumnDescriptor::new("when", ColumnType::DateTime))
        .feature(FixtureFeature::new(None).property(0, RowValue::Varchar("2021-13-45".to_string())))
        .feature(FixtureFeature::new(None).property(0, RowValue::Varchar("2021-12-01T08:00:00Z".to_string())));
    run_test(
        || create_test_context(&builder),
        |ctx| {
            let mut driver = ctx.open()?;
            assert!(driver.get_field(0, 1).unwrap_err().is_row_not_found());
            assert_eq!(driver.get_field(1, 1)?, RowValue::Date(chrono_date("2021-12-01")));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_mixed_geometry_types() {
    let builder = FgbFileBuilder::new()
        .geometry_type(GeometryType::Unknown)
        .feature(FixtureFeature::new(Some(Geometry::point(1.0, 2.0))))
        .feature(FixtureFeature::new(Some(Geometry::polygon(&[
            (0.0, 0.0),
            (1.0, 0.0),
            (1.0, 1.0),
            (0.0, 0.0),
        ]))))
        .feature(FixtureFeature::new(Some(Geometry::GeometryCollection(vec![
            Geometry::point(5.0, 5.0),
            Geometry::line_string(&[(0.0, 0.0), (2.0, 2.0)]),
        ]))));
    run_test(
        || create_test_context(&builder),
        |ctx| {
            let mut driver = ctx.open()?;
            let types: Vec<GeometryType> = (0..3)
                .map(|row| {
                    driver
                        .get_field(row, 0)
                        .map(|v| v.as_geometry().unwrap().geometry().geometry_type())
                })
                .collect::<Result<_, _>>()?;
            assert_eq!(
                types,
                vec![
                    GeometryType::Point,
                    GeometryType::Polygon,
                    GeometryType::GeometryCollection
                ]
            );
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
