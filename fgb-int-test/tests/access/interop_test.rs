//! Reads files produced by the `flatgeobuf` crate's own writer rather than
//! the fixture builder.

use fgb_driver::{BoundingBox, DriverConfig, FgbResult, Geometry, GeometryType, RowValue};
use fgb_int_test::test_util::{cleanup, create_test_context_with, run_test};
use flatgeobuf::{FgbCrs, FgbWriter, FgbWriterOptions};
use geozero::{ColumnValue, PropertyProcessor};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

const POINTS: i32 = 50;

/// Point `i` sits at `(i % 10, i / 10)` with `id = i` and `name = "point-i"`.
fn write_grid_points(path: &Path, write_index: bool) -> FgbResult<()> {
    let options = FgbWriterOptions {
        write_index,
        crs: FgbCrs {
            code: 4326,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut fgb =
        FgbWriter::create_with_options("points", flatgeobuf::GeometryType::Point, options)
            .map_err(io::Error::other)?;
    fgb.add_column("id", flatgeobuf::ColumnType::Int, |_, _| {});
    fgb.add_column("name", flatgeobuf::ColumnType::String, |_, _| {});

    for i in 0..POINTS {
        let point = geo_types::Point::new((i % 10) as f64, (i / 10) as f64);
        let name = format!("point-{}", i);
        fgb.add_feature_geom(geo_types::Geometry::Point(point), |feat| {
            feat.property(0, "id", &ColumnValue::Int(i)).unwrap();
            feat.property(1, "name", &ColumnValue::String(&name)).unwrap();
        })
        .map_err(io::Error::other)?;
    }

    let mut out = BufWriter::new(File::create(path)?);
    fgb.write(&mut out).map_err(io::Error::other)?;
    out.flush()?;
    Ok(())
}

fn int_at(driver: &mut fgb_driver::FgbDriver, row: u64) -> FgbResult<i32> {
    match driver.get_field(row, 1)? {
        RowValue::Int(id) => Ok(id),
        other => panic!("row {} holds {:?} in the id column", row, other),
    }
}

#[test]
fn test_header_of_indexed_writer_output() {
    run_test(
        || create_test_context_with(|path| write_grid_points(path, true)),
        |ctx| {
            let driver = ctx.open()?;
            assert_eq!(driver.row_count(), POINTS as u64);
            assert_eq!(driver.field_count(), 3);

            let header = driver.header();
            assert_eq!(header.name.as_deref(), Some("points"));
            assert_eq!(header.geometry_type, GeometryType::Point);
            assert_eq!(header.srid, 4326);
            assert_eq!(header.index_node_size, 16);
            assert_eq!(header.envelope, Some(BoundingBox::new(0.0, 0.0, 9.0, 4.0)));
            let names: Vec<&str> = header.columns.iter().map(|c| c.name.as_str()).collect();
            assert_eq!(names, vec!["id", "name"]);
            assert_eq!(
                driver.features_offset(),
                header.index_byte_offset + header.index_size()?
            );
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_scan_writer_output() {
    run_test(
        || create_test_context_with(|path| write_grid_points(path, true)),
        |ctx| {
            let mut driver = ctx.open()?;
            let mut seen = BTreeSet::new();
            for row in 0..driver.row_count() {
                let id = int_at(&mut driver, row)?;
                assert_eq!(
                    driver.get_field(row, 2)?,
                    RowValue::Varchar(format!("point-{}", id))
                );
                let geometry = driver.get_field(row, 0)?;
                let geometry = geometry.as_geometry().unwrap();
                assert_eq!(
                    geometry.geometry(),
                    &Geometry::point((id % 10) as f64, (id / 10) as f64)
                );
                seen.insert(id);
            }
            // rows are in Hilbert order, but every id shows up once
            assert_eq!(seen, (0..POINTS).collect::<BTreeSet<_>>());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_warm_cache_on_writer_output() {
    run_test(
        || create_test_context_with(|path| write_grid_points(path, true)),
        |ctx| {
            let mut cold = ctx.open()?;
            let expected: Vec<i32> = (0..cold.row_count())
                .map(|row| int_at(&mut cold, row))
                .collect::<FgbResult<_>>()?;

            let config = DriverConfig::default().with_warm_cache_on_open(true);
            let mut warm = ctx.open_with_config(config)?;
            assert_eq!(warm.offset_cache().len(), POINTS as usize);
            assert_eq!(warm.offset_cache().get(0), Some(0));
            // backwards through the seeded offsets
            for row in (0..warm.row_count()).rev() {
                assert_eq!(int_at(&mut warm, row)?, expected[row as usize]);
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_query_writer_output() {
    run_test(
        || create_test_context_with(|path| write_grid_points(path, true)),
        |ctx| {
            let mut driver = ctx.open()?;
            let rows: Vec<u64> = driver
                .query_by_bounding_box(&BoundingBox::new(2.0, 2.0, 3.0, 3.0))?
                .collect();
            assert_eq!(rows.len(), 4);
            let ids = rows
                .iter()
                .map(|&row| int_at(&mut driver, row))
                .collect::<FgbResult<BTreeSet<_>>>()?;
            assert_eq!(ids, BTreeSet::from([22, 23, 32, 33]));

            let rows: Vec<u64> = driver
                .query_by_bounding_box(&BoundingBox::new(20.0, 20.0, 30.0, 30.0))?
                .collect();
            assert!(rows.is_empty());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_writer_output_without_index() {
    run_test(
        || create_test_context_with(|path| write_grid_points(path, false)),
        |ctx| {
            let mut driver = ctx.open()?;
            assert_eq!(driver.header().index_node_size, 0);
            assert_eq!(driver.features_offset(), driver.header().index_byte_offset);
            // insertion order is kept without an index
            assert_eq!(int_at(&mut driver, 0)?, 0);
            assert_eq!(int_at(&mut driver, 49)?, 49);
            assert_eq!(int_at(&mut driver, 7)?, 7);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
