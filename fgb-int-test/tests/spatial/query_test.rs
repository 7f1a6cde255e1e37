//! Integration tests for bounding box queries against the packed index.

use fgb_driver::fixture::{FgbFileBuilder, FixtureFeature};
use fgb_driver::{BoundingBox, FgbDriver, FgbError, FgbResult, Geometry, RowValue};
use fgb_int_test::test_util::{
    cleanup, create_test_context, int_string_builder, random_features_builder, run_test,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Rows whose decoded geometry envelope intersects `query`.
fn brute_force(driver: &mut FgbDriver, query: &BoundingBox) -> FgbResult<Vec<u64>> {
    let mut rows = Vec::new();
    for row in 0..driver.row_count() {
        if let Some(geometry) = driver.get_field(row, 0)?.as_geometry() {
            if geometry.geometry().bounding_box().intersects(query) {
                rows.push(row);
            }
        }
    }
    Ok(rows)
}

#[test]
fn test_query_has_no_false_negatives() {
    for node_size in [2u16, 5, 16] {
        run_test(
            || create_test_context(&random_features_builder(400, node_size as u64, node_size)),
            |ctx| {
                let mut driver = ctx.open()?;
                let mut rng = StdRng::seed_from_u64(17);
                for _ in 0..40 {
                    let x = rng.gen_range(-50.0..1000.0);
                    let y = rng.gen_range(-50.0..1000.0);
                    let query = BoundingBox::new(
                        x,
                        y,
                        x + rng.gen_range(0.0..200.0),
                        y + rng.gen_range(0.0..200.0),
                    );

                    let mut found: Vec<u64> = driver.query_by_bounding_box(&query)?.collect();
                    found.sort_unstable();
                    // leaf envelopes are exact, so no false positives either
                    assert_eq!(found, brute_force(&mut driver, &query)?, "query {}", query);
                }
                Ok(())
            },
            |ctx| cleanup(ctx),
        )
    }
}

#[test]
fn test_query_whole_extent() {
    run_test(
        || create_test_context(&random_features_builder(90, 4, 16)),
        |ctx| {
            let mut driver = ctx.open()?;
            let extent = driver.header().envelope.unwrap();
            let cursor = driver.query_by_bounding_box(&extent)?;
            // every feature except those without geometry
            let with_geometry = (0..90).filter(|i| i % 7 != 3).count();
            assert_eq!(cursor.len(), with_geometry);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_candidates_resolve_by_id_and_offset() {
    run_test(
        || create_test_context(&random_features_builder(200, 8, 8)),
        |ctx| {
            let mut driver = ctx.open()?;
            let mut cursor = driver.query_by_bounding_box(&BoundingBox::new(200.0, 200.0, 600.0, 600.0))?;
            assert!(!cursor.is_empty());

            while let Some(row) = cursor.next() {
                let by_offset = driver.fields_at_offset(cursor.current_offset().unwrap())?;
                let by_id = driver.row(row)?;
                assert_eq!(by_id, &by_offset[..]);
            }

            // walk back over the same candidates
            let mut back = Vec::new();
            while let Some(row) = cursor.previous() {
                back.push(row);
            }
            back.reverse();
            assert_eq!(back, cursor.ids());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_query_results_in_file_order() {
    let builder = FgbFileBuilder::new()
        .column(fgb_driver::ColumnDescriptor::new("id", fgb_driver::ColumnType::Int))
        .index_node_size(3)
        .features((0..50).map(|i| {
            let x = (i % 10) as f64 * 10.0;
            let y = (i / 10) as f64 * 10.0;
            FixtureFeature::new(Some(Geometry::polygon(&[
                (x, y),
                (x + 5.0, y),
                (x + 5.0, y + 5.0),
                (x, y),
            ])))
            .property(0, RowValue::Int(i))
        }));
    run_test(
        || create_test_context(&builder),
        |ctx| {
            let mut driver = ctx.open()?;
            let ids = driver
                .query_by_bounding_box(&BoundingBox::new(12.0, 12.0, 31.0, 21.0))?
                .ids();
            assert_eq!(ids, vec![11, 12, 13, 21, 22, 23]);
            for id in ids {
                assert_eq!(driver.get_field(id, 1)?, RowValue::Int(id as i32));
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_query_without_index() {
    run_test(
        || create_test_context(&int_string_builder(5)),
        |ctx| {
            let mut driver = ctx.open()?;
            let err = driver
                .query_by_bounding_box(&BoundingBox::new(0.0, 0.0, 10.0, 10.0))
                .unwrap_err();
            assert!(matches!(err, FgbError::NoSpatialIndex));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_query_after_close() {
    run_test(
        || create_test_context(&random_features_builder(20, 2, 16)),
        |ctx| {
            let mut driver = ctx.open()?;
            driver.close()?;
            let err = driver
                .query_by_bounding_box(&BoundingBox::new(0.0, 0.0, 10.0, 10.0))
                .unwrap_err();
            assert!(matches!(err, FgbError::Closed));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
