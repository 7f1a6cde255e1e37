use fgb_driver::fixture::{FgbFileBuilder, FixtureFeature};
use fgb_driver::{
    ColumnDescriptor, ColumnType, Coordinate, DriverConfig, FgbDriver, FgbResult, Geometry,
    RowValue,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Runs a test between a setup and a teardown step.
///
/// The teardown runs even when the test fails or panics; the failure is
/// reported afterwards.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    B: FnOnce() -> FgbResult<TestContext>,
    T: FnOnce(TestContext) -> FgbResult<()>,
    A: FnOnce(TestContext) -> FgbResult<()>,
{
    let ctx = match before() {
        Ok(ctx) => ctx,
        Err(e) => panic!("Before run failed: {:?}", e),
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| test(ctx.clone())));
    let after_result = after(ctx);

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => panic!("Test failed: {:?}", e),
        Err(panic_err) => panic::resume_unwind(panic_err),
    }
    if let Err(e) = after_result {
        panic!("After run failed: {:?}", e);
    }
}

/// A fixture file on disk, removed with its directory once the last clone
/// is dropped.
#[derive(Clone)]
pub struct TestContext {
    dir: Arc<TempDir>,
    path: PathBuf,
}

impl TestContext {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn open(&self) -> FgbResult<FgbDriver> {
        FgbDriver::open(&self.path)
    }

    pub fn open_with_config(&self, config: DriverConfig) -> FgbResult<FgbDriver> {
        FgbDriver::open_with_config(&self.path, config)
    }
}

/// Writes `builder` into a fresh temporary directory.
pub fn create_test_context(builder: &FgbFileBuilder) -> FgbResult<TestContext> {
    create_test_context_with(|path| Ok(builder.write_to(path)?))
}

/// Lets `write` produce the file at a path inside a fresh temporary
/// directory.
pub fn create_test_context_with<F>(write: F) -> FgbResult<TestContext>
where
    F: FnOnce(&Path) -> FgbResult<()>,
{
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("fixture.fgb");
    write(&path)?;
    Ok(TestContext {
        dir: Arc::new(dir),
        path,
    })
}

pub fn cleanup(ctx: TestContext) -> FgbResult<()> {
    if ctx.path().exists() {
        fs::remove_file(ctx.path())?;
    }
    Ok(())
}

/// `count` point features with an `Int` and a `String` column and no
/// index. Row `i` holds `i * 10` and `"name-i"`.
pub fn int_string_builder(count: i32) -> FgbFileBuilder {
    FgbFileBuilder::new()
        .name("int_string")
        .column(ColumnDescriptor::new("value", ColumnType::Int))
        .column(ColumnDescriptor::new("name", ColumnType::String))
        .index_node_size(0)
        .features((0..count).map(|i| {
            FixtureFeature::new(Some(Geometry::point(i as f64, i as f64)))
                .property(0, RowValue::Int(i * 10))
                .property(1, RowValue::Varchar(format!("name-{}", i)))
        }))
}

fn random_coordinate(rng: &mut StdRng) -> Coordinate {
    Coordinate::new(rng.gen_range(0.0..1000.0), rng.gen_range(0.0..1000.0))
}

fn random_geometry(rng: &mut StdRng) -> Geometry {
    match rng.gen_range(0..3) {
        0 => Geometry::Point(random_coordinate(rng)),
        1 => {
            let start = random_coordinate(rng);
            let len = rng.gen_range(2..6);
            let coords = (0..len)
                .map(|i| {
                    Coordinate::new(
                        start.x + i as f64 * rng.gen_range(0.0..20.0),
                        start.y + rng.gen_range(-10.0..10.0),
                    )
                })
                .collect();
            Geometry::LineString(coords)
        }
        _ => {
            let origin = random_coordinate(rng);
            let w = rng.gen_range(1.0..30.0);
            let h = rng.gen_range(1.0..30.0);
            Geometry::polygon(&[
                (origin.x, origin.y),
                (origin.x + w, origin.y),
                (origin.x + w, origin.y + h),
                (origin.x, origin.y + h),
                (origin.x, origin.y),
            ])
        }
    }
}

/// `count` random points, lines and boxes in `[0, 1030)`, Hilbert sorted
/// and indexed with `node_size`. Column 0 keeps the insertion number, and
/// one feature in seven has no geometry.
pub fn random_features_builder(count: u32, seed: u64, node_size: u16) -> FgbFileBuilder {
    let mut rng = StdRng::seed_from_u64(seed);
    let features: Vec<FixtureFeature> = (0..count)
        .map(|i| {
            let geometry = if i % 7 == 3 {
                None
            } else {
                Some(random_geometry(&mut rng))
            };
            let mut feature = FixtureFeature::new(geometry)
                .property(0, RowValue::BigInt(i as i64))
                .property(1, RowValue::Double(rng.gen_range(-1.0..1.0)));
            if i % 2 == 0 {
                feature = feature.property(2, RowValue::Varchar(format!("feature {}", i)));
            }
            feature
        })
        .collect();

    FgbFileBuilder::new()
        .name("random")
        .srid(4326)
        .column(ColumnDescriptor::new("seq", ColumnType::Long))
        .column(ColumnDescriptor::new("score", ColumnType::Double))
        .column(ColumnDescriptor::new("label", ColumnType::String))
        .index_node_size(node_size)
        .hilbert_sort(true)
        .features(features)
}

/// Reads every row in file order with caching off.
pub fn scan_all(driver: &mut FgbDriver) -> FgbResult<Vec<Vec<RowValue>>> {
    let caching = driver.is_cache_row_address();
    driver.set_cache_row_address(false);
    let mut rows = Vec::with_capacity(driver.row_count() as usize);
    for row in 0..driver.row_count() {
        rows.push(driver.row(row)?.to_vec());
    }
    driver.set_cache_row_address(caching);
    Ok(rows)
}
