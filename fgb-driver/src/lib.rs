//! # fgb_driver - Random Access FlatGeobuf Reader
//!
//! This crate exposes a FlatGeobuf file as a read-only table: rows are
//! features, field 0 is the geometry and the remaining fields are the
//! property columns of the header schema. The file itself can only be read
//! forward, so the driver keeps a sparse cache of record offsets to turn
//! jumps into short scans.
//!
//! ## Features
//!
//! - **Row/Column Access**: `get_field(row, column)` in any order
//! - **Offset Cache**: filled while scanning or in one pass from the index
//! - **Spatial Queries**: bounding box search over the packed Hilbert R-Tree
//! - **Typed Values**: every FlatGeobuf column type, geometry stamped with
//!   the file's SRID
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fgb_driver::{BoundingBox, FgbDriver};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut driver = FgbDriver::open("countries.fgb")?;
//! println!("{} rows, {} fields", driver.row_count(), driver.field_count());
//!
//! // sequential scan
//! for row in 0..driver.row_count() {
//!     let name = driver.get_field(row, 1)?;
//!     println!("{}", name);
//! }
//!
//! // spatial query
//! let candidates = driver.query_by_bounding_box(&BoundingBox::new(0.0, 40.0, 10.0, 50.0))?;
//! for row in candidates {
//!     let geometry = driver.get_field(row, driver.geometry_field_index())?;
//!     println!("{}: {}", row, geometry);
//! }
//! driver.close()?;
//! # Ok(())
//! # }
//! ```

pub mod bounding_box;
pub mod config;
pub mod driver;
pub mod errors;
pub mod geometry;
pub mod header;
pub mod offset_cache;
pub mod packed_rtree;
pub mod query;
pub mod record;
pub mod value;

#[cfg(any(test, feature = "test-util"))]
pub mod fixture;

pub use bounding_box::BoundingBox;
pub use config::DriverConfig;
pub use driver::FgbDriver;
pub use errors::{FgbError, FgbResult};
pub use geometry::{Coordinate, Geometry, GeometryType, GeometryValue};
pub use header::{ColumnDescriptor, FileHeader};
pub use offset_cache::OffsetCache;
pub use query::CandidateCursor;
pub use record::GEOMETRY_FIELD_INDEX;
pub use value::{ColumnType, RowValue};
