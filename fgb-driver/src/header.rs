//! FlatGeobuf file header.
//!
//! A file starts with eight magic bytes, a little endian u32 header length
//! and the header table itself. The packed index (if any) follows right
//! after, then the features. Framing and table verification are done by
//! [`flatgeobuf::FgbReader`]; this module copies the fields the driver needs
//! into an owned [`FileHeader`].

use std::io::{self, Read, Seek};

use crate::bounding_box::BoundingBox;
use crate::errors::{FgbError, FgbResult};
use crate::geometry::GeometryType;
use crate::packed_rtree;
use crate::value::ColumnType;

/// Magic bytes of a version 3 file. The last byte is the patch version and
/// is not checked.
pub const MAGIC_BYTES: [u8; 8] = [b'f', b'g', b'b', flatgeobuf::VERSION, b'f', b'g', b'b', 0];

/// One property column of the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// `None` when the stored tag is not a known type. Records that carry a
    /// value for such a column cannot be decoded.
    pub column_type: Option<ColumnType>,
    /// Declared width, -1 when unspecified.
    pub width: i32,
    pub precision: i32,
    pub scale: i32,
    pub nullable: bool,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type: Some(column_type),
            width: -1,
            precision: -1,
            scale: -1,
            nullable: true,
            title: None,
            description: None,
        }
    }

    /// Width used for row size estimates; unspecified widths count as 0.
    pub fn declared_width(&self) -> u64 {
        self.width.max(0) as u64
    }

    fn from_column(column: &flatgeobuf::Column<'_>) -> Self {
        Self {
            name: column.name().to_string(),
            column_type: ColumnType::from_tag(column.type_().0),
            width: column.width(),
            precision: column.precision(),
            scale: column.scale(),
            nullable: column.nullable(),
            title: column.title().map(str::to_string),
            description: column.description().map(str::to_string),
        }
    }
}

/// Parsed file header, fixed for the lifetime of a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {
    pub name: Option<String>,
    pub envelope: Option<BoundingBox>,
    pub geometry_type: GeometryType,
    pub has_z: bool,
    pub has_m: bool,
    pub has_t: bool,
    pub has_tm: bool,
    pub columns: Vec<ColumnDescriptor>,
    pub feature_count: u64,
    /// Branching factor of the packed index, 0 when the file has none.
    pub index_node_size: u16,
    /// EPSG code of the CRS, 0 when unknown.
    pub srid: i32,
    pub title: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<String>,
    /// Absolute offset of the first byte after the header.
    pub index_byte_offset: u64,
}

fn header_error(err: flatgeobuf::Error) -> FgbError {
    match err {
        flatgeobuf::Error::MissingMagicBytes => {
            FgbError::InvalidHeader("not a FlatGeobuf v3 file".to_string())
        }
        flatgeobuf::Error::IllegalHeaderSize(size) => {
            FgbError::InvalidHeader(format!("header size {} out of range", size))
        }
        flatgeobuf::Error::IO(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            FgbError::InvalidHeader("file ends inside the header".to_string())
        }
        flatgeobuf::Error::IO(e) => FgbError::Io(e),
        other => FgbError::InvalidHeader(other.to_string()),
    }
}

impl FileHeader {
    /// Reads the header from a stream positioned at the start of the file,
    /// leaving it positioned right after the header.
    ///
    /// The index size implied by the feature count and node size is checked
    /// here, so [`Self::index_size`] and [`Self::features_offset`] only fail
    /// for headers that were not produced by this function.
    pub fn read<R: Read + Seek>(reader: &mut R) -> FgbResult<FileHeader> {
        let file = flatgeobuf::FgbReader::open(&mut *reader).map_err(header_error)?;
        let table = file.header();

        let envelope = table
            .envelope()
            .filter(|e| e.len() >= 4)
            .map(|e| BoundingBox::new(e.get(0), e.get(1), e.get(2), e.get(3)));
        let geometry_type = GeometryType::try_from(table.geometry_type()).map_err(|tag| {
            FgbError::InvalidHeader(format!("unknown geometry type tag {}", tag))
        })?;
        let columns = table
            .columns()
            .map(|columns| columns.iter().map(|c| ColumnDescriptor::from_column(&c)).collect())
            .unwrap_or_default();

        let mut header = FileHeader {
            name: table.name().map(str::to_string),
            envelope,
            geometry_type,
            has_z: table.has_z(),
            has_m: table.has_m(),
            has_t: table.has_t(),
            has_tm: table.has_tm(),
            columns,
            feature_count: table.features_count(),
            index_node_size: table.index_node_size(),
            srid: table.crs().map(|crs| crs.code()).unwrap_or(0),
            title: table.title().map(str::to_string),
            description: table.description().map(str::to_string),
            metadata: table.metadata().map(str::to_string),
            index_byte_offset: 0,
        };
        drop(file);

        header.index_byte_offset = reader.stream_position()?;
        header.features_offset()?;
        Ok(header)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn has_index(&self) -> bool {
        self.index_node_size > 0 && self.feature_count > 0
    }

    /// Byte size of the packed index region.
    pub fn index_size(&self) -> FgbResult<u64> {
        packed_rtree::index_size(self.feature_count, self.index_node_size)
    }

    /// Absolute offset of the first feature.
    pub fn features_offset(&self) -> FgbResult<u64> {
        self.index_byte_offset
            .checked_add(self.index_size()?)
            .ok_or_else(|| FgbError::InvalidHeader("feature section offset overflows".to_string()))
    }
}
