//! Row/column access over a FlatGeobuf file.
//!
//! The file only supports forward reads and absolute seeks, while callers
//! ask for `(row, column)` in any order. [`FgbDriver`] bridges the two with
//! a virtual cursor and an [`OffsetCache`]:
//!
//! - asking for the row right after the last resolved one just keeps
//!   reading;
//! - any other jump restarts from the closest cached row offset at or
//!   before the target (or from the first feature), skipping records by
//!   their length prefix without decoding them.
//!
//! Resolution is row granular: asking for any column decodes the whole row
//! and keeps it until another row is resolved.

use log::{debug, trace, warn};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::config::DriverConfig;
use crate::errors::{FgbError, FgbResult};
use crate::header::FileHeader;
use crate::offset_cache::OffsetCache;
use crate::packed_rtree::{self, SpatialIndex};
use crate::record::{decode_record, GEOMETRY_FIELD_INDEX};
use crate::value::RowValue;

/// Size of the little endian length prefix in front of each record.
const LENGTH_PREFIX_SIZE: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    /// No row resolved, or the last resolution failed.
    Fresh,
    /// `last_row` is decoded in the current row buffer; `next_offset` is
    /// where the record after it starts, relative to the first feature.
    Positioned { last_row: u64, next_offset: u64 },
}

/// Read-only random access driver over a FlatGeobuf file.
///
/// Not thread safe: every access moves the shared cursor and may grow the
/// offset cache, so concurrent use needs external synchronization.
pub struct FgbDriver<R: Read + Seek = File> {
    reader: Option<BufReader<R>>,
    /// Absolute stream position, `None` when unknown.
    position: Option<u64>,
    stream_len: u64,
    header: FileHeader,
    features_offset: u64,
    config: DriverConfig,
    cache: OffsetCache,
    cursor: CursorState,
    current_row: Vec<RowValue>,
    /// Loaded on the first spatial query.
    spatial_index: Option<SpatialIndex>,
}

impl FgbDriver<File> {
    /// Opens the file at `path` with the default configuration.
    pub fn open<P: AsRef<Path>>(path: P) -> FgbResult<Self> {
        Self::open_with_config(path, DriverConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: DriverConfig) -> FgbResult<Self> {
        let file = File::open(path.as_ref())?;
        debug!("Opening FlatGeobuf file {}", path.as_ref().display());
        Self::from_reader_with_config(file, config)
    }
}

impl<R: Read + Seek> FgbDriver<R> {
    pub fn from_reader(reader: R) -> FgbResult<Self> {
        Self::from_reader_with_config(reader, DriverConfig::default())
    }

    /// Parses the header of `reader` and prepares the driver.
    ///
    /// With `warm_cache_on_open` set and an index present, the offset cache
    /// is seeded before returning.
    pub fn from_reader_with_config(mut reader: R, config: DriverConfig) -> FgbResult<Self> {
        let stream_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let mut reader = BufReader::new(reader);
        let header = FileHeader::read(&mut reader)?;
        let features_offset = header.features_offset()?;
        if features_offset > stream_len {
            return Err(FgbError::InvalidHeader(format!(
                "features start at {} but the file has only {} bytes",
                features_offset, stream_len
            )));
        }

        debug!(
            "FlatGeobuf header: {} features, {} columns, geometry {:?}, srid {}, index node size {}, features at {}",
            header.feature_count,
            header.column_count(),
            header.geometry_type,
            header.srid,
            header.index_node_size,
            features_offset
        );

        let field_count = header.column_count() + 1;
        let mut driver = Self {
            reader: Some(reader),
            position: Some(header.index_byte_offset),
            stream_len,
            header,
            features_offset,
            config,
            cache: OffsetCache::new(),
            cursor: CursorState::Fresh,
            current_row: vec![RowValue::Null; field_count],
            spatial_index: None,
        };

        if driver.config.warm_cache_on_open && driver.header.has_index() {
            driver.warm_cache_from_index()?;
        }
        Ok(driver)
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Absolute offset of the first feature.
    pub fn features_offset(&self) -> u64 {
        self.features_offset
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn row_count(&self) -> u64 {
        self.header.feature_count
    }

    /// Number of fields per row: the geometry plus one per column.
    pub fn field_count(&self) -> usize {
        self.header.column_count() + 1
    }

    /// Sum of declared column widths. Advisory only.
    pub fn estimated_row_byte_size(&self) -> u64 {
        self.header
            .columns
            .iter()
            .map(|column| column.declared_width())
            .sum()
    }

    pub fn geometry_field_index(&self) -> usize {
        GEOMETRY_FIELD_INDEX
    }

    pub fn set_cache_row_address(&mut self, enabled: bool) {
        self.config.cache_row_address = enabled;
    }

    pub fn is_cache_row_address(&self) -> bool {
        self.config.cache_row_address
    }

    pub fn offset_cache(&self) -> &OffsetCache {
        &self.cache
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// Returns the value of `column` in `row`.
    ///
    /// Any failure to reach or decode the row is reported as
    /// [`FgbError::RowNotFound`] with the underlying error as its source.
    pub fn get_field(&mut self, row: u64, column: usize) -> FgbResult<RowValue> {
        let field_count = self.field_count();
        if column >= field_count {
            return Err(FgbError::ColumnOutOfRange {
                column,
                field_count,
            });
        }
        self.resolve(row)?;
        Ok(self.current_row[column].clone())
    }

    /// Resolves `row` and returns all of its fields.
    pub fn row(&mut self, row: u64) -> FgbResult<&[RowValue]> {
        self.resolve(row)?;
        Ok(&self.current_row)
    }

    /// Decodes the record starting at `offset` (relative to the first
    /// feature) into a new row.
    ///
    /// The virtual cursor is left alone; the next resolution seeks back to
    /// where it needs to be.
    pub fn fields_at_offset(&mut self, offset: u64) -> FgbResult<Vec<RowValue>> {
        let mut row = vec![RowValue::Null; self.field_count()];
        let start = self.record_position(offset)?;
        self.seek_to(start)?;
        let bytes = self.read_record(offset)?;
        decode_record(&bytes, &self.header, &mut row)?;
        Ok(row)
    }

    /// Seeds the offset cache with the offset of every feature, read from
    /// the leaf level of the spatial index in one pass.
    ///
    /// The cache is left untouched if the read fails.
    pub fn warm_cache_from_index(&mut self) -> FgbResult<()> {
        let count = self.header.feature_count;
        if count == 0 {
            return Ok(());
        }
        if !self.header.has_index() {
            return Err(FgbError::NoSpatialIndex);
        }

        let node_size = self.header.index_node_size;
        let ids: Vec<u64> = (0..count).collect();
        let offsets = self.with_index(|index| {
            packed_rtree::read_feature_offsets(index, count, node_size, &ids)
        })?;
        self.cache.seed(offsets);
        debug!("Seeded {} row offsets from the spatial index", count);
        Ok(())
    }

    /// Always fails: the driver is read-only.
    pub fn insert_row(&mut self, _values: &[RowValue]) -> FgbResult<()> {
        Err(FgbError::Unsupported(
            "FlatGeobuf driver is read-only, rows cannot be inserted".to_string(),
        ))
    }

    /// Releases the file. Calling it again is a no-op.
    pub fn close(&mut self) -> FgbResult<()> {
        if self.reader.take().is_some() {
            debug!("Closed FlatGeobuf driver");
        }
        self.position = None;
        self.cursor = CursorState::Fresh;
        self.spatial_index = None;
        Ok(())
    }

    /// The in-memory spatial index, read from the file on first use.
    pub(crate) fn spatial_index(&mut self) -> FgbResult<&SpatialIndex> {
        if self.spatial_index.is_none() {
            let count = self.header.feature_count;
            let node_size = self.header.index_node_size;
            let index = self.with_index(|reader| SpatialIndex::read(reader, count, node_size))?;
            debug!("Loaded spatial index over {} features", index.num_items());
            self.spatial_index = Some(index);
        }
        self.spatial_index.as_ref().ok_or(FgbError::NoSpatialIndex)
    }

    /// Runs `f` with the stream positioned at the start of the index.
    pub(crate) fn with_index<T>(
        &mut self,
        f: impl FnOnce(&mut BufReader<R>) -> FgbResult<T>,
    ) -> FgbResult<T> {
        let index_start = self.header.index_byte_offset;
        let reader = self.reader.as_mut().ok_or(FgbError::Closed)?;
        self.position = None;
        reader.seek(SeekFrom::Start(index_start))?;
        f(reader)
    }

    fn resolve(&mut self, row: u64) -> FgbResult<()> {
        if row >= self.header.feature_count {
            return Err(FgbError::row_not_found(row, None));
        }
        if self.reader.is_none() {
            return Err(FgbError::row_not_found(row, Some(FgbError::Closed)));
        }
        if let CursorState::Positioned { last_row, .. } = self.cursor {
            if last_row == row {
                return Ok(());
            }
        }

        match self.scan_to(row) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("Failed to resolve row {}: {}", row, err);
                self.cursor = CursorState::Fresh;
                Err(FgbError::row_not_found(row, Some(err)))
            }
        }
    }

    /// Moves the virtual cursor onto `row` and decodes it.
    fn scan_to(&mut self, row: u64) -> FgbResult<()> {
        let (mut next_row, mut offset) = match self.cursor {
            _ if row == 0 => (0, 0),
            CursorState::Positioned {
                last_row,
                next_offset,
            } if last_row + 1 == row => (row, next_offset),
            _ => self.cache.floor_entry(row).unwrap_or((0, 0)),
        };
        let start = self.record_position(offset)?;
        self.seek_to(start)?;

        while next_row < row {
            let len = self.read_length_prefix(offset)?;
            self.skip(len)?;
            offset += LENGTH_PREFIX_SIZE + len;
            next_row += 1;
            if self.config.cache_row_address {
                self.cache.record(next_row, offset);
            }
            trace!("Skipped to row {} at offset {}", next_row, offset);
        }

        let start = offset;
        let bytes = self.read_record(offset)?;
        offset += LENGTH_PREFIX_SIZE + bytes.len() as u64;

        let mut values = vec![RowValue::Null; self.field_count()];
        decode_record(&bytes, &self.header, &mut values)?;
        self.current_row = values;

        if self.config.cache_row_address && row + 1 < self.header.feature_count {
            self.cache.record(row + 1, offset);
        }
        self.cursor = CursorState::Positioned {
            last_row: row,
            next_offset: offset,
        };
        trace!("Decoded row {} at offset {}", row, start);
        Ok(())
    }

    fn seek_to(&mut self, absolute: u64) -> FgbResult<()> {
        let known = self.position.take();
        let reader = self.reader.as_mut().ok_or(FgbError::Closed)?;
        match known {
            Some(pos) if pos == absolute => {}
            Some(pos) => reader.seek_relative(absolute as i64 - pos as i64)?,
            None => {
                reader.seek(SeekFrom::Start(absolute))?;
            }
        }
        self.position = Some(absolute);
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> FgbResult<()> {
        let known = self.position.take();
        let reader = self.reader.as_mut().ok_or(FgbError::Closed)?;
        reader.read_exact(buf)?;
        self.position = known.map(|pos| pos + buf.len() as u64);
        Ok(())
    }

    fn skip(&mut self, len: u64) -> FgbResult<()> {
        let known = self.position.take();
        let reader = self.reader.as_mut().ok_or(FgbError::Closed)?;
        reader.seek_relative(len as i64)?;
        self.position = known.map(|pos| pos + len);
        Ok(())
    }

    /// Absolute position of the record at `offset`. Offsets come from the
    /// cache, the index or the caller, so they are checked against the file.
    fn record_position(&self, offset: u64) -> FgbResult<u64> {
        self.features_offset
            .checked_add(offset)
            .filter(|&start| start <= self.stream_len)
            .ok_or_else(|| {
                FgbError::malformed(format!("record offset {} lies outside the file", offset))
            })
    }

    /// Reads the length prefix of the record at `offset`, which must be the
    /// current position.
    fn read_length_prefix(&mut self, offset: u64) -> FgbResult<u64> {
        let start = self.record_position(offset)?;
        if start + LENGTH_PREFIX_SIZE > self.stream_len {
            return Err(FgbError::malformed(format!(
                "record at offset {} starts past the end of the data",
                offset
            )));
        }
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE as usize];
        self.read_exact(&mut prefix)?;
        let len = u32::from_le_bytes(prefix) as u64;
        if start + LENGTH_PREFIX_SIZE + len > self.stream_len {
            return Err(FgbError::malformed(format!(
                "record at offset {} claims {} bytes, past the end of the file",
                offset, len
            )));
        }
        Ok(len)
    }

    /// Reads the record at `offset`, which must be the current position.
    fn read_record(&mut self, offset: u64) -> FgbResult<Vec<u8>> {
        let len = self.read_length_prefix(offset)?;
        let mut bytes = vec![0u8; len as usize];
        self.read_exact(&mut bytes)?;
        Ok(bytes)
    }
}
