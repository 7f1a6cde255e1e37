//! Bounding box queries over the packed spatial index.

use log::debug;
use std::io::{Read, Seek};

use crate::bounding_box::BoundingBox;
use crate::driver::FgbDriver;
use crate::errors::{FgbError, FgbResult};
use crate::packed_rtree::SearchHit;

/// Candidate rows of a spatial query.
///
/// A bidirectional cursor over the feature ids whose index envelope
/// intersects the query box, in file order. It starts before the first
/// candidate. The cursor only yields ids; resolve them with
/// [`FgbDriver::get_field`] or, using [`CandidateCursor::current_offset`],
/// [`FgbDriver::fields_at_offset`].
#[derive(Debug, Clone, Default)]
pub struct CandidateCursor {
    hits: Vec<SearchHit>,
    /// 0 is before the first hit, `i + 1` is on hit `i`, `len + 1` is past
    /// the last one.
    position: usize,
}

impl CandidateCursor {
    pub(crate) fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits, position: 0 }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Id of the candidate under the cursor.
    pub fn current(&self) -> Option<u64> {
        self.current_hit().map(|hit| hit.index)
    }

    /// Offset of the current candidate's record, relative to the first
    /// feature.
    pub fn current_offset(&self) -> Option<u64> {
        self.current_hit().map(|hit| hit.offset)
    }

    /// Steps back and returns the candidate there.
    pub fn previous(&mut self) -> Option<u64> {
        self.position = self.position.saturating_sub(1);
        self.current()
    }

    /// Moves back before the first candidate.
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// All candidate ids, regardless of the cursor position.
    pub fn ids(&self) -> Vec<u64> {
        self.hits.iter().map(|hit| hit.index).collect()
    }

    fn current_hit(&self) -> Option<&SearchHit> {
        self.position
            .checked_sub(1)
            .and_then(|i| self.hits.get(i))
    }
}

impl Iterator for CandidateCursor {
    type Item = u64;

    /// Advances and returns the candidate there.
    fn next(&mut self) -> Option<u64> {
        if self.position <= self.hits.len() {
            self.position += 1;
        }
        self.current()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.hits.len().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl<R: Read + Seek> FgbDriver<R> {
    /// Finds the rows whose indexed envelope intersects `bbox`.
    ///
    /// Fails with [`FgbError::NoSpatialIndex`] when the file was written
    /// without an index; an empty file yields an empty cursor. The first
    /// query reads the index into memory; later ones reuse it.
    pub fn query_by_bounding_box(&mut self, bbox: &BoundingBox) -> FgbResult<CandidateCursor> {
        let header = self.header();
        let feature_count = header.feature_count;
        if feature_count == 0 {
            return Ok(CandidateCursor::default());
        }
        if !header.has_index() {
            return Err(FgbError::NoSpatialIndex);
        }

        let hits = self.spatial_index()?.search(bbox)?;
        debug!("Spatial query {} matched {} of {} rows", bbox, hits.len(), feature_count);
        Ok(CandidateCursor::new(hits))
    }
}
