use std::collections::BTreeMap;
use std::ops::Bound::{Included, Unbounded};

/// Sparse map from row index to the byte offset where that row's record
/// starts, relative to the first feature.
///
/// An entry for row `i` means the bytes before its offset hold exactly `i`
/// complete records. The file is immutable while a driver reads it, so
/// entries are only ever added.
///
/// # Population
/// - [`OffsetCache::record`] is fed by sequential scans as rows are passed.
/// - [`OffsetCache::seed`] installs every offset read from the spatial
///   index at once.
///
/// # Lookup
/// [`OffsetCache::floor_entry`] returns the closest known row at or before
/// the requested one, which is where a forward scan should restart.
#[derive(Debug, Default, Clone)]
pub struct OffsetCache {
    offsets: BTreeMap<u64, u64>,
}

impl OffsetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `row` starts at `offset`.
    pub fn record(&mut self, row: u64, offset: u64) {
        self.offsets.insert(row, offset);
    }

    /// Installs a complete offset table, `offsets[i]` being the start of row
    /// `i`. Takes the finished table so a failed read never leaves the cache
    /// half seeded.
    pub fn seed(&mut self, offsets: Vec<u64>) {
        self.offsets.extend(
            offsets
                .into_iter()
                .enumerate()
                .map(|(row, offset)| (row as u64, offset)),
        );
    }

    pub fn get(&self, row: u64) -> Option<u64> {
        self.offsets.get(&row).copied()
    }

    /// Greatest cached row `<= row` and its offset.
    pub fn floor_entry(&self, row: u64) -> Option<(u64, u64)> {
        self.offsets
            .range((Unbounded, Included(row)))
            .next_back()
            .map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}
