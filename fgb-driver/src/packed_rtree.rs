//! Access to the packed Hilbert R-Tree stored inline in FlatGeobuf files.
//!
//! The tree is static and complete: every level is stored contiguously,
//! root first, leaves last. Each node is a 40 byte item (four little endian
//! doubles for the envelope, one u64 offset). For leaves the offset is the
//! byte offset of the feature relative to the first feature; for internal
//! nodes it is the index of the node's first child.
//!
//! Searching goes through [`flatgeobuf::packed_r_tree::PackedRTree`] over an
//! in-memory copy of the index, read once and checked before use. The bulk
//! offset read streams over the leaf level only.

use byteorder::{ByteOrder, LittleEndian};
use flatgeobuf::packed_r_tree::{NodeItem, PackedRTree};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::Range;

use crate::bounding_box::BoundingBox;
use crate::errors::{FgbError, FgbResult};

/// Size of one serialized node item.
pub const NODE_ITEM_SIZE: u64 = 40;

/// Node size FlatGeobuf writers use unless told otherwise.
pub const DEFAULT_NODE_SIZE: u16 = PackedRTree::DEFAULT_NODE_SIZE;

/// A leaf whose envelope intersects a search box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchHit {
    /// Position of the feature in file order.
    pub index: u64,
    /// Feature byte offset relative to the first feature.
    pub offset: u64,
}

fn index_error(err: flatgeobuf::Error) -> FgbError {
    match err {
        flatgeobuf::Error::IO(e) => FgbError::Io(e),
        other => FgbError::malformed(format!("spatial index: {}", other)),
    }
}

/// Node index ranges per level, leaves first. `None` if the node count does
/// not fit in a u64.
fn level_bounds(num_items: u64, node_size: u16) -> Option<Vec<Range<u64>>> {
    let node_size = u64::from(node_size);

    let mut level_num_nodes = vec![num_items];
    let mut n = num_items;
    let mut num_nodes = n;
    loop {
        n = n.div_ceil(node_size);
        num_nodes = num_nodes.checked_add(n)?;
        level_num_nodes.push(n);
        if n == 1 {
            break;
        }
    }

    let mut remaining = num_nodes;
    Some(
        level_num_nodes
            .into_iter()
            .map(|size| {
                remaining -= size;
                remaining..remaining + size
            })
            .collect(),
    )
}

/// Byte size of the index for `num_items` features, 0 when there is none.
///
/// Node sizes below 2 and feature counts whose index would not be
/// addressable are rejected as an invalid header.
pub fn index_size(num_items: u64, node_size: u16) -> FgbResult<u64> {
    if num_items == 0 || node_size == 0 {
        return Ok(0);
    }
    if node_size < 2 {
        return Err(FgbError::InvalidHeader(format!(
            "index node size {} is below 2",
            node_size
        )));
    }
    level_bounds(num_items, node_size)
        .and_then(|bounds| bounds.first().map(|leaves| leaves.end))
        .and_then(|num_nodes| num_nodes.checked_mul(NODE_ITEM_SIZE))
        .filter(|&size| usize::try_from(size).is_ok())
        .ok_or_else(|| {
            FgbError::InvalidHeader(format!(
                "index for {} features with node size {} is too large",
                num_items, node_size
            ))
        })
}

/// Checks that every internal node points at the first child its position
/// implies, so that a search never leaves the level it descends into.
fn check_layout(bytes: &[u8], levels: &[Range<u64>], node_size: u16) -> FgbResult<()> {
    for pair in levels.windows(2) {
        let (children, parents) = (&pair[0], &pair[1]);
        for (k, node) in parents.clone().enumerate() {
            let at = (node * NODE_ITEM_SIZE) as usize;
            let offset = LittleEndian::read_u64(&bytes[at + 32..at + 40]);
            let expected = children.start + k as u64 * u64::from(node_size);
            if offset != expected {
                return Err(FgbError::malformed(format!(
                    "index node {} points at {}, expected {}",
                    node, offset, expected
                )));
            }
        }
    }
    Ok(())
}

/// In-memory copy of a file's packed index.
pub struct SpatialIndex {
    tree: PackedRTree,
    num_items: u64,
}

impl SpatialIndex {
    /// Reads the whole index. `reader` must be positioned at its start.
    pub fn read<R: Read>(reader: &mut R, num_items: u64, node_size: u16) -> FgbResult<Self> {
        let size = index_size(num_items, node_size)?;
        if size == 0 {
            return Err(FgbError::NoSpatialIndex);
        }
        let levels = level_bounds(num_items, node_size).unwrap_or_default();

        let mut bytes = vec![0u8; size as usize];
        reader.read_exact(&mut bytes)?;
        check_layout(&bytes, &levels, node_size)?;

        let tree = PackedRTree::from_buf(bytes.as_slice(), num_items as usize, node_size)
            .map_err(index_error)?;
        Ok(Self { tree, num_items })
    }

    pub fn num_items(&self) -> u64 {
        self.num_items
    }

    /// Finds every leaf intersecting `query`, in file order.
    pub fn search(&self, query: &BoundingBox) -> FgbResult<Vec<SearchHit>> {
        let mut hits: Vec<SearchHit> = self
            .tree
            .search(query.min_x, query.min_y, query.max_x, query.max_y)
            .map_err(index_error)?
            .into_iter()
            .map(|hit| SearchHit {
                index: hit.index as u64,
                offset: hit.offset as u64,
            })
            .collect();
        hits.sort_unstable_by_key(|hit| hit.index);
        Ok(hits)
    }
}

/// Reads the feature offsets of `ids` from the leaf level in one pass.
///
/// `reader` must be positioned at the start of the index and `ids` must be
/// strictly increasing and below `num_items`. The result is parallel to
/// `ids`.
pub fn read_feature_offsets<R: Read + Seek>(
    reader: &mut R,
    num_items: u64,
    node_size: u16,
    ids: &[u64],
) -> FgbResult<Vec<u64>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let size = index_size(num_items, node_size)?;
    if size == 0 {
        return Err(FgbError::NoSpatialIndex);
    }
    if let Some(&last) = ids.last() {
        if last >= num_items {
            return Err(FgbError::InvalidArgument(format!(
                "feature id {} out of range for {} features",
                last, num_items
            )));
        }
    }
    if ids.windows(2).any(|w| w[0] >= w[1]) {
        return Err(FgbError::InvalidArgument(
            "feature ids must be strictly increasing".to_string(),
        ));
    }

    let leaf_start = size - num_items * NODE_ITEM_SIZE;
    reader.seek(SeekFrom::Current(leaf_start as i64))?;

    let mut leaves = BufReader::new(reader);
    let mut offsets = Vec::with_capacity(ids.len());
    let mut next_leaf = 0u64;
    for &id in ids {
        if id > next_leaf {
            leaves.seek_relative(((id - next_leaf) * NODE_ITEM_SIZE) as i64)?;
        }
        offsets.push(NodeItem::from_reader(&mut leaves).map_err(index_error)?.offset);
        next_leaf = id + 1;
    }
    Ok(offsets)
}
