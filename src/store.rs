//! Row-indexed hash storage.
//!
//! The store owns every hash in the forest: one vector of hashes per row,
//! indexed by the row-local offset of a position, plus a map from leaf hash
//! to leaf position used for proving. Geometry is not the store's business;
//! callers pass in the [`ForestState`] the access should be resolved
//! against.

use std::collections::HashMap;
use std::hash::{BuildHasherDefault, Hasher};

use crate::error::{Error, Result};
use crate::node::Hash;
use crate::state::ForestState;

/// Pass-through hasher for the leaf position map.
///
/// `Hash` keys feed a single `write_u64` of their leading bytes, which this
/// hasher returns unchanged; hashing an already-uniform digest again would
/// be wasted work.
#[derive(Default)]
pub(crate) struct LeafMapHasher(u64);

impl Hasher for LeafMapHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write_u64(&mut self, n: u64) {
        self.0 = n;
    }

    fn write(&mut self, bytes: &[u8]) {
        let mut digest = [0u8; 8];
        let take = bytes.len().min(8);
        digest[..take].copy_from_slice(&bytes[..take]);
        self.0 = u64::from_le_bytes(digest);
    }
}

type LeafMap = HashMap<Hash, u64, BuildHasherDefault<LeafMapHasher>>;

/// Hash storage for the whole forest.
pub(crate) struct ForestStore {
    // rows[r][i] is the hash at position row_offset(r) + i
    rows: Vec<Vec<Hash>>,
    position_map: LeafMap,
}

impl ForestStore {
    pub fn new() -> Self {
        ForestStore {
            rows: vec![Vec::new()],
            position_map: LeafMap::default(),
        }
    }

    /// Rebuild a store from restored row data, populating the position map
    /// from row 0.
    pub fn from_rows(rows: Vec<Vec<Hash>>, num_leaves: u64) -> Result<Self> {
        let mut store = ForestStore {
            rows,
            position_map: LeafMap::default(),
        };
        if store.rows.is_empty() {
            store.rows.push(Vec::new());
        }
        if store.rows[0].len() as u64 != num_leaves {
            return Err(Error::CorruptFile(format!(
                "row 0 holds {} hashes for {} leaves",
                store.rows[0].len(),
                num_leaves
            )));
        }
        for (pos, hash) in store.rows[0].iter().enumerate() {
            if store.position_map.insert(*hash, pos as u64).is_some() {
                return Err(Error::CorruptFile(format!(
                    "duplicate leaf hash at position {pos}"
                )));
            }
        }
        Ok(store)
    }

    /// The hash stored at `pos`.
    pub fn read(&self, state: ForestState, pos: u64) -> Result<Hash> {
        let row = state.detect_row(pos);
        let offset = state.row_offset(row);
        self.rows
            .get(row as usize)
            .and_then(|row_data| row_data.get((pos - offset) as usize))
            .copied()
            .ok_or(Error::PositionOutOfRange(pos))
    }

    /// Overwrite the hash stored at `pos`.
    pub fn write(&mut self, state: ForestState, pos: u64, hash: Hash) -> Result<()> {
        let row = state.detect_row(pos);
        let offset = state.row_offset(row);
        let slot = self
            .rows
            .get_mut(row as usize)
            .and_then(|row_data| row_data.get_mut((pos - offset) as usize))
            .ok_or(Error::PositionOutOfRange(pos))?;
        *slot = hash;
        Ok(())
    }

    /// Swap the `range` hashes starting at `from` with those starting at
    /// `to`. Both runs must live on the same row and not overlap. On row 0
    /// the position map follows the hashes.
    pub fn swap_range(&mut self, state: ForestState, from: u64, to: u64, range: u64) -> Result<()> {
        let row = state.detect_row(from);
        debug_assert_eq!(row, state.detect_row(to));
        let offset = state.row_offset(row);
        let from_local = from - offset;
        let to_local = to - offset;

        let row_data = self
            .rows
            .get_mut(row as usize)
            .ok_or(Error::PositionOutOfRange(from))?;
        let len = row_data.len() as u64;
        if from_local + range > len || to_local + range > len {
            return Err(Error::PositionOutOfRange(from.max(to) + range - 1));
        }

        for i in 0..range {
            row_data.swap((from_local + i) as usize, (to_local + i) as usize);
            if row == 0 {
                let moved_here = row_data[(from_local + i) as usize];
                let moved_there = row_data[(to_local + i) as usize];
                self.position_map.insert(moved_here, from + i);
                self.position_map.insert(moved_there, to + i);
            }
        }
        Ok(())
    }

    /// Append a leaf hash on row 0 and record its position.
    pub fn append_leaf(&mut self, hash: Hash, pos: u64) -> Result<()> {
        if self.position_map.contains_key(&hash) {
            return Err(Error::DuplicateLeaf);
        }
        debug_assert_eq!(self.rows[0].len() as u64, pos);
        self.rows[0].push(hash);
        self.position_map.insert(hash, pos);
        Ok(())
    }

    /// Append a freshly merged parent hash at the end of `row`.
    pub fn append_row_hash(&mut self, row: u8, hash: Hash) -> Result<()> {
        let row_data = self.rows.get_mut(row as usize).ok_or_else(|| {
            Error::InvariantViolation(format!("row {row} missing during merge"))
        })?;
        row_data.push(hash);
        Ok(())
    }

    /// Make sure every row the forest will need for `next_num_leaves`
    /// leaves exists and has capacity.
    pub fn reserve(&mut self, next_num_leaves: u64) {
        let rows_needed = ForestState::new(next_num_leaves).num_rows() as usize + 1;
        if self.rows.len() < rows_needed {
            self.rows.resize_with(rows_needed, Vec::new);
        }
        for (row, row_data) in self.rows.iter_mut().enumerate() {
            let want = (next_num_leaves >> row) as usize;
            row_data.reserve(want.saturating_sub(row_data.len()));
        }
    }

    /// Shrink every row to its length under `next_num_leaves` leaves. The
    /// position map is untouched; callers drop the truncated leaves first.
    pub fn truncate_to(&mut self, next_num_leaves: u64) {
        for (row, row_data) in self.rows.iter_mut().enumerate() {
            row_data.truncate((next_num_leaves >> row) as usize);
        }
    }

    pub fn contains_leaf(&self, hash: &Hash) -> bool {
        self.position_map.contains_key(hash)
    }

    pub fn leaf_position(&self, hash: &Hash) -> Option<u64> {
        self.position_map.get(hash).copied()
    }

    /// Drop a leaf hash from the position map.
    pub fn forget_leaf(&mut self, hash: &Hash) {
        self.position_map.remove(hash);
    }

    /// Number of leaves tracked by the position map.
    pub fn tracked_leaves(&self) -> usize {
        self.position_map.len()
    }

    /// Row data in bottom-up order, for snapshotting.
    pub fn rows(&self) -> &[Vec<Hash>] {
        &self.rows
    }

    /// Number of hashes currently stored on `row`.
    pub fn row_len(&self, row: u8) -> usize {
        self.rows.get(row as usize).map_or(0, Vec::len)
    }
}
