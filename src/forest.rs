//! The RAM-backed forest accumulator.

use std::collections::HashSet;
use std::path::Path;

use crate::accumulator::Accumulator;
use crate::error::{Error, Result};
use crate::node::{parent_hash, Hash, Leaf, NodeEntry, NodePool, NodeRef};
use crate::persist::SnapshotFile;
use crate::proof::BatchProof;
use crate::state::ForestState;
use crate::store::ForestStore;

/// A dynamic accumulator over a forest of perfect Merkle trees, with all
/// hashes held in memory.
///
/// The forest commits to a set of 32-byte leaf hashes. Leaves are appended
/// with [`MemForest::add`], replaced and deleted with [`MemForest::modify`],
/// and proven against the current roots with [`MemForest::prove`]. The tree
/// shape is fully determined by the leaf count: one perfect tree per set bit.
///
/// A forest is single-writer; methods taking `&mut self` must not be
/// interleaved through shared ownership. A forest opened with
/// [`MemForest::open`] snapshots itself to its backing file on
/// [`MemForest::commit`] and on drop.
pub struct MemForest {
    num_leaves: u64,
    store: ForestStore,
    pool: NodePool,
    // root handles, taller trees first; hashes are always cached
    roots: Vec<NodeRef>,
    snapshot: Option<SnapshotFile>,
}

impl MemForest {
    /// Create an empty in-memory forest.
    ///
    /// `max_nodes` bounds the node pool: one slot per root plus the longest
    /// rehash chain a removal can produce. A few hundred slots is plenty for
    /// any realistic forest.
    pub fn new(max_nodes: usize) -> Self {
        MemForest {
            num_leaves: 0,
            store: ForestStore::new(),
            pool: NodePool::new(max_nodes),
            roots: Vec::new(),
            snapshot: None,
        }
    }

    /// Open a file-backed forest, restoring the snapshot at `path` if one
    /// exists and creating an empty one otherwise.
    pub fn open(path: impl AsRef<Path>, max_nodes: usize) -> Result<Self> {
        let (mut snapshot, fresh) = SnapshotFile::open(path.as_ref())?;
        let mut forest = if fresh {
            MemForest::new(max_nodes)
        } else {
            let (num_leaves, rows) = snapshot.restore()?;
            let store = ForestStore::from_rows(rows, num_leaves)?;
            let mut forest = MemForest {
                num_leaves,
                store,
                pool: NodePool::new(max_nodes),
                roots: Vec::new(),
                snapshot: None,
            };
            forest.select_roots()?;
            forest
        };
        if fresh {
            snapshot.commit(forest.num_leaves, &forest.store)?;
        }
        forest.snapshot = Some(snapshot);
        Ok(forest)
    }

    /// Current number of leaves.
    pub fn num_leaves(&self) -> u64 {
        self.num_leaves
    }

    /// Whether the forest holds no leaves.
    pub fn is_empty(&self) -> bool {
        self.num_leaves == 0
    }

    /// Append `leaves` to the forest.
    ///
    /// All-or-nothing: fails with [`Error::DuplicateLeaf`] before any state
    /// change if a hash is already live or repeats within the batch.
    pub fn add(&mut self, leaves: &[Leaf]) -> Result<()> {
        let mut batch = HashSet::new();
        for leaf in leaves {
            if self.store.contains_leaf(&leaf.hash) || !batch.insert(leaf.hash) {
                return Err(Error::DuplicateLeaf);
            }
        }
        self.store.reserve(self.num_leaves + leaves.len() as u64);
        self.add_batch(leaves)?;
        debug_assert_eq!(self.store.tracked_leaves() as u64, self.num_leaves);
        Ok(())
    }

    /// Delete the leaves at `targets`, then append `new_leaves`.
    ///
    /// Both phases are validated up front so a failure leaves the forest
    /// unchanged. A hash removed by `targets` may be re-added in the same
    /// call.
    pub fn modify(&mut self, new_leaves: &[Leaf], targets: &[u64]) -> Result<()> {
        let state = ForestState::new(self.num_leaves);
        let mut sorted = targets.to_vec();
        sorted.sort_unstable();
        if !state.check_targets_sanity(&sorted) {
            return Err(Error::BadTarget(format!(
                "{} deletions against {} leaves",
                targets.len(),
                self.num_leaves
            )));
        }

        let mut removed = HashSet::new();
        for &target in &sorted {
            removed.insert(self.store.read(state, target)?);
        }
        let mut batch = HashSet::new();
        for leaf in new_leaves {
            let live = self.store.contains_leaf(&leaf.hash) && !removed.contains(&leaf.hash);
            if live || !batch.insert(leaf.hash) {
                return Err(Error::DuplicateLeaf);
            }
        }

        self.remove_batch(&sorted)?;
        self.store.reserve(self.num_leaves + new_leaves.len() as u64);
        self.add_batch(new_leaves)?;
        debug_assert_eq!(self.store.tracked_leaves() as u64, self.num_leaves);
        Ok(())
    }

    /// Produce a batch inclusion proof for `target_hashes`.
    ///
    /// The proof's target positions follow the caller's hash order; the
    /// proof hashes are the minimal sibling set, ordered ascending within
    /// each row, rows bottom-up. Fails with [`Error::UnknownLeaf`] if any
    /// hash is not live.
    pub fn prove(&self, target_hashes: &[Hash]) -> Result<BatchProof> {
        let mut targets = Vec::with_capacity(target_hashes.len());
        for hash in target_hashes {
            targets.push(self.store.leaf_position(hash).ok_or(Error::UnknownLeaf)?);
        }

        let mut sorted = targets.clone();
        sorted.sort_unstable();
        let state = ForestState::new(self.num_leaves);
        if !state.check_targets_sanity(&sorted) {
            return Err(Error::BadTarget("repeated proof target".into()));
        }

        let mut proof = Vec::new();
        for pos in state.proof_positions(&sorted) {
            proof.push(self.store.read(state, pos)?);
        }
        Ok(BatchProof::new(targets, proof))
    }

    /// Check that every hash in `target_hashes` is live in the forest.
    ///
    /// This does not re-derive roots from the proof; use
    /// [`compute_roots`](crate::compute_roots) against [`MemForest::roots`]
    /// for a full structural check.
    pub fn verify(&self, _proof: &BatchProof, target_hashes: &[Hash]) -> bool {
        target_hashes
            .iter()
            .all(|hash| self.store.contains_leaf(hash))
    }

    /// The root hashes, taller trees first.
    pub fn roots(&self) -> Result<Vec<Hash>> {
        self.roots
            .iter()
            .map(|&root| self.node_hash(root))
            .collect()
    }

    /// The leaf hash at position `pos`.
    pub fn get_leaf(&self, pos: u64) -> Result<Hash> {
        if pos >= self.num_leaves {
            return Err(Error::PositionOutOfRange(pos));
        }
        self.store.read(ForestState::new(self.num_leaves), pos)
    }

    /// Write the forest to its backing file, truncating it to the snapshot
    /// length. A no-op for in-memory forests.
    pub fn commit(&mut self) -> Result<()> {
        if let Some(snapshot) = self.snapshot.as_mut() {
            snapshot.commit(self.num_leaves, &self.store)?;
        }
        Ok(())
    }

    // Allocate root handles for the current leaf count, hashes cached.
    fn select_roots(&mut self) -> Result<()> {
        for root in self.roots.drain(..) {
            self.pool.release(root);
        }
        let state = ForestState::new(self.num_leaves);
        for pos in state.root_positions() {
            let hash = self.store.read(state, pos)?;
            let node = self.pool.alloc(NodeEntry {
                num_leaves: self.num_leaves,
                position: pos,
                hash: Some(hash),
            })?;
            self.roots.push(node);
        }
        Ok(())
    }
}

impl Accumulator for MemForest {
    fn num_leaves(&self) -> u64 {
        self.num_leaves
    }

    fn set_num_leaves(&mut self, num_leaves: u64) {
        self.num_leaves = num_leaves;
    }

    fn new_leaf(&mut self, leaf: &Leaf) -> Result<NodeRef> {
        let pos = self.num_leaves;
        self.store.append_leaf(leaf.hash, pos)?;
        let node = self.pool.alloc(NodeEntry {
            num_leaves: self.num_leaves,
            position: pos,
            hash: Some(leaf.hash),
        })?;
        self.roots.push(node);
        Ok(node)
    }

    fn merge_root(&mut self, parent_pos: u64, parent_hash: Hash) -> Result<NodeRef> {
        if self.roots.len() < 2 {
            return Err(Error::InvariantViolation(
                "merge requires two trailing roots".into(),
            ));
        }
        for root in self.roots.drain(self.roots.len() - 2..) {
            self.pool.release(root);
        }

        let state = ForestState::new(self.num_leaves);
        let row = state.detect_row(parent_pos);
        self.store.append_row_hash(row, parent_hash)?;
        debug_assert_eq!(
            self.store.row_len(row) as u64,
            parent_pos - state.row_offset(row) + 1,
            "merged parent lands at its row-local slot"
        );

        let node = self.pool.alloc(NodeEntry {
            num_leaves: self.num_leaves,
            position: parent_pos,
            hash: Some(parent_hash),
        })?;
        self.roots.push(node);
        Ok(node)
    }

    fn swap_sub_trees(&mut self, from: u64, to: u64) -> Result<NodeRef> {
        let state = ForestState::new(self.num_leaves);
        let row = state.detect_row(from);
        debug_assert_eq!(row, state.detect_row(to));

        let mut from = state.left_descendant(from, row);
        let mut to = state.left_descendant(to, row);
        let mut range = 1u64 << row;
        while range > 0 {
            self.store.swap_range(state, from, to, range)?;
            from = state.parent(from);
            to = state.parent(to);
            range >>= 1;
        }

        // `to` has climbed one row past the swapped subtree: the node whose
        // child hashes just changed
        self.pool.alloc(NodeEntry {
            num_leaves: self.num_leaves,
            position: to,
            hash: None,
        })
    }

    fn finalize_remove(&mut self, next_num_leaves: u64) -> Result<()> {
        debug_assert!(next_num_leaves <= self.num_leaves);
        let state = ForestState::new(self.num_leaves);
        for pos in next_num_leaves..self.num_leaves {
            let hash = self.store.read(state, pos)?;
            self.store.forget_leaf(&hash);
        }

        self.store.truncate_to(next_num_leaves);
        self.num_leaves = next_num_leaves;
        self.select_roots()?;
        debug_assert_eq!(self.store.tracked_leaves() as u64, next_num_leaves);
        Ok(())
    }

    fn node_hash(&self, node: NodeRef) -> Result<Hash> {
        let entry = self.pool.get(node)?;
        match entry.hash {
            Some(hash) => Ok(hash),
            None => self
                .store
                .read(ForestState::new(entry.num_leaves), entry.position),
        }
    }

    fn node_position(&self, node: NodeRef) -> Result<u64> {
        Ok(self.pool.get(node)?.position)
    }

    fn rehash_node(&mut self, node: NodeRef) -> Result<()> {
        let entry = *self.pool.get(node)?;
        let state = ForestState::new(entry.num_leaves);
        let left = self.store.read(state, state.child(entry.position, 0))?;
        let right = self.store.read(state, state.child(entry.position, 1))?;
        let hash = parent_hash(&left, &right);
        self.store.write(state, entry.position, hash)?;
        self.pool.get_mut(node)?.hash = Some(hash);
        Ok(())
    }

    fn parent_node(&mut self, node: NodeRef) -> Result<Option<NodeRef>> {
        let entry = *self.pool.get(node)?;
        let state = ForestState::new(entry.num_leaves);
        let row = state.detect_row(entry.position);
        if state.has_root(row) && state.root_position(row) == entry.position {
            return Ok(None);
        }
        let parent = self.pool.alloc(NodeEntry {
            num_leaves: entry.num_leaves,
            position: state.parent(entry.position),
            hash: None,
        })?;
        Ok(Some(parent))
    }

    fn release_node(&mut self, node: NodeRef) {
        self.pool.release(node);
    }

    fn root_from_top(&self, nth: usize) -> Result<Hash> {
        let index = self
            .roots
            .len()
            .checked_sub(nth + 1)
            .ok_or_else(|| Error::InvariantViolation("not enough roots".into()))?;
        self.node_hash(self.roots[index])
    }
}

#[cfg(test)]
impl MemForest {
    pub(crate) fn read_position(&self, pos: u64) -> Result<Hash> {
        self.store.read(ForestState::new(self.num_leaves), pos)
    }

    pub(crate) fn leaf_position(&self, hash: &Hash) -> Option<u64> {
        self.store.leaf_position(hash)
    }

    pub(crate) fn tracked_leaves(&self) -> usize {
        self.store.tracked_leaves()
    }
}

impl Drop for MemForest {
    fn drop(&mut self) {
        if self.snapshot.is_some() {
            // best effort; errors on teardown have nowhere to go
            let _ = self.commit();
        }
    }
}
