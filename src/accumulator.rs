//! The shared accumulator engine.
//!
//! [`Accumulator`] splits an accumulator backend into a small capability set
//! (allocate a leaf, merge two roots, swap two subtrees, finalize a removal)
//! and the batch add/remove drivers built on top of it. Any backend
//! implementing the capability set gets the drivers for free; the in-memory
//! [`MemForest`](crate::MemForest) is one such backend.

use crate::error::{Error, Result};
use crate::node::{parent_hash, Hash, Leaf, NodeRef};
use crate::state::ForestState;

/// Capability set and drivers of a forest accumulator backend.
pub trait Accumulator {
    /// Current number of leaves.
    fn num_leaves(&self) -> u64;

    /// Record a new leaf count after a structural change.
    fn set_num_leaves(&mut self, num_leaves: u64);

    /// Append one leaf on row 0 and push a root handle for it. Called with
    /// the leaf count still at its pre-append value, which is also the new
    /// leaf's position.
    fn new_leaf(&mut self, leaf: &Leaf) -> Result<NodeRef>;

    /// Pop the two trailing roots and push their parent, storing
    /// `parent_hash` at `parent_pos`. The popped roots sit on the same row,
    /// adjacent in position.
    fn merge_root(&mut self, parent_pos: u64, parent_hash: Hash) -> Result<NodeRef>;

    /// Exchange the subtrees rooted at the same-row positions `from` and
    /// `to`, row by row. Returns a handle on the parent of `to`, whose hash
    /// is now stale.
    fn swap_sub_trees(&mut self, from: u64, to: u64) -> Result<NodeRef>;

    /// Complete a removal: drop the trailing leaves from the position map,
    /// shrink every row, select the roots of the shrunken forest and set the
    /// new leaf count.
    fn finalize_remove(&mut self, next_num_leaves: u64) -> Result<()>;

    /// Hash of a pooled node, reading through to storage if not cached.
    fn node_hash(&self, node: NodeRef) -> Result<Hash>;

    /// Position a pooled node views.
    fn node_position(&self, node: NodeRef) -> Result<u64>;

    /// Recompute a node's hash from its children and store it back.
    fn rehash_node(&mut self, node: NodeRef) -> Result<()>;

    /// Handle on the parent of `node`, or `None` if `node` is a root under
    /// the leaf count it was created with.
    fn parent_node(&mut self, node: NodeRef) -> Result<Option<NodeRef>>;

    /// Return a node handle to the pool.
    fn release_node(&mut self, node: NodeRef);

    /// Hash of the `nth` root counting back from the most recently pushed.
    fn root_from_top(&self, nth: usize) -> Result<Hash>;

    /// Append leaves in order, merging equal-height roots as they appear.
    ///
    /// Each leaf becomes a row-0 root; the number of merges it triggers is
    /// the number of trailing set bits of the pre-append leaf count, one per
    /// pair of equal-height roots the append completes.
    fn add_batch(&mut self, leaves: &[Leaf]) -> Result<()> {
        for leaf in leaves {
            let prev_leaves = self.num_leaves();
            let mut top = self.new_leaf(leaf)?;
            self.set_num_leaves(prev_leaves + 1);

            let state = ForestState::new(prev_leaves + 1);
            for _ in 0..prev_leaves.trailing_ones() {
                let left = self.root_from_top(1)?;
                let right = self.node_hash(top)?;
                let merged = parent_hash(&left, &right);
                let parent_pos = state.parent(self.node_position(top)?);
                top = self.merge_root(parent_pos, merged)?;
            }
        }
        Ok(())
    }

    /// Delete the leaves at `targets`.
    ///
    /// Plans the deletion as per-row subtree swaps that migrate every doomed
    /// leaf past the new leaf count, executes the swaps bottom-up while
    /// rehashing the nodes whose children moved (climbing each dirty path
    /// one row per iteration), then truncates.
    fn remove_batch(&mut self, targets: &[u64]) -> Result<()> {
        if targets.is_empty() {
            return Ok(());
        }
        let state = ForestState::new(self.num_leaves());
        let mut sorted = targets.to_vec();
        sorted.sort_unstable();
        if !state.check_targets_sanity(&sorted) {
            return Err(Error::BadTarget(format!(
                "{} deletions against {} leaves",
                targets.len(),
                self.num_leaves()
            )));
        }

        let swaps = state.transform(&sorted);
        let mut dirty: Vec<NodeRef> = Vec::new();
        for row in 0..state.num_rows() {
            for swap in &swaps[row as usize] {
                dirty.push(self.swap_sub_trees(swap.from, swap.to)?);
            }

            // rehash accumulated dirt now that this row's swaps have
            // settled, then queue each parent for the next iteration
            let mut next_dirty = Vec::new();
            for node in std::mem::take(&mut dirty) {
                self.rehash_node(node)?;
                let parent = self.parent_node(node)?;
                self.release_node(node);
                if let Some(parent) = parent {
                    let pos = self.node_position(parent)?;
                    let duplicate = match next_dirty.last() {
                        Some(&last) => self.node_position(last)? == pos,
                        None => false,
                    };
                    if duplicate {
                        self.release_node(parent);
                    } else {
                        next_dirty.push(parent);
                    }
                }
            }
            dirty = next_dirty;
        }
        debug_assert!(dirty.is_empty(), "rehash chains end at roots");

        self.finalize_remove(state.num_leaves() - sorted.len() as u64)
    }
}
