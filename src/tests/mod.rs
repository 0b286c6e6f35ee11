
use crate::node::parent_hash;
use crate::{ForestState, Hash, Leaf, MemForest};

/// Plenty of node slots for any forest the tests build.
pub(crate) const TEST_POOL_NODES: usize = 1024;

/// Deterministic leaf hash: the 32-byte big-endian encoding of `i`.
pub(crate) fn leaf_hash_of(i: u64) -> Hash {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&i.to_be_bytes());
    Hash(bytes)
}

pub(crate) fn leaves_of(range: std::ops::Range<u64>) -> Vec<Leaf> {
    range.map(|i| Leaf::new(leaf_hash_of(i), false)).collect()
}

/// Check the structural invariants of a forest: the position map tracks
/// exactly the live leaves, every stored parent hash matches its children,
/// and the root handles line up with the layout's root positions.
pub(crate) fn check_invariants(forest: &MemForest) {
    let num_leaves = forest.num_leaves();
    let state = ForestState::new(num_leaves);

    assert_eq!(
        forest.tracked_leaves() as u64,
        num_leaves,
        "position map size"
    );
    for pos in 0..num_leaves {
        let leaf = forest.get_leaf(pos).expect("leaf readable");
        assert_eq!(
            forest.leaf_position(&leaf),
            Some(pos),
            "position map entry for leaf {pos}"
        );
    }

    for row in 1..=state.num_rows() {
        let offset = state.row_offset(row);
        for i in 0..(num_leaves >> row) {
            let pos = offset + i;
            let stored = forest.read_position(pos).expect("parent readable");
            let left = forest
                .read_position(state.child(pos, 0))
                .expect("left child readable");
            let right = forest
                .read_position(state.child(pos, 1))
                .expect("right child readable");
            assert_eq!(
                stored,
                parent_hash(&left, &right),
                "merkle link at position {pos}"
            );
        }
    }

    let roots = forest.roots().expect("roots");
    let root_positions = state.root_positions();
    assert_eq!(roots.len(), root_positions.len(), "root count");
    for (root, pos) in roots.iter().zip(root_positions) {
        assert_eq!(
            *root,
            forest.read_position(pos).expect("root readable"),
            "root hash at position {pos}"
        );
    }
}
