//! Hash primitives and the pooled node view.
//!
//! Hashes are opaque 32-byte values; the only operation the forest performs
//! on them is the Blake3 parent merge. Nodes are lightweight views over
//! positions in the forest, handed out as indices into a bounded arena so
//! that rehash chains can walk parent edges without owning any tree data.

use std::fmt;

use crate::error::{Error, Result};

/// A 32-byte node hash.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", faster_hex::hex_string(&self.0))
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }
}

/// Leaf hashes are uniformly distributed already, so map keys use only the
/// first 8 bytes read little-endian.
impl std::hash::Hash for Hash {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        let mut digest = [0u8; 8];
        digest.copy_from_slice(&self.0[..8]);
        state.write_u64(u64::from_le_bytes(digest));
    }
}

/// A leaf queued for insertion.
///
/// The `remember` flag is advisory metadata for callers that track proving
/// data for a subset of leaves; the forest itself treats all leaves the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leaf {
    /// The leaf hash committed to by the accumulator.
    pub hash: Hash,
    /// Whether the caller wants to keep proving data for this leaf.
    pub remember: bool,
}

impl Leaf {
    /// Create a leaf from its hash.
    pub fn new(hash: Hash, remember: bool) -> Self {
        Leaf { hash, remember }
    }
}

impl From<Hash> for Leaf {
    fn from(hash: Hash) -> Self {
        Leaf::new(hash, false)
    }
}

/// Compute the parent hash of two sibling nodes: `blake3(left || right)`.
pub fn parent_hash(left: &Hash, right: &Hash) -> Hash {
    let mut input = [0u8; 64];
    input[..32].copy_from_slice(&left.0);
    input[32..].copy_from_slice(&right.0);
    Hash(*blake3::hash(&input).as_bytes())
}

/// Handle to a pooled node.
///
/// A handle is only valid for the forest that allocated it and only until
/// that forest releases it; it carries no data of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRef(usize);

/// A pooled node: the position it views, the leaf count it was created
/// under, and an optional cached hash.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NodeEntry {
    pub num_leaves: u64,
    pub position: u64,
    pub hash: Option<Hash>,
}

/// Bounded arena of node views.
///
/// Slots are recycled through a free list; the arena never holds more than
/// `max_nodes` live entries at once. The capacity is a construction-time
/// parameter of the forest, sized for the deepest rehash chain plus one
/// handle per root.
pub(crate) struct NodePool {
    slots: Vec<Option<NodeEntry>>,
    free: Vec<usize>,
    max_nodes: usize,
}

impl NodePool {
    pub fn new(max_nodes: usize) -> Self {
        NodePool {
            slots: Vec::new(),
            free: Vec::new(),
            max_nodes,
        }
    }

    /// Allocate a slot for `entry`, recycling released slots first.
    pub fn alloc(&mut self, entry: NodeEntry) -> Result<NodeRef> {
        if let Some(index) = self.free.pop() {
            self.slots[index] = Some(entry);
            return Ok(NodeRef(index));
        }
        if self.slots.len() >= self.max_nodes {
            return Err(Error::PoolExhausted);
        }
        self.slots.push(Some(entry));
        Ok(NodeRef(self.slots.len() - 1))
    }

    pub fn get(&self, node: NodeRef) -> Result<&NodeEntry> {
        self.slots
            .get(node.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::InvariantViolation(format!("dangling node handle {}", node.0)))
    }

    pub fn get_mut(&mut self, node: NodeRef) -> Result<&mut NodeEntry> {
        self.slots
            .get_mut(node.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::InvariantViolation(format!("dangling node handle {}", node.0)))
    }

    pub fn release(&mut self, node: NodeRef) {
        if let Some(slot) = self.slots.get_mut(node.0) {
            if slot.take().is_some() {
                self.free.push(node.0);
            }
        }
    }

    #[cfg(test)]
    pub fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_hash_is_deterministic_and_ordered() {
        let left = Hash([0xAA; 32]);
        let right = Hash([0xBB; 32]);

        assert_eq!(parent_hash(&left, &right), parent_hash(&left, &right));
        assert_ne!(
            parent_hash(&left, &right),
            parent_hash(&right, &left),
            "parent hash must depend on child order"
        );

        let mut input = [0u8; 64];
        input[..32].copy_from_slice(&left.0);
        input[32..].copy_from_slice(&right.0);
        assert_eq!(parent_hash(&left, &right).0, *blake3::hash(&input).as_bytes());
    }

    #[test]
    fn test_hash_debug_is_hex() {
        let hash = Hash([0xAB; 32]);
        let rendered = format!("{:?}", hash);
        assert!(rendered.contains("abab"), "got {rendered}");
    }

    #[test]
    fn test_pool_recycles_released_slots() {
        let mut pool = NodePool::new(2);
        let entry = NodeEntry {
            num_leaves: 1,
            position: 0,
            hash: None,
        };
        let a = pool.alloc(entry).expect("first alloc");
        let _b = pool.alloc(entry).expect("second alloc");
        assert_eq!(pool.live(), 2);

        pool.release(a);
        assert_eq!(pool.live(), 1);
        pool.alloc(entry).expect("alloc after release");
        assert_eq!(pool.live(), 2);
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut pool = NodePool::new(1);
        let entry = NodeEntry {
            num_leaves: 1,
            position: 0,
            hash: None,
        };
        pool.alloc(entry).expect("within capacity");
        assert!(matches!(pool.alloc(entry), Err(Error::PoolExhausted)));
    }

    #[test]
    fn test_pool_rejects_released_handle() {
        let mut pool = NodePool::new(1);
        let node = pool
            .alloc(NodeEntry {
                num_leaves: 1,
                position: 0,
                hash: None,
            })
            .expect("alloc");
        pool.release(node);
        assert!(matches!(
            pool.get(node),
            Err(Error::InvariantViolation(_))
        ));
    }
}
