//! Dynamic hash accumulator over a forest of perfect binary Merkle trees.
//!
//! The accumulator commits to a set of 32-byte leaf hashes by holding the
//! roots of a forest whose tree sizes follow the binary expansion of the
//! leaf count: one perfect tree per set bit. Leaves can be added, deleted
//! (surviving leaves are relocated by swapping whole subtrees) and proven
//! against the current root set with compact batch proofs.
//!
//! # Core types
//!
//! - [`MemForest`] — the in-memory forest (add, modify, prove, commit).
//! - [`BatchProof`] — batch inclusion proof (targets + sibling hashes).
//! - [`ForestState`] — pure position arithmetic for any leaf count.
//! - [`Accumulator`] — the backend capability set with shared add/remove
//!   drivers.
//!
//! # Example
//!
//! ```
//! use merkle_forest::{Hash, Leaf, MemForest};
//!
//! let mut forest = MemForest::new(128);
//! let leaves: Vec<Leaf> = (1u8..=3)
//!     .map(|i| Leaf::new(Hash([i; 32]), false))
//!     .collect();
//! forest.add(&leaves)?;
//!
//! let proof = forest.prove(&[leaves[0].hash])?;
//! assert_eq!(proof.targets(), &[0]);
//! # Ok::<(), merkle_forest::Error>(())
//! ```

#![warn(missing_docs)]

mod accumulator;
mod error;
mod forest;
mod node;
mod persist;
mod proof;
mod state;
mod store;
#[cfg(test)]
mod tests;

pub use accumulator::Accumulator;
pub use error::{Error, Result};
pub use forest::MemForest;
pub use node::{parent_hash, Hash, Leaf, NodeRef};
pub use proof::{compute_roots, BatchProof};
pub use state::ForestState;
