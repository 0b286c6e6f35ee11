//! Batch inclusion proofs.
//!
//! A [`BatchProof`] pairs the positions of the proven leaves with the
//! minimal set of sibling hashes needed to re-derive the roots covering
//! them. [`compute_roots`] is the pure mirror of proof generation: it walks
//! the same rows bottom-up, consuming proof hashes exactly where generation
//! emitted them.

use crate::error::{Error, Result};
use crate::node::{parent_hash, Hash};
use crate::state::ForestState;

/// An inclusion proof for a batch of leaves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchProof {
    // positions of the proven leaves, in the prover's caller order
    targets: Vec<u64>,
    // sibling hashes, ascending within each row, rows bottom-up
    proof: Vec<Hash>,
}

impl BatchProof {
    /// Assemble a proof from target positions and sibling hashes.
    pub fn new(targets: Vec<u64>, proof: Vec<Hash>) -> Self {
        BatchProof { targets, proof }
    }

    /// Positions of the proven leaves.
    pub fn targets(&self) -> &[u64] {
        &self.targets
    }

    /// The sibling hashes.
    pub fn hashes(&self) -> &[Hash] {
        &self.proof
    }

    /// Encode the proof.
    ///
    /// Layout: `u32` BE target count, each target as `u64` BE, `u32` BE
    /// hash count, each hash as its raw 32 bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(8 + 8 * self.targets.len() + 32 * self.proof.len());
        bytes.extend_from_slice(&(self.targets.len() as u32).to_be_bytes());
        for target in &self.targets {
            bytes.extend_from_slice(&target.to_be_bytes());
        }
        bytes.extend_from_slice(&(self.proof.len() as u32).to_be_bytes());
        for hash in &self.proof {
            bytes.extend_from_slice(&hash.0);
        }
        bytes
    }

    /// Decode a proof produced by [`BatchProof::serialize`].
    ///
    /// Rejects truncated input and trailing bytes.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);

        let target_count = reader.read_u32()? as usize;
        let mut targets = Vec::with_capacity(target_count.min(reader.remaining() / 8));
        for _ in 0..target_count {
            targets.push(reader.read_u64()?);
        }

        let hash_count = reader.read_u32()? as usize;
        let mut proof = Vec::with_capacity(hash_count.min(reader.remaining() / 32));
        for _ in 0..hash_count {
            proof.push(reader.read_hash()?);
        }

        if reader.remaining() != 0 {
            return Err(Error::InvalidProof(format!(
                "{} trailing bytes",
                reader.remaining()
            )));
        }
        Ok(BatchProof { targets, proof })
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        ByteReader { bytes }
    }

    fn remaining(&self) -> usize {
        self.bytes.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.bytes.len() < len {
            return Err(Error::InvalidProof("truncated proof".into()));
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().map_err(|_| {
            Error::InvalidProof("bad length prefix".into())
        })?))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_be_bytes(bytes.try_into().map_err(|_| {
            Error::InvalidProof("bad position bytes".into())
        })?))
    }

    fn read_hash(&mut self) -> Result<Hash> {
        let bytes = self.take(32)?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(bytes);
        Ok(Hash(hash))
    }
}

/// Re-derive the roots covered by a batch proof.
///
/// `targets` pairs each proven leaf position with its claimed hash; `proof`
/// holds the sibling hashes in the order proof generation emits them. On
/// success, returns `(position, hash)` for every root the targets roll up
/// to, shorter trees first. The result matches the accumulator's stored
/// roots exactly when the proof and the claimed hashes are genuine.
pub fn compute_roots(
    num_leaves: u64,
    targets: &[(u64, Hash)],
    proof: &[Hash],
) -> Result<Vec<(u64, Hash)>> {
    let state = ForestState::new(num_leaves);

    let mut row_nodes: Vec<(u64, Hash)> = targets.to_vec();
    row_nodes.sort_unstable_by_key(|(pos, _)| *pos);
    let positions: Vec<u64> = row_nodes.iter().map(|(pos, _)| *pos).collect();
    if !state.check_targets_sanity(&positions) {
        return Err(Error::BadTarget("invalid proof targets".into()));
    }

    let mut proof_iter = proof.iter();
    let mut roots = Vec::new();

    for row in 0..=state.num_rows() {
        if row_nodes.is_empty() {
            break;
        }
        let root_pos = state.has_root(row).then(|| state.root_position(row));
        let mut next_row = Vec::with_capacity(row_nodes.len());

        let mut i = 0;
        while i < row_nodes.len() {
            let (pos, hash) = row_nodes[i];
            if root_pos == Some(pos) {
                roots.push((pos, hash));
                i += 1;
                continue;
            }

            let sibling = state.sibling(pos);
            let parent = state.parent(pos);
            if row_nodes.get(i + 1).map(|(next, _)| *next) == Some(sibling) {
                let (_, sibling_hash) = row_nodes[i + 1];
                next_row.push((parent, parent_hash(&hash, &sibling_hash)));
                i += 2;
                continue;
            }

            let sibling_hash = proof_iter
                .next()
                .ok_or_else(|| Error::InvalidProof("ran out of proof hashes".into()))?;
            let merged = if pos & 1 == 0 {
                parent_hash(&hash, sibling_hash)
            } else {
                parent_hash(sibling_hash, &hash)
            };
            next_row.push((parent, merged));
            i += 1;
        }
        row_nodes = next_row;
    }

    if !row_nodes.is_empty() {
        return Err(Error::InvalidProof("targets did not resolve to roots".into()));
    }
    if proof_iter.next().is_some() {
        return Err(Error::InvalidProof("unused proof hashes".into()));
    }
    Ok(roots)
}
