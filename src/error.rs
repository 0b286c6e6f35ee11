use thiserror::Error;

/// Alias for `core::result::Result<T, Error>`.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for forest operations.
///
/// The first four kinds are recoverable: the forest is left unchanged and the
/// caller may retry with different inputs. [`Error::PoolExhausted`] and
/// [`Error::InvariantViolation`] are fatal: the forest is left in an
/// unspecified (but memory-safe) state and must be discarded.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A leaf hash handed to an add operation is already part of the forest.
    /// Leaf hashes must be globally unique while they are live.
    #[error("leaf hash is already included in the accumulator")]
    DuplicateLeaf,

    /// A hash handed to a proof operation is not tracked by the forest.
    #[error("leaf hash is not included in the accumulator")]
    UnknownLeaf,

    /// A deletion or proof target is not a valid leaf position.
    #[error("invalid target: {0}")]
    BadTarget(String),

    /// A batch proof could not be resolved against the claimed leaves.
    #[error("invalid proof: {0}")]
    InvalidProof(String),

    /// A position does not exist under the current leaf count.
    #[error("position {0} out of range")]
    PositionOutOfRange(u64),

    /// The on-disk snapshot could not be parsed.
    #[error("corrupt snapshot: {0}")]
    CorruptFile(String),

    /// An I/O failure from the snapshot file.
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    /// The node pool ran out of slots. The pool capacity is a configuration
    /// parameter of the forest; hitting this means the forest was built with
    /// too small a pool for its workload.
    #[error("node pool exhausted")]
    PoolExhausted,

    /// An internal consistency check failed.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}
