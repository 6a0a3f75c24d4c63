//! Error types for codec construction and shard operations

use thiserror::Error;

/// Errors that can occur while constructing a codec or coding shards
#[derive(Debug, Error)]
pub enum Error {
    /// Fewer shards supplied than the codec was configured for, or too few
    /// present to reconstruct
    #[error("too few shards given")]
    TooFewShards,

    /// Present shards disagree in length, or a length is not a multiple of
    /// the codec's shard size multiple
    #[error("shard sizes do not match")]
    ShardSize,

    /// Every shard in the list is absent or empty
    #[error("no shard data")]
    ShardNoData,

    /// The operation needs a prior reconstruction pass
    #[error("reconstruction required as one or more data shards are missing")]
    ReconstructRequired,

    /// Data shard count is zero
    #[error("cannot create codec with zero data shards")]
    InvalidShardCount,

    /// Total shard count exceeds what the codec family supports
    #[error("cannot create codec with more than {0} total shards")]
    MaxShardCount(usize),

    /// Coding matrix dimensions overflow
    #[error("invalid row size")]
    InvalidRowSize,

    /// The decoding matrix for this erasure pattern has no inverse
    #[error("matrix is singular")]
    SingularMatrix,

    /// The operation is not implemented by this codec family
    #[error("operation not supported")]
    NotSupported,

    /// Not enough data to fill the requested number of shards, or a join
    /// asked for more bytes than the shards contain
    #[error("not enough data to fill the number of requested shards")]
    ShortData,

    /// A caller-supplied matrix has the wrong shape
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// I/O error while joining shards into a writer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for Result with codec errors
pub type Result<T> = std::result::Result<T, Error>;
