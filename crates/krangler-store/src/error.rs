use krangler_types::ContentId;

use crate::compression::Compression;

/// Errors from chunk store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested chunk is not indexed.
    #[error("chunk not found: {0}")]
    NotFound(ContentId),

    /// Chunk content does not hash to its key, or a stored blob no longer
    /// matches the checksum recorded when it was committed.
    #[error("checksum mismatch for chunk {key}: {detail}")]
    ChecksumMismatch { key: ContentId, detail: String },

    /// Decompressed length disagrees with the declared uncompressed length.
    #[error("truncated chunk {key}: declared {declared} bytes, got {actual}")]
    TruncatedChunk {
        key: ContentId,
        declared: u64,
        actual: u64,
    },

    /// No decompressor is registered for the declared algorithm.
    #[error("unknown compression algorithm {0}")]
    UnknownCompressionAlgorithm(Compression),

    /// A decompressor rejected its input outright.
    #[error("failed to decompress chunk {key}: {reason}")]
    Decompression { key: ContentId, reason: String },

    /// A chunk payload does not fit the 32-bit length fields.
    #[error("chunk {key} is too large ({len} bytes)")]
    ChunkTooLarge { key: ContentId, len: u64 },

    /// An index record is unreadable or points at an invalid blob.
    #[error("index corruption for chunk {key}: {reason}")]
    IndexCorruption { key: ContentId, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid store configuration.
    #[error("invalid store configuration: {0}")]
    Config(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
