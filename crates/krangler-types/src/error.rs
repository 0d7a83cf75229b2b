use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// A violation of the chunk layout rules of a [`crate::FileEntry`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("chunk {index} starts at {found}, expected {expected}")]
    Gap {
        index: usize,
        expected: u64,
        found: u64,
    },

    #[error("chunk {index} at {found} overlaps the previous chunk ending at {expected}")]
    Overlap {
        index: usize,
        expected: u64,
        found: u64,
    },

    #[error("chunk {index} has zero length")]
    EmptyChunk { index: usize },

    #[error("chunks cover {actual} bytes but the file declares {declared}")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("directory entries cannot reference chunks")]
    DirectoryWithChunks,
}
