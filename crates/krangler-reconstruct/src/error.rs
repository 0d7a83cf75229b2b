use krangler_store::StoreError;
use krangler_types::ContentId;

/// Errors from reconstructing a file or archive.
///
/// Every variant names the path being rebuilt so the caller can decide what
/// to re-fetch.
#[derive(Debug, thiserror::Error)]
pub enum ReconstructError {
    /// A referenced chunk is not in the store: ingestion is incomplete.
    #[error("{path}: missing chunk {key}")]
    MissingChunk { path: String, key: ContentId },

    /// A chunk (`key` set) or the whole output (`key` unset) failed
    /// verification.
    #[error("{path}: checksum mismatch: {detail}")]
    ChecksumMismatch {
        path: String,
        key: Option<ContentId>,
        detail: String,
    },

    /// Any other store failure while reading a chunk.
    #[error("{path}: store error: {source}")]
    Store {
        path: String,
        #[source]
        source: StoreError,
    },

    /// Directory entries carry no content.
    #[error("{0} is a directory")]
    NotAFile(String),

    /// A manifest path would escape the output root.
    #[error("refusing to write outside the output root: {0}")]
    UnsafePath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReconstructError {
    /// Classify a store error raised while fetching `key`.
    pub(crate) fn from_store(path: &str, key: &ContentId, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::MissingChunk {
                path: path.to_owned(),
                key: *key,
            },
            StoreError::ChecksumMismatch { detail, .. } => Self::ChecksumMismatch {
                path: path.to_owned(),
                key: Some(*key),
                detail: format!("chunk {key}: {detail}"),
            },
            other => Self::Store {
                path: path.to_owned(),
                source: other,
            },
        }
    }
}

pub type ReconstructResult<T> = Result<T, ReconstructError>;
