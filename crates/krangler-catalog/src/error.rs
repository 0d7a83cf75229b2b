use krangler_codec::CodecError;
use krangler_types::{DepotId, ManifestId};

/// Errors from manifest catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// No entry of this kind is recorded for the manifest.
    #[error("no {kind} recorded for depot {depot} manifest {manifest}")]
    NotFound {
        kind: &'static str,
        depot: DepotId,
        manifest: ManifestId,
    },

    /// A different entry is already recorded under the same ids. Entries are
    /// immutable once recorded.
    #[error("a different {kind} is already recorded for depot {depot} manifest {manifest}")]
    Conflict {
        kind: &'static str,
        depot: DepotId,
        manifest: ManifestId,
    },

    /// A recorded entry could not be read back.
    #[error("corrupt catalog entry {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;
