//! Error types for depot state operations.

use krangler_types::{DepotId, ManifestId};
use thiserror::Error;

/// Errors that can occur while reading or updating depot state.
#[derive(Debug, Error)]
pub enum DepotError {
    /// Marking this manifest would move the depot backwards.
    #[error("stale manifest for depot {depot}: {offered} is older than installed {installed}")]
    StaleManifest {
        depot: DepotId,
        installed: ManifestId,
        offered: ManifestId,
    },

    /// The persisted state file could not be decoded.
    #[error("corrupt depot state: {0}")]
    Decode(String),

    /// I/O error during file-based state operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for depot state operations.
pub type DepotResult<T> = std::result::Result<T, DepotError>;
