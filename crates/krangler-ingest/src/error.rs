use krangler_catalog::CatalogError;
use krangler_codec::CodecError;
use krangler_depot::DepotError;
use krangler_store::StoreError;
use krangler_types::{ContentId, DepotId, ManifestId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("decode failed: {0}")]
    Codec(#[from] CodecError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("depot state error: {0}")]
    Depot(#[from] DepotError),

    #[error("manifest catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("chunk source failed for {key}: {reason}")]
    Source { key: ContentId, reason: String },

    #[error("chunk source has no data for {} chunk(s) of depot {depot} manifest {manifest}", keys.len())]
    Unavailable {
        depot: DepotId,
        manifest: ManifestId,
        keys: Vec<ContentId>,
    },

    #[error("depot {depot} manifest {manifest} still misses {missing} chunk(s) after ingestion")]
    Incomplete {
        depot: DepotId,
        manifest: ManifestId,
        missing: usize,
    },

    #[error("invalid ingest config: {0}")]
    Config(String),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
