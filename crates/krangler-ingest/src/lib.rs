//! # krangler-ingest
//!
//! The reconciliation engine. It turns a source artifact into stored chunks
//! and an updated depot state:
//!
//! 1. decode the artifact with a [`Codec`](krangler_codec::Codec) (nothing is
//!    written if this fails);
//! 2. ask the chunk store which referenced chunks it lacks;
//! 3. fetch those from a [`ChunkSource`] (or slice them out of a pack
//!    archive) and commit them in parallel;
//! 4. confirm every chunk is present, record the manifest (and a pack's
//!    skeleton) in the [`ManifestCatalog`](krangler_catalog::ManifestCatalog),
//!    then mark the manifest installed.

pub mod config;
pub mod error;
pub mod ingestor;
pub mod source;

pub use config::IngestConfig;
pub use error::{IngestError, IngestResult};
pub use ingestor::{IngestReport, Ingestor};
pub use source::{ChunkSource, FetchedChunk, InMemoryChunkSource};
