//! Content-addressed chunk storage for krangler.
//!
//! Every chunk is keyed by the SHA-1 of its uncompressed bytes and stored
//! at most once, no matter how many files, manifests, or source formats refer
//! to it.
//!
//! # Backends
//!
//! All backends implement the [`ChunkStore`] trait:
//!
//! - [`InMemoryChunkStore`]: concurrent map for tests and embedding
//! - [`FsChunkStore`]: durable sharded directory tree with atomic commits
//!
//! # Design Rules
//!
//! 1. Chunks are immutable once committed.
//! 2. Verify, then stage, then publish: nothing unverified is ever indexed.
//! 3. The index record is the only durability signal.
//! 4. Commits lock per key, and per shard across processes; reads take no
//!    commit lock.
//! 5. A lost commit race is reported as `AlreadyPresent`, not an error.

pub mod compression;
pub mod config;
pub mod error;
pub mod fs;
pub mod memory;
pub mod payload;
pub mod record;
pub mod traits;

pub use compression::{Compression, CompressionRegistry, Decompressor};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use fs::FsChunkStore;
pub use memory::InMemoryChunkStore;
pub use payload::{CommitResult, PutPayload};
pub use record::{ChunkRecord, StoredChunk};
pub use traits::ChunkStore;
