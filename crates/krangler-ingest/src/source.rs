//! Where chunk bytes come from during ingestion.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use krangler_crypto::ContentHasher;
use krangler_store::{Compression, PutPayload};
use krangler_types::{ChunkRef, ContentId, DepotId};

use crate::error::IngestResult;

/// Chunk bytes as delivered by a source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedChunk {
    /// `Compression::None` for raw content.
    pub compression: Compression,
    pub data: Vec<u8>,
}

impl FetchedChunk {
    pub fn raw(data: Vec<u8>) -> Self {
        Self {
            compression: Compression::None,
            data,
        }
    }

    pub fn compressed(compression: Compression, data: Vec<u8>) -> Self {
        Self { compression, data }
    }

    /// The store payload for this chunk, declared against `chunk`.
    pub fn payload<'a>(&'a self, chunk: &ChunkRef) -> PutPayload<'a> {
        match self.compression {
            Compression::None => PutPayload::Raw(&self.data),
            algorithm => PutPayload::Compressed {
                algorithm,
                data: &self.data,
                uncompressed_len: chunk.uncompressed_len,
            },
        }
    }
}

/// Supplies the bytes of chunks a manifest references, e.g. a CDN client.
///
/// Ingestion calls `fetch` only for chunks the store does not already hold,
/// possibly from several threads at once.
pub trait ChunkSource: Send + Sync {
    /// Fetch one chunk. `Ok(None)` means the source does not have it.
    fn fetch(&self, depot: DepotId, chunk: &ChunkRef) -> IngestResult<Option<FetchedChunk>>;
}

/// A [`ChunkSource`] serving chunks from memory.
#[derive(Debug, Default)]
pub struct InMemoryChunkSource {
    chunks: RwLock<HashMap<ContentId, FetchedChunk>>,
    fetches: AtomicUsize,
}

impl InMemoryChunkSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add raw content, returning its content address.
    pub fn insert_raw(&self, data: impl Into<Vec<u8>>) -> ContentId {
        let data = data.into();
        let key = ContentHasher::digest(&data);
        self.insert(key, FetchedChunk::raw(data));
        key
    }

    /// Add a chunk under an explicit key. The key is not checked here; the
    /// store verifies it on commit.
    pub fn insert(&self, key: ContentId, chunk: FetchedChunk) {
        self.chunks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, chunk);
    }

    /// Number of `fetch` calls served so far.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl ChunkSource for InMemoryChunkSource {
    fn fetch(&self, _depot: DepotId, chunk: &ChunkRef) -> IngestResult<Option<FetchedChunk>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&chunk.key)
            .cloned())
    }
}
