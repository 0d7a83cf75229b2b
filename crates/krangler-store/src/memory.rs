use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use krangler_types::ContentId;
use tracing::debug;

use crate::compression::CompressionRegistry;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::payload::{prepare, CommitResult, PutPayload};
use crate::record::{ChunkRecord, StoredChunk};
use crate::traits::ChunkStore;

/// In-memory chunk store.
///
/// Intended for tests and embedding. Chunks live in a sharded concurrent map,
/// so commits of different keys never contend and the map's entry API serves
/// as the insert-if-absent primitive.
pub struct InMemoryChunkStore {
    chunks: DashMap<ContentId, StoredChunk>,
    registry: CompressionRegistry,
    config: StoreConfig,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            chunks: DashMap::new(),
            registry: CompressionRegistry::new(),
            config,
        }
    }

    pub fn with_registry(mut self, registry: CompressionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Number of chunks currently stored.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total stored (post-compression) bytes.
    pub fn stored_bytes(&self) -> u64 {
        self.chunks
            .iter()
            .map(|c| u64::from(c.record.stored_len))
            .sum()
    }
}

impl Default for InMemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStore for InMemoryChunkStore {
    fn put(&self, key: &ContentId, payload: PutPayload<'_>) -> StoreResult<CommitResult> {
        if self.chunks.contains_key(key) {
            return Ok(CommitResult::AlreadyPresent);
        }
        let prepared = prepare(key, payload, &self.registry, &self.config)?;
        match self.chunks.entry(*key) {
            Entry::Occupied(_) => {
                debug!(key = %key, "chunk committed concurrently");
                Ok(CommitResult::AlreadyPresent)
            }
            Entry::Vacant(slot) => {
                let record = ChunkRecord {
                    key: *key,
                    uncompressed_len: prepared.uncompressed_len,
                    stored_len: prepared.stored_len(),
                    compression: prepared.compression,
                    stored_crc32: prepared.crc32(),
                    location: "memory".into(),
                };
                debug!(
                    key = %key,
                    bytes = record.uncompressed_len,
                    stored = record.stored_len,
                    compression = %record.compression,
                    "stored chunk"
                );
                slot.insert(StoredChunk {
                    record,
                    payload: prepared.stored.into_owned(),
                });
                Ok(CommitResult::Stored)
            }
        }
    }

    fn exists(&self, key: &ContentId) -> StoreResult<bool> {
        Ok(self.chunks.contains_key(key))
    }

    fn record(&self, key: &ContentId) -> StoreResult<Option<ChunkRecord>> {
        Ok(self.chunks.get(key).map(|c| c.record.clone()))
    }

    fn get(&self, key: &ContentId) -> StoreResult<StoredChunk> {
        let chunk = self
            .chunks
            .get(key)
            .map(|c| c.value().clone())
            .ok_or(StoreError::NotFound(*key))?;
        chunk.check_crc()?;
        Ok(chunk)
    }

    fn delete(&self, key: &ContentId) -> StoreResult<bool> {
        Ok(self.chunks.remove(key).is_some())
    }

    fn keys(&self) -> StoreResult<Vec<ContentId>> {
        let mut keys: Vec<ContentId> = self.chunks.iter().map(|c| *c.key()).collect();
        keys.sort();
        Ok(keys)
    }

    fn registry(&self) -> &CompressionRegistry {
        &self.registry
    }
}

impl std::fmt::Debug for InMemoryChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryChunkStore")
            .field("chunk_count", &self.len())
            .finish()
    }
}
