use std::collections::HashSet;

use krangler_types::ContentId;

use crate::compression::CompressionRegistry;
use crate::error::StoreResult;
use crate::payload::{CommitResult, PutPayload};
use crate::record::{ChunkRecord, StoredChunk};

/// Content-addressed chunk store.
///
/// All implementations must satisfy these invariants:
/// - At most one physical copy is kept per key.
/// - `put` of an already indexed key is a no-op returning
///   [`CommitResult::AlreadyPresent`], without verifying the offered bytes.
/// - A chunk becomes visible to `exists`/`get` only once its index record is
///   committed, and it is fully verified before that happens.
/// - Concurrent `put`s of one key produce exactly one `Stored`.
/// - Readers never wait on commits of other keys.
pub trait ChunkStore: Send + Sync {
    /// Verify and commit a chunk under `key`.
    fn put(&self, key: &ContentId, payload: PutPayload<'_>) -> StoreResult<CommitResult>;

    /// Whether `key` is indexed.
    fn exists(&self, key: &ContentId) -> StoreResult<bool>;

    /// Index metadata for `key`, if indexed.
    fn record(&self, key: &ContentId) -> StoreResult<Option<ChunkRecord>>;

    /// Read a chunk in its stored form. Fails with `NotFound` if the key is
    /// not indexed.
    fn get(&self, key: &ContentId) -> StoreResult<StoredChunk>;

    /// Remove a chunk. Returns `true` if it was indexed.
    ///
    /// Intended for garbage collection only; removing a chunk that a
    /// manifest still references makes that manifest unreconstructable.
    fn delete(&self, key: &ContentId) -> StoreResult<bool>;

    /// Every indexed key, sorted. Walks the whole index; meant for
    /// maintenance such as garbage collection, not for the ingest path.
    fn keys(&self) -> StoreResult<Vec<ContentId>>;

    /// Decompressors used to read stored payloads back.
    fn registry(&self) -> &CompressionRegistry;

    /// Keys from `keys` that are not indexed, deduplicated, in input order.
    fn missing(&self, keys: &[ContentId]) -> StoreResult<Vec<ContentId>> {
        let mut seen = HashSet::with_capacity(keys.len());
        let mut out = Vec::new();
        for key in keys {
            if seen.insert(*key) && !self.exists(key)? {
                out.push(*key);
            }
        }
        Ok(out)
    }

    /// Read a chunk and return its verified, uncompressed content.
    fn load(&self, key: &ContentId) -> StoreResult<Vec<u8>> {
        self.get(key)?.into_verified_bytes(self.registry())
    }

    /// Re-read a stored chunk and re-hash it.
    fn verify(&self, key: &ContentId) -> StoreResult<()> {
        self.load(key).map(|_| ())
    }
}
