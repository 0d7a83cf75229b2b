//! Durable filesystem chunk store.
//!
//! ```text
//! <root>/chunks/<hh>/<hex>.blob   stored payload
//! <root>/index/<hh>/<hex>.rec     framed ChunkRecord; its presence commits the chunk
//! <root>/staging/                 in-flight temporary files, cleared on open
//! <root>/locks/<hh>.lock          advisory commit lock for one shard
//! ```
//!
//! A commit writes the blob to staging, syncs it, renames it into place, then
//! publishes the index record with a no-clobber rename. A crash at any point
//! leaves either an unindexed blob (invisible, overwritten by the next
//! commit of that key) or a fully valid chunk.
//!
//! Several stores may share one root, in this process or others. Commits and
//! deletes hold the shard's lock file exclusively, so a blob is never
//! replaced underneath a published record.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use fs4::FileExt;
use krangler_types::ContentId;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::compression::CompressionRegistry;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::payload::{prepare, CommitResult, PutPayload};
use crate::record::{ChunkRecord, StoredChunk};
use crate::traits::ChunkStore;

const CHUNKS_DIR: &str = "chunks";
const INDEX_DIR: &str = "index";
const STAGING_DIR: &str = "staging";
const LOCKS_DIR: &str = "locks";

/// Chunk store on a local filesystem, sharded by the first key byte.
pub struct FsChunkStore {
    root: PathBuf,
    config: StoreConfig,
    registry: CompressionRegistry,
    /// Per-key commit locks, held only for the duration of one commit.
    commit_locks: DashMap<ContentId, Arc<Mutex<()>>>,
}

impl FsChunkStore {
    /// Open (or create) a store at `config.root`, clearing leftover staging
    /// files from interrupted commits.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let root = config.root.clone();
        fs::create_dir_all(root.join(CHUNKS_DIR))?;
        fs::create_dir_all(root.join(INDEX_DIR))?;
        fs::create_dir_all(root.join(STAGING_DIR))?;
        fs::create_dir_all(root.join(LOCKS_DIR))?;

        let store = Self {
            root,
            config,
            registry: CompressionRegistry::new(),
            commit_locks: DashMap::new(),
        };
        let swept = store.sweep_staging()?;
        info!(root = %store.root.display(), swept, "opened chunk store");
        Ok(store)
    }

    /// Open a store at `root` with default settings.
    pub fn open_at(root: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::open(StoreConfig::at(root))
    }

    pub fn with_registry(mut self, registry: CompressionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the blob for `key`, whether or not it exists.
    pub fn blob_path(&self, key: &ContentId) -> PathBuf {
        self.root.join(blob_location(key))
    }

    pub fn record_path(&self, key: &ContentId) -> PathBuf {
        let hex = key.to_hex();
        self.root
            .join(INDEX_DIR)
            .join(&hex[..2])
            .join(format!("{hex}.rec"))
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    fn sweep_staging(&self) -> StoreResult<usize> {
        let mut swept = 0;
        for entry in fs::read_dir(self.staging_dir())? {
            let entry = entry?;
            let path = entry.path();
            let result = if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => swept += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if swept > 0 {
            warn!(swept, "removed staging files from interrupted commits");
        }
        Ok(swept)
    }

    fn lock_path(&self, key: &ContentId) -> PathBuf {
        let hex = key.to_hex();
        self.root.join(LOCKS_DIR).join(format!("{}.lock", &hex[..2]))
    }

    /// Take the exclusive lock shared by every store on this root for the
    /// shard holding `key`. Dropping the file releases it.
    fn acquire_shard_lock(&self, key: &ContentId) -> StoreResult<File> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path(key))?;
        file.lock_exclusive()?;
        Ok(file)
    }

    /// Run `f` holding both the in-process key lock and the shard lock file.
    fn with_commit_lock<T>(
        &self,
        key: &ContentId,
        f: impl FnOnce() -> StoreResult<T>,
    ) -> StoreResult<T> {
        let lock = self.commit_lock(key);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.acquire_shard_lock(key).and_then(|_shard| f())
        };
        self.release_commit_lock(key);
        result
    }

    fn commit_lock(&self, key: &ContentId) -> Arc<Mutex<()>> {
        Arc::clone(self.commit_locks.entry(*key).or_default().value())
    }

    fn release_commit_lock(&self, key: &ContentId) {
        // Two owners left means the map and the caller: nobody else is waiting.
        self.commit_locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) <= 2);
    }

    /// Write `bytes` to a staging file, sync it, and return it unpublished.
    fn stage(&self, bytes: &[u8]) -> StoreResult<NamedTempFile> {
        let mut staged = NamedTempFile::new_in(self.staging_dir())?;
        staged.write_all(bytes)?;
        if self.config.fsync {
            staged.as_file().sync_all()?;
        }
        Ok(staged)
    }

    fn sync_dir(&self, dir: &Path) -> StoreResult<()> {
        if self.config.fsync {
            sync_dir(dir)?;
        }
        Ok(())
    }

    fn read_record(&self, key: &ContentId) -> StoreResult<Option<ChunkRecord>> {
        match fs::read(self.record_path(key)) {
            Ok(bytes) => ChunkRecord::from_bytes(key, &bytes).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn commit(&self, key: &ContentId, payload: PutPayload<'_>) -> StoreResult<CommitResult> {
        if self.exists(key)? {
            debug!(key = %key, "chunk committed concurrently");
            return Ok(CommitResult::AlreadyPresent);
        }
        let prepared = prepare(key, payload, &self.registry, &self.config)?;

        let blob_path = self.blob_path(key);
        let shard_dir = parent_of(&blob_path)?;
        fs::create_dir_all(shard_dir)?;
        self.stage(&prepared.stored)?
            .persist(&blob_path)
            .map_err(|e| StoreError::Io(e.error))?;
        self.sync_dir(shard_dir)?;

        let record = ChunkRecord {
            key: *key,
            uncompressed_len: prepared.uncompressed_len,
            stored_len: prepared.stored_len(),
            compression: prepared.compression,
            stored_crc32: prepared.crc32(),
            location: blob_location(key).to_string_lossy().into_owned(),
        };
        let record_path = self.record_path(key);
        let index_dir = parent_of(&record_path)?;
        fs::create_dir_all(index_dir)?;
        match self.stage(&record.to_bytes()?)?.persist_noclobber(&record_path) {
            Ok(_) => {}
            // Another process committed the same key first.
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!(key = %key, "index record already published");
                return Ok(CommitResult::AlreadyPresent);
            }
            Err(e) => return Err(StoreError::Io(e.error)),
        }
        self.sync_dir(index_dir)?;

        debug!(
            key = %key,
            bytes = record.uncompressed_len,
            stored = record.stored_len,
            compression = %record.compression,
            "stored chunk"
        );
        Ok(CommitResult::Stored)
    }
}

impl ChunkStore for FsChunkStore {
    fn put(&self, key: &ContentId, payload: PutPayload<'_>) -> StoreResult<CommitResult> {
        if self.exists(key)? {
            return Ok(CommitResult::AlreadyPresent);
        }
        self.with_commit_lock(key, || self.commit(key, payload))
    }

    fn exists(&self, key: &ContentId) -> StoreResult<bool> {
        Ok(self.record_path(key).try_exists()?)
    }

    fn record(&self, key: &ContentId) -> StoreResult<Option<ChunkRecord>> {
        self.read_record(key)
    }

    fn get(&self, key: &ContentId) -> StoreResult<StoredChunk> {
        let record = self.read_record(key)?.ok_or(StoreError::NotFound(*key))?;
        let payload = match fs::read(self.root.join(&record.location)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::IndexCorruption {
                    key: *key,
                    reason: format!("blob {} is missing", record.location),
                });
            }
            Err(e) => return Err(e.into()),
        };
        if payload.len() as u64 != u64::from(record.stored_len) {
            return Err(StoreError::IndexCorruption {
                key: *key,
                reason: format!(
                    "blob is {} bytes, index records {}",
                    payload.len(),
                    record.stored_len
                ),
            });
        }
        let chunk = StoredChunk { record, payload };
        chunk.check_crc()?;
        Ok(chunk)
    }

    fn delete(&self, key: &ContentId) -> StoreResult<bool> {
        self.with_commit_lock(key, || {
            // Unpublish first so the chunk is never visible without its blob.
            let existed = remove_if_present(&self.record_path(key))?;
            remove_if_present(&self.blob_path(key))?;
            if existed {
                debug!(key = %key, "deleted chunk");
            }
            Ok(existed)
        })
    }

    fn keys(&self) -> StoreResult<Vec<ContentId>> {
        let mut keys = Vec::new();
        for shard in fs::read_dir(self.root.join(INDEX_DIR))? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let name = entry?.file_name();
                let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".rec")) else {
                    continue;
                };
                match ContentId::from_hex(stem) {
                    Ok(key) => keys.push(key),
                    Err(_) => warn!(file = stem, "ignoring unrecognized index file"),
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn registry(&self) -> &CompressionRegistry {
        &self.registry
    }
}

impl std::fmt::Debug for FsChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsChunkStore")
            .field("root", &self.root)
            .field("registry", &self.registry)
            .finish()
    }
}

fn blob_location(key: &ContentId) -> PathBuf {
    let hex = key.to_hex();
    Path::new(CHUNKS_DIR)
        .join(&hex[..2])
        .join(format!("{hex}.blob"))
}

fn parent_of(path: &Path) -> StoreResult<&Path> {
    path.parent().ok_or_else(|| {
        StoreError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        ))
    })
}

fn remove_if_present(path: &Path) -> StoreResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
