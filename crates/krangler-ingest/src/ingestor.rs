use std::collections::HashMap;
use std::sync::Arc;

use krangler_catalog::ManifestCatalog;
use krangler_codec::{Codec, PackCodec, PackSkeleton, SourceKind};
use krangler_depot::{DepotError, DepotStateStore, InstallMode, MarkOutcome};
use krangler_store::{ChunkStore, CommitResult, PutPayload};
use krangler_types::{ChunkRef, ContentId, DepotId, Manifest, ManifestId};
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::error::{IngestError, IngestResult};
use crate::source::ChunkSource;

/// Summary of one successful ingestion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestReport {
    pub depot: DepotId,
    pub manifest: ManifestId,
    pub files: usize,
    /// Distinct chunks the manifest references.
    pub chunks_referenced: usize,
    /// Chunks this ingestion committed.
    pub stored: usize,
    /// Chunks that were already in the store, including ones another writer
    /// committed while this ingestion ran.
    pub already_present: usize,
    /// Uncompressed bytes of the chunks this ingestion committed.
    pub bytes_stored: u64,
    /// Whether the manifest was newly recorded in the catalog.
    pub cataloged: bool,
    pub depot_state: MarkOutcome,
}

enum ChunkOutcome {
    Stored(u64),
    AlreadyPresent,
    Unavailable(ContentId),
}

impl ChunkOutcome {
    fn from_commit(result: CommitResult, chunk: &ChunkRef) -> Self {
        match result {
            CommitResult::Stored => Self::Stored(u64::from(chunk.uncompressed_len)),
            CommitResult::AlreadyPresent => Self::AlreadyPresent,
        }
    }
}

/// Drives a decoded artifact into the chunk store, the manifest catalog and
/// then the depot state.
///
/// The manifest is cataloged and the depot marked installed only once every
/// chunk the manifest names is committed. Decoding happens before anything
/// is written, so a malformed artifact leaves every store untouched.
pub struct Ingestor {
    store: Arc<dyn ChunkStore>,
    catalog: Arc<dyn ManifestCatalog>,
    depot_state: Arc<dyn DepotStateStore>,
    pool: ThreadPool,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        catalog: Arc<dyn ManifestCatalog>,
        depot_state: Arc<dyn DepotStateStore>,
        config: IngestConfig,
    ) -> IngestResult<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallelism)
            .thread_name(|i| format!("krangler-ingest-{i}"))
            .build()
            .map_err(|e| IngestError::Config(e.to_string()))?;
        Ok(Self {
            store,
            catalog,
            depot_state,
            pool,
        })
    }

    /// Decode `bytes` with `codec` and fetch whatever the store lacks from
    /// `source`.
    pub fn ingest(
        &self,
        codec: &dyn Codec,
        bytes: &[u8],
        source: &dyn ChunkSource,
    ) -> IngestResult<IngestReport> {
        let manifest = codec.decode(bytes)?;
        debug!(
            kind = %codec.source_kind(),
            depot = %manifest.depot,
            manifest = %manifest.id,
            "decoded artifact"
        );
        self.ingest_manifest(&manifest, source)
    }

    /// Reconcile an already decoded manifest.
    pub fn ingest_manifest(
        &self,
        manifest: &Manifest,
        source: &dyn ChunkSource,
    ) -> IngestResult<IngestReport> {
        self.reconcile(manifest, None, |chunk| {
            let Some(fetched) = source.fetch(manifest.depot, chunk)? else {
                return Ok(ChunkOutcome::Unavailable(chunk.key));
            };
            let result = self.store.put(&chunk.key, fetched.payload(chunk))?;
            Ok(ChunkOutcome::from_commit(result, chunk))
        })
    }

    /// Decompose a pack archive, store its chunks straight from the archive
    /// bytes, and catalog its skeleton so the archive can be recomposed.
    pub fn ingest_pack(&self, codec: &PackCodec, bytes: &[u8]) -> IngestResult<IngestReport> {
        let parts = codec.decompose_archive(bytes)?;
        let pieces = parts.chunk_data();
        debug!(
            kind = %SourceKind::PackArchive,
            depot = %parts.manifest.depot,
            manifest = %parts.manifest.id,
            chunks = pieces.len(),
            "sliced pack archive"
        );

        self.reconcile(&parts.manifest, Some(&parts.skeleton), |chunk| {
            let Some(piece) = pieces.get(&chunk.key) else {
                return Ok(ChunkOutcome::Unavailable(chunk.key));
            };
            let result = self.store.put(&chunk.key, PutPayload::Raw(*piece))?;
            Ok(ChunkOutcome::from_commit(result, chunk))
        })
    }

    fn reconcile<F>(
        &self,
        manifest: &Manifest,
        skeleton: Option<&PackSkeleton>,
        commit: F,
    ) -> IngestResult<IngestReport>
    where
        F: Fn(&ChunkRef) -> IngestResult<ChunkOutcome> + Sync,
    {
        let (depot, id) = (manifest.depot, manifest.id);

        // Refuse a stale manifest before any chunk is written.
        if let Some(installed) = self.depot_state.installed(depot)? {
            if id < installed {
                return Err(DepotError::StaleManifest {
                    depot,
                    installed,
                    offered: id,
                }
                .into());
            }
        }

        let chunks = manifest.unique_chunks();
        let keys: Vec<ContentId> = chunks.iter().map(|c| c.key).collect();
        let missing = self.store.missing(&keys)?;
        let by_key: HashMap<ContentId, &ChunkRef> = chunks.iter().map(|c| (c.key, *c)).collect();
        let wanted: Vec<&ChunkRef> = missing.iter().filter_map(|k| by_key.get(k).copied()).collect();
        debug!(
            depot = %depot,
            manifest = %id,
            referenced = keys.len(),
            missing = wanted.len(),
            "computed missing chunks"
        );

        let outcomes: Vec<IngestResult<ChunkOutcome>> =
            self.pool.install(|| wanted.par_iter().map(|chunk| commit(*chunk)).collect());

        let mut stored = 0usize;
        let mut raced = 0usize;
        let mut bytes_stored = 0u64;
        let mut unavailable = Vec::new();
        for outcome in outcomes {
            match outcome? {
                ChunkOutcome::Stored(len) => {
                    stored += 1;
                    bytes_stored += len;
                }
                ChunkOutcome::AlreadyPresent => raced += 1,
                ChunkOutcome::Unavailable(key) => unavailable.push(key),
            }
        }
        if !unavailable.is_empty() {
            warn!(
                depot = %depot,
                manifest = %id,
                count = unavailable.len(),
                "chunk source could not supply every missing chunk"
            );
            return Err(IngestError::Unavailable {
                depot,
                manifest: id,
                keys: unavailable,
            });
        }

        let remaining = self.store.missing(&keys)?;
        if !remaining.is_empty() {
            return Err(IngestError::Incomplete {
                depot,
                manifest: id,
                missing: remaining.len(),
            });
        }

        // The skeleton is only useful next to its manifest, so it goes first.
        if let Some(skeleton) = skeleton {
            self.catalog.put_skeleton(skeleton)?;
        }
        let cataloged = self.catalog.put_manifest(manifest)?;

        let depot_state = self
            .depot_state
            .mark_installed(depot, id, InstallMode::Advance)?;

        let report = IngestReport {
            depot,
            manifest: id,
            files: manifest.files().count(),
            chunks_referenced: keys.len(),
            stored,
            already_present: keys.len() - wanted.len() + raced,
            bytes_stored,
            cataloged,
            depot_state,
        };
        info!(
            depot = %depot,
            manifest = %id,
            stored = report.stored,
            already_present = report.already_present,
            bytes = report.bytes_stored,
            "ingested manifest"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}
