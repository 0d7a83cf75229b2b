use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use krangler_crypto::StreamingHasher;
use krangler_store::ChunkStore;
use krangler_types::{ContentId, FileEntry, Manifest};
use tracing::{debug, info, warn};

use crate::error::{ReconstructError, ReconstructResult};
use crate::fetch::for_each_chunk;
use crate::output::{output_buffer, write_atomically};

/// Outcome of materializing a whole manifest.
#[derive(Debug, Default)]
pub struct MaterializeReport {
    pub files_written: usize,
    pub directories_created: usize,
    pub bytes_written: u64,
    /// Files that could not be rebuilt. Other files are unaffected.
    pub failures: Vec<(String, ReconstructError)>,
}

impl MaterializeReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Rebuilds files from their chunk lists, verifying every chunk and the
/// whole-file hash.
#[derive(Clone)]
pub struct Reconstructor {
    store: Arc<dyn ChunkStore>,
}

impl Reconstructor {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self { store }
    }

    /// Reconstruct a file in memory.
    pub fn reconstruct(&self, entry: &FileEntry) -> ReconstructResult<Vec<u8>> {
        let mut out = output_buffer(entry.size);
        self.write_verified(entry, &mut out)?;
        Ok(out)
    }

    /// Reconstruct a file to `dest`. The destination only changes once the
    /// whole output has verified. Returns the number of bytes written.
    pub fn reconstruct_to(&self, entry: &FileEntry, dest: &Path) -> ReconstructResult<u64> {
        write_atomically(dest, |w| self.write_verified(entry, w))?;
        info!(path = %entry.path, dest = %dest.display(), bytes = entry.size, "reconstructed file");
        Ok(entry.size)
    }

    /// Reconstruct every entry of `manifest` beneath `root`.
    ///
    /// A failing file is recorded in the report and does not stop the others.
    pub fn materialize(&self, manifest: &Manifest, root: &Path) -> MaterializeReport {
        let mut report = MaterializeReport::default();
        for entry in &manifest.entries {
            let dest = match safe_join(root, &entry.path) {
                Ok(dest) => dest,
                Err(e) => {
                    report.failures.push((entry.path.clone(), e));
                    continue;
                }
            };
            if entry.is_directory() {
                match std::fs::create_dir_all(&dest) {
                    Ok(()) => report.directories_created += 1,
                    Err(e) => report.failures.push((entry.path.clone(), e.into())),
                }
                continue;
            }
            match self.reconstruct_to(entry, &dest) {
                Ok(bytes) => {
                    report.files_written += 1;
                    report.bytes_written += bytes;
                }
                Err(e) => {
                    warn!(path = %entry.path, error = %e, "reconstruction failed");
                    report.failures.push((entry.path.clone(), e));
                }
            }
        }
        debug!(
            depot = %manifest.depot,
            manifest = %manifest.id,
            files = report.files_written,
            failures = report.failures.len(),
            "materialized manifest"
        );
        report
    }

    fn write_verified(&self, entry: &FileEntry, out: &mut dyn Write) -> ReconstructResult<()> {
        if entry.is_directory() {
            return Err(ReconstructError::NotAFile(entry.path.clone()));
        }
        let chunks: Vec<(ContentId, u32)> = entry
            .chunks
            .iter()
            .map(|c| (c.key, c.uncompressed_len))
            .collect();

        let mut hasher = StreamingHasher::new();
        for_each_chunk(self.store.as_ref(), &entry.path, &chunks, |data| {
            hasher.update(data);
            out.write_all(data)?;
            Ok(())
        })?;

        let mismatch = |detail: String| ReconstructError::ChecksumMismatch {
            path: entry.path.clone(),
            key: None,
            detail,
        };
        if hasher.len() != entry.size {
            return Err(mismatch(format!(
                "rebuilt {} bytes, expected {}",
                hasher.len(),
                entry.size
            )));
        }
        let computed = hasher.finalize();
        if computed != entry.hash {
            return Err(mismatch(format!(
                "file hashes to {computed}, expected {}",
                entry.hash
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Reconstructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconstructor").finish_non_exhaustive()
    }
}

/// Join a manifest path onto `root`, refusing anything that could escape it.
fn safe_join(root: &Path, path: &str) -> ReconstructResult<PathBuf> {
    let relative = Path::new(path);
    let normal = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !normal || path.is_empty() {
        return Err(ReconstructError::UnsafePath(path.to_owned()));
    }
    Ok(root.join(relative))
}
