//! Durable depot state backed by a single protobuf file.
//!
//! The file holds one `DepotConfigStore` message. Every change rewrites the
//! whole file through a temporary sibling that is synced and then renamed
//! over the original, so a crash leaves either the old or the new mapping.
//!
//! Any number of handles, in any number of processes, may share one path.
//! A `<file>.lock` sibling is locked exclusively while a mark re-reads the
//! file, checks the transition and persists, and shared while reading.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs4::FileExt;
use krangler_codec::proto::DepotConfigStore;
use krangler_types::{DepotId, ManifestId};
use prost::Message;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{DepotError, DepotResult};
use crate::traits::{transition, DepotStateStore, InstallMode, MarkOutcome};

/// A [`DepotStateStore`] persisted to a protobuf file.
///
/// Nothing is cached: every call reads the file under its lock, so handles
/// never act on a mapping another handle has since replaced.
#[derive(Debug)]
pub struct FileDepotState {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileDepotState {
    /// Open the state at `path`. A missing file is an empty state; it is
    /// created on the first change. An existing file must decode.
    pub fn open(path: impl Into<PathBuf>) -> DepotResult<Self> {
        let path = path.into();
        let mut lock_name = path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("depots"));
        lock_name.push(".lock");
        let state = Self {
            lock_path: path.with_file_name(lock_name),
            path,
        };
        let depots = {
            let _lock = state.lock_shared()?;
            state.read()?.len()
        };
        debug!(path = %state.path.display(), depots, "opened depot state");
        Ok(state)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }

    fn open_lock_file(&self) -> DepotResult<File> {
        fs::create_dir_all(self.parent())?;
        Ok(OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?)
    }

    /// Held for the lifetime of the returned file.
    fn lock_exclusive(&self) -> DepotResult<File> {
        let file = self.open_lock_file()?;
        file.lock_exclusive()?;
        Ok(file)
    }

    fn lock_shared(&self) -> DepotResult<File> {
        let file = self.open_lock_file()?;
        FileExt::lock_shared(&file)?;
        Ok(file)
    }

    fn read(&self) -> DepotResult<HashMap<u32, u64>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(DepotConfigStore::decode(bytes.as_slice())
                .map_err(|e| DepotError::Decode(format!("{}: {e}", self.path.display())))?
                .installed_manifest_ids),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, installed: HashMap<u32, u64>) -> DepotResult<()> {
        let message = DepotConfigStore {
            installed_manifest_ids: installed,
        };
        let mut tmp = NamedTempFile::new_in(self.parent())?;
        tmp.write_all(&message.encode_to_vec())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl DepotStateStore for FileDepotState {
    fn installed(&self, depot: DepotId) -> DepotResult<Option<ManifestId>> {
        let _lock = self.lock_shared()?;
        Ok(self.read()?.get(&depot.0).copied().map(ManifestId))
    }

    fn mark_installed(
        &self,
        depot: DepotId,
        manifest: ManifestId,
        mode: InstallMode,
    ) -> DepotResult<MarkOutcome> {
        let _lock = self.lock_exclusive()?;
        let mut installed = self.read()?;
        let current = installed.get(&depot.0).copied().map(ManifestId);
        let outcome = transition(depot, current, manifest, mode)?;
        if !outcome.changed() {
            return Ok(outcome);
        }

        installed.insert(depot.0, manifest.0);
        self.persist(installed)?;

        info!(
            depot = %depot,
            manifest = %manifest,
            ?outcome,
            path = %self.path.display(),
            "depot state updated"
        );
        Ok(outcome)
    }

    fn snapshot(&self) -> DepotResult<BTreeMap<DepotId, ManifestId>> {
        let _lock = self.lock_shared()?;
        Ok(self
            .read()?
            .into_iter()
            .map(|(d, m)| (DepotId(d), ManifestId(m)))
            .collect())
    }
}
