//! Durable filesystem manifest catalog.
//!
//! ```text
//! <root>/manifests/<depot>/<id>.manifest   zstd-compressed protobuf manifest
//! <root>/skeletons/<depot>/<id>.skel       serialized PackSkeleton
//! ```
//!
//! Entries are written to a synced temporary file in the depot directory and
//! published with a no-clobber rename, so concurrent writers of one entry
//! cannot replace each other and readers never see a partial file.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use krangler_codec::{ManifestCodec, PackSkeleton};
use krangler_types::{DepotId, Manifest, ManifestId};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{CatalogError, CatalogResult};
use crate::traits::{ManifestCatalog, MANIFEST, SKELETON};

const MANIFESTS_DIR: &str = "manifests";
const SKELETONS_DIR: &str = "skeletons";
const MANIFEST_EXT: &str = "manifest";
const SKELETON_EXT: &str = "skel";
const ZSTD_LEVEL: i32 = 3;

/// Manifest catalog on a local filesystem, one directory per depot.
#[derive(Debug)]
pub struct FsManifestCatalog {
    root: PathBuf,
}

impl FsManifestCatalog {
    pub fn open(root: impl Into<PathBuf>) -> CatalogResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(MANIFESTS_DIR))?;
        fs::create_dir_all(root.join(SKELETONS_DIR))?;
        info!(root = %root.display(), "opened manifest catalog");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self, depot: DepotId, id: ManifestId) -> PathBuf {
        entry_path(&self.root, MANIFESTS_DIR, depot, id, MANIFEST_EXT)
    }

    pub fn skeleton_path(&self, depot: DepotId, id: ManifestId) -> PathBuf {
        entry_path(&self.root, SKELETONS_DIR, depot, id, SKELETON_EXT)
    }

    /// Publish `bytes` at `path` unless something is already there.
    fn publish(path: &Path, bytes: &[u8]) -> CatalogResult<bool> {
        let dir = match path.parent() {
            Some(dir) => dir,
            None => {
                return Err(CatalogError::Corrupt {
                    path: path.display().to_string(),
                    reason: "no parent directory".into(),
                })
            }
        };
        fs::create_dir_all(dir)?;
        let mut staged = NamedTempFile::new_in(dir)?;
        staged.write_all(bytes)?;
        staged.as_file().sync_all()?;
        match staged.persist_noclobber(path) {
            Ok(_) => {}
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.error.into()),
        }
        sync_dir(dir)?;
        Ok(true)
    }
}

impl ManifestCatalog for FsManifestCatalog {
    fn put_manifest(&self, manifest: &Manifest) -> CatalogResult<bool> {
        let (depot, id) = (manifest.depot, manifest.id);
        let path = self.manifest_path(depot, id);
        let wire = ManifestCodec::encode(manifest);
        if Self::publish(&path, &zstd::encode_all(wire.as_slice(), ZSTD_LEVEL)?)? {
            debug!(depot = %depot, manifest = %id, files = manifest.len(), "recorded manifest");
            return Ok(true);
        }
        if unpack(&path, &read_recorded(&path)?)? == wire {
            Ok(false)
        } else {
            Err(conflict(MANIFEST, depot, id))
        }
    }

    fn manifest(&self, depot: DepotId, id: ManifestId) -> CatalogResult<Option<Manifest>> {
        let path = self.manifest_path(depot, id);
        let Some(packed) = read_existing(&path)? else {
            return Ok(None);
        };
        let manifest = ManifestCodec::new(depot).decode(&unpack(&path, &packed)?)?;
        if manifest.id != id {
            return Err(CatalogError::Corrupt {
                path: path.display().to_string(),
                reason: format!("holds manifest {}", manifest.id),
            });
        }
        Ok(Some(manifest))
    }

    fn manifest_ids(&self, depot: DepotId) -> CatalogResult<Vec<ManifestId>> {
        let dir = self.root.join(MANIFESTS_DIR).join(depot.to_string());
        let mut ids: Vec<ManifestId> = list_numeric(&dir, Some(MANIFEST_EXT))?
            .into_iter()
            .map(ManifestId)
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn depots(&self) -> CatalogResult<Vec<DepotId>> {
        let mut depots = Vec::new();
        for raw in list_numeric(&self.root.join(MANIFESTS_DIR), None)? {
            match u32::try_from(raw) {
                Ok(depot) => depots.push(DepotId(depot)),
                Err(_) => warn!(depot = raw, "ignoring out-of-range depot directory"),
            }
        }
        depots.sort();
        Ok(depots)
    }

    fn put_skeleton(&self, skeleton: &PackSkeleton) -> CatalogResult<bool> {
        let (depot, id) = (skeleton.depot, skeleton.manifest);
        let path = self.skeleton_path(depot, id);
        if Self::publish(&path, &skeleton.to_bytes()?)? {
            debug!(
                depot = %depot,
                manifest = %id,
                segments = skeleton.segments.len(),
                "recorded pack skeleton"
            );
            return Ok(true);
        }
        if PackSkeleton::from_bytes(&read_recorded(&path)?)? == *skeleton {
            Ok(false)
        } else {
            Err(conflict(SKELETON, depot, id))
        }
    }

    fn skeleton(&self, depot: DepotId, id: ManifestId) -> CatalogResult<Option<PackSkeleton>> {
        let path = self.skeleton_path(depot, id);
        let Some(bytes) = read_existing(&path)? else {
            return Ok(None);
        };
        let skeleton = PackSkeleton::from_bytes(&bytes)?;
        if (skeleton.depot, skeleton.manifest) != (depot, id) {
            return Err(CatalogError::Corrupt {
                path: path.display().to_string(),
                reason: format!(
                    "holds depot {} manifest {}",
                    skeleton.depot, skeleton.manifest
                ),
            });
        }
        Ok(Some(skeleton))
    }
}

fn entry_path(root: &Path, dir: &str, depot: DepotId, id: ManifestId, ext: &str) -> PathBuf {
    root.join(dir)
        .join(depot.to_string())
        .join(format!("{id}.{ext}"))
}

fn read_existing(path: &Path) -> CatalogResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// An entry a no-clobber publish just collided with.
fn read_recorded(path: &Path) -> CatalogResult<Vec<u8>> {
    read_existing(path)?.ok_or_else(|| CatalogError::Corrupt {
        path: path.display().to_string(),
        reason: "removed while being recorded".into(),
    })
}

fn conflict(kind: &'static str, depot: DepotId, manifest: ManifestId) -> CatalogError {
    CatalogError::Conflict {
        kind,
        depot,
        manifest,
    }
}

fn unpack(path: &Path, packed: &[u8]) -> CatalogResult<Vec<u8>> {
    zstd::decode_all(packed).map_err(|e| CatalogError::Corrupt {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Numeric names in `dir`: file stems with extension `ext`, or directory
/// names when `ext` is `None`. A missing directory lists nothing.
fn list_numeric(dir: &Path, ext: Option<&str>) -> CatalogResult<Vec<u64>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let stem = match ext {
            Some(ext) if path.extension().and_then(|e| e.to_str()) == Some(ext) => {
                path.file_stem().and_then(|s| s.to_str())
            }
            None if entry.file_type()?.is_dir() => path.file_name().and_then(|s| s.to_str()),
            // Temporaries of in-flight writes, or foreign files.
            _ => continue,
        };
        match stem.and_then(|s| s.parse::<u64>().ok()) {
            Some(n) => out.push(n),
            None => warn!(path = %path.display(), "ignoring unrecognized catalog entry"),
        }
    }
    Ok(out)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use krangler_codec::{PackCodec, PackWriter};
    use krangler_crypto::ContentHasher;
    use krangler_types::{ChunkRef, FileEntry, FileFlags};

    use super::*;

    fn manifest(depot: u32, id: u64, content: &[u8]) -> Manifest {
        let len = content.len() as u32;
        Manifest {
            depot: DepotId(depot),
            id: ManifestId(id),
            created_at: None,
            entries: vec![FileEntry {
                path: "Data/a.dat".into(),
                flags: FileFlags::empty(),
                size: u64::from(len),
                hash: ContentHasher::digest(content),
                chunks: vec![ChunkRef {
                    key: ContentHasher::digest(content),
                    offset: 0,
                    uncompressed_len: len,
                    compressed_len: len,
                    source_checksum: None,
                }],
            }],
        }
    }

    #[test]
    fn manifests_survive_reopen_and_list_in_order() {
        let dir = tempfile::tempdir().unwrap();
        {
            let catalog = FsManifestCatalog::open(dir.path()).unwrap();
            for id in [300, 100, 200] {
                assert!(catalog.put_manifest(&manifest(7, id, b"v")).unwrap());
            }
            catalog.put_manifest(&manifest(3, 1, b"w")).unwrap();
        }
        let catalog = FsManifestCatalog::open(dir.path()).unwrap();
        assert_eq!(
            catalog.manifest_ids(DepotId(7)).unwrap(),
            vec![ManifestId(100), ManifestId(200), ManifestId(300)]
        );
        assert_eq!(catalog.depots().unwrap(), vec![DepotId(3), DepotId(7)]);
        assert_eq!(
            catalog.load_manifest(DepotId(7), ManifestId(200)).unwrap(),
            manifest(7, 200, b"v")
        );
        assert!(catalog.manifest_ids(DepotId(99)).unwrap().is_empty());
    }

    #[test]
    fn rerecording_is_a_noop_and_a_different_manifest_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FsManifestCatalog::open(dir.path()).unwrap();
        assert!(catalog.put_manifest(&manifest(7, 100, b"one")).unwrap());
        assert!(!catalog.put_manifest(&manifest(7, 100, b"one")).unwrap());
        assert!(matches!(
            catalog.put_manifest(&manifest(7, 100, b"two")),
            Err(CatalogError::Conflict { kind: "manifest", .. })
        ));
        assert_eq!(
            catalog.load_manifest(DepotId(7), ManifestId(100)).unwrap(),
            manifest(7, 100, b"one")
        );
    }

    #[test]
    fn racing_writers_record_one_entry() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let barrier = Arc::new(Barrier::new(6));
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let root = root.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let catalog = FsManifestCatalog::open(&root).unwrap();
                    barrier.wait();
                    catalog.put_manifest(&manifest(7, 100, b"same")).unwrap()
                })
            })
            .collect();
        let added = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|added| *added)
            .count();
        assert_eq!(added, 1);
        let entries = fs::read_dir(root.join(MANIFESTS_DIR).join("7")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn skeletons_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FsManifestCatalog::open(dir.path()).unwrap();
        let mut writer = PackWriter::new();
        writer.add_file("Data/Mods.dat", vec![1u8; 300]).unwrap();
        let bytes = writer.finish().unwrap();
        let (_, skeleton) = PackCodec::new(DepotId(238961), ManifestId(4))
            .decompose_with_skeleton(&bytes)
            .unwrap();

        assert!(catalog.skeleton(DepotId(238961), ManifestId(4)).unwrap().is_none());
        assert!(catalog.put_skeleton(&skeleton).unwrap());
        assert!(!catalog.put_skeleton(&skeleton).unwrap());
        assert_eq!(
            catalog.load_skeleton(DepotId(238961), ManifestId(4)).unwrap(),
            skeleton
        );
    }

    #[test]
    fn misplaced_entry_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FsManifestCatalog::open(dir.path()).unwrap();
        catalog.put_manifest(&manifest(7, 100, b"x")).unwrap();
        let moved = catalog.manifest_path(DepotId(7), ManifestId(101));
        fs::copy(catalog.manifest_path(DepotId(7), ManifestId(100)), moved).unwrap();
        assert!(matches!(
            catalog.manifest(DepotId(7), ManifestId(101)),
            Err(CatalogError::Corrupt { .. })
        ));
    }

    #[test]
    fn garbage_entry_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FsManifestCatalog::open(dir.path()).unwrap();
        let path = catalog.manifest_path(DepotId(7), ManifestId(5));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not zstd").unwrap();
        assert!(matches!(
            catalog.manifest(DepotId(7), ManifestId(5)),
            Err(CatalogError::Corrupt { .. })
        ));
        // Stray temporaries are not listed.
        fs::write(path.with_file_name(".tmpAbC12"), b"").unwrap();
        assert_eq!(catalog.manifest_ids(DepotId(7)).unwrap(), vec![ManifestId(5)]);
    }
}
