use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use krangler_codec::{PackSkeleton, SkeletonSegment};
use krangler_crypto::ArchiveHasher;
use krangler_store::ChunkStore;
use krangler_types::ContentId;
use tracing::info;

use crate::error::{ReconstructError, ReconstructResult};
use crate::fetch::for_each_chunk;
use crate::output::{output_buffer, write_atomically};

/// Rebuilds a decomposed pack archive byte-for-byte from its skeleton and the
/// chunk store.
#[derive(Clone)]
pub struct Recomposer {
    store: Arc<dyn ChunkStore>,
}

impl Recomposer {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self { store }
    }

    /// Chunk keys the skeleton needs that the store does not hold.
    pub fn missing(&self, skeleton: &PackSkeleton) -> ReconstructResult<Vec<ContentId>> {
        let keys: Vec<ContentId> = skeleton.chunk_keys().copied().collect();
        self.store.missing(&keys).map_err(|source| ReconstructError::Store {
            path: label(skeleton),
            source,
        })
    }

    pub fn recompose(&self, skeleton: &PackSkeleton) -> ReconstructResult<Vec<u8>> {
        let mut out = output_buffer(skeleton.archive_len);
        self.write_verified(skeleton, &mut out)?;
        Ok(out)
    }

    /// Recompose to `dest`, promoting the file only once the archive digest
    /// has verified.
    pub fn recompose_to(&self, skeleton: &PackSkeleton, dest: &Path) -> ReconstructResult<u64> {
        write_atomically(dest, |w| self.write_verified(skeleton, w))?;
        info!(
            depot = %skeleton.depot,
            manifest = %skeleton.manifest,
            dest = %dest.display(),
            bytes = skeleton.archive_len,
            "recomposed pack archive"
        );
        Ok(skeleton.archive_len)
    }

    fn write_verified(&self, skeleton: &PackSkeleton, out: &mut dyn Write) -> ReconstructResult<()> {
        let path = label(skeleton);
        let mut hasher = ArchiveHasher::new();
        let mut written = 0u64;
        let mut emit = |data: &[u8]| -> ReconstructResult<()> {
            hasher.update(data);
            out.write_all(data)?;
            written += data.len() as u64;
            Ok(())
        };

        // Consecutive chunk segments are fetched together.
        let mut pending: Vec<(ContentId, u32)> = Vec::new();
        for segment in &skeleton.segments {
            match segment {
                SkeletonSegment::Chunk { key, len } => pending.push((*key, *len)),
                SkeletonSegment::Literal(bytes) => {
                    for_each_chunk(self.store.as_ref(), &path, &pending, &mut emit)?;
                    pending.clear();
                    emit(bytes.as_slice())?;
                }
            }
        }
        for_each_chunk(self.store.as_ref(), &path, &pending, &mut emit)?;

        let mismatch = |detail: String| ReconstructError::ChecksumMismatch {
            path: path.clone(),
            key: None,
            detail,
        };
        if written != skeleton.archive_len {
            return Err(mismatch(format!(
                "rebuilt {written} bytes, expected {}",
                skeleton.archive_len
            )));
        }
        if hasher.finalize() != skeleton.archive_digest {
            return Err(mismatch("archive digest differs from the original".into()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Recomposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recomposer").finish_non_exhaustive()
    }
}

fn label(skeleton: &PackSkeleton) -> String {
    format!("pack {}/{}", skeleton.depot, skeleton.manifest)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use krangler_codec::{PackArchive, PackCodec, PackWriter};
    use krangler_crypto::ContentHasher;
    use krangler_store::{InMemoryChunkStore, PutPayload};
    use krangler_types::{DepotId, ManifestId};

    use super::*;

    fn archive() -> Vec<u8> {
        let mut writer = PackWriter::new();
        writer.add_file("Data/Mods.dat", vec![1u8; 3000]).unwrap();
        writer.add_file("Data/Stats.dat", vec![2u8; 10]).unwrap();
        writer.add_file("Art/a.dds", (0..2500u32).map(|i| i as u8).collect::<Vec<_>>()).unwrap();
        writer.add_file("empty.txt", Vec::new()).unwrap();
        writer.add_free(100);
        writer.finish().unwrap()
    }

    /// Decompose `bytes`, store every chunk, and return the skeleton.
    fn decompose_into(store: &InMemoryChunkStore, bytes: &[u8]) -> PackSkeleton {
        let (_, skeleton) = PackCodec::new(DepotId(238961), ManifestId(9))
            .with_chunk_size(1024)
            .decompose_with_skeleton(bytes)
            .unwrap();
        let archive = PackArchive::parse(bytes).unwrap();
        for file in archive.files().unwrap() {
            for piece in file.data.chunks(1024) {
                let key = ContentHasher::digest(piece);
                store.put(&key, PutPayload::Raw(piece)).unwrap();
            }
        }
        skeleton
    }

    #[test]
    fn recomposes_byte_exact_archive() {
        let bytes = archive();
        let store = Arc::new(InMemoryChunkStore::new());
        let skeleton = decompose_into(&store, &bytes);
        let recomposer = Recomposer::new(store);
        assert!(recomposer.missing(&skeleton).unwrap().is_empty());
        assert_eq!(recomposer.recompose(&skeleton).unwrap(), bytes);
    }

    #[test]
    fn recompose_to_survives_skeleton_reload() {
        let bytes = archive();
        let store = Arc::new(InMemoryChunkStore::new());
        let skeleton = decompose_into(&store, &bytes);
        let reloaded = PackSkeleton::from_bytes(&skeleton.to_bytes().unwrap()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("Content.ggpk");
        let written = Recomposer::new(store).recompose_to(&reloaded, &dest).unwrap();
        assert_eq!(written, bytes.len() as u64);
        assert_eq!(fs::read(&dest).unwrap(), bytes);
    }

    #[test]
    fn missing_chunk_blocks_recomposition() {
        let bytes = archive();
        let store = Arc::new(InMemoryChunkStore::new());
        let skeleton = decompose_into(&store, &bytes);
        let victim = *skeleton.chunk_keys().next().unwrap();
        store.delete(&victim).unwrap();

        let recomposer = Recomposer::new(store);
        assert_eq!(recomposer.missing(&skeleton).unwrap(), vec![victim]);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("Content.ggpk");
        assert!(matches!(
            recomposer.recompose_to(&skeleton, &dest),
            Err(ReconstructError::MissingChunk { key, .. }) if key == victim
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn absurd_archive_length_is_an_error_not_an_abort() {
        let bytes = archive();
        let store = Arc::new(InMemoryChunkStore::new());
        let mut skeleton = decompose_into(&store, &bytes);
        skeleton.archive_len = 1 << 60;
        let victim = *skeleton.chunk_keys().next().unwrap();
        store.delete(&victim).unwrap();
        assert!(matches!(
            Recomposer::new(store).recompose(&skeleton),
            Err(ReconstructError::MissingChunk { key, .. }) if key == victim
        ));
    }

    #[test]
    fn tampered_literal_fails_digest() {
        let bytes = archive();
        let store = Arc::new(InMemoryChunkStore::new());
        let mut skeleton = decompose_into(&store, &bytes);
        for segment in &mut skeleton.segments {
            if let SkeletonSegment::Literal(lit) = segment {
                lit[0] ^= 0xff;
                break;
            }
        }
        assert!(matches!(
            Recomposer::new(store).recompose(&skeleton),
            Err(ReconstructError::ChecksumMismatch { key: None, .. })
        ));
    }
}
