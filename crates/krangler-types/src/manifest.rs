use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::ContentId;
use crate::error::LayoutError;
use crate::flags::FileFlags;
use crate::ids::{DepotId, ManifestId};

/// Reference to a chunk at a byte offset within a file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    /// Content address of the uncompressed chunk payload.
    pub key: ContentId,
    /// Byte offset within the file where this chunk begins.
    pub offset: u64,
    /// Length of the uncompressed payload.
    pub uncompressed_len: u32,
    /// Length of the payload as delivered by the source (equal to
    /// `uncompressed_len` when the source is not compressed).
    pub compressed_len: u32,
    /// Source-specific checksum carried alongside the chunk, kept verbatim
    /// for re-encoding.
    pub source_checksum: Option<Vec<u8>>,
}

impl ChunkRef {
    /// End offset (exclusive) of this chunk within its file.
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.uncompressed_len)
    }
}

/// One file (or directory) described by a manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// `/`-separated path relative to the depot root.
    pub path: String,
    pub flags: FileFlags,
    /// Declared total size in bytes.
    pub size: u64,
    /// SHA-1 of the whole file content.
    pub hash: ContentId,
    /// Chunk references, ordered by offset.
    pub chunks: Vec<ChunkRef>,
}

impl FileEntry {
    pub fn is_directory(&self) -> bool {
        self.flags.is_directory()
    }

    /// Check that chunks start at zero, are contiguous, non-overlapping,
    /// non-empty, and cover exactly `size` bytes.
    ///
    /// Chunks must already be in offset order.
    pub fn check_layout(&self) -> Result<(), LayoutError> {
        if self.is_directory() && !self.chunks.is_empty() {
            return Err(LayoutError::DirectoryWithChunks);
        }
        let mut expected = 0u64;
        for (index, chunk) in self.chunks.iter().enumerate() {
            if chunk.uncompressed_len == 0 {
                return Err(LayoutError::EmptyChunk { index });
            }
            if chunk.offset < expected {
                return Err(LayoutError::Overlap {
                    index,
                    expected,
                    found: chunk.offset,
                });
            }
            if chunk.offset > expected {
                return Err(LayoutError::Gap {
                    index,
                    expected,
                    found: chunk.offset,
                });
            }
            expected = chunk.end();
        }
        if expected != self.size {
            return Err(LayoutError::SizeMismatch {
                declared: self.size,
                actual: expected,
            });
        }
        Ok(())
    }
}

/// An immutable snapshot of a depot's file tree at one version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub depot: DepotId,
    pub id: ManifestId,
    /// Creation time, when the source records one.
    pub created_at: Option<DateTime<Utc>>,
    pub entries: Vec<FileEntry>,
}

impl Manifest {
    /// Look up an entry by path.
    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// Non-directory entries, in manifest order.
    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter().filter(|e| !e.is_directory())
    }

    /// Every distinct chunk referenced by the manifest, in first-use order.
    pub fn unique_chunks(&self) -> Vec<&ChunkRef> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .flat_map(|e| e.chunks.iter())
            .filter(|c| seen.insert(c.key))
            .collect()
    }

    /// Sum of the declared sizes of all files.
    pub fn total_size(&self) -> u64 {
        self.files().map(|e| e.size).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
