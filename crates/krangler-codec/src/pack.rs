//! GGPK pack archive parsing and decomposition.
//!
//! A pack archive is a flat sequence of length-prefixed records. Directory
//! records (`PDIR`) point at their children by absolute offset, file records
//! (`FILE`) carry their data inline, and free records (`FREE`) mark unused
//! space. Records are addressed by container offset rather than by content,
//! so decomposition hashes every file itself.
//!
//! ```text
//! header  : u32 rec_len (28) | "GGPK" | u32 version | u64 child0 | u64 child1
//! record  : u32 rec_len | [u8; 4] tag | body
//! PDIR    : u32 name_len | u32 child_count | [u8; 32] sha256 | name | (u32 hash, u64 offset)*
//! FILE    : u32 name_len | [u8; 32] sha256 | name | data
//! FREE    : u64 next_free | unused
//! ```
//!
//! Names are NUL-terminated UTF-16LE; `name_len` counts code units including
//! the terminator. All integers are little-endian.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use krangler_crypto::{ArchiveHasher, ContentHasher};
use krangler_types::{ChunkRef, ContentId, DepotId, FileEntry, FileFlags, Manifest, ManifestId};
use tracing::{debug, warn};

use crate::error::{CodecError, CodecResult};
use crate::skeleton::{PackSkeleton, SkeletonSegment};
use crate::traits::{Codec, SourceKind};

pub(crate) const HEADER_LEN: u32 = 28;
pub(crate) const GGPK_TAG: [u8; 4] = *b"GGPK";
pub(crate) const PDIR_TAG: [u8; 4] = *b"PDIR";
pub(crate) const FILE_TAG: [u8; 4] = *b"FILE";
pub(crate) const FREE_TAG: [u8; 4] = *b"FREE";

/// Archive versions whose record layout this module understands.
pub const SUPPORTED_VERSIONS: [u32; 2] = [2, 3];

/// Largest chunk a pack file is split into (matches depot chunk sizing).
pub const DEFAULT_CHUNK_SIZE: u32 = 1024 * 1024;

#[derive(Clone, Debug)]
struct DirRecord {
    name: String,
    children: Vec<u64>,
}

#[derive(Clone, Debug)]
struct FileRecord {
    name: String,
    sha256: [u8; 32],
    data_offset: u64,
    data_len: u64,
}

/// A file reachable from the archive's root directory.
#[derive(Clone, Debug)]
pub struct PackedFile<'a> {
    /// `/`-joined path from the root directory.
    pub path: String,
    /// Offset of the `FILE` record within the archive.
    pub record_offset: u64,
    /// Offset of the file data within the archive.
    pub data_offset: u64,
    pub data: &'a [u8],
    /// SHA-256 of `data` as recorded by the archive.
    pub sha256: [u8; 32],
}

/// A structurally parsed pack archive, borrowing the archive bytes.
pub struct PackArchive<'a> {
    bytes: &'a [u8],
    version: u32,
    root: u64,
    dirs: BTreeMap<u64, DirRecord>,
    files: BTreeMap<u64, FileRecord>,
    frees: BTreeSet<u64>,
}

impl std::fmt::Debug for PackArchive<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackArchive")
            .field("len", &self.bytes.len())
            .field("version", &self.version)
            .field("root", &self.root)
            .field("dirs", &self.dirs.len())
            .field("files", &self.files.len())
            .field("frees", &self.frees.len())
            .finish()
    }
}

/// Bounds-checked little-endian reader over one record body.
struct RecordCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    end: usize,
    record: u64,
}

impl<'a> RecordCursor<'a> {
    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        if self.end - self.pos < n {
            return Err(CodecError::pack(self.record, "truncated record"));
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u32(&mut self) -> CodecResult<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn u64(&mut self) -> CodecResult<u64> {
        let raw = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        Ok(u64::from_le_bytes(buf))
    }

    fn digest(&mut self) -> CodecResult<[u8; 32]> {
        let raw = self.take(32)?;
        let mut buf = [0u8; 32];
        buf.copy_from_slice(raw);
        Ok(buf)
    }

    fn name(&mut self, units: u32) -> CodecResult<String> {
        let record = self.record;
        if units == 0 {
            return Err(CodecError::pack(record, "zero-length name"));
        }
        let len = (units as usize)
            .checked_mul(2)
            .ok_or_else(|| CodecError::pack(record, "name length overflow"))?;
        let raw = self.take(len)?;
        let mut code_units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        if code_units.pop() != Some(0) {
            return Err(CodecError::pack(record, "name is not NUL-terminated"));
        }
        let name = String::from_utf16(&code_units)
            .map_err(|_| CodecError::pack(record, "name is not valid UTF-16"))?;
        if name.contains(['/', '\\', '\0']) {
            return Err(CodecError::pack(record, format!("invalid character in name {name:?}")));
        }
        Ok(name)
    }

    fn rest(&self) -> (u64, u64) {
        (self.pos as u64, (self.end - self.pos) as u64)
    }
}

fn read_u32_at(bytes: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
}

fn read_u64_at(bytes: &[u8], pos: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[pos..pos + 8]);
    u64::from_le_bytes(buf)
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}/{name}")
    }
}

impl<'a> PackArchive<'a> {
    /// Parse the header and every record of an archive.
    pub fn parse(bytes: &'a [u8]) -> CodecResult<Self> {
        if bytes.len() < HEADER_LEN as usize {
            return Err(CodecError::pack(0, "truncated header"));
        }
        if bytes[4..8] != GGPK_TAG {
            return Err(CodecError::pack(
                0,
                format!("bad magic {:?}", String::from_utf8_lossy(&bytes[4..8])),
            ));
        }
        let header_len = read_u32_at(bytes, 0);
        if header_len != HEADER_LEN {
            return Err(CodecError::pack(0, format!("unexpected header length {header_len}")));
        }
        let version = read_u32_at(bytes, 8);
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(CodecError::pack(0, format!("unsupported version {version}")));
        }
        let child0 = read_u64_at(bytes, 12);
        let child1 = read_u64_at(bytes, 20);

        let total = bytes.len() as u64;
        let mut dirs = BTreeMap::new();
        let mut files = BTreeMap::new();
        let mut frees = BTreeSet::new();
        let mut offset = u64::from(HEADER_LEN);

        while offset < total {
            if total - offset < 8 {
                return Err(CodecError::pack(offset, "truncated record header"));
            }
            let pos = offset as usize;
            let rec_len = u64::from(read_u32_at(bytes, pos));
            if rec_len < 8 {
                return Err(CodecError::pack(offset, format!("record length {rec_len} too small")));
            }
            if rec_len > total - offset {
                return Err(CodecError::pack(offset, "record extends past end of archive"));
            }
            let mut cursor = RecordCursor {
                bytes,
                pos: pos + 8,
                end: pos + rec_len as usize,
                record: offset,
            };
            let tag = [bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]];
            match tag {
                PDIR_TAG => {
                    let name_len = cursor.u32()?;
                    let child_count = cursor.u32()?;
                    let _digest = cursor.digest()?;
                    let name = cursor.name(name_len)?;
                    let table_len = (child_count as usize)
                        .checked_mul(12)
                        .ok_or_else(|| CodecError::pack(offset, "child table overflow"))?;
                    let table = cursor.take(table_len)?;
                    let children = table
                        .chunks_exact(12)
                        .map(|entry| read_u64_at(entry, 4))
                        .collect();
                    dirs.insert(offset, DirRecord { name, children });
                }
                FILE_TAG => {
                    let name_len = cursor.u32()?;
                    let sha256 = cursor.digest()?;
                    let name = cursor.name(name_len)?;
                    let (data_offset, data_len) = cursor.rest();
                    files.insert(
                        offset,
                        FileRecord {
                            name,
                            sha256,
                            data_offset,
                            data_len,
                        },
                    );
                }
                FREE_TAG => {
                    let _next_free = cursor.u64()?;
                    frees.insert(offset);
                }
                other => {
                    return Err(CodecError::pack(
                        offset,
                        format!("unknown record tag {:?}", String::from_utf8_lossy(&other)),
                    ));
                }
            }
            offset += rec_len;
        }

        let root = [child0, child1]
            .into_iter()
            .find(|candidate| dirs.contains_key(candidate))
            .ok_or_else(|| CodecError::pack(12, "header does not reference a directory record"))?;

        Ok(Self {
            bytes,
            version,
            root,
            dirs,
            files,
            frees,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn root_offset(&self) -> u64 {
        self.root
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn directory_count(&self) -> usize {
        self.dirs.len()
    }

    pub fn file_record_count(&self) -> usize {
        self.files.len()
    }

    pub fn free_record_count(&self) -> usize {
        self.frees.len()
    }

    /// Walk the directory tree from the root and flatten it into paths.
    ///
    /// The walk is iterative, so nesting depth is bounded only by memory.
    /// Files are returned sorted by path. Records not reachable from the root
    /// are not returned.
    pub fn files(&self) -> CodecResult<Vec<PackedFile<'a>>> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(self.root, String::new())];

        while let Some((dir_offset, prefix)) = stack.pop() {
            if !visited.insert(dir_offset) {
                return Err(CodecError::pack(dir_offset, "directory reachable more than once"));
            }
            let Some(dir) = self.dirs.get(&dir_offset) else {
                return Err(CodecError::pack(dir_offset, "not a directory record"));
            };
            for &child in &dir.children {
                if let Some(sub) = self.dirs.get(&child) {
                    if sub.name.is_empty() {
                        return Err(CodecError::pack(child, "unnamed subdirectory"));
                    }
                    stack.push((child, join(&prefix, &sub.name)));
                } else if let Some(file) = self.files.get(&child) {
                    if file.name.is_empty() {
                        return Err(CodecError::pack(child, "unnamed file"));
                    }
                    let start = file.data_offset as usize;
                    out.push(PackedFile {
                        path: join(&prefix, &file.name),
                        record_offset: child,
                        data_offset: file.data_offset,
                        data: &self.bytes[start..start + file.data_len as usize],
                        sha256: file.sha256,
                    });
                } else {
                    return Err(CodecError::pack(
                        dir_offset,
                        format!("dangling child offset {child}"),
                    ));
                }
            }
        }

        out.sort_by(|a, b| a.path.cmp(&b.path));
        if let Some(pair) = out.windows(2).find(|w| w[0].path == w[1].path) {
            return Err(CodecError::pack(
                pair[1].record_offset,
                format!("duplicate path {}", pair[1].path),
            ));
        }

        let orphans = self.orphan_count(&out);
        if orphans > 0 {
            warn!(orphans, "pack contains file records unreachable from the root");
        }
        Ok(out)
    }

    /// `FILE` records that no path in `reachable` leads to. One record may
    /// be reached through several directories.
    fn orphan_count(&self, reachable: &[PackedFile<'_>]) -> usize {
        let reached: HashSet<u64> = reachable.iter().map(|f| f.record_offset).collect();
        self.files.len() - reached.len()
    }
}

/// Everything one parse of a pack archive yields.
#[derive(Debug)]
pub struct PackDecomposition<'a> {
    pub manifest: Manifest,
    pub skeleton: PackSkeleton,
    /// Reachable files, in the same order as `manifest.entries`.
    pub files: Vec<PackedFile<'a>>,
}

impl PackDecomposition<'_> {
    /// Bytes of every distinct chunk the manifest references, sliced from
    /// the archive.
    pub fn chunk_data(&self) -> HashMap<ContentId, &[u8]> {
        let mut pieces = HashMap::new();
        for (file, entry) in self.files.iter().zip(&self.manifest.entries) {
            for chunk in &entry.chunks {
                if let Some(piece) = file.data.get(chunk.offset as usize..chunk.end() as usize) {
                    pieces.entry(chunk.key).or_insert(piece);
                }
            }
        }
        pieces
    }
}

/// Codec that decomposes GGPK pack archives into a canonical [`Manifest`].
///
/// Pack archives carry no depot or version identity of their own, so both are
/// supplied by the caller.
#[derive(Clone, Debug)]
pub struct PackCodec {
    depot: DepotId,
    manifest: ManifestId,
    chunk_size: u32,
}

impl PackCodec {
    pub fn new(depot: DepotId, manifest: ManifestId) -> Self {
        Self {
            depot,
            manifest,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override the maximum chunk size. Zero is treated as one byte.
    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Decompose an archive into a manifest.
    pub fn decompose(&self, bytes: &[u8]) -> CodecResult<Manifest> {
        let archive = PackArchive::parse(bytes)?;
        let files = archive.files()?;
        let entries = files
            .iter()
            .map(|f| self.file_entry(f))
            .collect::<CodecResult<Vec<_>>>()?;
        debug!(
            depot = %self.depot,
            manifest = %self.manifest,
            version = archive.version(),
            files = entries.len(),
            "decomposed pack archive"
        );
        Ok(self.manifest_from(entries))
    }

    /// Decompose an archive and also capture everything needed to rebuild
    /// it byte-for-byte from the chunk store.
    pub fn decompose_with_skeleton(&self, bytes: &[u8]) -> CodecResult<(Manifest, PackSkeleton)> {
        let parts = self.decompose_archive(bytes)?;
        Ok((parts.manifest, parts.skeleton))
    }

    /// Parse once and return the manifest, the skeleton and the reachable
    /// files borrowing `bytes`.
    pub fn decompose_archive<'a>(&self, bytes: &'a [u8]) -> CodecResult<PackDecomposition<'a>> {
        let archive = PackArchive::parse(bytes)?;
        let files = archive.files()?;
        let entries = files
            .iter()
            .map(|f| self.file_entry(f))
            .collect::<CodecResult<Vec<_>>>()?;

        // One data range per FILE record, even if several paths reach it.
        let mut ranges: BTreeMap<u64, &[ChunkRef]> = BTreeMap::new();
        for (file, entry) in files.iter().zip(&entries) {
            ranges.entry(file.data_offset).or_insert(entry.chunks.as_slice());
        }

        let mut segments = Vec::new();
        let mut cursor = 0u64;
        for (&start, chunks) in &ranges {
            if start > cursor {
                segments.push(SkeletonSegment::Literal(
                    bytes[cursor as usize..start as usize].to_vec(),
                ));
            }
            let mut end = start;
            for chunk in chunks.iter() {
                segments.push(SkeletonSegment::Chunk {
                    key: chunk.key,
                    len: chunk.uncompressed_len,
                });
                end = start + chunk.end();
            }
            cursor = cursor.max(end);
        }
        if (cursor as usize) < bytes.len() {
            segments.push(SkeletonSegment::Literal(bytes[cursor as usize..].to_vec()));
        }

        let skeleton = PackSkeleton {
            depot: self.depot,
            manifest: self.manifest,
            archive_len: bytes.len() as u64,
            archive_digest: ArchiveHasher::digest(bytes),
            segments,
        };
        debug!(
            depot = %self.depot,
            manifest = %self.manifest,
            version = archive.version(),
            files = entries.len(),
            literal_bytes = skeleton.literal_len(),
            "decomposed pack archive with skeleton"
        );
        Ok(PackDecomposition {
            manifest: self.manifest_from(entries),
            skeleton,
            files,
        })
    }

    fn manifest_from(&self, entries: Vec<FileEntry>) -> Manifest {
        Manifest {
            depot: self.depot,
            id: self.manifest,
            created_at: None,
            entries,
        }
    }

    fn file_entry(&self, file: &PackedFile<'_>) -> CodecResult<FileEntry> {
        if ContentHasher::sha256(file.data) != file.sha256 {
            return Err(CodecError::PackChecksumMismatch {
                path: file.path.clone(),
            });
        }
        let mut offset = 0u64;
        let chunks = file
            .data
            .chunks(self.chunk_size as usize)
            .map(|piece| {
                let len = piece.len() as u32;
                let chunk = ChunkRef {
                    key: ContentHasher::digest(piece),
                    offset,
                    uncompressed_len: len,
                    compressed_len: len,
                    source_checksum: None,
                };
                offset += u64::from(len);
                chunk
            })
            .collect();
        Ok(FileEntry {
            path: file.path.clone(),
            flags: FileFlags::empty(),
            size: file.data.len() as u64,
            hash: ContentHasher::digest(file.data),
            chunks,
        })
    }
}

impl Codec for PackCodec {
    fn source_kind(&self) -> SourceKind {
        SourceKind::PackArchive
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Manifest> {
        self.decompose(bytes)
    }
}

/// Decompose a pack archive into a manifest with the default chunk size.
pub fn decompose_pack(bytes: &[u8], depot: DepotId, manifest: ManifestId) -> CodecResult<Manifest> {
    PackCodec::new(depot, manifest).decompose(bytes)
}

/// Decompose a pack archive and capture its skeleton for later recomposition.
pub fn decompose_pack_with_skeleton(
    bytes: &[u8],
    depot: DepotId,
    manifest: ManifestId,
) -> CodecResult<(Manifest, PackSkeleton)> {
    PackCodec::new(depot, manifest).decompose_with_skeleton(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::PackWriter;

    fn sample() -> Vec<u8> {
        let mut writer = PackWriter::new();
        writer.add_file("Data/Mods.dat", b"mods table".to_vec()).unwrap();
        writer.add_file("Data/Words.dat", b"words table".to_vec()).unwrap();
        writer.add_file("Art/2DArt/icon.dds", b"DDS icon".to_vec()).unwrap();
        writer.add_file("readme.txt", b"top level".to_vec()).unwrap();
        writer.add_free(64);
        writer.finish().unwrap()
    }

    fn reason(err: CodecError) -> String {
        match err {
            CodecError::MalformedPack { reason, .. } => reason,
            other => panic!("expected MalformedPack, got {other:?}"),
        }
    }

    #[test]
    fn parses_records() {
        let bytes = sample();
        let archive = PackArchive::parse(&bytes).unwrap();
        assert_eq!(archive.version(), 2);
        assert_eq!(archive.file_record_count(), 4);
        // root, Data, Art, Art/2DArt
        assert_eq!(archive.directory_count(), 4);
        assert_eq!(archive.free_record_count(), 1);
    }

    #[test]
    fn flattens_nested_directories() {
        let bytes = sample();
        let archive = PackArchive::parse(&bytes).unwrap();
        let paths: Vec<String> = archive.files().unwrap().into_iter().map(|f| f.path).collect();
        assert_eq!(
            paths,
            vec![
                "Art/2DArt/icon.dds",
                "Data/Mods.dat",
                "Data/Words.dat",
                "readme.txt"
            ]
        );
    }

    #[test]
    fn deep_nesting_is_flattened() {
        let path: Vec<String> = (0..200).map(|i| format!("d{i}")).collect();
        let path = format!("{}/leaf.bin", path.join("/"));
        let mut writer = PackWriter::new();
        writer.add_file(&path, b"deep".to_vec()).unwrap();
        let bytes = writer.finish().unwrap();
        let manifest = decompose_pack(&bytes, DepotId(1), ManifestId(1)).unwrap();
        assert_eq!(manifest.entries.len(), 1);
        assert_eq!(manifest.entries[0].path, path);
    }

    #[test]
    fn decomposition_hashes_content() {
        let bytes = sample();
        let manifest = decompose_pack(&bytes, DepotId(238961), ManifestId(5)).unwrap();
        assert_eq!(manifest.depot, DepotId(238961));
        assert_eq!(manifest.id, ManifestId(5));
        let mods = manifest.get("Data/Mods.dat").unwrap();
        assert_eq!(mods.size, 10);
        assert_eq!(mods.hash, ContentHasher::digest(b"mods table"));
        assert_eq!(mods.chunks.len(), 1);
        assert_eq!(mods.chunks[0].key, mods.hash);
        assert_eq!(mods.check_layout(), Ok(()));
    }

    #[test]
    fn large_files_split_into_chunks() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut writer = PackWriter::new();
        writer.add_file("big.bin", data.clone()).unwrap();
        let bytes = writer.finish().unwrap();

        let codec = PackCodec::new(DepotId(1), ManifestId(1)).with_chunk_size(4096);
        let manifest = codec.decompose(&bytes).unwrap();
        let big = manifest.get("big.bin").unwrap();
        let lens: Vec<u32> = big.chunks.iter().map(|c| c.uncompressed_len).collect();
        assert_eq!(lens, vec![4096, 4096, 1808]);
        assert_eq!(big.chunks[2].key, ContentHasher::digest(&data[8192..]));
        assert_eq!(big.hash, ContentHasher::digest(&data));
        assert_eq!(big.check_layout(), Ok(()));
    }

    #[test]
    fn empty_files_have_no_chunks() {
        let mut writer = PackWriter::new();
        writer.add_file("empty", Vec::new()).unwrap();
        let bytes = writer.finish().unwrap();
        let manifest = decompose_pack(&bytes, DepotId(1), ManifestId(1)).unwrap();
        assert!(manifest.entries[0].chunks.is_empty());
        assert_eq!(manifest.entries[0].hash, ContentHasher::digest(b""));
    }

    #[test]
    fn version_three_accepted() {
        let mut writer = PackWriter::with_version(3);
        writer.add_file("a", b"a".to_vec()).unwrap();
        let bytes = writer.finish().unwrap();
        assert_eq!(PackArchive::parse(&bytes).unwrap().version(), 3);
    }

    #[test]
    fn bad_magic_rejected() {
        let mut bytes = sample();
        bytes[4..8].copy_from_slice(b"NOPE");
        assert!(reason(PackArchive::parse(&bytes).unwrap_err()).contains("bad magic"));
    }

    #[test]
    fn bad_version_rejected() {
        let mut bytes = sample();
        bytes[8..12].copy_from_slice(&99u32.to_le_bytes());
        assert!(reason(PackArchive::parse(&bytes).unwrap_err()).contains("unsupported version 99"));
    }

    #[test]
    fn truncated_header_rejected() {
        assert!(reason(PackArchive::parse(b"GGPK").unwrap_err()).contains("truncated header"));
    }

    #[test]
    fn truncated_archive_rejected() {
        let bytes = sample();
        let cut = &bytes[..bytes.len() - 3];
        assert!(PackArchive::parse(cut).is_err());
    }

    #[test]
    fn record_overrunning_archive_rejected() {
        let mut bytes = sample();
        let first = HEADER_LEN as usize;
        bytes[first..first + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(reason(PackArchive::parse(&bytes).unwrap_err()).contains("past end"));
    }

    #[test]
    fn unknown_tag_rejected() {
        let mut bytes = sample();
        let first = HEADER_LEN as usize;
        bytes[first + 4..first + 8].copy_from_slice(b"JUNK");
        assert!(reason(PackArchive::parse(&bytes).unwrap_err()).contains("unknown record tag"));
    }

    #[test]
    fn dangling_child_offset_rejected() {
        let mut writer = PackWriter::new();
        writer.add_file("a", b"a".to_vec()).unwrap();
        let mut bytes = writer.finish().unwrap();
        let archive = PackArchive::parse(&bytes).unwrap();
        let root = archive.root_offset() as usize;
        // Root PDIR body: name_len, child_count, sha256, name "\0", then the child table.
        let child_offset_pos = root + 8 + 4 + 4 + 32 + 2 + 4;
        bytes[child_offset_pos..child_offset_pos + 8].copy_from_slice(&999_999u64.to_le_bytes());
        let archive = PackArchive::parse(&bytes).unwrap();
        assert!(reason(archive.files().unwrap_err()).contains("dangling child offset"));
    }

    #[test]
    fn record_shared_by_two_directories_leaves_an_orphan() {
        let mut writer = PackWriter::new();
        writer.add_file("a/x", b"first".to_vec()).unwrap();
        writer.add_file("b/x", b"second".to_vec()).unwrap();
        let mut bytes = writer.finish().unwrap();
        let archive = PackArchive::parse(&bytes).unwrap();
        assert_eq!(archive.orphan_count(&archive.files().unwrap()), 0);

        let shared = archive
            .files()
            .unwrap()
            .into_iter()
            .find(|f| f.path == "a/x")
            .unwrap()
            .record_offset;
        let b_dir = *archive
            .dirs
            .iter()
            .find(|(_, d)| d.name == "b")
            .unwrap()
            .0 as usize;
        // PDIR body: name_len, child_count, sha256, name "b\0", then the child table.
        let child_offset_pos = b_dir + 8 + 4 + 4 + 32 + 4 + 4;
        bytes[child_offset_pos..child_offset_pos + 8].copy_from_slice(&shared.to_le_bytes());

        let archive = PackArchive::parse(&bytes).unwrap();
        let files = archive.files().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.record_offset == shared && f.data == b"first"));
        assert_eq!(archive.orphan_count(&files), 1);
    }

    #[test]
    fn corrupted_file_data_is_checksum_mismatch() {
        let mut bytes = sample();
        let archive = PackArchive::parse(&bytes).unwrap();
        let target = archive
            .files()
            .unwrap()
            .into_iter()
            .find(|f| f.path == "readme.txt")
            .unwrap();
        let pos = target.data_offset as usize;
        bytes[pos] ^= 0xff;
        let err = decompose_pack(&bytes, DepotId(1), ManifestId(1)).unwrap_err();
        assert!(matches!(err, CodecError::PackChecksumMismatch { path } if path == "readme.txt"));
    }

    #[test]
    fn skeleton_covers_whole_archive() {
        let bytes = sample();
        let codec = PackCodec::new(DepotId(1), ManifestId(2)).with_chunk_size(4);
        let (manifest, skeleton) = codec.decompose_with_skeleton(&bytes).unwrap();
        assert_eq!(skeleton.archive_len, bytes.len() as u64);
        assert_eq!(skeleton.covered_len(), bytes.len() as u64);
        let chunk_refs: usize = manifest.entries.iter().map(|e| e.chunks.len()).sum();
        assert_eq!(skeleton.chunk_keys().count(), chunk_refs);
    }

    #[test]
    fn one_parse_yields_manifest_skeleton_and_chunk_bytes() {
        let bytes = sample();
        let codec = PackCodec::new(DepotId(1), ManifestId(2)).with_chunk_size(4);
        let parts = codec.decompose_archive(&bytes).unwrap();
        assert_eq!(
            (parts.manifest.clone(), parts.skeleton.clone()),
            codec.decompose_with_skeleton(&bytes).unwrap()
        );

        let paths: Vec<&str> = parts.files.iter().map(|f| f.path.as_str()).collect();
        let entry_paths: Vec<&str> = parts.manifest.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, entry_paths);

        let pieces = parts.chunk_data();
        assert_eq!(pieces.len(), parts.manifest.unique_chunks().len());
        for (key, piece) in &pieces {
            assert_eq!(ContentHasher::digest(piece), *key);
        }
    }

    proptest::proptest! {
        #[test]
        fn written_archives_decompose_to_their_files(
            files in proptest::collection::btree_map(
                "[a-z]{1,6}(/[a-z]{1,6}){0,2}\\.dat",
                proptest::collection::vec(proptest::num::u8::ANY, 0..600),
                1..8,
            ),
            chunk_size in 1u32..300,
        ) {
            let mut writer = PackWriter::new();
            for (path, data) in &files {
                if writer.add_file(path, data.clone()).is_err() {
                    return Ok(());
                }
            }
            let bytes = match writer.finish() {
                Ok(bytes) => bytes,
                // A name used both as a file and a directory.
                Err(_) => return Ok(()),
            };
            let codec = PackCodec::new(DepotId(1), ManifestId(1)).with_chunk_size(chunk_size);
            let (manifest, skeleton) = codec.decompose_with_skeleton(&bytes).unwrap();
            proptest::prop_assert_eq!(manifest.len(), files.len());
            for (path, data) in &files {
                let entry = manifest.get(path).unwrap();
                proptest::prop_assert_eq!(entry.size, data.len() as u64);
                proptest::prop_assert_eq!(entry.hash, ContentHasher::digest(data));
                proptest::prop_assert_eq!(entry.check_layout(), Ok(()));
            }
            proptest::prop_assert_eq!(skeleton.covered_len(), bytes.len() as u64);
        }
    }

    #[test]
    fn codec_trait_reports_source_kind() {
        let codec: Box<dyn Codec> = Box::new(PackCodec::new(DepotId(1), ManifestId(1)));
        assert_eq!(codec.source_kind(), SourceKind::PackArchive);
        assert_eq!(codec.decode(&sample()).unwrap().len(), 4);
    }
}
