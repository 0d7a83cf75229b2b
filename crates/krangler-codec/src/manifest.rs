//! Depot manifest codec.
//!
//! Decoding validates everything downstream code relies on before returning:
//! required fields, chunk layout, flag combinations, and path uniqueness.

use std::collections::HashSet;
use std::io::Read;

use chrono::{DateTime, Utc};
use flate2::read::DeflateDecoder;
use krangler_types::{ChunkRef, ContentId, DepotId, FileEntry, FileFlags, Manifest, ManifestId};
use prost::Message;
use tracing::debug;

use crate::error::{CodecError, CodecResult};
use crate::proto::{ChunkData, FileData, ProtoManifest};
use crate::traits::{Codec, SourceKind};

/// Codec for protobuf depot manifests.
///
/// The wire format does not carry the depot id, so the codec is bound to the
/// depot the manifest was fetched for.
#[derive(Clone, Debug)]
pub struct ManifestCodec {
    depot: DepotId,
}

impl ManifestCodec {
    pub fn new(depot: DepotId) -> Self {
        Self { depot }
    }

    /// Decode a raw (uncompressed) protobuf manifest.
    pub fn decode(&self, bytes: &[u8]) -> CodecResult<Manifest> {
        let proto = ProtoManifest::decode(bytes)
            .map_err(|e| CodecError::manifest(None, "<wire>", e.to_string()))?;
        self.from_proto(proto)
    }

    /// Decode a manifest stored as a raw DEFLATE stream, the form depot
    /// downloaders keep on disk.
    pub fn decode_deflated(&self, bytes: &[u8]) -> CodecResult<Manifest> {
        let mut raw = Vec::new();
        DeflateDecoder::new(bytes)
            .read_to_end(&mut raw)
            .map_err(|e| CodecError::manifest(None, "<deflate>", e.to_string()))?;
        self.decode(&raw)
    }

    /// Convert a decoded wire message into a validated manifest.
    pub fn from_proto(&self, proto: ProtoManifest) -> CodecResult<Manifest> {
        let id = proto
            .id
            .ok_or_else(|| CodecError::manifest(None, "ID", "missing"))?;
        let created_at = proto.creation_time.map(decode_timestamp).transpose()?;

        let mut seen = HashSet::with_capacity(proto.files.len());
        let mut entries = Vec::with_capacity(proto.files.len());
        for file in proto.files {
            let entry = decode_file(file)?;
            if !seen.insert(entry.path.clone()) {
                return Err(CodecError::manifest(
                    Some(&entry.path),
                    "FileName",
                    "duplicate path",
                ));
            }
            entries.push(entry);
        }

        debug!(
            depot = %self.depot,
            manifest = id,
            files = entries.len(),
            "decoded depot manifest"
        );
        Ok(Manifest {
            depot: self.depot,
            id: ManifestId(id),
            created_at,
            entries,
        })
    }

    /// Encode a manifest back into the wire format.
    pub fn encode(manifest: &Manifest) -> Vec<u8> {
        Self::to_proto(manifest).encode_to_vec()
    }

    pub fn to_proto(manifest: &Manifest) -> ProtoManifest {
        ProtoManifest {
            files: manifest.entries.iter().map(encode_file).collect(),
            id: Some(manifest.id.0),
            creation_time: manifest.created_at.map(|t| ::prost_types::Timestamp {
                seconds: t.timestamp(),
                nanos: t.timestamp_subsec_nanos() as i32,
            }),
        }
    }
}

impl Codec for ManifestCodec {
    fn source_kind(&self) -> SourceKind {
        SourceKind::DepotManifest
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Manifest> {
        ManifestCodec::decode(self, bytes)
    }
}

/// Decode a raw protobuf manifest for `depot`.
pub fn decode_manifest(bytes: &[u8], depot: DepotId) -> CodecResult<Manifest> {
    ManifestCodec::new(depot).decode(bytes)
}

/// Encode a manifest into the protobuf wire format.
pub fn encode_manifest(manifest: &Manifest) -> Vec<u8> {
    ManifestCodec::encode(manifest)
}

/// Wire paths use the separator of the OS that produced them.
fn normalize_path(raw: &str) -> String {
    raw.replace('\\', "/").trim_start_matches('/').to_owned()
}

fn decode_timestamp(ts: ::prost_types::Timestamp) -> CodecResult<DateTime<Utc>> {
    let nanos = u32::try_from(ts.nanos)
        .map_err(|_| CodecError::manifest(None, "CreationTime", "negative nanos"))?;
    DateTime::from_timestamp(ts.seconds, nanos)
        .ok_or_else(|| CodecError::manifest(None, "CreationTime", "out of range"))
}

fn decode_file(file: FileData) -> CodecResult<FileEntry> {
    let raw_name = file
        .file_name
        .ok_or_else(|| CodecError::manifest(None, "FileName", "missing"))?;
    let path = normalize_path(&raw_name);
    if path.is_empty() {
        return Err(CodecError::manifest(Some(&raw_name), "FileName", "empty path"));
    }
    let p = Some(path.as_str());

    let flags = match file.flags {
        None => FileFlags::empty(),
        Some(bits) => FileFlags::from_wire(bits)
            .ok_or_else(|| CodecError::manifest(p, "Flags", format!("unknown bits in {bits:#x}")))?,
    };
    if !flags.is_valid_combination() {
        return Err(CodecError::manifest(
            p,
            "Flags",
            format!("invalid combination {flags:?}"),
        ));
    }

    let size = file
        .total_size
        .ok_or_else(|| CodecError::manifest(p, "TotalSize", "missing"))?;
    let hash_bytes = file
        .file_hash
        .ok_or_else(|| CodecError::manifest(p, "FileHash", "missing"))?;
    let hash = ContentId::from_slice(&hash_bytes)
        .map_err(|e| CodecError::manifest(p, "FileHash", e.to_string()))?;

    let mut chunks = file
        .chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| decode_chunk(&path, index, chunk))
        .collect::<CodecResult<Vec<_>>>()?;
    // The wire does not guarantee chunk order.
    chunks.sort_by_key(|c| c.offset);

    let entry = FileEntry {
        path,
        flags,
        size,
        hash,
        chunks,
    };
    entry
        .check_layout()
        .map_err(|e| CodecError::manifest(Some(&entry.path), "Chunks", e.to_string()))?;
    Ok(entry)
}

fn decode_chunk(path: &str, index: usize, chunk: ChunkData) -> CodecResult<ChunkRef> {
    let p = Some(path);
    let missing = |field: &'static str| CodecError::manifest(p, field, format!("missing on chunk {index}"));

    let id = chunk.chunk_id.ok_or_else(|| missing("ChunkID"))?;
    let key = ContentId::from_slice(&id)
        .map_err(|e| CodecError::manifest(p, "ChunkID", format!("chunk {index}: {e}")))?;
    Ok(ChunkRef {
        key,
        offset: chunk.offset.ok_or_else(|| missing("Offset"))?,
        uncompressed_len: chunk
            .uncompressed_length
            .ok_or_else(|| missing("UncompressedLength"))?,
        compressed_len: chunk
            .compressed_length
            .ok_or_else(|| missing("CompressedLength"))?,
        source_checksum: chunk.checksum,
    })
}

fn encode_file(entry: &FileEntry) -> FileData {
    FileData {
        file_name: Some(entry.path.clone()),
        chunks: entry
            .chunks
            .iter()
            .map(|c| ChunkData {
                chunk_id: Some(c.key.as_bytes().to_vec()),
                checksum: c.source_checksum.clone(),
                offset: Some(c.offset),
                compressed_length: Some(c.compressed_len),
                uncompressed_length: Some(c.uncompressed_len),
            })
            .collect(),
        flags: Some(entry.flags.to_wire()),
        total_size: Some(entry.size),
        file_hash: Some(entry.hash.as_bytes().to_vec()),
    }
}
