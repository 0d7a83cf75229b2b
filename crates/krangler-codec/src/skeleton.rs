use krangler_types::{ContentId, DepotId, ManifestId};
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult};

const SKELETON_MAGIC: &[u8; 4] = b"KSKL";
const SKELETON_VERSION: u32 = 1;

/// One contiguous span of a pack archive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkeletonSegment {
    /// Container bytes kept verbatim: headers, directory records, free space.
    Literal(Vec<u8>),
    /// File data held in the chunk store.
    Chunk { key: ContentId, len: u32 },
}

impl SkeletonSegment {
    pub fn len(&self) -> u64 {
        match self {
            Self::Literal(bytes) => bytes.len() as u64,
            Self::Chunk { len, .. } => u64::from(*len),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything needed to rebuild a decomposed pack archive byte-for-byte,
/// given the chunks it references.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackSkeleton {
    pub depot: DepotId,
    pub manifest: ManifestId,
    pub archive_len: u64,
    /// BLAKE3 digest of the original archive.
    pub archive_digest: [u8; 32],
    pub segments: Vec<SkeletonSegment>,
}

impl PackSkeleton {
    /// Keys of every chunk segment, in archive order.
    pub fn chunk_keys(&self) -> impl Iterator<Item = &ContentId> {
        self.segments.iter().filter_map(|s| match s {
            SkeletonSegment::Chunk { key, .. } => Some(key),
            SkeletonSegment::Literal(_) => None,
        })
    }

    /// Total length described by the segments; equals `archive_len` for a
    /// well-formed skeleton.
    pub fn covered_len(&self) -> u64 {
        self.segments.iter().map(SkeletonSegment::len).sum()
    }

    pub fn literal_len(&self) -> u64 {
        self.segments
            .iter()
            .filter(|s| matches!(s, SkeletonSegment::Literal(_)))
            .map(SkeletonSegment::len)
            .sum()
    }

    /// Serialize as `KSKL | u32 version | zstd(bincode(self))`.
    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        let body = bincode::serialize(self).map_err(|e| CodecError::Serialization(e.to_string()))?;
        let compressed =
            zstd::encode_all(body.as_slice(), 3).map_err(|e| CodecError::Serialization(e.to_string()))?;
        let mut out = Vec::with_capacity(8 + compressed.len());
        out.extend_from_slice(SKELETON_MAGIC);
        out.extend_from_slice(&SKELETON_VERSION.to_le_bytes());
        out.extend_from_slice(&compressed);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        if bytes.len() < 8 || &bytes[0..4] != SKELETON_MAGIC {
            return Err(CodecError::Serialization("not a pack skeleton".into()));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != SKELETON_VERSION {
            return Err(CodecError::Serialization(format!(
                "unsupported skeleton version {version}"
            )));
        }
        let body =
            zstd::decode_all(&bytes[8..]).map_err(|e| CodecError::Serialization(e.to_string()))?;
        let skeleton: Self =
            bincode::deserialize(&body).map_err(|e| CodecError::Serialization(e.to_string()))?;
        if skeleton.covered_len() != skeleton.archive_len {
            return Err(CodecError::Serialization(format!(
                "segments cover {} bytes, archive is {}",
                skeleton.covered_len(),
                skeleton.archive_len
            )));
        }
        Ok(skeleton)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::PackCodec;
    use crate::writer::PackWriter;

    fn skeleton() -> PackSkeleton {
        let mut writer = PackWriter::new();
        writer.add_file("Data/a.dat", vec![7u8; 300]).unwrap();
        writer.add_file("Data/b.dat", vec![9u8; 20]).unwrap();
        writer.add_free(40);
        let bytes = writer.finish().unwrap();
        PackCodec::new(DepotId(3), ManifestId(11))
            .with_chunk_size(128)
            .decompose_with_skeleton(&bytes)
            .unwrap()
            .1
    }

    #[test]
    fn serialized_form_survives_reload() {
        let original = skeleton();
        let bytes = original.to_bytes().unwrap();
        assert_eq!(&bytes[0..4], b"KSKL");
        assert_eq!(PackSkeleton::from_bytes(&bytes).unwrap(), original);
    }

    #[test]
    fn chunk_keys_follow_archive_order() {
        let s = skeleton();
        // a.dat: 128 + 128 + 44, b.dat: 20
        let lens: Vec<u64> = s
            .segments
            .iter()
            .filter(|seg| matches!(seg, SkeletonSegment::Chunk { .. }))
            .map(SkeletonSegment::len)
            .collect();
        assert_eq!(lens, vec![128, 128, 44, 20]);
        assert_eq!(s.chunk_keys().count(), 4);
        assert_eq!(s.literal_len() + 320, s.archive_len);
    }

    #[test]
    fn rejects_foreign_bytes() {
        assert!(PackSkeleton::from_bytes(b"GGPK\x01\0\0\0").is_err());
        assert!(PackSkeleton::from_bytes(b"KS").is_err());
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = skeleton().to_bytes().unwrap();
        bytes[4..8].copy_from_slice(&9u32.to_le_bytes());
        assert!(matches!(
            PackSkeleton::from_bytes(&bytes),
            Err(CodecError::Serialization(msg)) if msg.contains("version 9")
        ));
    }
}
