use krangler_crypto::ContentHasher;
use krangler_types::ContentId;
use serde::{Deserialize, Serialize};

use crate::compression::{Compression, CompressionRegistry};
use crate::error::{StoreError, StoreResult};

const RECORD_MAGIC: &[u8; 4] = b"KIDX";
const RECORD_VERSION: u32 = 1;
/// magic + version + payload length + CRC32.
const RECORD_HEADER_LEN: usize = 16;

/// Index metadata for one committed chunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub key: ContentId,
    pub uncompressed_len: u32,
    /// Length of the payload as stored (after compression, if any).
    pub stored_len: u32,
    pub compression: Compression,
    /// CRC32 of the stored payload, checked on every read.
    pub stored_crc32: u32,
    /// Backend-specific physical location.
    pub location: String,
}

impl ChunkRecord {
    /// Serialize as `KIDX | u32 version | u32 len | u32 crc32 | bincode`.
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        let payload =
            bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut out = Vec::with_capacity(RECORD_HEADER_LEN + payload.len());
        out.extend_from_slice(RECORD_MAGIC);
        out.extend_from_slice(&RECORD_VERSION.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Parse a framed record, checking that it belongs to `key`.
    pub fn from_bytes(key: &ContentId, bytes: &[u8]) -> StoreResult<Self> {
        let corrupt = |reason: String| StoreError::IndexCorruption { key: *key, reason };
        if bytes.len() < RECORD_HEADER_LEN || &bytes[0..4] != RECORD_MAGIC {
            return Err(corrupt("not an index record".into()));
        }
        let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let version = word(4);
        if version != RECORD_VERSION {
            return Err(corrupt(format!("unsupported record version {version}")));
        }
        let len = word(8) as usize;
        let payload = &bytes[RECORD_HEADER_LEN..];
        if payload.len() != len {
            return Err(corrupt(format!(
                "record payload is {} bytes, header says {len}",
                payload.len()
            )));
        }
        if crc32fast::hash(payload) != word(12) {
            return Err(corrupt("record CRC mismatch".into()));
        }
        let record: Self =
            bincode::deserialize(payload).map_err(|e| corrupt(e.to_string()))?;
        if record.key != *key {
            return Err(corrupt(format!("record belongs to {}", record.key)));
        }
        Ok(record)
    }
}

/// A chunk as read back from the store, still in its stored form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredChunk {
    pub record: ChunkRecord,
    pub payload: Vec<u8>,
}

impl StoredChunk {
    pub fn key(&self) -> &ContentId {
        &self.record.key
    }

    /// Decompress the stored payload to the original chunk bytes.
    pub fn decompress(&self, registry: &CompressionRegistry) -> StoreResult<Vec<u8>> {
        registry.decompress(
            &self.record.key,
            self.record.compression,
            &self.payload,
            u64::from(self.record.uncompressed_len),
        )
    }

    /// Decompress and check the content against the key.
    pub fn into_verified_bytes(self, registry: &CompressionRegistry) -> StoreResult<Vec<u8>> {
        let data = self.decompress(registry)?;
        let computed = ContentHasher::digest(&data);
        if computed != self.record.key {
            return Err(StoreError::ChecksumMismatch {
                key: self.record.key,
                detail: format!("content hashes to {computed}"),
            });
        }
        Ok(data)
    }

    /// Check the stored payload against the CRC recorded at commit time.
    pub(crate) fn check_crc(&self) -> StoreResult<()> {
        let actual = crc32fast::hash(&self.payload);
        if actual != self.record.stored_crc32 {
            return Err(StoreError::ChecksumMismatch {
                key: self.record.key,
                detail: format!(
                    "stored payload CRC {actual:08x}, expected {:08x}",
                    self.record.stored_crc32
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ChunkRecord {
        ChunkRecord {
            key: ContentHasher::digest(b"chunk"),
            uncompressed_len: 5,
            stored_len: 5,
            compression: Compression::None,
            stored_crc32: crc32fast::hash(b"chunk"),
            location: "chunks/aa/aabb.blob".into(),
        }
    }

    #[test]
    fn framed_record_reloads() {
        let r = record();
        let bytes = r.to_bytes().unwrap();
        assert_eq!(&bytes[0..4], b"KIDX");
        assert_eq!(ChunkRecord::from_bytes(&r.key, &bytes).unwrap(), r);
    }

    #[test]
    fn flipped_record_byte_is_corruption() {
        let r = record();
        let mut bytes = r.to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 1;
        assert!(matches!(
            ChunkRecord::from_bytes(&r.key, &bytes),
            Err(StoreError::IndexCorruption { .. })
        ));
    }

    #[test]
    fn truncated_record_is_corruption() {
        let r = record();
        let bytes = r.to_bytes().unwrap();
        assert!(ChunkRecord::from_bytes(&r.key, &bytes[..bytes.len() - 2]).is_err());
        assert!(ChunkRecord::from_bytes(&r.key, &bytes[..8]).is_err());
    }

    #[test]
    fn record_for_other_key_is_corruption() {
        let r = record();
        let bytes = r.to_bytes().unwrap();
        let other = ContentHasher::digest(b"other");
        assert!(matches!(
            ChunkRecord::from_bytes(&other, &bytes),
            Err(StoreError::IndexCorruption { .. })
        ));
    }

    #[test]
    fn stored_chunk_verifies_content() {
        let chunk = StoredChunk {
            record: record(),
            payload: b"chunk".to_vec(),
        };
        chunk.check_crc().unwrap();
        assert_eq!(chunk.into_verified_bytes(&CompressionRegistry::new()).unwrap(), b"chunk");

        let bad = StoredChunk {
            record: record(),
            payload: b"chonk".to_vec(),
        };
        assert!(matches!(bad.check_crc(), Err(StoreError::ChecksumMismatch { .. })));
        assert!(matches!(
            bad.into_verified_bytes(&CompressionRegistry::new()),
            Err(StoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn decompression_uses_the_given_registry() {
        struct Upper;
        impl crate::compression::Decompressor for Upper {
            fn decompress(&self, input: &[u8], _expected_len: usize) -> std::io::Result<Vec<u8>> {
                Ok(input.to_ascii_uppercase())
            }
        }
        let content = b"CHUNK";
        let chunk = StoredChunk {
            record: ChunkRecord {
                key: ContentHasher::digest(content),
                compression: Compression::Custom(9),
                ..record()
            },
            payload: b"chunk".to_vec(),
        };

        assert!(matches!(
            chunk.decompress(&CompressionRegistry::new()),
            Err(StoreError::UnknownCompressionAlgorithm(Compression::Custom(9)))
        ));
        let mut registry = CompressionRegistry::new();
        registry.register(9, std::sync::Arc::new(Upper));
        assert_eq!(chunk.into_verified_bytes(&registry).unwrap(), content);
    }
}
