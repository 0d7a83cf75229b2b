use std::borrow::Cow;

use krangler_crypto::ContentHasher;
use krangler_types::ContentId;

use crate::compression::{Compression, CompressionRegistry};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

/// Bytes offered to [`ChunkStore::put`](crate::ChunkStore::put).
#[derive(Clone, Copy, Debug)]
pub enum PutPayload<'a> {
    /// Uncompressed chunk content.
    Raw(&'a [u8]),
    /// Compressed chunk content with its declared uncompressed length.
    Compressed {
        algorithm: Compression,
        data: &'a [u8],
        uncompressed_len: u32,
    },
}

/// Outcome of a successful `put`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitResult {
    /// This call committed the chunk.
    Stored,
    /// The chunk was already indexed; nothing was written.
    AlreadyPresent,
}

/// A verified chunk ready to be written.
#[derive(Debug)]
pub(crate) struct Prepared<'a> {
    pub compression: Compression,
    pub stored: Cow<'a, [u8]>,
    pub uncompressed_len: u32,
}

impl Prepared<'_> {
    pub fn stored_len(&self) -> u32 {
        self.stored.len() as u32
    }

    pub fn crc32(&self) -> u32 {
        crc32fast::hash(&self.stored)
    }
}

/// Decompress and verify a payload against `key`, then choose its stored
/// form.
///
/// zstd input is kept as given. Everything else is stored zstd-compressed when
/// that is smaller, raw otherwise.
pub(crate) fn prepare<'a>(
    key: &ContentId,
    payload: PutPayload<'a>,
    registry: &CompressionRegistry,
    config: &StoreConfig,
) -> StoreResult<Prepared<'a>> {
    let (content, passthrough): (Cow<'a, [u8]>, Option<&'a [u8]>) = match payload {
        PutPayload::Raw(data) => (Cow::Borrowed(data), None),
        PutPayload::Compressed {
            algorithm,
            data,
            uncompressed_len,
        } => {
            let content = match algorithm {
                Compression::None => {
                    if data.len() as u64 != u64::from(uncompressed_len) {
                        return Err(StoreError::TruncatedChunk {
                            key: *key,
                            declared: u64::from(uncompressed_len),
                            actual: data.len() as u64,
                        });
                    }
                    Cow::Borrowed(data)
                }
                _ => Cow::Owned(registry.decompress(
                    key,
                    algorithm,
                    data,
                    u64::from(uncompressed_len),
                )?),
            };
            let passthrough = (algorithm == Compression::Zstd).then_some(data);
            (content, passthrough)
        }
    };

    let uncompressed_len = u32::try_from(content.len()).map_err(|_| StoreError::ChunkTooLarge {
        key: *key,
        len: content.len() as u64,
    })?;
    let computed = ContentHasher::digest(&content);
    if computed != *key {
        return Err(StoreError::ChecksumMismatch {
            key: *key,
            detail: format!("content hashes to {computed}"),
        });
    }

    if let Some(compressed) = passthrough {
        return Ok(Prepared {
            compression: Compression::Zstd,
            stored: Cow::Borrowed(compressed),
            uncompressed_len,
        });
    }
    if content.len() >= config.compression_threshold {
        let compressed = zstd::bulk::compress(&content, config.zstd_level)?;
        if compressed.len() < content.len() {
            return Ok(Prepared {
                compression: Compression::Zstd,
                stored: Cow::Owned(compressed),
                uncompressed_len,
            });
        }
    }
    Ok(Prepared {
        compression: Compression::None,
        stored: content,
        uncompressed_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StoreConfig {
        StoreConfig::default()
    }

    #[test]
    fn compressible_raw_payload_is_compressed() {
        let data = vec![0u8; 4096];
        let key = ContentHasher::digest(&data);
        let p = prepare(&key, PutPayload::Raw(&data), &CompressionRegistry::new(), &config()).unwrap();
        assert_eq!(p.compression, Compression::Zstd);
        assert!(p.stored.len() < data.len());
        assert_eq!(p.uncompressed_len, 4096);
    }

    #[test]
    fn small_payload_stays_raw() {
        let data = b"tiny";
        let key = ContentHasher::digest(data);
        let p = prepare(&key, PutPayload::Raw(data), &CompressionRegistry::new(), &config()).unwrap();
        assert_eq!(p.compression, Compression::None);
        assert_eq!(&*p.stored, data);
    }

    #[test]
    fn zstd_input_is_kept_as_given() {
        let data = vec![7u8; 1000];
        let packed = zstd::encode_all(data.as_slice(), 19).unwrap();
        let key = ContentHasher::digest(&data);
        let payload = PutPayload::Compressed {
            algorithm: Compression::Zstd,
            data: &packed,
            uncompressed_len: 1000,
        };
        let p = prepare(&key, payload, &CompressionRegistry::new(), &config()).unwrap();
        assert_eq!(p.compression, Compression::Zstd);
        assert_eq!(&*p.stored, packed.as_slice());
    }

    #[test]
    fn wrong_key_is_checksum_mismatch() {
        let key = ContentHasher::digest(b"expected");
        let err = prepare(&key, PutPayload::Raw(b"actual"), &CompressionRegistry::new(), &config())
            .unwrap_err();
        assert!(matches!(err, StoreError::ChecksumMismatch { .. }));
    }

    #[test]
    fn declared_length_mismatch_is_truncation() {
        let data = b"abcdef";
        let key = ContentHasher::digest(data);
        let payload = PutPayload::Compressed {
            algorithm: Compression::None,
            data,
            uncompressed_len: 10,
        };
        let err = prepare(&key, payload, &CompressionRegistry::new(), &config()).unwrap_err();
        assert!(matches!(err, StoreError::TruncatedChunk { declared: 10, actual: 6, .. }));
    }

    #[test]
    fn unknown_algorithm_rejected() {
        let key = ContentHasher::digest(b"x");
        let payload = PutPayload::Compressed {
            algorithm: Compression::Custom(3),
            data: b"x",
            uncompressed_len: 1,
        };
        let err = prepare(&key, payload, &CompressionRegistry::new(), &config()).unwrap_err();
        assert!(matches!(err, StoreError::UnknownCompressionAlgorithm(_)));
    }
}
