use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

use krangler_types::ContentId;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Compression algorithm tag for a chunk payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compression {
    None,
    Zstd,
    /// An integrator-supplied algorithm, resolved through a
    /// [`CompressionRegistry`]. Never used for stored blobs.
    Custom(u16),
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Zstd => write!(f, "zstd"),
            Self::Custom(tag) => write!(f, "custom:{tag}"),
        }
    }
}

/// A decompression capability for a custom algorithm tag.
///
/// `expected_len` is the declared uncompressed length; implementations may use
/// it to size buffers but must not pad or truncate their output to match it.
pub trait Decompressor: Send + Sync {
    fn decompress(&self, input: &[u8], expected_len: usize) -> io::Result<Vec<u8>>;
}

/// Resolves compression tags to decompressors.
///
/// `None` and `Zstd` are always available.
#[derive(Clone, Default)]
pub struct CompressionRegistry {
    custom: HashMap<u16, Arc<dyn Decompressor>>,
}

impl fmt::Debug for CompressionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<u16> = self.custom.keys().copied().collect();
        tags.sort_unstable();
        f.debug_struct("CompressionRegistry")
            .field("custom", &tags)
            .finish()
    }
}

impl CompressionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the decompressor for a custom tag.
    pub fn register(&mut self, tag: u16, decompressor: Arc<dyn Decompressor>) -> &mut Self {
        self.custom.insert(tag, decompressor);
        self
    }

    pub fn supports(&self, algorithm: Compression) -> bool {
        match algorithm {
            Compression::None | Compression::Zstd => true,
            Compression::Custom(tag) => self.custom.contains_key(&tag),
        }
    }

    /// Decompress `input` and check it against the declared length.
    pub fn decompress(
        &self,
        key: &ContentId,
        algorithm: Compression,
        input: &[u8],
        expected_len: u64,
    ) -> StoreResult<Vec<u8>> {
        let output = match algorithm {
            Compression::None => input.to_vec(),
            Compression::Zstd => zstd_bounded(key, input, expected_len)?,
            Compression::Custom(tag) => {
                let decompressor = self
                    .custom
                    .get(&tag)
                    .ok_or(StoreError::UnknownCompressionAlgorithm(algorithm))?;
                decompressor
                    .decompress(input, expected_len as usize)
                    .map_err(|e| StoreError::Decompression {
                        key: *key,
                        reason: e.to_string(),
                    })?
            }
        };
        if output.len() as u64 != expected_len {
            return Err(StoreError::TruncatedChunk {
                key: *key,
                declared: expected_len,
                actual: output.len() as u64,
            });
        }
        Ok(output)
    }
}

/// Decode a zstd frame, reading at most one byte past the declared length so
/// an oversized frame is detected without decoding all of it.
fn zstd_bounded(key: &ContentId, input: &[u8], expected_len: u64) -> StoreResult<Vec<u8>> {
    let decoder = zstd::stream::read::Decoder::new(input).map_err(|e| StoreError::Decompression {
        key: *key,
        reason: e.to_string(),
    })?;
    let mut output = Vec::with_capacity(expected_len.min(16 * 1024 * 1024) as usize);
    decoder
        .take(expected_len.saturating_add(1))
        .read_to_end(&mut output)
        .map_err(|e| StoreError::Decompression {
            key: *key,
            reason: e.to_string(),
        })?;
    Ok(output)
}
