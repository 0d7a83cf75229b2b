use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Content address of a chunk payload or a whole file.
///
/// A `ContentId` is the SHA-1 digest of the *uncompressed* bytes. This is the
/// width carried by the manifest wire format (`ChunkID` and `FileHash`), so
/// manifest chunks can be keyed without rehashing. Identical content always
/// produces the same `ContentId`, which is what makes chunks deduplicatable
/// across files, manifests, and sources.
///
/// This crate does not compute digests; see `krangler-crypto`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentId([u8; 20]);

impl ContentId {
    /// Digest width in bytes.
    pub const LEN: usize = 20;

    /// Create a `ContentId` from a pre-computed digest.
    pub const fn from_raw(digest: [u8; 20]) -> Self {
        Self(digest)
    }

    /// Create a `ContentId` from a digest slice, checking its width.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; 20] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// The raw 20-byte digest.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// First byte of the digest, used for sharding.
    pub fn shard(&self) -> u8 {
        self.0[0]
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.short_hex())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 20]> for ContentId {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl From<ContentId> for [u8; 20] {
    fn from(id: ContentId) -> Self {
        id.0
    }
}
