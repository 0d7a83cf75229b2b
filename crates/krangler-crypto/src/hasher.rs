use krangler_types::ContentId;
use sha1::{Digest, Sha1};
use sha2::Sha256;

/// One-shot content hashing.
pub struct ContentHasher;

impl ContentHasher {
    /// SHA-1 content address of `data`.
    pub fn digest(data: &[u8]) -> ContentId {
        ContentId::from_raw(Sha1::digest(data).into())
    }

    /// Verify that `data` has the expected content address.
    pub fn verify(data: &[u8], expected: &ContentId) -> bool {
        Self::digest(data) == *expected
    }

    /// SHA-256 of `data`, as embedded in pack archive records.
    pub fn sha256(data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }
}

/// Incremental SHA-1 over a sequence of byte slices.
///
/// Used to verify a whole-file hash while chunks are appended in order.
#[derive(Clone, Default)]
pub struct StreamingHasher {
    inner: Sha1,
    len: u64,
}

impl StreamingHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.len += data.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finalize(self) -> ContentId {
        ContentId::from_raw(self.inner.finalize().into())
    }
}

/// Incremental BLAKE3 over an entire pack archive.
#[derive(Clone, Default)]
pub struct ArchiveHasher {
    inner: blake3::Hasher,
}

impl ArchiveHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(&self) -> [u8; 32] {
        *self.inner.finalize().as_bytes()
    }

    /// One-shot digest of a complete archive.
    pub fn digest(data: &[u8]) -> [u8; 32] {
        *blake3::hash(data).as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_known_vector() {
        let id = ContentHasher::digest(b"abc");
        assert_eq!(id.to_hex(), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn sha1_of_empty_input() {
        let id = ContentHasher::digest(b"");
        assert_eq!(id.to_hex(), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn verify_correct_and_tampered() {
        let id = ContentHasher::digest(b"original");
        assert!(ContentHasher::verify(b"original", &id));
        assert!(!ContentHasher::verify(b"tampered", &id));
    }

    #[test]
    fn streaming_matches_one_shot() {
        let mut hasher = StreamingHasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.len(), 11);
        assert_eq!(hasher.finalize(), ContentHasher::digest(b"hello world"));
    }

    #[test]
    fn sha256_known_vector() {
        let digest = ContentHasher::sha256(b"abc");
        assert_eq!(
            digest[..4],
            [0xba, 0x78, 0x16, 0xbf],
        );
    }

    #[test]
    fn archive_streaming_matches_one_shot() {
        let mut hasher = ArchiveHasher::new();
        hasher.update(b"GGPK");
        hasher.update(b"payload");
        assert_eq!(hasher.finalize(), ArchiveHasher::digest(b"GGPKpayload"));
    }
}
