use krangler_types::Manifest;

use crate::error::CodecResult;

/// Which kind of source artifact a codec understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    DepotManifest,
    PackArchive,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DepotManifest => write!(f, "depot-manifest"),
            Self::PackArchive => write!(f, "pack-archive"),
        }
    }
}

/// Turns the bytes of one source artifact into a canonical [`Manifest`].
///
/// Implementations are pure: they never touch a store, and they either return
/// a fully validated manifest or an error.
pub trait Codec: Send + Sync {
    fn source_kind(&self) -> SourceKind;

    fn decode(&self, bytes: &[u8]) -> CodecResult<Manifest>;
}
