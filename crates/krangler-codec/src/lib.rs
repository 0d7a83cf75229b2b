//! Source codecs for krangler.
//!
//! Each codec turns the bytes of one artifact kind into the canonical
//! [`Manifest`](krangler_types::Manifest). Codecs are pure: they never touch a
//! store and reject malformed input as a whole.
//!
//! # Codecs
//!
//! - **[`ManifestCodec`]**: protobuf depot manifests, optionally raw-deflated
//! - **[`PackCodec`]**: GGPK pack archives, flattened to files and re-chunked
//! - **[`PackWriter`]**: builds GGPK archives in memory
//! - **[`PackSkeleton`]**: the non-file bytes of a decomposed archive, so it
//!   can be rebuilt from the chunk store

pub mod error;
pub mod manifest;
pub mod pack;
pub mod proto;
pub mod skeleton;
pub mod traits;
pub mod writer;

pub use error::{CodecError, CodecResult};
pub use manifest::{decode_manifest, encode_manifest, ManifestCodec};
pub use pack::{
    decompose_pack, decompose_pack_with_skeleton, PackArchive, PackCodec, PackDecomposition, PackedFile,
    DEFAULT_CHUNK_SIZE,
};
pub use skeleton::{PackSkeleton, SkeletonSegment};
pub use traits::{Codec, SourceKind};
pub use writer::PackWriter;
