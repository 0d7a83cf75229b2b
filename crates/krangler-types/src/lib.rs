//! Canonical model for krangler.
//!
//! Both source formats (depot manifests and pack archives) decode into the
//! types defined here, so that storage, reconstruction, and state tracking
//! never need to know where a file came from.
//!
//! # Key Types
//!
//! - [`ContentId`]: SHA-1 content address of a chunk or a whole file
//! - [`DepotId`] / [`ManifestId`]: numeric depot and version identifiers
//! - [`FileFlags`]: independent per-file attribute bits
//! - [`ChunkRef`]: a chunk reference at an offset within a file
//! - [`FileEntry`]: a path plus its ordered chunk list
//! - [`Manifest`]: an immutable snapshot of a depot at one version

pub mod content;
pub mod error;
pub mod flags;
pub mod ids;
pub mod manifest;

pub use content::ContentId;
pub use error::{LayoutError, TypeError};
pub use flags::FileFlags;
pub use ids::{DepotId, ManifestId};
pub use manifest::{ChunkRef, FileEntry, Manifest};
