//! # krangler-catalog
//!
//! Keeps every ingested manifest, and the skeleton of every ingested pack
//! archive, keyed by `(depot, manifest id)`. The chunk store only holds
//! bytes; the catalog is what makes a depot version reconstructable after
//! the depot state has moved past it.
//!
//! - [`InMemoryManifestCatalog`] for tests and embedding.
//! - [`FsManifestCatalog`] stores one file per entry under a root directory.

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::{CatalogError, CatalogResult};
pub use fs::FsManifestCatalog;
pub use memory::InMemoryManifestCatalog;
pub use traits::ManifestCatalog;
