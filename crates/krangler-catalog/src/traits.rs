use krangler_codec::PackSkeleton;
use krangler_types::{DepotId, Manifest, ManifestId};

use crate::error::{CatalogError, CatalogResult};

pub(crate) const MANIFEST: &str = "manifest";
pub(crate) const SKELETON: &str = "pack skeleton";

/// Every manifest (and pack skeleton) that was ever ingested, so any
/// historical version stays reconstructable after the depot moves on.
///
/// Entries are keyed by `(depot, manifest id)` and immutable: recording an
/// identical entry again is a no-op returning `false`, recording a different
/// one fails with [`CatalogError::Conflict`].
pub trait ManifestCatalog: Send + Sync {
    /// Record a manifest. Returns `true` if it was not recorded before.
    fn put_manifest(&self, manifest: &Manifest) -> CatalogResult<bool>;

    fn manifest(&self, depot: DepotId, id: ManifestId) -> CatalogResult<Option<Manifest>>;

    /// Recorded manifest ids of `depot`, oldest first.
    fn manifest_ids(&self, depot: DepotId) -> CatalogResult<Vec<ManifestId>>;

    /// Depots with at least one recorded manifest, sorted.
    fn depots(&self) -> CatalogResult<Vec<DepotId>>;

    /// Record the skeleton of an ingested pack archive.
    fn put_skeleton(&self, skeleton: &PackSkeleton) -> CatalogResult<bool>;

    fn skeleton(&self, depot: DepotId, id: ManifestId) -> CatalogResult<Option<PackSkeleton>>;

    /// Like [`manifest`](Self::manifest), failing with `NotFound` when absent.
    fn load_manifest(&self, depot: DepotId, id: ManifestId) -> CatalogResult<Manifest> {
        self.manifest(depot, id)?.ok_or(CatalogError::NotFound {
            kind: MANIFEST,
            depot,
            manifest: id,
        })
    }

    fn load_skeleton(&self, depot: DepotId, id: ManifestId) -> CatalogResult<PackSkeleton> {
        self.skeleton(depot, id)?.ok_or(CatalogError::NotFound {
            kind: SKELETON,
            depot,
            manifest: id,
        })
    }

    /// Newest recorded manifest id of `depot`.
    fn latest(&self, depot: DepotId) -> CatalogResult<Option<ManifestId>> {
        Ok(self.manifest_ids(depot)?.last().copied())
    }
}
