use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use krangler_codec::PackSkeleton;
use krangler_types::{DepotId, Manifest, ManifestId};

use crate::error::{CatalogError, CatalogResult};
use crate::traits::{ManifestCatalog, MANIFEST, SKELETON};

/// In-memory manifest catalog for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryManifestCatalog {
    manifests: DashMap<(DepotId, ManifestId), Manifest>,
    skeletons: DashMap<(DepotId, ManifestId), PackSkeleton>,
}

impl InMemoryManifestCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}

/// Insert `value` unless an entry exists; an existing entry must be equal.
fn insert_once<T: Clone + PartialEq>(
    map: &DashMap<(DepotId, ManifestId), T>,
    key: (DepotId, ManifestId),
    value: &T,
    kind: &'static str,
) -> CatalogResult<bool> {
    match map.entry(key) {
        Entry::Occupied(existing) if existing.get() == value => Ok(false),
        Entry::Occupied(_) => Err(CatalogError::Conflict {
            kind,
            depot: key.0,
            manifest: key.1,
        }),
        Entry::Vacant(slot) => {
            slot.insert(value.clone());
            Ok(true)
        }
    }
}

impl ManifestCatalog for InMemoryManifestCatalog {
    fn put_manifest(&self, manifest: &Manifest) -> CatalogResult<bool> {
        insert_once(&self.manifests, (manifest.depot, manifest.id), manifest, MANIFEST)
    }

    fn manifest(&self, depot: DepotId, id: ManifestId) -> CatalogResult<Option<Manifest>> {
        Ok(self.manifests.get(&(depot, id)).map(|m| m.value().clone()))
    }

    fn manifest_ids(&self, depot: DepotId) -> CatalogResult<Vec<ManifestId>> {
        let mut ids: Vec<ManifestId> = self
            .manifests
            .iter()
            .filter(|e| e.key().0 == depot)
            .map(|e| e.key().1)
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn depots(&self) -> CatalogResult<Vec<DepotId>> {
        let mut depots: Vec<DepotId> = self.manifests.iter().map(|e| e.key().0).collect();
        depots.sort();
        depots.dedup();
        Ok(depots)
    }

    fn put_skeleton(&self, skeleton: &PackSkeleton) -> CatalogResult<bool> {
        insert_once(
            &self.skeletons,
            (skeleton.depot, skeleton.manifest),
            skeleton,
            SKELETON,
        )
    }

    fn skeleton(&self, depot: DepotId, id: ManifestId) -> CatalogResult<Option<PackSkeleton>> {
        Ok(self.skeletons.get(&(depot, id)).map(|s| s.value().clone()))
    }
}
