//! In-memory depot state for testing and ephemeral use.

use std::collections::BTreeMap;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use krangler_types::{DepotId, ManifestId};
use tracing::info;

use crate::error::DepotResult;
use crate::traits::{transition, DepotStateStore, InstallMode, MarkOutcome};

/// An in-memory implementation of [`DepotStateStore`].
///
/// Updates of one depot are serialized by holding its map entry for the
/// whole check-and-set; different depots never contend.
#[derive(Debug, Default)]
pub struct InMemoryDepotState {
    installed: DashMap<DepotId, ManifestId>,
}

impl InMemoryDepotState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DepotStateStore for InMemoryDepotState {
    fn installed(&self, depot: DepotId) -> DepotResult<Option<ManifestId>> {
        Ok(self.installed.get(&depot).map(|m| *m))
    }

    fn mark_installed(
        &self,
        depot: DepotId,
        manifest: ManifestId,
        mode: InstallMode,
    ) -> DepotResult<MarkOutcome> {
        let outcome = match self.installed.entry(depot) {
            Entry::Vacant(slot) => {
                let outcome = transition(depot, None, manifest, mode)?;
                slot.insert(manifest);
                outcome
            }
            Entry::Occupied(mut slot) => {
                let outcome = transition(depot, Some(*slot.get()), manifest, mode)?;
                slot.insert(manifest);
                outcome
            }
        };
        if outcome.changed() {
            info!(depot = %depot, manifest = %manifest, ?outcome, "depot state updated");
        }
        Ok(outcome)
    }

    fn snapshot(&self) -> DepotResult<BTreeMap<DepotId, ManifestId>> {
        Ok(self.installed.iter().map(|e| (*e.key(), *e.value())).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::error::DepotError;

    #[test]
    fn unknown_depot_has_nothing_installed() {
        let state = InMemoryDepotState::new();
        assert_eq!(state.installed(DepotId(1)).unwrap(), None);
    }

    #[test]
    fn mark_then_read() {
        let state = InMemoryDepotState::new();
        state
            .mark_installed(DepotId(7), ManifestId(100), InstallMode::Advance)
            .unwrap();
        assert_eq!(state.installed(DepotId(7)).unwrap(), Some(ManifestId(100)));
        assert_eq!(state.installed(DepotId(8)).unwrap(), None);
    }

    #[test]
    fn stale_mark_leaves_state_alone() {
        let state = InMemoryDepotState::new();
        state
            .mark_installed(DepotId(7), ManifestId(100), InstallMode::Advance)
            .unwrap();
        let err = state
            .mark_installed(DepotId(7), ManifestId(99), InstallMode::Advance)
            .unwrap_err();
        assert!(matches!(err, DepotError::StaleManifest { .. }));
        assert_eq!(state.installed(DepotId(7)).unwrap(), Some(ManifestId(100)));
    }

    #[test]
    fn rollback_applies() {
        let state = InMemoryDepotState::new();
        state
            .mark_installed(DepotId(7), ManifestId(100), InstallMode::Advance)
            .unwrap();
        state
            .mark_installed(DepotId(7), ManifestId(99), InstallMode::Rollback)
            .unwrap();
        assert_eq!(state.installed(DepotId(7)).unwrap(), Some(ManifestId(99)));
    }

    #[test]
    fn snapshot_is_ordered() {
        let state = InMemoryDepotState::new();
        for (d, m) in [(9, 1), (3, 5), (7, 100)] {
            state
                .mark_installed(DepotId(d), ManifestId(m), InstallMode::Advance)
                .unwrap();
        }
        let depots: Vec<DepotId> = state.snapshot().unwrap().into_keys().collect();
        assert_eq!(depots, vec![DepotId(3), DepotId(7), DepotId(9)]);
    }

    #[test]
    fn concurrent_marks_end_at_the_maximum() {
        let state = Arc::new(InMemoryDepotState::new());
        let top = ManifestId(50);
        let handles: Vec<_> = (1..=50u64)
            .map(|m| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    let own = state.mark_installed(DepotId(1), ManifestId(m), InstallMode::Advance);
                    let newest = state.mark_installed(DepotId(1), top, InstallMode::Advance);
                    (ManifestId(m), own, newest)
                })
            })
            .collect();

        let mut advanced_to_top = 0;
        for h in handles {
            let (offered, own, newest) = h.join().unwrap();
            for (offered, outcome) in [(offered, own), (top, newest)] {
                match outcome {
                    Ok(MarkOutcome::Advanced { .. }) if offered == top => advanced_to_top += 1,
                    Ok(MarkOutcome::Advanced { .. }) => {}
                    Ok(MarkOutcome::Unchanged) => assert_eq!(offered, top),
                    Err(DepotError::StaleManifest { installed, .. }) => {
                        assert_ne!(offered, top);
                        assert!(installed > offered);
                    }
                    other => panic!("offering {offered}: unexpected {other:?}"),
                }
            }
        }
        assert_eq!(advanced_to_top, 1);
        assert_eq!(state.installed(DepotId(1)).unwrap(), Some(top));
    }
}
