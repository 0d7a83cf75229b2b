//! The [`DepotStateStore`] trait and the transition rule every backend shares.

use std::collections::BTreeMap;

use krangler_types::{DepotId, ManifestId};

use crate::error::{DepotError, DepotResult};

/// How `mark_installed` treats a manifest id older than the installed one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InstallMode {
    /// Only move forward; an older id fails with `StaleManifest`.
    #[default]
    Advance,
    /// Explicit override: accept an older id.
    Rollback,
}

/// What a successful `mark_installed` changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkOutcome {
    /// The depot moved to a newer manifest (or was recorded for the first time).
    Advanced { previous: Option<ManifestId> },
    /// The depot was explicitly moved back.
    RolledBack { previous: ManifestId },
    /// The manifest was already recorded; nothing changed.
    Unchanged,
}

impl MarkOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Decide the outcome of recording `offered` for `depot` over `current`.
pub(crate) fn transition(
    depot: DepotId,
    current: Option<ManifestId>,
    offered: ManifestId,
    mode: InstallMode,
) -> DepotResult<MarkOutcome> {
    match current {
        None => Ok(MarkOutcome::Advanced { previous: None }),
        Some(installed) if installed == offered => Ok(MarkOutcome::Unchanged),
        Some(installed) if offered > installed => Ok(MarkOutcome::Advanced {
            previous: Some(installed),
        }),
        Some(installed) => match mode {
            InstallMode::Rollback => Ok(MarkOutcome::RolledBack {
                previous: installed,
            }),
            InstallMode::Advance => Err(DepotError::StaleManifest {
                depot,
                installed,
                offered,
            }),
        },
    }
}

/// Storage backend for the depot to installed-manifest mapping.
///
/// Implementations must be thread-safe and serialize updates of any one
/// depot, so that a concurrent pair of `mark_installed` calls can never both
/// pass the non-regression check against the same old value.
pub trait DepotStateStore: Send + Sync {
    /// The manifest currently recorded as installed for `depot`.
    fn installed(&self, depot: DepotId) -> DepotResult<Option<ManifestId>>;

    /// Record `manifest` as installed for `depot`.
    ///
    /// Callers must only do this after every chunk of the manifest is
    /// committed to the chunk store.
    fn mark_installed(
        &self,
        depot: DepotId,
        manifest: ManifestId,
        mode: InstallMode,
    ) -> DepotResult<MarkOutcome>;

    /// Every recorded depot, ordered by depot id.
    fn snapshot(&self) -> DepotResult<BTreeMap<DepotId, ManifestId>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const D: DepotId = DepotId(7);

    #[test]
    fn first_record_advances() {
        assert_eq!(
            transition(D, None, ManifestId(100), InstallMode::Advance).unwrap(),
            MarkOutcome::Advanced { previous: None }
        );
    }

    #[test]
    fn same_id_is_unchanged() {
        let outcome = transition(D, Some(ManifestId(100)), ManifestId(100), InstallMode::Advance).unwrap();
        assert_eq!(outcome, MarkOutcome::Unchanged);
        assert!(!outcome.changed());
    }

    #[test]
    fn older_id_is_stale() {
        let err = transition(D, Some(ManifestId(100)), ManifestId(99), InstallMode::Advance).unwrap_err();
        assert!(matches!(
            err,
            DepotError::StaleManifest {
                depot: DepotId(7),
                installed: ManifestId(100),
                offered: ManifestId(99),
            }
        ));
    }

    #[test]
    fn rollback_overrides() {
        assert_eq!(
            transition(D, Some(ManifestId(100)), ManifestId(99), InstallMode::Rollback).unwrap(),
            MarkOutcome::RolledBack {
                previous: ManifestId(100)
            }
        );
    }

    #[test]
    fn newer_id_advances_in_either_mode() {
        for mode in [InstallMode::Advance, InstallMode::Rollback] {
            assert_eq!(
                transition(D, Some(ManifestId(1)), ManifestId(2), mode).unwrap(),
                MarkOutcome::Advanced {
                    previous: Some(ManifestId(1))
                }
            );
        }
    }
}
