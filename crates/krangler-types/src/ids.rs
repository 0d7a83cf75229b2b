use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric identifier of a depot (a logical collection of versioned files).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DepotId(pub u32);

/// Numeric identifier of one manifest (version) of a depot.
///
/// Manifest ids are ordered: a larger id is a newer manifest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManifestId(pub u64);

impl fmt::Display for DepotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DepotId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<u64> for ManifestId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_ids_order_numerically() {
        assert!(ManifestId(99) < ManifestId(100));
    }

    #[test]
    fn display_is_plain_number() {
        assert_eq!(DepotId(238961).to_string(), "238961");
        assert_eq!(ManifestId(42).to_string(), "42");
    }
}
