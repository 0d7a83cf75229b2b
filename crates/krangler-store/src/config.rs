use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Chunk store settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory of a filesystem store.
    pub root: PathBuf,
    /// zstd level used when the store compresses raw payloads.
    pub zstd_level: i32,
    /// Flush blobs, records and their directories to disk before a commit
    /// returns.
    pub fsync: bool,
    /// Raw payloads shorter than this are stored uncompressed.
    pub compression_threshold: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("store"),
            zstd_level: 3,
            fsync: true,
            compression_threshold: 64,
        }
    }
}

impl StoreConfig {
    /// Defaults with a different root directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if !zstd::compression_level_range().contains(&self.zstd_level) {
            return Err(StoreError::Config(format!(
                "zstd_level {} out of range",
                self.zstd_level
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.zstd_level, 3);
        assert!(c.fsync);
        assert_eq!(c.compression_threshold, 64);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = StoreConfig::from_toml_str("root = \"/var/lib/krangler\"\nfsync = false\n").unwrap();
        assert_eq!(c.root, PathBuf::from("/var/lib/krangler"));
        assert!(!c.fsync);
        assert_eq!(c.zstd_level, 3);
    }

    #[test]
    fn invalid_toml_rejected() {
        assert!(matches!(
            StoreConfig::from_toml_str("zstd_level = \"high\""),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn out_of_range_level_rejected() {
        assert!(matches!(
            StoreConfig::from_toml_str("zstd_level = 1000"),
            Err(StoreError::Config(_))
        ));
    }
}
