use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};

/// Ingestion settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Chunks fetched and committed concurrently.
    pub parallelism: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { parallelism: 8 }
    }
}

impl IngestConfig {
    pub fn from_toml_str(s: &str) -> IngestResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| IngestError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> IngestResult<()> {
        if self.parallelism == 0 {
            return Err(IngestError::Config("parallelism must be at least 1".into()));
        }
        Ok(())
    }
}
