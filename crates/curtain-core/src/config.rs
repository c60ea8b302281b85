//! Data layer configuration
//!
//! Resolves where per-dataset stores live and how large insert batches are.

use curtain_common::{CurtainError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Rows written per transaction during ingestion and mapping builds.
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 500;

/// Configuration for [`crate::store::StoreManager`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Root directory; stores are created under `<data_dir>/datasets/`
    pub data_dir: PathBuf,

    /// Rows per insert transaction
    #[serde(default = "default_batch_size")]
    pub insert_batch_size: usize,
}

fn default_batch_size() -> usize {
    DEFAULT_INSERT_BATCH_SIZE
}

impl CoreConfig {
    /// Create a config rooted at `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
        }
    }

    /// Platform data directory, overridden by `CURTAIN_DATA_DIR` and
    /// `CURTAIN_INSERT_BATCH_SIZE`
    pub fn from_env() -> Result<Self> {
        let data_dir = match std::env::var("CURTAIN_DATA_DIR") {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            Ok(_) => return Err(CurtainError::config("CURTAIN_DATA_DIR is set but empty")),
            Err(_) => dirs::data_dir()
                .ok_or_else(|| CurtainError::config("Could not determine data directory"))?
                .join("curtain"),
        };

        let mut config = Self::new(data_dir);
        if let Ok(size) = std::env::var("CURTAIN_INSERT_BATCH_SIZE") {
            config.insert_batch_size = size
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    CurtainError::config(format!("Invalid CURTAIN_INSERT_BATCH_SIZE '{}'", size))
                })?;
        }
        Ok(config)
    }

    /// Directory holding one SQLite file per dataset
    pub fn datasets_dir(&self) -> PathBuf {
        self.data_dir.join("datasets")
    }

    /// Data root
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_datasets_dir_is_under_data_dir() {
        let config = CoreConfig::new("/tmp/curtain-test");
        assert_eq!(config.datasets_dir(), PathBuf::from("/tmp/curtain-test/datasets"));
        assert_eq!(config.insert_batch_size, DEFAULT_INSERT_BATCH_SIZE);
    }

    #[test]
    fn test_deserialize_defaults_batch_size() {
        let config: CoreConfig = serde_json::from_str(r#"{"data_dir": "/data"}"#).unwrap();
        assert_eq!(config.insert_batch_size, DEFAULT_INSERT_BATCH_SIZE);
    }
}
