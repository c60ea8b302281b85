//! Per-dataset store lifecycle
//!
//! A [`StoreManager`] owns the directory holding one SQLite file per dataset
//! and hands out at most one open [`DatasetStore`] per dataset identifier.
//! Concurrent first access to the same identifier is single-flight: every
//! caller awaits the same open.
//!
//! # Data status
//!
//! | File state                          | Status    |
//! |-------------------------------------|-----------|
//! | absent                              | `Missing` |
//! | unreadable / corrupt                | rebuilt, then `Missing` |
//! | zero processed and raw rows         | `Missing` |
//! | row-schema version differs          | `Stale`   |
//! | rows present, version current       | `Present` |

mod dataset;

pub use dataset::{DatasetStore, RowCounts};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::error::{Result, StoreError};
use crate::schema::ROW_SCHEMA_VERSION;

const STORE_EXTENSION: &str = "sqlite";

/// Whether a dataset's local store holds usable rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStatus {
    /// No rows (file absent, empty, or just rebuilt)
    Missing,
    /// Rows exist but were written under another row-schema version
    Stale { found: Option<i64> },
    /// Rows exist under the current row-schema version
    Present,
}

impl DataStatus {
    pub fn is_present(&self) -> bool {
        matches!(self, DataStatus::Present)
    }
}

impl std::fmt::Display for DataStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataStatus::Missing => write!(f, "missing"),
            DataStatus::Stale { found: Some(v) } => {
                write!(f, "stale (v{}, current v{})", v, ROW_SCHEMA_VERSION)
            },
            DataStatus::Stale { found: None } => write!(f, "stale (unversioned)"),
            DataStatus::Present => write!(f, "present"),
        }
    }
}

type StoreSlot = Arc<OnceCell<Arc<DatasetStore>>>;

/// Registry of open dataset stores
#[derive(Debug)]
pub struct StoreManager {
    config: CoreConfig,
    stores: Mutex<HashMap<String, StoreSlot>>,
}

impl StoreManager {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            stores: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// File backing a dataset; the name is the hex of the identifier so any
    /// identifier maps to a safe, reversible file name
    pub fn store_path(&self, dataset_id: &str) -> PathBuf {
        self.config.datasets_dir().join(format!(
            "{}.{}",
            hex::encode(dataset_id.as_bytes()),
            STORE_EXTENSION
        ))
    }

    fn slot(&self, dataset_id: &str) -> StoreSlot {
        let mut stores = self
            .stores
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        stores
            .entry(dataset_id.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    fn take_slot(&self, dataset_id: &str) -> Option<StoreSlot> {
        self.stores
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(dataset_id)
    }

    /// Open (or reuse) the store for a dataset
    pub async fn get_store(&self, dataset_id: &str) -> Result<Arc<DatasetStore>> {
        let slot = self.slot(dataset_id);
        let path = self.store_path(dataset_id);
        let store = slot
            .get_or_try_init(|| async {
                DatasetStore::open(dataset_id, &path).await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(store))
    }

    /// Classify the local data of a dataset
    ///
    /// A store that cannot be opened or read is destroyed and reported as
    /// `Missing`. A dataset with no file is reported `Missing` without
    /// creating one.
    pub async fn data_status(&self, dataset_id: &str) -> Result<DataStatus> {
        if !self.is_open(dataset_id) && !self.store_path(dataset_id).exists() {
            return Ok(DataStatus::Missing);
        }

        let inspect = async {
            let store = self.get_store(dataset_id).await?;
            let counts = store.row_counts().await?;
            let version = store.schema_version().await?;
            Ok::<_, StoreError>((counts.processed + counts.raw, version))
        };

        let (rows, version) = match inspect.await {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    dataset = %dataset_id,
                    error = %e,
                    "Store unreadable, rebuilding"
                );
                self.destructive_rebuild(dataset_id).await?;
                return Ok(DataStatus::Missing);
            },
        };

        if rows == 0 {
            return Ok(DataStatus::Missing);
        }

        match version {
            Some(v) if v == ROW_SCHEMA_VERSION => Ok(DataStatus::Present),
            found => {
                debug!(dataset = %dataset_id, ?found, current = ROW_SCHEMA_VERSION, "Stale store");
                Ok(DataStatus::Stale { found })
            },
        }
    }

    /// True when the dataset has rows under the current row-schema version
    pub async fn data_exists(&self, dataset_id: &str) -> bool {
        match self.data_status(dataset_id).await {
            Ok(status) => status.is_present(),
            Err(e) => {
                warn!(dataset = %dataset_id, error = %e, "Could not check data status");
                false
            },
        }
    }

    /// Delete every row of a dataset, keeping the file
    pub async fn clear_all(&self, dataset_id: &str) -> Result<()> {
        let store = self.get_store(dataset_id).await?;
        store.clear_all().await?;
        info!(dataset = %dataset_id, "Cleared dataset store");
        Ok(())
    }

    /// Close the store and delete its file and WAL side files
    pub async fn destructive_rebuild(&self, dataset_id: &str) -> Result<()> {
        if let Some(slot) = self.take_slot(dataset_id) {
            if let Some(store) = slot.get() {
                store.close().await;
            }
        }

        let path = self.store_path(dataset_id);
        let mut targets = vec![path.clone()];
        for suffix in ["-wal", "-shm"] {
            let mut name = path.clone().into_os_string();
            name.push(suffix);
            targets.push(PathBuf::from(name));
        }

        for target in targets {
            match std::fs::remove_file(&target) {
                Ok(()) => debug!(path = %target.display(), "Removed store file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => return Err(e.into()),
            }
        }

        info!(dataset = %dataset_id, "Destroyed dataset store");
        Ok(())
    }

    /// Row counts, or `None` when the dataset has no store file
    pub async fn row_counts(&self, dataset_id: &str) -> Result<Option<RowCounts>> {
        if !self.is_open(dataset_id) && !self.store_path(dataset_id).exists() {
            return Ok(None);
        }
        let store = self.get_store(dataset_id).await?;
        Ok(Some(store.row_counts().await?))
    }

    /// Dataset identifiers with a store on disk or open in this process
    pub fn list_datasets(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .stores
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();

        let dir = self.config.datasets_dir();
        if dir.exists() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(STORE_EXTENSION) {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                match hex::decode(stem).ok().and_then(|b| String::from_utf8(b).ok()) {
                    Some(id) => ids.push(id),
                    None => debug!(path = %path.display(), "Skipping foreign file"),
                }
            }
        }

        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    fn is_open(&self, dataset_id: &str) -> bool {
        self.stores
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(dataset_id)
            .is_some_and(|slot| slot.initialized())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::ProcessedRow;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> StoreManager {
        StoreManager::new(CoreConfig::new(dir.path()))
    }

    #[tokio::test]
    async fn test_missing_without_creating_file() {
        let dir = TempDir::new().unwrap();
        let stores = manager(&dir);

        assert_eq!(stores.data_status("abc").await.unwrap(), DataStatus::Missing);
        assert!(!stores.store_path("abc").exists());
        assert!(stores.row_counts("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_handle_for_same_id() {
        let dir = TempDir::new().unwrap();
        let stores = manager(&dir);

        let a = stores.get_store("ds-1").await.unwrap();
        let b = stores.get_store("ds-1").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_concurrent_first_access_is_single_flight() {
        let dir = TempDir::new().unwrap();
        let stores = Arc::new(manager(&dir));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stores = Arc::clone(&stores);
                tokio::spawn(async move { stores.get_store("shared").await.unwrap() })
            })
            .collect();

        let mut opened = Vec::new();
        for h in handles {
            opened.push(h.await.unwrap());
        }
        assert!(opened.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_status_follows_rows_and_version() {
        let dir = TempDir::new().unwrap();
        let stores = manager(&dir);
        let store = stores.get_store("ds").await.unwrap();

        assert_eq!(stores.data_status("ds").await.unwrap(), DataStatus::Missing);

        store
            .insert_processed(&[ProcessedRow::new("P04637")], 100)
            .await
            .unwrap();
        assert_eq!(
            stores.data_status("ds").await.unwrap(),
            DataStatus::Stale { found: None }
        );

        store.set_schema_version(ROW_SCHEMA_VERSION - 1).await.unwrap();
        assert!(!stores.data_exists("ds").await);

        store.set_schema_version(ROW_SCHEMA_VERSION).await.unwrap();
        assert!(stores.data_exists("ds").await);
    }

    #[tokio::test]
    async fn test_destructive_rebuild_removes_files() {
        let dir = TempDir::new().unwrap();
        let stores = manager(&dir);
        stores.get_store("gone").await.unwrap();
        let path = stores.store_path("gone");
        assert!(path.exists());

        stores.destructive_rebuild("gone").await.unwrap();
        assert!(!path.exists());

        // a second rebuild with nothing on disk is fine
        stores.destructive_rebuild("gone").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_datasets_decodes_file_names() {
        let dir = TempDir::new().unwrap();
        let stores = manager(&dir);
        stores.get_store("b/with slash").await.unwrap();
        stores.get_store("a").await.unwrap();
        std::fs::write(stores.config().datasets_dir().join("notes.txt"), "x").unwrap();

        assert_eq!(stores.list_datasets().unwrap(), vec!["a", "b/with slash"]);
    }
}
