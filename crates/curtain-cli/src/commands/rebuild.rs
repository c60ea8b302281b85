//! `curtain rebuild` command implementation
//!
//! Deletes a dataset's store files; the next ingestion recreates them.

use crate::error::Result;
use colored::Colorize;
use curtain_core::store::StoreManager;
use std::sync::Arc;

/// Destroy the store of `dataset_id`
pub async fn run(stores: Arc<StoreManager>, dataset_id: &str) -> Result<()> {
    stores.destructive_rebuild(dataset_id).await?;
    println!("{} Removed store for dataset '{}'", "✓".green(), dataset_id);
    println!("  Run 'curtain ingest {}' to rebuild it.", dataset_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use curtain_core::config::CoreConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_rebuild_removes_store_file() {
        let dir = TempDir::new().unwrap();
        let stores = Arc::new(StoreManager::new(CoreConfig::new(dir.path())));
        stores.get_store("d1").await.unwrap();
        assert!(stores.store_path("d1").exists());

        run(Arc::clone(&stores), "d1").await.unwrap();
        assert!(!stores.store_path("d1").exists());

        // idempotent on a missing store
        run(stores, "d1").await.unwrap();
    }
}
