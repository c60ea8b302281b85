//! `curtain clean` command implementation
//!
//! Empties a dataset's store without deleting the file.

use crate::error::Result;
use colored::Colorize;
use curtain_core::store::StoreManager;
use std::sync::Arc;

/// Delete every row of `dataset_id`
pub async fn run(stores: Arc<StoreManager>, dataset_id: &str) -> Result<()> {
    let Some(counts) = stores.row_counts(dataset_id).await? else {
        println!("No store found for dataset '{}'.", dataset_id);
        return Ok(());
    };

    stores.clear_all(dataset_id).await?;
    println!("{} Cleared dataset '{}'", "✓".green(), dataset_id);
    println!("  Removed: {} processed row(s), {} raw row(s)", counts.processed, counts.raw);
    Ok(())
}
