//! `curtain status` command implementation
//!
//! Shows stored datasets with their data status and row counts.

use super::new_table;
use crate::error::Result;
use colored::Colorize;
use curtain_core::store::{DataStatus, StoreManager};
use std::sync::Arc;

/// Show status of one dataset, or of every dataset on disk
pub async fn run(stores: Arc<StoreManager>, dataset: Option<&str>) -> Result<()> {
    let ids = match dataset {
        Some(id) => vec![id.to_string()],
        None => stores.list_datasets()?,
    };

    if ids.is_empty() {
        println!("No datasets stored.");
        println!("Run 'curtain ingest' to add one.");
        return Ok(());
    }

    let mut table = new_table(
        ["Dataset", "Status", "Processed", "Raw", "Gene Maps", "ID Maps", "UniProt", "Genes"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    );

    for id in &ids {
        let status = stores.data_status(id).await?;
        let label = match status {
            DataStatus::Present => status.to_string().green().to_string(),
            DataStatus::Stale { .. } => status.to_string().yellow().to_string(),
            DataStatus::Missing => status.to_string().red().to_string(),
        };

        let mut row = vec![id.clone(), label];
        match stores.row_counts(id).await? {
            Some(counts) => row.extend(
                [
                    counts.processed,
                    counts.raw,
                    counts.gene_mappings,
                    counts.split_id_mappings,
                    counts.uniprot_entries,
                    counts.all_genes,
                ]
                .iter()
                .map(|n| n.to_string()),
            ),
            None => row.extend(std::iter::repeat_n("-".to_string(), 6)),
        }
        table.add_row(row);
    }

    println!("{}", table);
    println!();
    println!("{}", "Summary:".cyan().bold());
    println!("  Datasets: {}", ids.len());
    println!("  Data dir: {}", stores.config().datasets_dir().display());
    Ok(())
}
