//! `curtain report` command implementation

use super::{format_number, is_stdout, new_table, write_csv};
use crate::error::Result;
use crate::{DatasetArgs, OutputArgs};
use colored::Colorize;
use curtain_core::export::detailed_csv;
use curtain_core::search::SearchEngine;
use curtain_core::store::StoreManager;
use std::sync::Arc;

/// Print every matching row of `term` in each dataset
pub async fn run(
    stores: Arc<StoreManager>,
    term: &str,
    datasets: &DatasetArgs,
    output: &OutputArgs,
) -> Result<()> {
    let rows = SearchEngine::new(stores)
        .report(term, &datasets.datasets, datasets.mode())
        .await?;

    if output.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if let Some(ref path) = output.csv {
        write_csv(path, &detailed_csv(&rows)?)?;
        if is_stdout(path) {
            return Ok(());
        }
    }

    let mut table = new_table(
        [
            "Dataset", "Found", "Primary ID", "Gene", "Comparison", "Position", "log2FC", "p-value",
            "Significant",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    );
    for row in &rows {
        table.add_row(vec![
            row.dataset_id.clone(),
            if row.found { "yes" } else { "no" }.to_string(),
            row.primary_id.clone().unwrap_or_default(),
            row.gene_name.clone().unwrap_or_default(),
            row.comparison.clone(),
            row.position.clone().unwrap_or_default(),
            format_number(row.fold_change),
            format_number(row.p_value),
            if row.significant { "yes" } else { "no" }.to_string(),
        ]);
    }
    println!("{}", table);

    let found = rows.iter().filter(|r| r.found).count();
    println!();
    println!("{} row(s) found for '{}'", found.to_string().cyan(), term.bold());
    Ok(())
}
