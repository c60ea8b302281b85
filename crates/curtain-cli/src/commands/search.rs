//! `curtain search` command implementation
//!
//! Searches terms across datasets and prints one aggregated line per term.

use super::{format_number, is_stdout, new_table, write_csv};
use crate::error::Result;
use crate::progress::create_spinner;
use crate::OutputArgs;
use colored::Colorize;
use curtain_core::export::summary_csv;
use curtain_core::search::{
    DatasetSearchStatus, SearchEngine, SearchOutcome, SearchRequest, SearchStatus,
};
use curtain_core::store::StoreManager;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Run a cross-dataset search; Ctrl-C cancels the remaining dataset tasks
pub async fn run(stores: Arc<StoreManager>, request: SearchRequest, output: &OutputArgs) -> Result<()> {
    if request.terms.is_empty() {
        println!("No search terms given.");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Interrupt received, cancelling search");
                cancel.cancel();
            }
        })
    };

    let spinner = create_spinner(&format!(
        "Searching {} term(s) in {} dataset(s)...",
        request.terms.len(),
        request.dataset_ids.len()
    ));
    let outcome = SearchEngine::new(stores)
        .search_with_progress(&request, &cancel, &|done: &DatasetSearchStatus| {
            spinner.set_message(format!("{}: {}", done.dataset_id, done.status));
        })
        .await;
    spinner.finish_and_clear();
    watcher.abort();
    let outcome = outcome?;

    if output.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    if let Some(ref path) = output.csv {
        write_csv(path, &summary_csv(&outcome.summaries)?)?;
        if is_stdout(path) {
            return Ok(());
        }
    }

    display(&outcome);
    Ok(())
}

fn display(outcome: &SearchOutcome) {
    for status in &outcome.statuses {
        let label = match &status.status {
            SearchStatus::Completed { .. } => status.status.to_string().green(),
            SearchStatus::Failed { .. } => status.status.to_string().red(),
            SearchStatus::Cancelled => status.status.to_string().yellow(),
        };
        println!("  {} {}", status.dataset_id.bold(), label);
    }
    println!();

    if outcome.summaries.is_empty() {
        println!("No matches found.");
        return;
    }

    let mut table = new_table(
        ["Term", "Gene Names", "Found In", "Significant", "Avg log2FC"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    );
    for summary in &outcome.summaries {
        table.add_row(vec![
            summary.search_term.clone(),
            summary.gene_names.clone(),
            format!("{}/{}", summary.datasets_found_in, summary.total_datasets_searched),
            if summary.significant { "yes" } else { "no" }.to_string(),
            format_number(summary.average_fold_change),
        ]);
    }
    println!("{}", table);
    println!();
    println!("{} term(s) matched", outcome.summaries.len().to_string().cyan());
}
