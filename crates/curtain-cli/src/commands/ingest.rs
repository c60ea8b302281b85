//! `curtain ingest` command implementation
//!
//! Builds a dataset store from a metadata JSON file plus optional table files.

use super::read_input;
use crate::error::Result;
use crate::progress::{create_ingest_progress, update_ingest_progress};
use colored::Colorize;
use curtain_core::ingest::{IngestOutcome, IngestRequest, IngestionPipeline};
use curtain_core::metadata::DatasetMetadata;
use curtain_core::store::StoreManager;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Ingest one dataset
pub async fn run(
    stores: Arc<StoreManager>,
    dataset_id: &str,
    metadata_path: &Path,
    processed: Option<&Path>,
    raw: Option<&Path>,
    force: bool,
) -> Result<()> {
    let metadata = DatasetMetadata::from_json(&read_input(metadata_path)?)?;
    let mut request = IngestRequest::from_metadata(metadata);
    if let Some(path) = processed {
        request.processed_text = Some(read_input(path)?);
    }
    if let Some(path) = raw {
        request.raw_text = Some(read_input(path)?);
    }
    if request.processed_text.is_none() {
        println!(
            "{} No processed table given; the dataset will not be searchable",
            "!".yellow()
        );
    }

    if force {
        info!(dataset = %dataset_id, "Removing existing store before ingestion");
        stores.destructive_rebuild(dataset_id).await?;
    }

    let pb = create_ingest_progress(dataset_id);
    let outcome = IngestionPipeline::new(Arc::clone(&stores))
        .build(dataset_id, request, &|p| update_ingest_progress(&pb, p))
        .await;
    pb.finish_and_clear();

    match outcome? {
        IngestOutcome::AlreadyPresent => {
            println!(
                "{} Dataset '{}' is already stored. Use --force to re-ingest.",
                "✓".green(),
                dataset_id
            );
        },
        IngestOutcome::Ingested(summary) => {
            println!("{} Ingested dataset '{}'", "✓".green(), dataset_id.bold());
            println!("  Processed rows:  {}", summary.processed_rows);
            println!("  Raw rows:        {}", summary.raw_rows);
            println!("  UniProt entries: {}", summary.uniprot_entries);
            if summary.mapping.is_degraded() {
                println!(
                    "{} Mapping index could not be built; gene-name search may miss entries",
                    "!".yellow()
                );
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use curtain_core::config::CoreConfig;
    use tempfile::TempDir;

    const METADATA: &str = r#"{
        "differentialForm": {
            "primaryIDs": "Protein.Group",
            "geneNames": "Genes",
            "foldChange": "log2FC",
            "significant": "p.value",
            "transformSignificant": true
        }
    }"#;

    const PROCESSED: &str = "Protein.Group\tGenes\tlog2FC\tp.value\nP04637\tTP53\t1.5\t0.01\n";

    #[tokio::test]
    async fn test_ingest_from_files() {
        let dir = TempDir::new().unwrap();
        let metadata = dir.path().join("meta.json");
        let processed = dir.path().join("processed.tsv");
        std::fs::write(&metadata, METADATA).unwrap();
        std::fs::write(&processed, PROCESSED).unwrap();

        let stores = Arc::new(StoreManager::new(CoreConfig::new(dir.path().join("data"))));
        run(Arc::clone(&stores), "d1", &metadata, Some(&processed), None, false)
            .await
            .unwrap();

        assert!(stores.data_exists("d1").await);
        let counts = stores.row_counts("d1").await.unwrap().unwrap();
        assert_eq!(counts.processed, 1);

        // a forced re-run starts from an empty store
        run(Arc::clone(&stores), "d1", &metadata, Some(&processed), None, true)
            .await
            .unwrap();
        assert_eq!(stores.row_counts("d1").await.unwrap().unwrap().processed, 1);
    }

    #[tokio::test]
    async fn test_missing_metadata_file() {
        let dir = TempDir::new().unwrap();
        let stores = Arc::new(StoreManager::new(CoreConfig::new(dir.path())));
        let result = run(stores, "d1", &dir.path().join("absent.json"), None, None, false).await;
        assert!(matches!(result, Err(crate::CliError::FileNotFound(_))));
    }
}
