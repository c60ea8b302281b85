//! Shared fixtures for curtain-core integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use curtain_core::config::CoreConfig;
use curtain_core::ingest::{IngestOutcome, IngestRequest, IngestionPipeline};
use curtain_core::metadata::{DatasetMetadata, DifferentialFormConfig, RawFormConfig};
use curtain_core::store::StoreManager;
use std::sync::Arc;
use tempfile::TempDir;

/// Store manager rooted in a fresh temporary directory
pub fn stores() -> (TempDir, Arc<StoreManager>) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let stores = Arc::new(StoreManager::new(CoreConfig::new(dir.path())));
    (dir, stores)
}

pub fn differential_form() -> DifferentialFormConfig {
    DifferentialFormConfig {
        primary_id_column: "Protein.Group".to_string(),
        gene_names_column: "Genes".to_string(),
        fold_change_column: "log2FC".to_string(),
        significant_column: "p.value".to_string(),
        transform_significant: true,
        ..Default::default()
    }
}

pub fn raw_form(samples: &[&str]) -> RawFormConfig {
    RawFormConfig {
        primary_id_column: "Protein.Group".to_string(),
        samples: samples.iter().map(|s| s.to_string()).collect(),
        log2: false,
    }
}

/// Processed table with one `(primary id, genes, log2FC, p)` line per row
pub fn processed_table(rows: &[(&str, &str, f64, f64)]) -> String {
    let mut text = String::from("Protein.Group\tGenes\tlog2FC\tp.value\n");
    for (id, genes, fc, p) in rows {
        text.push_str(&format!("{}\t{}\t{}\t{}\n", id, genes, fc, p));
    }
    text
}

pub fn request(processed: String) -> IngestRequest {
    IngestRequest {
        raw_text: None,
        processed_text: Some(processed),
        raw_form: raw_form(&[]),
        differential_form: differential_form(),
        metadata: DatasetMetadata::default(),
    }
}

/// Ingest and insist something was written
pub async fn ingest(stores: &Arc<StoreManager>, dataset_id: &str, request: IngestRequest) {
    let pipeline = IngestionPipeline::new(Arc::clone(stores));
    let outcome = pipeline
        .build(dataset_id, request, &|_| {})
        .await
        .expect("ingestion failed");
    assert!(matches!(outcome, IngestOutcome::Ingested(_)));
}
