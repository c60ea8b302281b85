//! Store lifecycle integration tests
//!
//! Covers:
//! - Idempotent ingestion
//! - Row uniqueness on (primary id, comparison) and (primary id, sample)
//! - The row-schema version gate
//! - Destructive rebuild of an unreadable store

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use curtain_core::ingest::{IngestOutcome, IngestionPipeline};
use curtain_core::schema::ROW_SCHEMA_VERSION;
use curtain_core::store::DataStatus;
use std::sync::Arc;

#[tokio::test]
async fn test_second_ingestion_is_noop() {
    let (_dir, stores) = common::stores();
    let table = common::processed_table(&[("P04637", "TP53", 1.0, 0.01), ("Q00987", "MDM2", -0.5, 0.3)]);

    common::ingest(&stores, "ds", common::request(table.clone())).await;
    let before = stores.row_counts("ds").await.unwrap().unwrap();

    let pipeline = IngestionPipeline::new(Arc::clone(&stores));
    let outcome = pipeline
        .build("ds", common::request(table), &|_| {})
        .await
        .unwrap();
    let after = stores.row_counts("ds").await.unwrap().unwrap();

    assert!(matches!(outcome, IngestOutcome::AlreadyPresent));
    assert_eq!(before, after);
    assert_eq!(after.processed, 2);
}

#[tokio::test]
async fn test_rows_unique_per_key() {
    let (_dir, stores) = common::stores();
    let processed = "Protein.Group\tGenes\tlog2FC\tp.value\tContrast\n\
        P04637\tTP53\t1.0\t0.01\tA\n\
        P04637\tTP53\t2.0\t0.01\tA\n\
        P04637\tTP53\t3.0\t0.01\tB\n";
    let raw = "Protein.Group\tWT.1\tWT.2\nP04637\t1\t2\nP04637\t3\t4\n";

    let mut request = common::request(processed.to_string());
    request.differential_form.comparison_column = "Contrast".to_string();
    request.raw_text = Some(raw.to_string());
    request.raw_form = common::raw_form(&["WT.1", "WT.2"]);
    common::ingest(&stores, "ds", request).await;

    let store = stores.get_store("ds").await.unwrap();
    let rows = store.processed_rows_for("P04637").await.unwrap();
    let mut keys: Vec<(&str, &str)> = rows
        .iter()
        .map(|r| (r.primary_id.as_str(), r.comparison.as_str()))
        .collect();
    keys.sort();
    assert_eq!(keys, vec![("P04637", "A"), ("P04637", "B")]);

    let a = rows.iter().find(|r| r.comparison == "A").unwrap();
    assert_eq!(a.fold_change, Some(2.0));

    let raw_rows = store.raw_rows_for("P04637").await.unwrap();
    assert_eq!(raw_rows.len(), 2);
    assert!(raw_rows.iter().any(|r| r.sample_name == "WT.1" && r.sample_value == Some(3.0)));
}

#[tokio::test]
async fn test_version_mismatch_hides_rows() {
    let (_dir, stores) = common::stores();
    let table = common::processed_table(&[("P04637", "TP53", 1.0, 0.01)]);
    common::ingest(&stores, "ds", common::request(table.clone())).await;
    assert!(stores.data_exists("ds").await);

    let store = stores.get_store("ds").await.unwrap();
    store.set_schema_version(ROW_SCHEMA_VERSION + 1).await.unwrap();

    assert!(!stores.data_exists("ds").await);
    assert_eq!(
        stores.data_status("ds").await.unwrap(),
        DataStatus::Stale {
            found: Some(ROW_SCHEMA_VERSION + 1)
        }
    );

    // a stale store is rebuilt by the next ingestion
    common::ingest(&stores, "ds", common::request(table)).await;
    assert!(stores.data_exists("ds").await);
}

#[tokio::test]
async fn test_corrupt_store_is_deleted_and_reported_missing() {
    let (_dir, stores) = common::stores();
    let path = stores.store_path("broken");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"this is definitely not a sqlite database".repeat(64)).unwrap();

    assert!(!stores.data_exists("broken").await);
    assert!(!path.exists());

    // the identifier is usable again afterwards
    let table = common::processed_table(&[("P04637", "TP53", 1.0, 0.01)]);
    common::ingest(&stores, "broken", common::request(table)).await;
    assert!(stores.data_exists("broken").await);
}

#[tokio::test]
async fn test_clear_all_keeps_store_open() {
    let (_dir, stores) = common::stores();
    let table = common::processed_table(&[("P04637", "TP53", 1.0, 0.01)]);
    common::ingest(&stores, "ds", common::request(table)).await;

    stores.clear_all("ds").await.unwrap();
    let counts = stores.row_counts("ds").await.unwrap().unwrap();
    assert_eq!(counts.processed, 0);
    assert_eq!(counts.gene_mappings, 0);
    assert!(stores.store_path("ds").exists());
    assert_eq!(stores.list_datasets().unwrap(), vec!["ds"]);
}
