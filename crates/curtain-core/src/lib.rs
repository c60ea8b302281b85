//! Curtain Core Library
//!
//! Local data layer for differential proteomics datasets: one SQLite store
//! per dataset, an ingestion pipeline that fills it from tab-separated
//! tables, a gene-name/accession mapping index, and a cross-dataset search
//! engine with report, matrix and CSV export.
//!
//! # Overview
//!
//! - [`store`]: per-dataset store lifecycle (open, status, destructive rebuild)
//! - [`ingest`]: table parsing, transforms, sample structure, bulk writes
//! - [`mapping`]: gene-name and split-ID index, rebuilt when stale
//! - [`lookup`]: gene/protein queries over one dataset
//! - [`search`]: concurrent cross-dataset search and aggregation
//! - [`export`]: CSV renderings of search results
//!
//! # Example
//!
//! ```no_run
//! use curtain_core::config::CoreConfig;
//! use curtain_core::ingest::{IngestionPipeline, IngestRequest};
//! use curtain_core::metadata::DatasetMetadata;
//! use curtain_core::store::StoreManager;
//! use std::sync::Arc;
//!
//! # async fn run(metadata_json: &str) -> curtain_core::error::Result<()> {
//! let stores = Arc::new(StoreManager::new(CoreConfig::from_env()?));
//! let pipeline = IngestionPipeline::new(Arc::clone(&stores));
//! let request = IngestRequest::from_metadata(DatasetMetadata::from_json(metadata_json)?);
//! pipeline.build("dataset-1", request, &|p| tracing::info!(stage = %p.stage, "progress")).await?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod error;
pub mod export;
pub mod ids;
pub mod ingest;
pub mod lookup;
pub mod mapping;
pub mod metadata;
pub mod schema;
pub mod search;
pub mod store;
pub mod uniprot;

pub use config::CoreConfig;
pub use error::{Result, StoreError};
pub use ingest::{IngestOutcome, IngestProgress, IngestRequest, IngestionPipeline};
pub use lookup::LookupService;
pub use search::{SearchEngine, SearchOutcome, SearchRequest};
pub use store::{DataStatus, StoreManager};
