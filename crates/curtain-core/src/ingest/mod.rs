//! Ingestion pipeline
//!
//! Turns the raw and processed tab-separated tables of one dataset, plus its
//! metadata payload, into rows of the dataset's store:
//!
//! 1. Skip if the store already holds current data; rebuild it if stale
//! 2. Parse the processed table (transforms, PTM gene enrichment)
//! 3. Parse the raw table and derive the sample/condition structure
//! 4. Store rows, UniProt entries, auxiliary maps and metadata
//! 5. Stamp the row-schema version, then build the mapping index
//!
//! The version is stamped only after every row is written, so an
//! interrupted ingestion reads back as stale and is rebuilt next time.

mod parse;
mod samples;

pub use parse::{parse_processed, parse_raw};
pub use samples::{derive_sample_structure, split_sample_name, SampleStructure, DEFAULT_PALETTE};

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::ids::gene_tokens;
use crate::mapping::{ensure_mappings, MappingReport};
use crate::metadata::{DatasetMetadata, DifferentialFormConfig, RawFormConfig};
use crate::schema::{ProcessedRow, ROW_SCHEMA_VERSION};
use crate::store::{DataStatus, StoreManager};
use crate::uniprot::{project_record, UniProtIndex};

/// Ingestion stage, reported through the progress callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestStage {
    CheckingExisting,
    ParsingProcessed,
    ParsingRaw,
    StoringProcessed,
    StoringRaw,
    StoringUniProt,
    StoringMetadata,
    BuildingMappings,
    Done,
}

impl IngestStage {
    /// Rough completion percentage at the start of the stage
    pub fn percent(&self) -> u8 {
        match self {
            IngestStage::CheckingExisting => 0,
            IngestStage::ParsingProcessed => 5,
            IngestStage::ParsingRaw => 20,
            IngestStage::StoringProcessed => 35,
            IngestStage::StoringRaw => 55,
            IngestStage::StoringUniProt => 70,
            IngestStage::StoringMetadata => 80,
            IngestStage::BuildingMappings => 90,
            IngestStage::Done => 100,
        }
    }
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            IngestStage::CheckingExisting => "Checking existing data",
            IngestStage::ParsingProcessed => "Parsing processed data",
            IngestStage::ParsingRaw => "Parsing raw data",
            IngestStage::StoringProcessed => "Storing processed rows",
            IngestStage::StoringRaw => "Storing raw rows",
            IngestStage::StoringUniProt => "Storing UniProt entries",
            IngestStage::StoringMetadata => "Storing metadata",
            IngestStage::BuildingMappings => "Building mapping index",
            IngestStage::Done => "Done",
        };
        f.write_str(label)
    }
}

/// One progress update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestProgress {
    pub stage: IngestStage,
    pub percent: u8,
}

impl From<IngestStage> for IngestProgress {
    fn from(stage: IngestStage) -> Self {
        Self {
            stage,
            percent: stage.percent(),
        }
    }
}

/// Everything needed to ingest one dataset
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub raw_text: Option<String>,
    pub processed_text: Option<String>,
    pub raw_form: RawFormConfig,
    pub differential_form: DifferentialFormConfig,
    pub metadata: DatasetMetadata,
}

impl IngestRequest {
    /// Request built from a metadata payload alone, taking the forms and
    /// any embedded tables from it
    pub fn from_metadata(mut metadata: DatasetMetadata) -> Self {
        let (raw_text, processed_text) = metadata.take_embedded_tables();
        Self {
            raw_text,
            processed_text,
            raw_form: metadata.raw_form.clone(),
            differential_form: metadata.differential_form.clone(),
            metadata,
        }
    }
}

/// Counts written by one ingestion
#[derive(Debug)]
pub struct IngestSummary {
    pub processed_rows: usize,
    pub raw_rows: usize,
    pub uniprot_entries: usize,
    pub mapping: MappingReport,
}

/// Result of [`IngestionPipeline::build`]
#[derive(Debug)]
pub enum IngestOutcome {
    /// Current data was already stored; nothing was written
    AlreadyPresent,
    Ingested(IngestSummary),
}

/// Builds a dataset's store from its source tables
#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    stores: Arc<StoreManager>,
}

impl IngestionPipeline {
    pub fn new(stores: Arc<StoreManager>) -> Self {
        Self { stores }
    }

    /// Ingest one dataset
    ///
    /// A no-op when the store already holds data under the current row-schema
    /// version. Storage failures propagate; nothing is retried.
    #[instrument(skip(self, request, on_progress), fields(dataset = %dataset_id))]
    pub async fn build(
        &self,
        dataset_id: &str,
        request: IngestRequest,
        on_progress: &(dyn Fn(IngestProgress) + Send + Sync),
    ) -> Result<IngestOutcome> {
        let report = |stage: IngestStage| on_progress(stage.into());
        let batch_size = self.stores.config().insert_batch_size;

        report(IngestStage::CheckingExisting);
        match self.stores.data_status(dataset_id).await? {
            DataStatus::Present => {
                info!("Current data already stored, skipping ingestion");
                report(IngestStage::Done);
                return Ok(IngestOutcome::AlreadyPresent);
            },
            DataStatus::Stale { found } => {
                info!(?found, current = ROW_SCHEMA_VERSION, "Stale store, rebuilding");
                self.stores.destructive_rebuild(dataset_id).await?;
            },
            DataStatus::Missing => {},
        }

        let store = self.stores.get_store(dataset_id).await?;
        store.clear_all().await?;

        let IngestRequest {
            raw_text,
            processed_text,
            raw_form,
            differential_form,
            mut metadata,
        } = request;

        let extra = metadata.extra_data();
        let uniprot_entries: Vec<_> = extra
            .uniprot
            .db
            .iter()
            .map(|(key, record)| project_record(key, record))
            .collect();
        let aliases = UniProtIndex::aliases_from_payload(extra.uniprot.acc_map.iter());
        let index = UniProtIndex::new(uniprot_entries.clone(), aliases);

        report(IngestStage::ParsingProcessed);
        let mut processed = match processed_text.as_deref() {
            Some(text) => parse_processed(text, &differential_form),
            None => {
                warn!("No processed table supplied");
                Vec::new()
            },
        };
        if differential_form.is_ptm() {
            enrich_gene_names(&mut processed, &index);
        }

        report(IngestStage::ParsingRaw);
        let (raw, samples) = match raw_text.as_deref() {
            Some(text) => parse_raw(text, &raw_form),
            None => {
                debug!("No raw table supplied");
                (Vec::new(), Vec::new())
            },
        };
        if !samples.is_empty() {
            derive_sample_structure(&samples, &metadata.settings).apply(&mut metadata.settings);
        }
        metadata.raw_form = raw_form;
        metadata.differential_form = differential_form;

        report(IngestStage::StoringProcessed);
        store.insert_processed(&processed, batch_size).await?;

        report(IngestStage::StoringRaw);
        store.insert_raw(&raw, batch_size).await?;

        report(IngestStage::StoringUniProt);
        store.insert_uniprot(&uniprot_entries, batch_size).await?;
        store
            .replace_keyed_blobs("genes_map", "gene_name", &blobs(&extra.data.genes_map)?, batch_size)
            .await?;
        store
            .replace_keyed_blobs(
                "primary_ids_map",
                "primary_id",
                &blobs(&extra.data.primary_ids_map)?,
                batch_size,
            )
            .await?;
        store
            .replace_keyed_blobs(
                "gene_name_to_acc",
                "gene_name",
                &blobs(&extra.uniprot.gene_name_to_acc)?,
                batch_size,
            )
            .await?;
        let vocabulary = gene_vocabulary(&processed, &index, &extra.data.all_genes);
        store.replace_all_genes(&vocabulary, batch_size).await?;

        report(IngestStage::StoringMetadata);
        store.save_metadata(&metadata).await?;
        store.set_schema_version(ROW_SCHEMA_VERSION).await?;

        report(IngestStage::BuildingMappings);
        let mapping = ensure_mappings(&self.stores, dataset_id, Some(&index)).await;
        mapping.log(dataset_id);

        report(IngestStage::Done);

        let summary = IngestSummary {
            processed_rows: processed.len(),
            raw_rows: raw.len(),
            uniprot_entries: uniprot_entries.len(),
            mapping,
        };
        info!(
            processed = summary.processed_rows,
            raw = summary.raw_rows,
            uniprot = summary.uniprot_entries,
            "Ingestion complete"
        );
        Ok(IngestOutcome::Ingested(summary))
    }
}

/// Fill missing gene names of PTM rows from UniProt, by accession first and
/// by primary ID otherwise
fn enrich_gene_names(rows: &mut [ProcessedRow], index: &UniProtIndex) {
    let mut enriched = 0usize;
    for row in rows.iter_mut().filter(|r| r.gene_names.is_none()) {
        let resolved = row
            .accession
            .as_deref()
            .and_then(|acc| index.resolve_gene_name(acc))
            .or_else(|| index.resolve_gene_name(&row.primary_id));
        if resolved.is_some() {
            enriched += 1;
        }
        row.gene_names = resolved;
    }
    debug!(enriched, "Enriched PTM gene names from UniProt");
}

/// `(key, json)` pairs of an auxiliary map
fn blobs(map: &BTreeMap<String, Value>) -> Result<Vec<(String, String)>> {
    map.iter()
        .map(|(k, v)| Ok((k.clone(), serde_json::to_string(v)?)))
        .collect()
}

/// Union of row gene tokens, UniProt gene tokens, and the payload's
/// own vocabulary; case-insensitively distinct, first spelling wins
fn gene_vocabulary(rows: &[ProcessedRow], index: &UniProtIndex, declared: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = BTreeSet::new();

    let candidates = rows
        .iter()
        .filter_map(|r| r.gene_names.as_deref())
        .chain(index.all_gene_names())
        .flat_map(gene_tokens)
        .chain(declared.iter().map(String::as_str).map(str::trim));

    for name in candidates.filter(|n| !n.is_empty()) {
        if seen.insert(name.to_uppercase()) {
            names.insert(name.to_string());
        }
    }
    names.into_iter().collect()
}
