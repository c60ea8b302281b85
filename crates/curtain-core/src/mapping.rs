//! Gene-name and split-ID mapping index
//!
//! Derived wholesale from the processed rows (plus UniProt gene names) so
//! search can resolve a term with an indexed equality lookup instead of
//! scanning the processed table. A failed build never fails the caller:
//! [`ensure_mappings`] reports it as [`MappingReport::Degraded`].

use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, StoreError};
use crate::ids::{gene_tokens, split_primary_id};
use crate::lookup::uniprot_index_for;
use crate::schema::{GeneNameMapping, PrimaryIdMapping, ProcessedRow, MAPPING_SCHEMA_VERSION};
use crate::store::{DatasetStore, StoreManager};
use crate::uniprot::UniProtIndex;

/// Non-fatal mapping failure, only ever logged
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Could not inspect mapping index of '{dataset}': {source}")]
    Inspect {
        dataset: String,
        #[source]
        source: StoreError,
    },

    #[error("Could not rebuild mapping index of '{dataset}': {source}")]
    Rebuild {
        dataset: String,
        #[source]
        source: StoreError,
    },
}

/// What [`ensure_mappings`] did
#[derive(Debug)]
pub enum MappingReport {
    /// The index was current; nothing written
    UpToDate,
    /// The index was rebuilt with this many distinct pairs
    Rebuilt { gene_names: usize, split_ids: usize },
    /// The index could not be checked or rebuilt; search quality degrades
    Degraded(MappingError),
}

impl MappingReport {
    /// Emit the report at the matching level
    pub fn log(&self, dataset_id: &str) {
        match self {
            MappingReport::UpToDate => debug!(dataset = %dataset_id, "Mapping index up to date"),
            MappingReport::Rebuilt {
                gene_names,
                split_ids,
            } => info!(
                dataset = %dataset_id,
                gene_names,
                split_ids,
                "Rebuilt mapping index"
            ),
            MappingReport::Degraded(e) => warn!(dataset = %dataset_id, error = %e, "Mapping index degraded"),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, MappingReport::Degraded(_))
    }
}

/// Rebuild the mapping index of a dataset if it is empty, stale, or missing
/// gene names that UniProt data can now supply
///
/// Without `uniprot`, the UniProt entries stored with the dataset are used.
#[instrument(skip(stores, uniprot), fields(dataset = %dataset_id))]
pub async fn ensure_mappings(
    stores: &StoreManager,
    dataset_id: &str,
    uniprot: Option<&UniProtIndex>,
) -> MappingReport {
    let store = match stores.get_store(dataset_id).await {
        Ok(store) => store,
        Err(source) => {
            return MappingReport::Degraded(MappingError::Inspect {
                dataset: dataset_id.to_string(),
                source,
            })
        },
    };

    let loaded;
    let index = match uniprot {
        Some(index) => Some(index),
        None => match uniprot_index_for(&store).await {
            Ok(index) => {
                loaded = index;
                Some(&loaded)
            },
            Err(e) => {
                warn!(error = %e, "Could not load UniProt entries for mapping");
                None
            },
        },
    };

    match needs_rebuild(&store, index).await {
        Ok(false) => return MappingReport::UpToDate,
        Ok(true) => {},
        Err(source) => {
            return MappingReport::Degraded(MappingError::Inspect {
                dataset: dataset_id.to_string(),
                source,
            })
        },
    }

    match rebuild(&store, index, stores.config().insert_batch_size).await {
        Ok((gene_names, split_ids)) => MappingReport::Rebuilt {
            gene_names,
            split_ids,
        },
        Err(source) => MappingReport::Degraded(MappingError::Rebuild {
            dataset: dataset_id.to_string(),
            source,
        }),
    }
}

async fn needs_rebuild(store: &DatasetStore, uniprot: Option<&UniProtIndex>) -> Result<bool> {
    let counts = store.row_counts().await?;
    if counts.processed == 0 {
        return Ok(false);
    }
    if counts.gene_mappings == 0 && counts.split_id_mappings == 0 {
        return Ok(true);
    }
    if store.mapping_schema_version().await? != Some(MAPPING_SCHEMA_VERSION) {
        return Ok(true);
    }
    if counts.gene_mappings > 0 {
        return Ok(false);
    }
    // No gene names resolved yet: retry only if UniProt data changed since
    // the last build
    let available = uniprot.map_or(0, |u| u.len());
    if available == 0 {
        return Ok(false);
    }
    let built_with = store.mapping_uniprot_entries().await?;
    Ok(built_with != i64::try_from(available).ok())
}

async fn rebuild(
    store: &DatasetStore,
    uniprot: Option<&UniProtIndex>,
    batch_size: usize,
) -> Result<(usize, usize)> {
    let rows = store.processed_rows().await?;
    let (gene_names, split_ids) = build_mappings(&rows, uniprot);
    let uniprot_entries = uniprot.map_or(0, |u| i64::try_from(u.len()).unwrap_or(i64::MAX));
    store
        .replace_mappings(
            &gene_names,
            &split_ids,
            MAPPING_SCHEMA_VERSION,
            uniprot_entries,
            batch_size,
        )
        .await?;
    Ok((gene_names.len(), split_ids.len()))
}

/// Gene-name string for a row: its own column, then (PTM rows) UniProt by
/// accession, then UniProt by the primary ID or any of its fragments
fn resolve_gene_names<'a>(row: &'a ProcessedRow, uniprot: Option<&'a UniProtIndex>) -> Option<&'a str> {
    if let Some(names) = row.gene_names.as_deref().filter(|g| !g.trim().is_empty()) {
        return Some(names);
    }
    let index = uniprot?;
    if row.is_ptm() {
        if let Some(names) = row.accession.as_deref().and_then(|a| index.gene_names(a)) {
            return Some(names);
        }
    }
    index
        .gene_names(&row.primary_id)
        .or_else(|| split_primary_id(&row.primary_id).find_map(|f| index.gene_names(f)))
}

/// Distinct mapping pairs for a set of processed rows
pub fn build_mappings(
    rows: &[ProcessedRow],
    uniprot: Option<&UniProtIndex>,
) -> (Vec<GeneNameMapping>, Vec<PrimaryIdMapping>) {
    let mut gene_names = Vec::new();
    let mut split_ids = Vec::new();
    let mut seen_genes = HashSet::new();
    let mut seen_splits = HashSet::new();

    let mut add_split = |key: &str, primary_id: &str| {
        let pair = PrimaryIdMapping {
            split_id_upper: key.trim().to_uppercase(),
            primary_id: primary_id.to_string(),
        };
        if !pair.split_id_upper.is_empty() && seen_splits.insert(pair.clone()) {
            split_ids.push(pair);
        }
    };

    for row in rows {
        add_split(&row.primary_id, &row.primary_id);
        for fragment in split_primary_id(&row.primary_id) {
            add_split(fragment, &row.primary_id);
        }
        if row.is_ptm() {
            if let Some(accession) = row.accession.as_deref() {
                add_split(accession, &row.primary_id);
            }
        }

        let Some(names) = resolve_gene_names(row, uniprot) else {
            continue;
        };
        let keys = std::iter::once(names.trim()).chain(gene_tokens(names));
        for key in keys {
            let pair = GeneNameMapping {
                gene_name_upper: key.to_uppercase(),
                primary_id: row.primary_id.clone(),
            };
            if !pair.gene_name_upper.is_empty() && seen_genes.insert(pair.clone()) {
                gene_names.push(pair);
            }
        }
    }

    (gene_names, split_ids)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::uniprot::project_record;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn row(primary_id: &str, genes: Option<&str>) -> ProcessedRow {
        let mut row = ProcessedRow::new(primary_id);
        row.gene_names = genes.map(str::to_string);
        row
    }

    fn index() -> UniProtIndex {
        UniProtIndex::new(
            vec![project_record("Q00987", &json!({"Gene Names": "MDM2 HDM2"}))],
            HashMap::new(),
        )
    }

    #[test]
    fn test_split_and_gene_tokens_are_mapped() {
        let (genes, splits) = build_mappings(&[row("a;B", Some("G1 G2"))], None);

        let split_keys: Vec<&str> = splits.iter().map(|m| m.split_id_upper.as_str()).collect();
        assert_eq!(split_keys, vec!["A;B", "A", "B"]);
        assert!(splits.iter().all(|m| m.primary_id == "a;B"));

        let gene_keys: Vec<&str> = genes.iter().map(|m| m.gene_name_upper.as_str()).collect();
        assert_eq!(gene_keys, vec!["G1 G2", "G1", "G2"]);
    }

    #[test]
    fn test_gene_name_falls_back_to_uniprot_fragment() {
        let index = index();
        let (genes, _) = build_mappings(&[row("Q99999;Q00987", None)], Some(&index));
        let keys: Vec<&str> = genes.iter().map(|m| m.gene_name_upper.as_str()).collect();
        assert_eq!(keys, vec!["MDM2 HDM2", "MDM2", "HDM2"]);
    }

    #[test]
    fn test_ptm_accession_is_mapped_and_resolved() {
        let index = index();
        let mut ptm = row("Q00987_S166", None);
        ptm.accession = Some("q00987".to_string());
        ptm.position = Some("S166".to_string());

        let (genes, splits) = build_mappings(&[ptm], Some(&index));
        assert!(splits.iter().any(|m| m.split_id_upper == "Q00987"));
        assert!(genes.iter().any(|m| m.gene_name_upper == "MDM2"));
    }

    #[tokio::test]
    async fn test_ensure_mappings_rebuilds_once() {
        let dir = TempDir::new().unwrap();
        let stores = StoreManager::new(CoreConfig::new(dir.path()));
        let store = stores.get_store("ds").await.unwrap();
        store
            .insert_processed(&[row("P04637", Some("TP53"))], 100)
            .await
            .unwrap();

        let first = ensure_mappings(&stores, "ds", None).await;
        assert!(matches!(first, MappingReport::Rebuilt { gene_names: 1, split_ids: 1 }));

        let second = ensure_mappings(&stores, "ds", None).await;
        assert!(matches!(second, MappingReport::UpToDate));
    }

    #[tokio::test]
    async fn test_ensure_mappings_rebuilds_when_uniprot_arrives() {
        let dir = TempDir::new().unwrap();
        let stores = StoreManager::new(CoreConfig::new(dir.path()));
        let store = stores.get_store("ds").await.unwrap();
        store
            .insert_processed(&[row("Q00987", None)], 100)
            .await
            .unwrap();

        let first = ensure_mappings(&stores, "ds", None).await;
        assert!(matches!(first, MappingReport::Rebuilt { gene_names: 0, .. }));

        let index = index();
        let second = ensure_mappings(&stores, "ds", Some(&index)).await;
        assert!(matches!(second, MappingReport::Rebuilt { gene_names: 3, .. }));
        assert_eq!(store.primary_ids_for_gene_name("HDM2").await.unwrap(), vec!["Q00987"]);
    }

    #[tokio::test]
    async fn test_unresolvable_gene_names_do_not_rebuild_every_time() {
        let dir = TempDir::new().unwrap();
        let stores = StoreManager::new(CoreConfig::new(dir.path()));
        let store = stores.get_store("ds").await.unwrap();
        store
            .insert_processed(&[row("P99999", None)], 100)
            .await
            .unwrap();

        // UniProt is loaded but knows nothing about P99999
        let index = index();
        let first = ensure_mappings(&stores, "ds", Some(&index)).await;
        assert!(matches!(first, MappingReport::Rebuilt { gene_names: 0, .. }));
        assert_eq!(store.mapping_uniprot_entries().await.unwrap(), Some(1));

        let second = ensure_mappings(&stores, "ds", Some(&index)).await;
        assert!(matches!(second, MappingReport::UpToDate));
    }
}
