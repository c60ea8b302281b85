//! Detailed per-protein report: one row per matching processed entry

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{instrument, warn};

use super::{compile_patterns, SearchEngine, SearchMode};
use crate::error::Result;

/// One line of a detailed report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub dataset_id: String,
    pub search_term: String,
    pub found: bool,
    pub primary_id: Option<String>,
    pub gene_name: Option<String>,
    pub fold_change: Option<f64>,
    pub p_value: Option<f64>,
    pub significant: bool,
    /// The dataset's current comparison label
    pub comparison: String,
    /// PTM site, when the row carries one
    pub position: Option<String>,
}

impl ReportRow {
    fn not_found(dataset_id: &str, term: &str, comparison: String) -> Self {
        Self {
            dataset_id: dataset_id.to_string(),
            search_term: term.to_string(),
            found: false,
            primary_id: None,
            gene_name: None,
            fold_change: None,
            p_value: None,
            significant: false,
            comparison,
            position: None,
        }
    }
}

impl SearchEngine {
    /// Every processed row matching `term` in each dataset
    ///
    /// PTM datasets with several sites per protein yield several rows. A
    /// dataset with no usable match (or no data) yields one not-found row.
    /// Rows follow the order of `dataset_ids`.
    #[instrument(skip(self, dataset_ids), fields(datasets = dataset_ids.len()))]
    pub async fn report(
        &self,
        term: &str,
        dataset_ids: &[String],
        mode: SearchMode,
    ) -> Result<Vec<ReportRow>> {
        let term = term.trim();
        let patterns = compile_patterns(&[term.to_string()], mode)?;
        let pattern = patterns.as_ref().and_then(|p| p.first());

        let mut per_dataset: Vec<(usize, Vec<ReportRow>)> = stream::iter(dataset_ids.iter().enumerate())
            .map(|(index, dataset_id)| async move {
                (index, self.report_dataset(dataset_id, term, mode, pattern).await)
            })
            .buffer_unordered(dataset_ids.len().max(1))
            .collect()
            .await;

        per_dataset.sort_by_key(|(index, _)| *index);
        Ok(per_dataset.into_iter().flat_map(|(_, rows)| rows).collect())
    }

    async fn report_dataset(
        &self,
        dataset_id: &str,
        term: &str,
        mode: SearchMode,
        pattern: Option<&regex::Regex>,
    ) -> Vec<ReportRow> {
        let context = match self.prepare(dataset_id, mode).await {
            Ok(context) => context,
            Err(e) => {
                warn!(dataset = %dataset_id, error = %e, "Report skipped dataset");
                return vec![ReportRow::not_found(dataset_id, term, String::new())];
            },
        };
        let comparison = context.comparison();

        let matched = match context.resolve_term(term, pattern).await {
            Ok(matched) => matched,
            Err(e) => {
                warn!(dataset = %dataset_id, error = %e, "Report lookup failed");
                Vec::new()
            },
        };
        if matched.is_empty() {
            return vec![ReportRow::not_found(dataset_id, term, comparison)];
        }

        let (p_cutoff, fc_cutoff) = (context.p_cutoff(), context.fc_cutoff());
        let mut rows = Vec::new();
        for protein in &matched {
            let gene_name = context.gene_name(protein).await.unwrap_or_else(|e| {
                warn!(dataset = %dataset_id, error = %e, "Gene name lookup failed");
                None
            });
            for row in &protein.rows {
                rows.push(ReportRow {
                    dataset_id: dataset_id.to_string(),
                    search_term: term.to_string(),
                    found: true,
                    primary_id: Some(row.primary_id.clone()),
                    gene_name: gene_name.clone(),
                    fold_change: row.fold_change,
                    p_value: row.p_value(),
                    significant: row.passes_cutoffs(p_cutoff, fc_cutoff),
                    comparison: comparison.clone(),
                    position: row.position.clone(),
                });
            }
        }
        rows
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::metadata::DatasetMetadata;
    use crate::schema::{ProcessedRow, ROW_SCHEMA_VERSION};
    use crate::store::StoreManager;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn site(position: &str, fc: f64) -> ProcessedRow {
        let mut row = ProcessedRow::new(format!("P04637_{}", position));
        row.gene_names = Some("TP53".to_string());
        row.accession = Some("P04637".to_string());
        row.position = Some(position.to_string());
        row.fold_change = Some(fc);
        row.significant = Some(2.0);
        row
    }

    #[tokio::test]
    async fn test_one_row_per_site_and_not_found_rows() {
        let dir = TempDir::new().unwrap();
        let stores = Arc::new(StoreManager::new(CoreConfig::new(dir.path())));

        let store = stores.get_store("ptm").await.unwrap();
        store
            .insert_processed(&[site("S15", 1.0), site("S20", -2.0)], 100)
            .await
            .unwrap();
        let mut metadata = DatasetMetadata::default();
        metadata.settings.current_comparison = "KO vs WT".to_string();
        store.save_metadata(&metadata).await.unwrap();
        store.set_schema_version(ROW_SCHEMA_VERSION).await.unwrap();

        let engine = SearchEngine::new(stores);
        let datasets = vec!["missing".to_string(), "ptm".to_string()];
        let rows = engine.report("tp53", &datasets, SearchMode::Exact).await.unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].dataset_id, "missing");
        assert!(!rows[0].found);
        assert!(rows[1..].iter().all(|r| r.found && r.comparison == "KO vs WT"));
        let sites: Vec<_> = rows[1..].iter().filter_map(|r| r.position.as_deref()).collect();
        assert_eq!(sites, vec!["S15", "S20"]);
        assert!((rows[2].p_value.unwrap() - 0.01).abs() < 1e-12);
    }
}
