//! Protein x dataset comparison matrix

use futures::stream::{self, StreamExt};
use regex::Regex;
use serde::Serialize;
use tracing::{instrument, warn};

use super::{compile_patterns, SearchEngine, SearchMode};
use crate::error::Result;

/// Which found cells stay found
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MatrixFilter {
    pub significant_only: bool,
    pub min_abs_fold_change: Option<f64>,
    pub max_p_value: Option<f64>,
    /// Drop protein rows in which no cell is found
    pub hide_not_found: bool,
}

impl MatrixFilter {
    fn keeps(&self, cell: &MatrixCell) -> bool {
        if self.significant_only && !cell.significant {
            return false;
        }
        if let Some(min) = self.min_abs_fold_change {
            if !cell.fold_change.is_some_and(|fc| fc.abs() >= min) {
                return false;
            }
        }
        if let Some(max) = self.max_p_value {
            if !cell.p_value.is_some_and(|p| p <= max) {
                return false;
            }
        }
        true
    }
}

/// Statistics of the first matching entry of one protein in one dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatrixCell {
    pub found: bool,
    pub primary_id: Option<String>,
    pub gene_name: Option<String>,
    pub fold_change: Option<f64>,
    pub p_value: Option<f64>,
    pub significant: bool,
}

/// Rectangular grid: `cells[protein][dataset]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonMatrix {
    pub proteins: Vec<String>,
    pub dataset_ids: Vec<String>,
    pub cells: Vec<Vec<MatrixCell>>,
}

impl ComparisonMatrix {
    pub fn cell(&self, protein: usize, dataset: usize) -> Option<&MatrixCell> {
        self.cells.get(protein)?.get(dataset)
    }

    pub fn cell_count(&self) -> usize {
        self.cells.iter().map(Vec::len).sum()
    }
}

impl SearchEngine {
    /// Build the comparison matrix for `proteins` over `dataset_ids`
    ///
    /// Cells take the first matching entry rather than an average. Cells the
    /// filter rejects are kept with `found = false`.
    #[instrument(skip(self, proteins, dataset_ids), fields(proteins = proteins.len(), datasets = dataset_ids.len()))]
    pub async fn matrix(
        &self,
        proteins: &[String],
        dataset_ids: &[String],
        mode: SearchMode,
        filter: MatrixFilter,
    ) -> Result<ComparisonMatrix> {
        let patterns = compile_patterns(proteins, mode)?;
        let patterns = patterns.as_deref();

        let mut columns: Vec<(usize, Vec<MatrixCell>)> = stream::iter(dataset_ids.iter().enumerate())
            .map(|(index, dataset_id)| async move {
                (index, self.matrix_column(dataset_id, proteins, mode, patterns).await)
            })
            .buffer_unordered(dataset_ids.len().max(1))
            .collect()
            .await;
        columns.sort_by_key(|(index, _)| *index);

        let mut kept_proteins = Vec::with_capacity(proteins.len());
        let mut cells = Vec::with_capacity(proteins.len());
        for (p, protein) in proteins.iter().enumerate() {
            let row: Vec<MatrixCell> = columns
                .iter()
                .map(|(_, column)| {
                    let cell = column.get(p).cloned().unwrap_or_default();
                    if cell.found && !filter.keeps(&cell) {
                        MatrixCell { found: false, ..cell }
                    } else {
                        cell
                    }
                })
                .collect();

            if filter.hide_not_found && !row.iter().any(|c| c.found) {
                continue;
            }
            kept_proteins.push(protein.clone());
            cells.push(row);
        }

        Ok(ComparisonMatrix {
            proteins: kept_proteins,
            dataset_ids: dataset_ids.to_vec(),
            cells,
        })
    }

    /// One cell per protein for a single dataset; all not-found on failure
    async fn matrix_column(
        &self,
        dataset_id: &str,
        proteins: &[String],
        mode: SearchMode,
        patterns: Option<&[Regex]>,
    ) -> Vec<MatrixCell> {
        let blank = || vec![MatrixCell::default(); proteins.len()];
        let context = match self.prepare(dataset_id, mode).await {
            Ok(context) => context,
            Err(e) => {
                warn!(dataset = %dataset_id, error = %e, "Matrix column left empty");
                return blank();
            },
        };
        let (p_cutoff, fc_cutoff) = (context.p_cutoff(), context.fc_cutoff());

        let mut column = Vec::with_capacity(proteins.len());
        for (i, protein) in proteins.iter().enumerate() {
            let pattern = patterns.and_then(|p| p.get(i));
            let matched = match context.resolve_term(protein, pattern).await {
                Ok(matched) => matched,
                Err(e) => {
                    warn!(dataset = %dataset_id, protein = %protein, error = %e, "Matrix lookup failed");
                    Vec::new()
                },
            };

            let Some(first) = matched.first() else {
                column.push(MatrixCell::default());
                continue;
            };
            let Some(row) = first.rows.first() else {
                column.push(MatrixCell::default());
                continue;
            };
            let gene_name = context.gene_name(first).await.unwrap_or_default();

            column.push(MatrixCell {
                found: true,
                primary_id: Some(row.primary_id.clone()),
                gene_name,
                fold_change: row.fold_change,
                p_value: row.p_value(),
                significant: row.passes_cutoffs(p_cutoff, fc_cutoff),
            });
        }
        column
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

    #[test]
    fn test_filter_rules() {
        let cell = MatrixCell {
            found: true,
            fold_change: Some(-1.0),
            p_value: Some(0.01),
            significant: false,
            ..Default::default()
        };
        assert!(MatrixFilter::default().keeps(&cell));
        assert!(!MatrixFilter { significant_only: true, ..Default::default() }.keeps(&cell));
        assert!(MatrixFilter { min_abs_fold_change: Some(1.0), ..Default::default() }.keeps(&cell));
        assert!(!MatrixFilter { max_p_value: Some(0.001), ..Default::default() }.keeps(&cell));
    }

    #[tokio::test]
    async fn test_first_match_wins_and_hide_not_found() {
        let dir = TempDir::new().unwrap();
        let stores = Arc::new(StoreManager::new(CoreConfig::new(dir.path())));
        let store = stores.get_store("d1").await.unwrap();

        let mut first = ProcessedRow::new("P04637");
        first.gene_names = Some("TP53".to_string());
        first.fold_change = Some(1.0);
        let mut second = first.clone();
        second.comparison = "2".to_string();
        second.fold_change = Some(5.0);
        store.insert_processed(&[first, second], 100).await.unwrap();
        store.save_metadata(&DatasetMetadata::default()).await.unwrap();
        store.set_schema_version(ROW_SCHEMA_VERSION).await.unwrap();

        let engine = SearchEngine::new(stores);
        let proteins = vec!["TP53".to_string(), "GHOST".to_string()];
        let datasets = vec!["d1".to_string()];

        let matrix = engine
            .matrix(&proteins, &datasets, SearchMode::Exact, MatrixFilter::default())
            .await
            .unwrap();
        assert_eq!(matrix.cell_count(), 2);
        assert_eq!(matrix.cell(0, 0).unwrap().fold_change, Some(1.0));
        assert!(!matrix.cell(1, 0).unwrap().found);

        let hidden = engine
            .matrix(
                &proteins,
                &datasets,
                SearchMode::Exact,
                MatrixFilter {
                    hide_not_found: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(hidden.proteins, vec!["TP53"]);
    }
}
