//! Cross-dataset search engine
//!
//! A search fans out one task per requested dataset. Each task resolves every
//! term against its own store and reports a terminal status; a failed dataset
//! contributes no matches and never aborts the others. Results are then
//! re-ordered deterministically by [`aggregate`].
//!
//! # Example
//!
//! ```no_run
//! use curtain_core::search::{SearchEngine, SearchRequest};
//! use curtain_core::store::StoreManager;
//! use curtain_core::config::CoreConfig;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> curtain_core::error::Result<()> {
//! let stores = Arc::new(StoreManager::new(CoreConfig::from_env()?));
//! let engine = SearchEngine::new(stores);
//! let request = SearchRequest::from_text("TP53\nMDM2", vec!["dataset-1".into()]);
//! let outcome = engine.search(&request, &CancellationToken::new()).await?;
//! for summary in &outcome.summaries {
//!     println!("{} found in {}", summary.search_term, summary.datasets_found_in);
//! }
//! # Ok(())
//! # }
//! ```

mod aggregate;
mod matrix;
mod report;
mod terms;

pub use aggregate::{
    aggregate, DatasetMatch, FcWindow, FoldChangeFilter, SearchFilter, SearchSummary,
};
pub use matrix::{ComparisonMatrix, MatrixCell, MatrixFilter};
pub use report::ReportRow;
pub use terms::parse_search_terms;

use futures::stream::{self, StreamExt};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, StoreError};
use crate::ids::first_gene_name;
use crate::lookup::gene_name_for;
use crate::mapping::ensure_mappings;
use crate::metadata::DatasetMetadata;
use crate::schema::{GeneNameMapping, ProcessedRow};
use crate::store::{DatasetStore, StoreManager};
use aggregate::mean_fold_change;

/// How terms are compared against identifiers and gene names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SearchMode {
    /// Case-insensitive equality through the mapping index
    #[default]
    Exact,
    /// Case-insensitive regular expression over IDs and gene names
    Regex,
}

/// A cross-dataset search
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub terms: Vec<String>,
    pub dataset_ids: Vec<String>,
    pub mode: SearchMode,
    pub filter: SearchFilter,
}

impl SearchRequest {
    /// Exact-mode request for the terms in a free-text blob
    pub fn from_text(text: &str, dataset_ids: Vec<String>) -> Self {
        Self {
            terms: parse_search_terms(text),
            dataset_ids,
            ..Default::default()
        }
    }
}

/// Terminal state of one dataset's search task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SearchStatus {
    Completed { matched: usize },
    Failed { reason: String },
    Cancelled,
}

impl std::fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchStatus::Completed { matched } => write!(f, "completed ({} matched)", matched),
            SearchStatus::Failed { reason } => write!(f, "failed: {}", reason),
            SearchStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSearchStatus {
    pub dataset_id: String,
    pub status: SearchStatus,
}

/// Aggregated summaries plus the per-dataset statuses, in request order
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub summaries: Vec<SearchSummary>,
    pub statuses: Vec<DatasetSearchStatus>,
}

/// A matched primary ID and its processed rows
#[derive(Debug, Clone)]
pub(crate) struct MatchedProtein {
    pub primary_id: String,
    pub rows: Vec<ProcessedRow>,
}

/// Candidates scanned in regex mode, loaded once per dataset
struct RegexCorpus {
    identifiers: Vec<(String, Option<String>)>,
    gene_mappings: Vec<GeneNameMapping>,
}

/// One dataset, ready to resolve terms
pub(crate) struct DatasetContext {
    pub dataset_id: String,
    pub store: Arc<DatasetStore>,
    pub metadata: DatasetMetadata,
    corpus: Option<RegexCorpus>,
}

/// Compile regex-mode terms, failing on the first invalid pattern
pub(crate) fn compile_patterns(terms: &[String], mode: SearchMode) -> Result<Option<Vec<Regex>>> {
    if mode != SearchMode::Regex {
        return Ok(None);
    }
    terms
        .iter()
        .map(|term| {
            RegexBuilder::new(term)
                .case_insensitive(true)
                .build()
                .map_err(|source| StoreError::InvalidRegex {
                    pattern: term.clone(),
                    source,
                })
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn push_unique(ids: &mut Vec<String>, seen: &mut HashSet<String>, candidates: Vec<String>) {
    for id in candidates {
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }
}

impl DatasetContext {
    pub fn p_cutoff(&self) -> f64 {
        self.metadata.settings.p_cutoff
    }

    pub fn fc_cutoff(&self) -> f64 {
        self.metadata.settings.log2_fc_cutoff
    }

    pub fn comparison(&self) -> String {
        self.metadata.comparison_label()
    }

    /// Primary IDs a term resolves to, most specific lookup first
    async fn matched_ids(&self, term: &str, pattern: Option<&Regex>) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut seen = HashSet::new();

        match (pattern, &self.corpus) {
            (Some(re), Some(corpus)) => {
                let by_column = corpus
                    .identifiers
                    .iter()
                    .filter(|(id, genes)| re.is_match(id) || genes.as_deref().is_some_and(|g| re.is_match(g)))
                    .map(|(id, _)| id.clone())
                    .collect();
                push_unique(&mut ids, &mut seen, by_column);

                let by_mapping = corpus
                    .gene_mappings
                    .iter()
                    .filter(|m| re.is_match(&m.gene_name_upper))
                    .map(|m| m.primary_id.clone())
                    .collect();
                push_unique(&mut ids, &mut seen, by_mapping);
            },
            _ => {
                let key = term.trim().to_uppercase();
                push_unique(&mut ids, &mut seen, self.store.primary_ids_for_split_id(&key).await?);
                push_unique(&mut ids, &mut seen, self.store.primary_ids_for_gene_name(&key).await?);
                if ids.is_empty() {
                    push_unique(
                        &mut ids,
                        &mut seen,
                        self.store.primary_ids_matching_columns(term.trim()).await?,
                    );
                }
            },
        }
        Ok(ids)
    }

    /// Every matched primary ID that has processed rows, in match order
    pub async fn resolve_term(&self, term: &str, pattern: Option<&Regex>) -> Result<Vec<MatchedProtein>> {
        let mut matched = Vec::new();
        for primary_id in self.matched_ids(term, pattern).await? {
            let rows = self.store.processed_rows_for(&primary_id).await?;
            if !rows.is_empty() {
                matched.push(MatchedProtein { primary_id, rows });
            }
        }
        Ok(matched)
    }

    /// Display gene name for a matched protein
    pub async fn gene_name(&self, protein: &MatchedProtein) -> Result<Option<String>> {
        let from_rows = protein
            .rows
            .iter()
            .filter_map(|r| r.gene_names.as_deref())
            .find_map(first_gene_name);
        match from_rows {
            Some(name) => Ok(Some(name.to_string())),
            None => gene_name_for(&self.store, &protein.primary_id).await,
        }
    }

    async fn dataset_match(&self, term: &str, matched: &[MatchedProtein]) -> Result<Option<DatasetMatch>> {
        let Some(first) = matched.first() else {
            return Ok(None);
        };

        let rows: Vec<&ProcessedRow> = matched.iter().flat_map(|m| m.rows.iter()).collect();
        let (p_cutoff, fc_cutoff) = (self.p_cutoff(), self.fc_cutoff());

        Ok(Some(DatasetMatch {
            dataset_id: self.dataset_id.clone(),
            search_term: term.to_string(),
            primary_id: first.primary_id.clone(),
            gene_name: self.gene_name(first).await?,
            matched_ids: matched.iter().map(|m| m.primary_id.clone()).collect(),
            average_fold_change: mean_fold_change(rows.iter().map(|r| &r.fold_change)),
            significant: rows.iter().any(|r| r.passes_cutoffs(p_cutoff, fc_cutoff)),
            p_cutoff,
            fc_cutoff,
            comparison: self.comparison(),
        }))
    }
}

/// Runs searches, reports and matrices over a set of dataset stores
#[derive(Debug, Clone)]
pub struct SearchEngine {
    stores: Arc<StoreManager>,
}

impl SearchEngine {
    pub fn new(stores: Arc<StoreManager>) -> Self {
        Self { stores }
    }

    /// Check a dataset has current data, load its metadata and bring its
    /// mapping index up to date
    pub(crate) async fn prepare(&self, dataset_id: &str, mode: SearchMode) -> Result<DatasetContext> {
        if !self.stores.data_exists(dataset_id).await {
            return Err(StoreError::no_data(dataset_id));
        }
        let store = self.stores.get_store(dataset_id).await?;

        let metadata = match store.load_metadata().await? {
            Some(metadata) => metadata,
            None => {
                warn!(dataset = %dataset_id, "No stored metadata, using default cutoffs");
                DatasetMetadata::default()
            },
        };

        ensure_mappings(&self.stores, dataset_id, None)
            .await
            .log(dataset_id);

        let corpus = match mode {
            SearchMode::Regex => Some(RegexCorpus {
                identifiers: store.distinct_identifiers().await?,
                gene_mappings: store.gene_name_mappings().await?,
            }),
            SearchMode::Exact => None,
        };

        Ok(DatasetContext {
            dataset_id: dataset_id.to_string(),
            store,
            metadata,
            corpus,
        })
    }

    /// Search every requested dataset concurrently and aggregate the matches
    ///
    /// Only an invalid regex pattern fails the whole search; per-dataset
    /// problems end up in [`SearchOutcome::statuses`].
    pub async fn search(&self, request: &SearchRequest, cancel: &CancellationToken) -> Result<SearchOutcome> {
        self.search_with_progress(request, cancel, &|_| {}).await
    }

    /// [`search`](Self::search), calling `on_dataset` as each dataset task ends
    ///
    /// A dataset still running when `cancel` fires reports
    /// [`SearchStatus::Cancelled`] and its partial matches are dropped.
    #[instrument(skip(self, request, cancel, on_dataset), fields(terms = request.terms.len(), datasets = request.dataset_ids.len()))]
    pub async fn search_with_progress(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
        on_dataset: &(dyn Fn(&DatasetSearchStatus) + Send + Sync),
    ) -> Result<SearchOutcome> {
        let patterns = compile_patterns(&request.terms, request.mode)?;
        let concurrency = request.dataset_ids.len().max(1);

        let results: Vec<(DatasetSearchStatus, Vec<DatasetMatch>)> = stream::iter(request.dataset_ids.iter())
            .map(|dataset_id| {
                let patterns = patterns.as_deref();
                async move {
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => (
                            DatasetSearchStatus {
                                dataset_id: dataset_id.clone(),
                                status: SearchStatus::Cancelled,
                            },
                            Vec::new(),
                        ),
                        result = self.search_dataset(dataset_id, request, patterns, cancel) => result,
                    };
                    on_dataset(&result.0);
                    result
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut statuses = Vec::with_capacity(results.len());
        let mut matches = Vec::new();
        for (status, found) in results {
            statuses.push(status);
            matches.extend(found);
        }
        statuses.sort_by_key(|s| {
            request
                .dataset_ids
                .iter()
                .position(|d| d == &s.dataset_id)
                .unwrap_or(usize::MAX)
        });

        let summaries = aggregate(&request.terms, &request.dataset_ids, &matches, &request.filter);
        info!(summaries = summaries.len(), matches = matches.len(), "Search complete");

        Ok(SearchOutcome {
            summaries,
            statuses,
        })
    }

    async fn search_dataset(
        &self,
        dataset_id: &str,
        request: &SearchRequest,
        patterns: Option<&[Regex]>,
        cancel: &CancellationToken,
    ) -> (DatasetSearchStatus, Vec<DatasetMatch>) {
        let status = |status| DatasetSearchStatus {
            dataset_id: dataset_id.to_string(),
            status,
        };
        let failed = |e: StoreError| {
            warn!(dataset = %dataset_id, error = %e, "Dataset search failed");
            status(SearchStatus::Failed {
                reason: e.short_reason(),
            })
        };

        let context = match self.prepare(dataset_id, request.mode).await {
            Ok(context) => context,
            Err(e) => return (failed(e), Vec::new()),
        };

        let mut matches = Vec::new();
        for (i, term) in request.terms.iter().enumerate() {
            if cancel.is_cancelled() {
                return (status(SearchStatus::Cancelled), Vec::new());
            }
            let pattern = patterns.and_then(|p| p.get(i));
            let found = match context.resolve_term(term, pattern).await {
                Ok(found) => found,
                Err(e) => return (failed(e), Vec::new()),
            };
            match context.dataset_match(term, &found).await {
                Ok(Some(m)) => matches.push(m),
                Ok(None) => {},
                Err(e) => return (failed(e), Vec::new()),
            }
        }

        debug!(dataset = %dataset_id, matched = matches.len(), "Dataset search complete");
        (
            status(SearchStatus::Completed {
                matched: matches.len(),
            }),
            matches,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::schema::ROW_SCHEMA_VERSION;
    use tempfile::TempDir;

    async fn seed(stores: &StoreManager, dataset_id: &str, rows: &[ProcessedRow]) {
        let store = stores.get_store(dataset_id).await.unwrap();
        store.insert_processed(rows, 100).await.unwrap();
        store.save_metadata(&DatasetMetadata::default()).await.unwrap();
        store.set_schema_version(ROW_SCHEMA_VERSION).await.unwrap();
    }

    fn row(id: &str, gene: &str, fc: f64, significant: f64) -> ProcessedRow {
        let mut row = ProcessedRow::new(id);
        row.gene_names = Some(gene.to_string());
        row.fold_change = Some(fc);
        row.significant = Some(significant);
        row
    }

    #[test]
    fn test_invalid_regex_rejected_up_front() {
        let terms = vec!["TP53".to_string(), "(unclosed".to_string()];
        let err = compile_patterns(&terms, SearchMode::Regex).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRegex { ref pattern, .. } if pattern == "(unclosed"));
        assert!(compile_patterns(&terms, SearchMode::Exact).unwrap().is_none());
    }

    #[test]
    fn test_status_display() {
        let failed = SearchStatus::Failed {
            reason: "no data downloaded".to_string(),
        };
        assert_eq!(failed.to_string(), "failed: no data downloaded");
    }

    #[tokio::test]
    async fn test_missing_dataset_fails_without_aborting_others() {
        let dir = TempDir::new().unwrap();
        let stores = Arc::new(StoreManager::new(CoreConfig::new(dir.path())));
        seed(&stores, "d1", &[row("P04637", "TP53", 1.0, 3.0)]).await;

        let engine = SearchEngine::new(Arc::clone(&stores));
        let request = SearchRequest::from_text("tp53", vec!["d1".into(), "absent".into()]);
        let outcome = engine.search(&request, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.summaries.len(), 1);
        assert_eq!(outcome.summaries[0].gene_names, "TP53");
        assert_eq!(outcome.summaries[0].total_datasets_searched, 2);
        assert_eq!(outcome.statuses[0].status, SearchStatus::Completed { matched: 1 });
        assert_eq!(
            outcome.statuses[1].status,
            SearchStatus::Failed {
                reason: "no data downloaded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_every_matched_id_contributes() {
        let dir = TempDir::new().unwrap();
        let stores = Arc::new(StoreManager::new(CoreConfig::new(dir.path())));
        seed(
            &stores,
            "d1",
            &[row("P04637", "TP53", 1.0, 0.5), row("P04637-2", "TP53", 3.0, 3.0)],
        )
        .await;

        let engine = SearchEngine::new(stores);
        let request = SearchRequest::from_text("TP53", vec!["d1".into()]);
        let outcome = engine.search(&request, &CancellationToken::new()).await.unwrap();

        let m = &outcome.summaries[0].matches[0];
        assert_eq!(m.primary_id, "P04637");
        assert_eq!(m.matched_ids, vec!["P04637", "P04637-2"]);
        assert_eq!(m.average_fold_change, Some(2.0));
        assert!(m.significant);
    }

    #[tokio::test]
    async fn test_regex_mode() {
        let dir = TempDir::new().unwrap();
        let stores = Arc::new(StoreManager::new(CoreConfig::new(dir.path())));
        seed(
            &stores,
            "d1",
            &[row("P04637", "TP53", 1.0, 0.5), row("O15350", "TP73", 2.0, 0.5)],
        )
        .await;

        let engine = SearchEngine::new(stores);
        let request = SearchRequest {
            terms: vec!["^tp[57]3$".to_string()],
            dataset_ids: vec!["d1".to_string()],
            mode: SearchMode::Regex,
            ..Default::default()
        };
        let outcome = engine.search(&request, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.summaries[0].matches[0].matched_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_search_reports_cancelled() {
        let dir = TempDir::new().unwrap();
        let stores = Arc::new(StoreManager::new(CoreConfig::new(dir.path())));
        seed(&stores, "d1", &[row("P04637", "TP53", 1.0, 3.0)]).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let engine = SearchEngine::new(stores);
        let request = SearchRequest::from_text("TP53", vec!["d1".into()]);
        let outcome = engine.search(&request, &cancel).await.unwrap();

        assert!(outcome.summaries.is_empty());
        assert_eq!(outcome.statuses[0].status, SearchStatus::Cancelled);
    }
}
