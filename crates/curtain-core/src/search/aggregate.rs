//! Cross-dataset aggregation of per-dataset matches

use serde::Serialize;
use std::collections::BTreeSet;

/// One search term resolved within one dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetMatch {
    pub dataset_id: String,
    pub search_term: String,
    /// First matched primary ID that has processed rows
    pub primary_id: String,
    pub gene_name: Option<String>,
    /// Every matched primary ID that has processed rows
    pub matched_ids: Vec<String>,
    /// Mean fold change over every matching row
    pub average_fold_change: Option<f64>,
    /// Any matching row passes the dataset's cutoffs
    pub significant: bool,
    pub p_cutoff: f64,
    pub fc_cutoff: f64,
    pub comparison: String,
}

/// Magnitude window on one side of zero
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FcWindow {
    pub min: f64,
    pub max: f64,
}

impl FcWindow {
    fn contains(&self, magnitude: f64) -> bool {
        magnitude >= self.min && magnitude <= self.max
    }
}

/// Fold-change windows for down- (`left`) and up-regulated (`right`) terms
///
/// With both sides set a term passes if either side matches; with one side
/// set it must match that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FoldChangeFilter {
    pub left: Option<FcWindow>,
    pub right: Option<FcWindow>,
}

impl FoldChangeFilter {
    pub fn passes(&self, fold_change: Option<f64>) -> bool {
        if self.left.is_none() && self.right.is_none() {
            return true;
        }
        let Some(fc) = fold_change else {
            return false;
        };
        let left = self.left.is_some_and(|w| fc < 0.0 && w.contains(-fc));
        let right = self.right.is_some_and(|w| fc > 0.0 && w.contains(fc));
        left || right
    }
}

/// Post-aggregation filters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SearchFilter {
    pub significant_only: bool,
    pub advanced: Option<FoldChangeFilter>,
}

/// One search term summarised across every searched dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchSummary {
    pub search_term: String,
    /// Distinct resolved gene names, sorted, joined with `;`
    pub gene_names: String,
    pub datasets_found_in: usize,
    pub total_datasets_searched: usize,
    pub significant: bool,
    /// Mean of the per-dataset mean fold changes
    pub average_fold_change: Option<f64>,
    /// Per-dataset matches in requested dataset order
    pub matches: Vec<DatasetMatch>,
}

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

pub(crate) fn mean_fold_change<'a>(values: impl IntoIterator<Item = &'a Option<f64>>) -> Option<f64> {
    mean(values.into_iter().flatten().copied())
}

/// Combine per-dataset matches into one summary per found term
///
/// `terms` fixes the order before the final stable sort by
/// `datasets_found_in`, descending; `dataset_ids` fixes the order of each
/// summary's matches.
pub fn aggregate(
    terms: &[String],
    dataset_ids: &[String],
    matches: &[DatasetMatch],
    filter: &SearchFilter,
) -> Vec<SearchSummary> {
    let dataset_rank = |id: &str| dataset_ids.iter().position(|d| d == id).unwrap_or(usize::MAX);

    let mut summaries: Vec<SearchSummary> = terms
        .iter()
        .filter_map(|term| {
            let mut found: Vec<DatasetMatch> = matches
                .iter()
                .filter(|m| &m.search_term == term)
                .cloned()
                .collect();
            if found.is_empty() {
                return None;
            }
            found.sort_by_key(|m| dataset_rank(&m.dataset_id));

            let gene_names: BTreeSet<&str> =
                found.iter().filter_map(|m| m.gene_name.as_deref()).collect();

            Some(SearchSummary {
                search_term: term.clone(),
                gene_names: gene_names.into_iter().collect::<Vec<_>>().join(";"),
                datasets_found_in: found.len(),
                total_datasets_searched: dataset_ids.len(),
                significant: found.iter().any(|m| m.significant),
                average_fold_change: mean_fold_change(found.iter().map(|m| &m.average_fold_change)),
                matches: found,
            })
        })
        .filter(|s| !filter.significant_only || s.significant)
        .filter(|s| {
            filter
                .advanced
                .map_or(true, |f| f.passes(s.average_fold_change))
        })
        .collect();

    summaries.sort_by(|a, b| b.datasets_found_in.cmp(&a.datasets_found_in));
    summaries
}
