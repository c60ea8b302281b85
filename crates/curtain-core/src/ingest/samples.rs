//! Sample/condition structure derived from raw sample column names

use std::collections::{BTreeMap, HashSet};

use crate::metadata::{SampleInfo, Settings};

/// Condition colours used when the settings carry no `defaultColorList`
pub const DEFAULT_PALETTE: [&str; 20] = [
    "#fd7f6f", "#7eb0d5", "#b2e061", "#bd7ebe", "#ffb55a", "#ffee65", "#beb9db", "#fdcce5",
    "#8bd3c7", "#e60049", "#0bb4ff", "#50e991", "#e6d800", "#9b19f5", "#ffa300", "#dc0ab4",
    "#b3d4ff", "#00bfa0", "#b30000", "#7c1158",
];

/// Replicate/condition layout of the samples in one raw table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleStructure {
    pub sample_map: BTreeMap<String, SampleInfo>,
    pub condition_order: Vec<String>,
    pub sample_order: BTreeMap<String, Vec<String>>,
    pub sample_visible: BTreeMap<String, bool>,
    pub color_map: BTreeMap<String, String>,
}

impl SampleStructure {
    /// Write the structure back into `settings`
    pub fn apply(self, settings: &mut Settings) {
        settings.sample_map = self.sample_map;
        settings.condition_order = self.condition_order;
        settings.sample_order = self.sample_order;
        settings.sample_visible = self.sample_visible;
        settings.color_map = self.color_map;
    }
}

/// `"KO.rep.1"` becomes condition `"KO.rep"`, replicate `"1"`; a name with
/// no dot is its own condition with replicate `"1"`
pub fn split_sample_name(sample: &str) -> (String, String) {
    match sample.rsplit_once('.') {
        Some((condition, replicate)) if !condition.is_empty() => {
            (condition.to_string(), replicate.to_string())
        },
        _ => (sample.to_string(), "1".to_string()),
    }
}

/// Derive the structure for `samples`, keeping what `prior` already records
///
/// Prior condition assignments and colours win over derived ones. Ordering
/// lists keep their existing entries in place, append new ones, and drop
/// samples or conditions no longer present.
pub fn derive_sample_structure(samples: &[String], prior: &Settings) -> SampleStructure {
    let mut sample_map = BTreeMap::new();
    let mut conditions: Vec<String> = Vec::new();
    let mut members: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for sample in samples {
        let info = match prior.sample_map.get(sample) {
            Some(existing) if !existing.condition.is_empty() => SampleInfo {
                name: sample.clone(),
                ..existing.clone()
            },
            _ => {
                let (condition, replicate) = split_sample_name(sample);
                SampleInfo {
                    replicate,
                    condition,
                    name: sample.clone(),
                }
            },
        };

        if !conditions.contains(&info.condition) {
            conditions.push(info.condition.clone());
        }
        members
            .entry(info.condition.clone())
            .or_default()
            .push(sample.clone());
        sample_map.insert(sample.clone(), info);
    }

    let condition_order = merge_order(&prior.condition_order, &conditions);

    let sample_order = members
        .iter()
        .map(|(condition, current)| {
            let existing = prior
                .sample_order
                .get(condition)
                .map(Vec::as_slice)
                .unwrap_or_default();
            (condition.clone(), merge_order(existing, current))
        })
        .collect();

    let sample_visible = samples
        .iter()
        .map(|s| (s.clone(), prior.sample_visible.get(s).copied().unwrap_or(true)))
        .collect();

    let color_map = assign_colors(&condition_order, prior);

    SampleStructure {
        sample_map,
        condition_order,
        sample_order,
        sample_visible,
        color_map,
    }
}

/// Existing entries that are still current, in their old order, followed by
/// new entries in the order they were seen
fn merge_order(existing: &[String], current: &[String]) -> Vec<String> {
    let current_set: HashSet<&String> = current.iter().collect();
    let mut merged: Vec<String> = Vec::with_capacity(current.len());
    for item in existing {
        if current_set.contains(item) && !merged.contains(item) {
            merged.push(item.clone());
        }
    }
    for item in current {
        if !merged.contains(item) {
            merged.push(item.clone());
        }
    }
    merged
}

fn assign_colors(conditions: &[String], prior: &Settings) -> BTreeMap<String, String> {
    let palette: Vec<&str> = if prior.default_color_list.is_empty() {
        DEFAULT_PALETTE.to_vec()
    } else {
        prior.default_color_list.iter().map(String::as_str).collect()
    };

    let mut colors = prior.color_map.clone();
    let mut assigned = colors.len();

    for condition in conditions {
        if colors.contains_key(condition) {
            continue;
        }
        let used: HashSet<&str> = colors.values().map(String::as_str).collect();
        let color = palette
            .iter()
            .find(|c| !used.contains(*c))
            .copied()
            .unwrap_or(palette[assigned % palette.len()]);
        colors.insert(condition.clone(), color.to_string());
        assigned += 1;
    }
    colors
}
