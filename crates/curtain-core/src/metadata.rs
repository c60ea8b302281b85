//! Typed projection of the dataset metadata payload
//!
//! The remote metadata is a large, loosely-typed JSON object. Only the fields
//! the data layer reads get a named field here; everything else is kept in a
//! flattened pass-through map so it survives a store round-trip.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::schema::DEFAULT_COMPARISON;

const DEFAULT_P_CUTOFF: f64 = 0.05;
const DEFAULT_LOG2_FC_CUTOFF: f64 = 0.6;

/// Column declarations for the raw quantification table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFormConfig {
    #[serde(rename = "primaryIDs", default)]
    pub primary_id_column: String,

    #[serde(default, deserialize_with = "string_or_list")]
    pub samples: Vec<String>,

    #[serde(default)]
    pub log2: bool,
}

/// Column declarations and transforms for the differential table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DifferentialFormConfig {
    #[serde(rename = "primaryIDs", default)]
    pub primary_id_column: String,

    #[serde(rename = "geneNames", default)]
    pub gene_names_column: String,

    #[serde(rename = "foldChange", default)]
    pub fold_change_column: String,

    #[serde(rename = "significant", default)]
    pub significant_column: String,

    #[serde(rename = "comparison", default)]
    pub comparison_column: String,

    #[serde(rename = "comparisonSelect", default, deserialize_with = "string_or_list")]
    pub comparison_select: Vec<String>,

    #[serde(rename = "transformFC", default)]
    pub transform_fc: bool,

    #[serde(rename = "transformSignificant", default)]
    pub transform_significant: bool,

    #[serde(rename = "reverseFoldChange", default)]
    pub reverse_fold_change: bool,

    #[serde(default)]
    pub accession: String,

    #[serde(default)]
    pub position: String,

    #[serde(rename = "positionPeptide", default)]
    pub position_peptide: String,

    #[serde(rename = "peptideSequence", default)]
    pub peptide_sequence: String,

    #[serde(default)]
    pub score: String,
}

impl DifferentialFormConfig {
    /// True when any PTM column is declared
    pub fn is_ptm(&self) -> bool {
        [
            &self.accession,
            &self.position,
            &self.position_peptide,
            &self.peptide_sequence,
        ]
        .iter()
        .any(|c| !c.trim().is_empty())
    }
}

/// `None` for an undeclared (empty) column name
pub fn declared(column: &str) -> Option<&str> {
    let trimmed = column.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Replicate/condition assignment of one sample column
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleInfo {
    #[serde(default)]
    pub replicate: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub name: String,
}

/// The settings object, typed where the data layer reads it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "pCutoff", default = "default_p_cutoff", deserialize_with = "lenient_p_cutoff")]
    pub p_cutoff: f64,

    #[serde(
        rename = "log2FCCutoff",
        default = "default_fc_cutoff",
        deserialize_with = "lenient_fc_cutoff"
    )]
    pub log2_fc_cutoff: f64,

    #[serde(rename = "currentComparison", default)]
    pub current_comparison: String,

    #[serde(rename = "sampleMap", default)]
    pub sample_map: BTreeMap<String, SampleInfo>,

    #[serde(rename = "conditionOrder", default)]
    pub condition_order: Vec<String>,

    #[serde(rename = "sampleOrder", default)]
    pub sample_order: BTreeMap<String, Vec<String>>,

    #[serde(rename = "sampleVisible", default)]
    pub sample_visible: BTreeMap<String, bool>,

    #[serde(rename = "colorMap", default)]
    pub color_map: BTreeMap<String, String>,

    #[serde(rename = "defaultColorList", default)]
    pub default_color_list: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            p_cutoff: DEFAULT_P_CUTOFF,
            log2_fc_cutoff: DEFAULT_LOG2_FC_CUTOFF,
            current_comparison: String::new(),
            sample_map: BTreeMap::new(),
            condition_order: Vec::new(),
            sample_order: BTreeMap::new(),
            sample_visible: BTreeMap::new(),
            color_map: BTreeMap::new(),
            default_color_list: Vec::new(),
            extra: Map::new(),
        }
    }
}

fn default_p_cutoff() -> f64 {
    DEFAULT_P_CUTOFF
}

fn default_fc_cutoff() -> f64 {
    DEFAULT_LOG2_FC_CUTOFF
}

fn default_true() -> bool {
    true
}

/// The full metadata payload of one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    #[serde(default)]
    pub settings: Settings,

    #[serde(rename = "rawForm", default)]
    pub raw_form: RawFormConfig,

    #[serde(rename = "differentialForm", default)]
    pub differential_form: DifferentialFormConfig,

    #[serde(rename = "selectionsMap", default)]
    pub selections: Value,

    #[serde(rename = "extraData", default)]
    pub extra_data: Option<Value>,

    #[serde(default)]
    pub password: String,

    #[serde(rename = "fetchUniprot", default = "default_true")]
    pub fetch_uniprot: bool,

    #[serde(default)]
    pub permanent: bool,

    #[serde(rename = "bypassUniProt", default)]
    pub bypass_uniprot: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for DatasetMetadata {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            raw_form: RawFormConfig::default(),
            differential_form: DifferentialFormConfig::default(),
            selections: Value::Null,
            extra_data: None,
            password: String::new(),
            fetch_uniprot: true,
            permanent: false,
            bypass_uniprot: false,
            extra: Map::new(),
        }
    }
}

impl DatasetMetadata {
    /// Parse the remote metadata JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Detach the embedded raw/processed table text, if the payload carries it
    ///
    /// Returns `(raw, processed)`. The tables are removed from the
    /// pass-through map so they are not persisted twice.
    pub fn take_embedded_tables(&mut self) -> (Option<String>, Option<String>) {
        let mut take = |key: &str| match self.extra.remove(key) {
            Some(Value::Object(mut obj)) => match obj.remove("originalFile") {
                Some(Value::String(text)) => Some(text),
                _ => None,
            },
            Some(Value::String(text)) => Some(text),
            _ => None,
        };
        let raw = take("raw");
        let processed = take("processed");
        (raw, processed)
    }

    /// Comparison label currently selected for display
    pub fn comparison_label(&self) -> String {
        if !self.settings.current_comparison.is_empty() {
            return self.settings.current_comparison.clone();
        }
        self.differential_form
            .comparison_select
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_COMPARISON.to_string())
    }

    /// Typed view over the extra-data blob; unknown shapes yield empty data
    pub fn extra_data(&self) -> ExtraData {
        match &self.extra_data {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Ignoring unreadable extraData block");
                ExtraData::default()
            }),
            None => ExtraData::default(),
        }
    }
}

/// The parts of `extraData` the data layer consumes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtraData {
    #[serde(default)]
    pub uniprot: UniProtPayload,

    #[serde(default)]
    pub data: AuxiliaryData,
}

/// `extraData.uniprot`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UniProtPayload {
    /// accession -> full UniProt record
    #[serde(default, deserialize_with = "map_or_entries")]
    pub db: BTreeMap<String, Value>,

    /// alias accession -> canonical accession(s)
    #[serde(rename = "accMap", default, deserialize_with = "map_or_entries")]
    pub acc_map: BTreeMap<String, Value>,

    #[serde(rename = "geneNameToAcc", default, deserialize_with = "map_or_entries")]
    pub gene_name_to_acc: BTreeMap<String, Value>,

    #[serde(default)]
    pub organism: Option<String>,
}

/// `extraData.data`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuxiliaryData {
    #[serde(rename = "genesMap", default, deserialize_with = "map_or_entries")]
    pub genes_map: BTreeMap<String, Value>,

    #[serde(rename = "primaryIDsMap", default, deserialize_with = "map_or_entries")]
    pub primary_ids_map: BTreeMap<String, Value>,

    #[serde(rename = "allGenes", default, deserialize_with = "string_or_list")]
    pub all_genes: Vec<String>,
}

/// Accepts a plain object or a serialised JS `Map`
/// (`{"dataType": "Map", "value": [[k, v], ...]}`).
fn map_or_entries<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let mut out = BTreeMap::new();
    match value {
        Value::Object(mut obj) => {
            if obj.get("dataType").and_then(Value::as_str) == Some("Map") {
                if let Some(Value::Array(entries)) = obj.remove("value") {
                    for entry in entries {
                        if let Value::Array(mut pair) = entry {
                            if pair.len() == 2 {
                                let v = pair.pop().unwrap_or(Value::Null);
                                if let Some(Value::String(k)) = pair.pop() {
                                    out.insert(k, v);
                                }
                            }
                        }
                    }
                }
            } else {
                out.extend(obj);
            }
        },
        Value::Null => {},
        other => {
            return Err(serde::de::Error::custom(format!(
                "expected an object or serialised Map, got {}",
                other
            )))
        },
    }
    Ok(out)
}

/// Accepts `"a"`, `["a", "b"]`, or null
fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if s.is_empty() => Vec::new(),
        Value::String(s) => vec![s],
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

/// Accepts a number or a numeric string
fn lenient_p_cutoff<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_f64(deserializer, default_p_cutoff())
}

fn lenient_fc_cutoff<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_f64(deserializer, default_fc_cutoff())
}

/// A number or numeric string; `null` and blank strings take `fallback`
fn lenient_f64<'de, D>(deserializer: D, fallback: f64) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(fallback),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("number out of range")),
        Value::String(s) if s.trim().is_empty() => Ok(fallback),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("not a number: '{}'", s))),
        other => Err(serde::de::Error::custom(format!("not a number: {}", other))),
    }
}
