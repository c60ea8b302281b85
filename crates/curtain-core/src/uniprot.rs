//! Typed UniProt projection and in-memory accession index
//!
//! Records arrive as opaque JSON (either UniProt TSV-style objects keyed by
//! column title, or UniProt REST JSON). They are projected once at ingestion
//! into [`UniProtEntry`] rows; lookups afterwards only touch typed fields.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::ids::first_gene_name;
use crate::schema::UniProtEntry;

/// UniProt accession format, with an optional isoform suffix
#[allow(clippy::expect_used)]
static ACCESSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([OPQ][0-9][A-Z0-9]{3}[0-9]|[A-NR-Z][0-9](?:[A-Z][A-Z0-9]{2}[0-9]){1,2})(?:-\d+)?",
    )
    .expect("accession pattern is valid")
});

/// Project one UniProt record into a storable entry
///
/// `key` is the accession the record was keyed by in the payload and is used
/// when the record itself carries none.
pub fn project_record(key: &str, record: &Value) -> UniProtEntry {
    let accession = first_string(record, &["/Entry", "/accession", "/primaryAccession"])
        .unwrap_or_else(|| key.to_string());

    let gene_names = first_string(record, &["/Gene Names", "/Gene names", "/geneNames"])
        .or_else(|| list_string(record.pointer("/Gene Names")))
        .or_else(|| rest_gene_names(record));

    let protein_name = first_string(
        record,
        &[
            "/Protein names",
            "/proteinName",
            "/proteinDescription/recommendedName/fullName/value",
        ],
    );

    let organism = first_string(record, &["/Organism", "/organism/scientificName", "/organism"]);
    let sequence = first_string(record, &["/Sequence", "/sequence/value", "/sequence"]);

    UniProtEntry {
        accession,
        gene_names,
        protein_name,
        organism,
        sequence,
        raw_json: record.to_string(),
    }
}

fn first_string(record: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|p| {
        record
            .pointer(p)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn list_string(value: Option<&Value>) -> Option<String> {
    let items = value?.as_array()?;
    let joined: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
    (!joined.is_empty()).then(|| joined.join(" "))
}

/// `genes[*].geneName.value` plus synonyms, from UniProt REST JSON
fn rest_gene_names(record: &Value) -> Option<String> {
    let genes = record.get("genes")?.as_array()?;
    let mut names = Vec::new();
    for gene in genes {
        if let Some(name) = gene.pointer("/geneName/value").and_then(Value::as_str) {
            names.push(name.to_string());
        }
        if let Some(synonyms) = gene.get("synonyms").and_then(Value::as_array) {
            names.extend(
                synonyms
                    .iter()
                    .filter_map(|s| s.get("value").and_then(Value::as_str))
                    .map(str::to_string),
            );
        }
    }
    (!names.is_empty()).then(|| names.join(" "))
}

/// Every UniProt-shaped accession inside `text`, in order of appearance
pub fn extract_accessions(text: &str) -> Vec<&str> {
    ACCESSION_RE.find_iter(text).map(|m| m.as_str()).collect()
}

/// Accession lookups over the UniProt entries of one dataset
#[derive(Debug, Default, Clone)]
pub struct UniProtIndex {
    entries: HashMap<String, UniProtEntry>,
    aliases: HashMap<String, String>,
}

impl UniProtIndex {
    /// Build from stored entries and an alias map (`alias -> canonical`)
    pub fn new(entries: Vec<UniProtEntry>, aliases: HashMap<String, String>) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| (e.accession.to_uppercase(), e))
            .collect();
        let aliases = aliases
            .into_iter()
            .map(|(k, v)| (k.to_uppercase(), v.to_uppercase()))
            .collect();
        Self { entries, aliases }
    }

    /// Alias map from an `accMap` payload whose values are an accession or a
    /// list of accessions; the first listed accession wins.
    pub fn aliases_from_payload<'a, I>(acc_map: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        acc_map
            .into_iter()
            .filter_map(|(alias, target)| {
                let canonical = match target {
                    Value::String(s) => Some(s.clone()),
                    Value::Array(items) => items.iter().find_map(Value::as_str).map(str::to_string),
                    _ => None,
                }?;
                Some((alias.clone(), canonical))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entry for an accession, tolerating an isoform suffix
    pub fn entry(&self, accession: &str) -> Option<&UniProtEntry> {
        let key = accession.trim().to_uppercase();
        self.entries.get(&key).or_else(|| {
            let (base, _) = key.split_once('-')?;
            self.entries.get(base)
        })
    }

    /// Full gene-names string of an accession
    pub fn gene_names(&self, accession: &str) -> Option<&str> {
        self.entry(accession)?.gene_names.as_deref()
    }

    /// Gene name for an accession: direct lookup, then the alias map, then
    /// an accession extracted from the text. Always the first token.
    pub fn resolve_gene_name(&self, accession: &str) -> Option<String> {
        if let Some(name) = self.gene_names(accession).and_then(first_gene_name) {
            return Some(name.to_string());
        }

        let alias = self.aliases.get(&accession.trim().to_uppercase());
        if let Some(name) = alias.and_then(|a| self.gene_names(a)).and_then(first_gene_name) {
            return Some(name.to_string());
        }

        extract_accessions(&accession.to_uppercase())
            .into_iter()
            .find_map(|acc| self.gene_names(acc).and_then(first_gene_name))
            .map(str::to_string)
    }

    /// Every gene-name string in the index
    pub fn all_gene_names(&self) -> impl Iterator<Item = &str> {
        self.entries.values().filter_map(|e| e.gene_names.as_deref())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index() -> UniProtIndex {
        let entries = vec![
            project_record("P04637", &json!({"Entry": "P04637", "Gene Names": "TP53 P53"})),
            project_record("Q00987", &json!({"Gene Names": "MDM2"})),
        ];
        let mut aliases = HashMap::new();
        aliases.insert("P04637_ALT".to_string(), "P04637".to_string());
        UniProtIndex::new(entries, aliases)
    }

    #[test]
    fn test_project_tsv_style_record() {
        let entry = project_record(
            "p04637",
            &json!({
                "Entry": "P04637",
                "Gene Names": "TP53 P53",
                "Organism": "Homo sapiens (Human)",
                "Sequence": "MEEPQSDPSV"
            }),
        );
        assert_eq!(entry.accession, "P04637");
        assert_eq!(entry.gene_names.as_deref(), Some("TP53 P53"));
        assert_eq!(entry.organism.as_deref(), Some("Homo sapiens (Human)"));
        assert_eq!(entry.sequence.as_deref(), Some("MEEPQSDPSV"));
    }

    #[test]
    fn test_project_rest_record() {
        let entry = project_record(
            "P04637",
            &json!({
                "primaryAccession": "P04637",
                "genes": [{"geneName": {"value": "TP53"}, "synonyms": [{"value": "P53"}]}],
                "organism": {"scientificName": "Homo sapiens"},
                "sequence": {"value": "MEEP"}
            }),
        );
        assert_eq!(entry.gene_names.as_deref(), Some("TP53 P53"));
        assert_eq!(entry.organism.as_deref(), Some("Homo sapiens"));
        assert_eq!(entry.sequence.as_deref(), Some("MEEP"));
    }

    #[test]
    fn test_resolve_gene_name_priority() {
        let index = index();
        assert_eq!(index.resolve_gene_name("P04637").as_deref(), Some("TP53"));
        assert_eq!(index.resolve_gene_name("p04637-2").as_deref(), Some("TP53"));
        assert_eq!(index.resolve_gene_name("P04637_ALT").as_deref(), Some("TP53"));
        assert_eq!(index.resolve_gene_name("sp|Q00987|MDM2_HUMAN").as_deref(), Some("MDM2"));
        assert_eq!(index.resolve_gene_name("UNKNOWN"), None);
    }

    #[test]
    fn test_extract_accessions() {
        assert_eq!(extract_accessions("sp|P04637|P53_HUMAN"), vec!["P04637"]);
        assert_eq!(extract_accessions("A0A024RBG1-2;Q9Y6K9"), vec!["A0A024RBG1-2", "Q9Y6K9"]);
    }

    #[test]
    fn test_aliases_from_payload() {
        let payload: Vec<(String, Value)> = vec![
            ("P04637-2".to_string(), json!(["P04637", "P04638"])),
            ("X1".to_string(), json!("Q00987")),
            ("bad".to_string(), json!(3)),
        ];
        let aliases = UniProtIndex::aliases_from_payload(payload.iter().map(|(k, v)| (k, v)));
        assert_eq!(aliases.get("P04637-2").map(String::as_str), Some("P04637"));
        assert_eq!(aliases.get("X1").map(String::as_str), Some("Q00987"));
        assert!(!aliases.contains_key("bad"));
    }
}
