//! Tab-separated table parsing for processed and raw data

use csv::{ReaderBuilder, StringRecord};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::metadata::{declared, DifferentialFormConfig, RawFormConfig};
use crate::schema::{ProcessedRow, RawRow, DEFAULT_COMPARISON};

/// Header row plus data records of a tab-separated table
///
/// Fields are never quoted; short lines are allowed through so the caller
/// can decide what a missing column means. Unreadable lines are skipped.
fn read_table(text: &str) -> Option<(StringRecord, Vec<StringRecord>)> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quoting(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = reader.records().filter_map(|r| match r {
        Ok(record) => Some(record),
        Err(e) => {
            debug!(error = %e, "Skipping unreadable line");
            None
        },
    });

    let header = records.next()?;
    Some((header, records.collect()))
}

/// Position of a declared column in the header
fn column_index(header: &StringRecord, column: &str) -> Option<usize> {
    let column = declared(column)?;
    header.iter().position(|h| h.trim() == column)
}

fn field(record: &StringRecord, index: Option<usize>) -> Option<&str> {
    index
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Finite float, or absent
pub(crate) fn parse_number(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn parse_integer(value: Option<&str>) -> Option<i64> {
    let value = value?;
    value.parse::<i64>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            .map(|v| v as i64)
    })
}

struct ProcessedColumns {
    primary_id: usize,
    gene_names: Option<usize>,
    fold_change: Option<usize>,
    significant: Option<usize>,
    comparison: Option<usize>,
    accession: Option<usize>,
    position: Option<usize>,
    position_peptide: Option<usize>,
    peptide_sequence: Option<usize>,
    score: Option<usize>,
}

/// Parse the differential table into processed rows
///
/// Returns an empty set when the primary-ID column is not in the header.
/// Rows sharing `(primary_id, comparison)` collapse to the last one seen.
pub fn parse_processed(text: &str, form: &DifferentialFormConfig) -> Vec<ProcessedRow> {
    let Some((header, records)) = read_table(text) else {
        return Vec::new();
    };

    let Some(primary_id) = column_index(&header, &form.primary_id_column) else {
        warn!(
            column = %form.primary_id_column,
            "Primary ID column not found in processed header, skipping processed table"
        );
        return Vec::new();
    };

    let columns = ProcessedColumns {
        primary_id,
        gene_names: column_index(&header, &form.gene_names_column),
        fold_change: column_index(&header, &form.fold_change_column),
        significant: column_index(&header, &form.significant_column),
        comparison: column_index(&header, &form.comparison_column),
        accession: column_index(&header, &form.accession),
        position: column_index(&header, &form.position),
        position_peptide: column_index(&header, &form.position_peptide),
        peptide_sequence: column_index(&header, &form.peptide_sequence),
        score: column_index(&header, &form.score),
    };

    for (name, column, index) in [
        ("gene names", &form.gene_names_column, columns.gene_names),
        ("fold change", &form.fold_change_column, columns.fold_change),
        ("significance", &form.significant_column, columns.significant),
        ("comparison", &form.comparison_column, columns.comparison),
    ] {
        if declared(column).is_some() && index.is_none() {
            warn!(column = %column, role = name, "Declared column missing from processed header");
        }
    }

    let mut rows: Vec<ProcessedRow> = Vec::with_capacity(records.len());
    let mut seen: HashMap<(String, String), usize> = HashMap::new();

    for record in &records {
        if record.len() <= columns.primary_id {
            continue;
        }
        let Some(row) = processed_row(record, &columns, form) else {
            continue;
        };

        let key = (row.primary_id.clone(), row.comparison.clone());
        match seen.get(&key) {
            Some(&i) => rows[i] = row,
            None => {
                seen.insert(key, rows.len());
                rows.push(row);
            },
        }
    }

    debug!(rows = rows.len(), lines = records.len(), "Parsed processed table");
    rows
}

fn processed_row(
    record: &StringRecord,
    columns: &ProcessedColumns,
    form: &DifferentialFormConfig,
) -> Option<ProcessedRow> {
    let primary_id = field(record, Some(columns.primary_id))?;

    let fold_change = parse_number(field(record, columns.fold_change)).map(|mut fc| {
        if form.transform_fc && fc > 0.0 {
            fc = fc.log2();
        }
        if form.reverse_fold_change {
            fc = -fc;
        }
        fc
    });

    let significant = parse_number(field(record, columns.significant)).map(|p| {
        if form.transform_significant && p > 0.0 {
            -p.log10()
        } else {
            p
        }
    });

    Some(ProcessedRow {
        primary_id: primary_id.to_string(),
        gene_names: field(record, columns.gene_names).map(str::to_string),
        fold_change,
        significant,
        comparison: field(record, columns.comparison)
            .unwrap_or(DEFAULT_COMPARISON)
            .to_string(),
        accession: field(record, columns.accession).map(str::to_string),
        position: field(record, columns.position).map(str::to_string),
        position_peptide: parse_integer(field(record, columns.position_peptide)),
        peptide_sequence: field(record, columns.peptide_sequence).map(str::to_string),
        score: parse_number(field(record, columns.score)),
    })
}

/// Parse the raw table into one row per (primary ID, sample)
///
/// Only declared samples that appear in the header produce rows. Returns the
/// rows and the sample names actually used, in declaration order.
pub fn parse_raw(text: &str, form: &RawFormConfig) -> (Vec<RawRow>, Vec<String>) {
    let Some((header, records)) = read_table(text) else {
        return (Vec::new(), Vec::new());
    };

    let Some(primary_id) = column_index(&header, &form.primary_id_column) else {
        warn!(
            column = %form.primary_id_column,
            "Primary ID column not found in raw header, skipping raw table"
        );
        return (Vec::new(), Vec::new());
    };

    let mut samples: Vec<(String, usize)> = Vec::new();
    for sample in &form.samples {
        match column_index(&header, sample) {
            Some(index) if !samples.iter().any(|(s, _)| s == sample.trim()) => {
                samples.push((sample.trim().to_string(), index))
            },
            Some(_) => {},
            None => debug!(sample = %sample, "Declared sample missing from raw header"),
        }
    }

    let mut rows: Vec<RawRow> = Vec::new();
    let mut seen: HashMap<(String, String), usize> = HashMap::new();

    for record in &records {
        let Some(id) = field(record, Some(primary_id)) else {
            continue;
        };

        for (sample, index) in &samples {
            let sample_value = parse_number(field(record, Some(*index))).map(|v| {
                if form.log2 && v > 0.0 {
                    v.log2()
                } else {
                    v
                }
            });

            let row = RawRow {
                primary_id: id.to_string(),
                sample_name: sample.clone(),
                sample_value,
            };
            let key = (row.primary_id.clone(), row.sample_name.clone());
            match seen.get(&key) {
                Some(&i) => rows[i] = row,
                None => {
                    seen.insert(key, rows.len());
                    rows.push(row);
                },
            }
        }
    }

    debug!(rows = rows.len(), samples = samples.len(), "Parsed raw table");
    (rows, samples.into_iter().map(|(s, _)| s).collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn form() -> DifferentialFormConfig {
        DifferentialFormConfig {
            primary_id_column: "Protein".to_string(),
            gene_names_column: "Gene".to_string(),
            fold_change_column: "FC".to_string(),
            significant_column: "P".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_transforms_applied() {
        let mut form = form();
        form.transform_fc = true;
        form.reverse_fold_change = true;
        form.transform_significant = true;

        let rows = parse_processed("Protein\tGene\tFC\tP\nP04637\tTP53\t4.0\t0.01\n", &form);
        assert_eq!(rows.len(), 1);
        assert!((rows[0].fold_change.unwrap() + 2.0).abs() < 1e-12);
        assert!((rows[0].significant.unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(rows[0].comparison, "1");
    }

    #[test]
    fn test_non_positive_values_skip_log_transform() {
        let mut form = form();
        form.transform_fc = true;
        form.transform_significant = true;

        let rows = parse_processed("Protein\tGene\tFC\tP\nP1\tG\t-1.5\t0\n", &form);
        assert_eq!(rows[0].fold_change, Some(-1.5));
        assert_eq!(rows[0].significant, Some(0.0));
    }

    #[test]
    fn test_bad_fields_become_absent() {
        let rows = parse_processed("Protein\tGene\tFC\tP\nP1\t\tn/a\tNaN\n", &form());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].gene_names, None);
        assert_eq!(rows[0].fold_change, None);
        assert_eq!(rows[0].significant, None);
    }

    #[test]
    fn test_missing_primary_column_yields_nothing() {
        let rows = parse_processed("Accession\tFC\nP1\t1.0\n", &form());
        assert!(rows.is_empty());
    }

    #[test]
    fn test_short_lines_skipped_and_duplicates_collapse() {
        let mut form = form();
        form.primary_id_column = "FC".to_string();
        form.fold_change_column = "Protein".to_string();
        let text = "Protein\tFC\n1.0\n2.0\tP1\n3.0\tP1\n";
        let rows = parse_processed(text, &form);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].primary_id, "P1");
        assert_eq!(rows[0].fold_change, Some(3.0));
    }

    #[test]
    fn test_ptm_columns() {
        let form = DifferentialFormConfig {
            primary_id_column: "id".to_string(),
            accession: "acc".to_string(),
            position: "site".to_string(),
            position_peptide: "pos".to_string(),
            peptide_sequence: "pep".to_string(),
            score: "score".to_string(),
            comparison_column: "cmp".to_string(),
            ..Default::default()
        };
        let text = "id\tacc\tsite\tpos\tpep\tscore\tcmp\nP04637_S15\tP04637\tS15\t3.0\tMEEPQS\t0.98\tKO\n";
        let rows = parse_processed(text, &form);
        let row = &rows[0];
        assert!(row.is_ptm());
        assert_eq!(row.accession.as_deref(), Some("P04637"));
        assert_eq!(row.position.as_deref(), Some("S15"));
        assert_eq!(row.position_peptide, Some(3));
        assert_eq!(row.score, Some(0.98));
        assert_eq!(row.comparison, "KO");
    }

    #[test]
    fn test_raw_only_declared_and_present_samples() {
        let form = RawFormConfig {
            primary_id_column: "Protein".to_string(),
            samples: vec!["KO.1".to_string(), "KO.2".to_string(), "WT.9".to_string()],
            log2: true,
        };
        let text = "Protein\tKO.1\tKO.2\tExtra\nP1\t8\t0\t5\nP2\t\t4\t5\n";
        let (rows, used) = parse_raw(text, &form);

        assert_eq!(used, vec!["KO.1", "KO.2"]);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].sample_value, Some(3.0));
        assert_eq!(rows[1].sample_value, Some(0.0));
        assert_eq!(rows[2].sample_value, None);
        assert_eq!(rows[3].sample_value, Some(2.0));
    }
}
