//! CSV renderings of search results
//!
//! Fields are quoted only when they contain a comma, quote or line break;
//! embedded quotes are doubled.

use csv::{QuoteStyle, Writer, WriterBuilder};

use crate::error::{Result, StoreError};
use crate::search::{ComparisonMatrix, ReportRow, SearchSummary};

fn writer() -> Writer<Vec<u8>> {
    WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .from_writer(Vec::new())
}

fn finish(writer: Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| StoreError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| {
        StoreError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

fn number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// One line per aggregated search term
pub fn summary_csv(summaries: &[SearchSummary]) -> Result<String> {
    let mut out = writer();
    out.write_record([
        "Search Term",
        "Gene Names",
        "Datasets Found",
        "Total Datasets",
        "Significant",
        "Average log2FC",
    ])?;
    for s in summaries {
        out.write_record([
            s.search_term.clone(),
            s.gene_names.clone(),
            s.datasets_found_in.to_string(),
            s.total_datasets_searched.to_string(),
            s.significant.to_string(),
            number(s.average_fold_change),
        ])?;
    }
    finish(out)
}

/// One line per report row
pub fn detailed_csv(rows: &[ReportRow]) -> Result<String> {
    let mut out = writer();
    out.write_record([
        "Dataset",
        "Search Term",
        "Found",
        "Primary ID",
        "Gene Name",
        "Comparison",
        "Position",
        "log2FC",
        "p-value",
        "Significant",
    ])?;
    for r in rows {
        out.write_record([
            r.dataset_id.clone(),
            r.search_term.clone(),
            r.found.to_string(),
            r.primary_id.clone().unwrap_or_default(),
            r.gene_name.clone().unwrap_or_default(),
            r.comparison.clone(),
            r.position.clone().unwrap_or_default(),
            number(r.fold_change),
            number(r.p_value),
            r.significant.to_string(),
        ])?;
    }
    finish(out)
}

/// One line per protein; a log2FC and a p-value column per dataset
///
/// Not-found cells are left blank.
pub fn matrix_csv(matrix: &ComparisonMatrix) -> Result<String> {
    let mut out = writer();

    let mut header = vec!["Protein".to_string()];
    for dataset in &matrix.dataset_ids {
        header.push(format!("{} log2FC", dataset));
        header.push(format!("{} p-value", dataset));
    }
    out.write_record(&header)?;

    for (protein, cells) in matrix.proteins.iter().zip(&matrix.cells) {
        let mut record = vec![protein.clone()];
        for cell in cells {
            if cell.found {
                record.push(number(cell.fold_change));
                record.push(number(cell.p_value));
            } else {
                record.push(String::new());
                record.push(String::new());
            }
        }
        out.write_record(&record)?;
    }
    finish(out)
}
