//! `curtain matrix` command implementation

use super::{format_number, is_stdout, new_table, write_csv};
use crate::error::Result;
use crate::{DatasetArgs, OutputArgs};
use curtain_core::export::matrix_csv;
use curtain_core::search::{MatrixFilter, SearchEngine};
use curtain_core::store::StoreManager;
use std::sync::Arc;

/// Print the protein x dataset matrix
pub async fn run(
    stores: Arc<StoreManager>,
    proteins: &[String],
    datasets: &DatasetArgs,
    filter: MatrixFilter,
    output: &OutputArgs,
) -> Result<()> {
    let matrix = SearchEngine::new(stores)
        .matrix(proteins, &datasets.datasets, datasets.mode(), filter)
        .await?;

    if output.json {
        println!("{}", serde_json::to_string_pretty(&matrix)?);
        return Ok(());
    }
    if let Some(ref path) = output.csv {
        write_csv(path, &matrix_csv(&matrix)?)?;
        if is_stdout(path) {
            return Ok(());
        }
    }

    let mut header = vec!["Protein".to_string()];
    header.extend(matrix.dataset_ids.iter().cloned());
    let mut table = new_table(header);

    for (protein, cells) in matrix.proteins.iter().zip(&matrix.cells) {
        let mut row = vec![protein.clone()];
        for cell in cells {
            if cell.found {
                let marker = if cell.significant { "*" } else { "" };
                row.push(format!(
                    "{}{} (p={})",
                    format_number(cell.fold_change),
                    marker,
                    format_number(cell.p_value)
                ));
            } else {
                row.push("-".to_string());
            }
        }
        table.add_row(row);
    }
    println!("{}", table);
    println!("* passes the dataset's significance cutoffs");
    Ok(())
}
