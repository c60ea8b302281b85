//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod clean;
pub mod ingest;
pub mod matrix;
pub mod rebuild;
pub mod report;
pub mod search;
pub mod status;

use crate::error::{CliError, Result};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use curtain_core::config::CoreConfig;
use curtain_core::store::StoreManager;
use std::path::Path;
use std::sync::Arc;

/// Store manager rooted at `data_dir`, or at the configured default
pub fn store_manager(data_dir: Option<&Path>) -> Result<Arc<StoreManager>> {
    let config = match data_dir {
        Some(dir) if dir.as_os_str().is_empty() => {
            return Err(CliError::config("data directory is empty"));
        },
        Some(dir) => CoreConfig::new(dir),
        None => CoreConfig::from_env()?,
    };
    Ok(Arc::new(StoreManager::new(config)))
}

/// Read a UTF-8 input file
pub fn read_input(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(CliError::FileNotFound(path.display().to_string()));
    }
    Ok(std::fs::read_to_string(path)?)
}

/// `-` names stdout
pub(crate) fn is_stdout(path: &Path) -> bool {
    path == Path::new("-")
}

/// Write CSV text to `path`, or to stdout for "-"
pub(crate) fn write_csv(path: &Path, csv: &str) -> Result<()> {
    if is_stdout(path) {
        print!("{}", csv);
        return Ok(());
    }
    std::fs::write(path, csv)?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}

pub(crate) fn new_table(header: Vec<String>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}

pub(crate) fn format_number(value: Option<f64>) -> String {
    value.map(|v| format!("{:.3}", v)).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_manager_uses_data_dir() {
        let dir = TempDir::new().unwrap();
        let stores = store_manager(Some(dir.path())).unwrap();
        assert_eq!(stores.config().data_dir(), dir.path());
        assert!(store_manager(Some(Path::new(""))).is_err());
    }

    #[test]
    fn test_read_input_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_input(&dir.path().join("absent.tsv")).unwrap_err();
        assert!(matches!(err, CliError::FileNotFound(_)));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(Some(1.23456)), "1.235");
        assert_eq!(format_number(None), "-");
    }
}
