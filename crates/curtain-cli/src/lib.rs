//! Curtain CLI Library
//!
//! Developer harness over the Curtain data layer.
//!
//! # Overview
//!
//! - **Ingestion**: build a dataset store from local tables (`curtain ingest`)
//! - **Search**: cross-dataset term search with aggregation (`curtain search`)
//! - **Reports**: per-row detail and protein x dataset matrix (`curtain report`, `curtain matrix`)
//! - **Store Management**: inspect, clear and rebuild stores (`curtain status/clean/rebuild`)

pub mod commands;
pub mod error;
pub mod progress;

// Re-export commonly used types
pub use error::{CliError, Result};

use clap::{Args, Parser, Subcommand};
use curtain_core::search::{FcWindow, SearchMode};
use std::path::PathBuf;

/// Curtain - local store and search for differential proteomics datasets
#[derive(Parser, Debug)]
#[command(name = "curtain")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Root directory holding the per-dataset stores
    #[arg(long, env = "CURTAIN_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest a dataset from its metadata JSON and tab-separated tables
    Ingest {
        /// Dataset identifier
        dataset: String,

        /// Metadata JSON file (forms, settings, extra data)
        #[arg(short, long)]
        metadata: PathBuf,

        /// Processed (differential) table; overrides one embedded in the metadata
        #[arg(short, long)]
        processed: Option<PathBuf>,

        /// Raw (per-sample) table; overrides one embedded in the metadata
        #[arg(short, long)]
        raw: Option<PathBuf>,

        /// Delete any existing store first
        #[arg(short, long)]
        force: bool,
    },

    /// Search terms across datasets
    Search {
        /// Search terms, separated by newlines or ';'
        #[arg(required_unless_present = "terms_file")]
        terms: Option<String>,

        /// Read search terms from a file
        #[arg(long, conflicts_with = "terms")]
        terms_file: Option<PathBuf>,

        #[command(flatten)]
        datasets: DatasetArgs,

        /// Only keep matches that pass the dataset's cutoffs
        #[arg(short, long)]
        significant_only: bool,

        /// Fold-change window for down-regulated matches, as MIN,MAX on |log2FC|
        #[arg(long, value_parser = parse_window)]
        left: Option<FcWindow>,

        /// Fold-change window for up-regulated matches, as MIN,MAX
        #[arg(long, value_parser = parse_window)]
        right: Option<FcWindow>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Detailed per-row report for one term
    Report {
        /// Search term
        term: String,

        #[command(flatten)]
        datasets: DatasetArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Protein x dataset comparison matrix
    Matrix {
        /// Proteins (gene names or accessions)
        #[arg(required = true)]
        proteins: Vec<String>,

        #[command(flatten)]
        datasets: DatasetArgs,

        /// Only keep cells that pass the dataset's cutoffs
        #[arg(short, long)]
        significant_only: bool,

        /// Minimum |log2FC| for a cell to count as found
        #[arg(long)]
        min_fc: Option<f64>,

        /// Maximum p-value for a cell to count as found
        #[arg(long)]
        max_p: Option<f64>,

        /// Drop proteins not found in any dataset
        #[arg(long)]
        hide_not_found: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show stored datasets and their row counts
    Status {
        /// Only show this dataset
        dataset: Option<String>,
    },

    /// Delete every row of a dataset, keeping its store
    Clean {
        /// Dataset identifier
        dataset: String,
    },

    /// Delete a dataset's store files so the next ingestion starts fresh
    Rebuild {
        /// Dataset identifier
        dataset: String,
    },
}

/// Datasets to query and how terms are matched
#[derive(Args, Debug, Clone)]
pub struct DatasetArgs {
    /// Dataset identifier (repeatable)
    #[arg(short = 'd', long = "dataset", required = true)]
    pub datasets: Vec<String>,

    /// Treat terms as case-insensitive regular expressions
    #[arg(long)]
    pub regex: bool,
}

impl DatasetArgs {
    pub fn mode(&self) -> SearchMode {
        if self.regex {
            SearchMode::Regex
        } else {
            SearchMode::Exact
        }
    }
}

/// Where results go besides the terminal table
#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Write results as CSV to this file ("-" for stdout)
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Print results as JSON instead of a table
    #[arg(long, conflicts_with = "csv")]
    pub json: bool,
}

/// Parse a `MIN,MAX` fold-change window
pub fn parse_window(s: &str) -> std::result::Result<FcWindow, String> {
    let (min, max) = s
        .split_once(',')
        .ok_or_else(|| format!("expected MIN,MAX, got '{}'", s))?;
    let min: f64 = min
        .trim()
        .parse()
        .map_err(|_| format!("invalid minimum '{}'", min.trim()))?;
    let max: f64 = max
        .trim()
        .parse()
        .map_err(|_| format!("invalid maximum '{}'", max.trim()))?;
    if min > max {
        return Err(format!("minimum {} is greater than maximum {}", min, max));
    }
    Ok(FcWindow { min, max })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_window() {
        let window = parse_window("0.5, 2").unwrap();
        assert_eq!(window.min, 0.5);
        assert_eq!(window.max, 2.0);

        assert!(parse_window("1").is_err());
        assert!(parse_window("a,2").is_err());
        assert!(parse_window("3,1").is_err());
    }

    #[test]
    fn test_search_args() {
        let cli = Cli::try_parse_from([
            "curtain", "search", "TP53;MDM2", "-d", "d1", "-d", "d2", "--regex", "--left", "1,5",
        ])
        .unwrap();
        match cli.command {
            Commands::Search {
                terms,
                datasets,
                left,
                right,
                ..
            } => {
                assert_eq!(terms.as_deref(), Some("TP53;MDM2"));
                assert_eq!(datasets.datasets, vec!["d1", "d2"]);
                assert_eq!(datasets.mode(), SearchMode::Regex);
                assert_eq!(left, Some(FcWindow { min: 1.0, max: 5.0 }));
                assert!(right.is_none());
            },
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_search_requires_dataset() {
        assert!(Cli::try_parse_from(["curtain", "search", "TP53"]).is_err());
    }
}
