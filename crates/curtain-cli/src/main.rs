//! Curtain CLI - Main entry point

use clap::Parser;
use curtain_cli::{commands, Cli, CliError, Commands};
use curtain_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use curtain_core::search::{
    parse_search_terms, FoldChangeFilter, MatrixFilter, SearchFilter, SearchRequest,
};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Verbose mode logs debug to the console; otherwise only warnings
    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Warn };
    let log_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("curtain-cli")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The CLI works without logging
    let _guard = init_logging(&log_config).ok();

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Execute the CLI command
async fn execute_command(cli: &Cli) -> curtain_cli::Result<()> {
    let stores = commands::store_manager(cli.data_dir.as_deref())?;

    match &cli.command {
        Commands::Ingest {
            dataset,
            metadata,
            processed,
            raw,
            force,
        } => {
            commands::ingest::run(
                stores,
                dataset,
                metadata,
                processed.as_deref(),
                raw.as_deref(),
                *force,
            )
            .await
        },

        Commands::Search {
            terms,
            terms_file,
            datasets,
            significant_only,
            left,
            right,
            output,
        } => {
            let text = match (terms, terms_file) {
                (_, Some(path)) => commands::read_input(path)?,
                (Some(text), None) => text.clone(),
                (None, None) => return Err(CliError::invalid_arguments("no search terms given")),
            };
            let advanced = (left.is_some() || right.is_some()).then_some(FoldChangeFilter {
                left: *left,
                right: *right,
            });
            let request = SearchRequest {
                terms: parse_search_terms(&text),
                dataset_ids: datasets.datasets.clone(),
                mode: datasets.mode(),
                filter: SearchFilter {
                    significant_only: *significant_only,
                    advanced,
                },
            };
            commands::search::run(stores, request, output).await
        },

        Commands::Report {
            term,
            datasets,
            output,
        } => commands::report::run(stores, term, datasets, output).await,

        Commands::Matrix {
            proteins,
            datasets,
            significant_only,
            min_fc,
            max_p,
            hide_not_found,
            output,
        } => {
            let filter = MatrixFilter {
                significant_only: *significant_only,
                min_abs_fold_change: *min_fc,
                max_p_value: *max_p,
                hide_not_found: *hide_not_found,
            };
            commands::matrix::run(stores, proteins, datasets, filter, output).await
        },

        Commands::Status { dataset } => commands::status::run(stores, dataset.as_deref()).await,

        Commands::Clean { dataset } => commands::clean::run(stores, dataset).await,

        Commands::Rebuild { dataset } => commands::rebuild::run(stores, dataset).await,
    }
}
