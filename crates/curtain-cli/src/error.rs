//! Error types for the Curtain CLI
//!
//! User-facing errors with messages that say what to check next.

use curtain_common::CurtainError;
use curtain_core::StoreError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Error type for CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    /// The data layer failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Shared configuration or parsing failure
    #[error(transparent)]
    Common(#[from] CurtainError),

    /// Required input file is missing
    #[error("File not found: '{0}'. Verify the file path exists and you have read permissions.")]
    FileNotFound(String),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// JSON output could not be rendered
    #[error("Failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Arguments are individually valid but unusable together
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Set CURTAIN_DATA_DIR or pass --data-dir.")]
    Config(String),

    /// Generic anyhow error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid-arguments error
    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }
}
