//! Error types for the Curtain data layer

use thiserror::Error;

/// Result type alias for store, ingestion and search operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Failures that propagate to callers of the data layer
///
/// Field-level parse failures never show up here; they degrade to an absent
/// value on the row. Mapping-index failures use their own non-fatal
/// [`crate::mapping::MappingError`] channel.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite reported an error while opening, reading or writing a store
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Filesystem operation on a store file failed
    #[error("File operation failed: {0}. Check permissions and disk space for the data directory.")]
    Io(#[from] std::io::Error),

    /// Metadata or UniProt payload could not be (de)serialised
    #[error("Failed to (de)serialise JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The dataset has never been ingested, or its store is stale
    #[error("No data downloaded for dataset '{0}'")]
    NoData(String),

    /// A regex-mode search term does not compile
    #[error("Invalid search pattern '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A CSV export could not be written
    #[error("Export failed: {0}")]
    Export(#[from] csv::Error),

    /// The surrounding operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] curtain_common::CurtainError),
}

impl StoreError {
    /// Create a no-data error for a dataset
    pub fn no_data(dataset_id: impl Into<String>) -> Self {
        Self::NoData(dataset_id.into())
    }

    /// Short reason string shown in per-dataset search status
    pub fn short_reason(&self) -> String {
        match self {
            StoreError::NoData(_) => "no data downloaded".to_string(),
            StoreError::Storage(_) | StoreError::Io(_) => "storage unavailable".to_string(),
            StoreError::Json(_) => "metadata unreadable".to_string(),
            StoreError::InvalidRegex { .. } => "invalid search pattern".to_string(),
            StoreError::Export(_) => "export failed".to_string(),
            StoreError::Cancelled => "cancelled".to_string(),
            StoreError::Config(_) => "configuration error".to_string(),
        }
    }
}
