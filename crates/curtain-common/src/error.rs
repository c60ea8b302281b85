//! Error types shared across Curtain crates

use thiserror::Error;

/// Result type alias for operations returning [`CurtainError`]
pub type Result<T> = std::result::Result<T, CurtainError>;

/// Errors that are not specific to one subsystem
#[derive(Error, Debug)]
pub enum CurtainError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl CurtainError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
