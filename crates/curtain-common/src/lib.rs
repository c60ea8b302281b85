//! Curtain Common Library
//!
//! Shared error handling and logging for the Curtain data workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`CurtainError`] and the crate-wide [`Result`] alias
//! - **Logging**: tracing subscriber setup driven by [`logging::LogConfig`]
//!
//! # Example
//!
//! ```no_run
//! use curtain_common::logging::{init_logging, LogConfig};
//!
//! let config = LogConfig::from_env().unwrap_or_default();
//! init_logging(&config).ok();
//! tracing::info!("Curtain started");
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CurtainError, Result};
