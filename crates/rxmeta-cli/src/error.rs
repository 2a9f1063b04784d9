//! Error types for the rxmeta CLI
//!
//! User-facing wrappers with actionable messages around the core pipeline
//! errors.

use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// Fatal pipeline failure; the run was aborted
    #[error("{0}")]
    Pipeline(#[from] rxmeta_core::MetaError),

    /// Cache file problem
    #[error("Cache error: {0}. Delete the cache file to force a full re-fetch.")]
    Cache(String),

    /// Bad command-line values
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
