//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading, saving, or validating configuration.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A value failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// The config file exists but could not be read
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file or a state directory could not be written
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file is not valid JSON for `Config`
    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Home directory not found
    #[error("Path error: {0}")]
    Path(String),
}

/// Result type alias using CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
