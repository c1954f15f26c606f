//! Error types for teams-export-core.

use thiserror::Error;

/// Result type alias using teams-export-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for teams-export-core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Path discovery error.
    #[error("path error: {0}")]
    Path(String),

    /// Token acquisition failed. Always fatal, raised before any fetch.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Raw transport failure reported by a page source.
    #[error("transport error: {0}")]
    Transport(String),

    /// A fetch was aborted by a transport failure.
    #[error("network error after {pages} page(s) and {items} item(s): {message}")]
    Network {
        pages: usize,
        items: usize,
        message: String,
    },

    /// A fetch was aborted by a non-success status.
    #[error("fetch failed with status {status} after {pages} page(s) and {items} item(s): {detail}")]
    Fetch {
        status: u16,
        pages: usize,
        items: usize,
        detail: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
