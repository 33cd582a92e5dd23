//! Error types for rolo-core

use thiserror::Error;

/// Result type alias using rolo-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in rolo-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local store error
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server rejected a request (non-2xx response)
    #[error("API error: {0}")]
    Api(String),
}
