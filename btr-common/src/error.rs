//! Common error types for BuildTrace

use thiserror::Error;

/// Common result type for BuildTrace operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across BuildTrace crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested blob or resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Drawing object missing a required field or carrying the wrong type
    #[error("Malformed drawing object: {0}")]
    MalformedObject(String),

    /// Invalid caller input or parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
