//! Error types for jobdeck-core

use thiserror::Error;

/// Main error type for the jobdeck-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Network or HTTP failure while talking to the job server
    #[error("{0}")]
    Transport(String),

    /// Run parameters rejected before any request was made
    #[error("invalid run: {0}")]
    InvalidRun(String),

    /// Job definition not found in configuration
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Run task panicked or was cancelled by the runtime
    #[error("run task aborted: {0}")]
    RunAborted(String),

    /// Inbox result not found
    #[error("result not found: {0}")]
    ResultNotFound(String),
}

/// Result type alias for jobdeck-core
pub type Result<T> = std::result::Result<T, Error>;
