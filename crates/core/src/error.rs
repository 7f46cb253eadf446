use std::io;
use std::result::Result as StdResult;

use thiserror::Error;

/// Errors that can occur in agent-mem
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Local store error (file system, permissions).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database operation error.
    #[error("Database error: {0}")]
    Database(String),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote backend error (network, availability).
    #[error("Backend error: {0}")]
    Backend(String),

    /// Invalid input provided by caller.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO operation error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for agent-mem operations.
pub type Result<T> = StdResult<T, Error>;
