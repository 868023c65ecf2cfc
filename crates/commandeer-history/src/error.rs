//! Error types for the history crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while recording or querying history.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Failed to initialize the history recorder.
    #[error("failed to initialize history at {path}: {source}")]
    InitializationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// IO error reading or writing the history file.
    #[error("history IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Serialization error.
    #[error("history serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
