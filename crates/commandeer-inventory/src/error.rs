//! Error types for inventory loading and filtering.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or querying the inventory.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Inventory file does not exist.
    #[error("inventory file not found: {0}")]
    NotFoundFile(PathBuf),

    /// IO error reading the inventory file.
    #[error("failed to read inventory file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// YAML parse failure.
    #[error("failed to parse inventory file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Text-format parse failure on a specific line.
    #[error("error in {path} at line {line}: {message}")]
    Line {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Two devices share a name.
    #[error("duplicate device name: {0}")]
    DuplicateName(String),

    /// Device lookup by name failed.
    #[error("device not found in inventory: {0}")]
    NotFound(String),

    /// Address is neither a valid IPv4 address nor a plausible hostname.
    #[error("invalid IP address or hostname: {0}")]
    BadAddress(String),

    /// Malformed filter expression.
    #[error("invalid device filter: {0}")]
    BadFilter(String),
}
