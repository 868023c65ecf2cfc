//! Error types for template loading and rendering.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or rendering templates.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template lookup by name failed.
    #[error("template not found: {0}")]
    NotFound(String),

    /// IO error reading a template file or directory.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON/YAML parse failure.
    #[error("failed to parse template file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// A placeholder survived rendering.
    #[error("template '{template}': unresolved variable '${{{variable}}}' in command '{command}'")]
    UnresolvedVariable {
        template: String,
        variable: String,
        command: String,
    },
}
