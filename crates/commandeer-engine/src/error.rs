//! Session failure taxonomy.
//!
//! Every per-device failure is captured on the owning session as a
//! [`SessionError`] and never thrown past the orchestrator boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::connector::ConnectorError;

/// Why a device session failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionErrorKind {
    /// Transport-level failure reported by the connector after its own retry
    /// budget; the engine does not retry connections.
    Connection,
    /// Command send failed after exhausting the engine's retry budget.
    Command,
    /// A Critical finding was present on a non-dry-run plan.
    ValidationBlocked,
    /// The confirmation gate denied the operation.
    UserAborted,
    /// An inverse command send failed; terminal and run-halting.
    RollbackFailed,
    /// The run was cancelled before this session could finish.
    Cancelled,
}

impl SessionErrorKind {
    /// Distinct, explained status string surfaced in run results.
    pub fn explain(&self) -> &'static str {
        match self {
            SessionErrorKind::Connection => "could not establish a session with the device",
            SessionErrorKind::Command => "a command was rejected after exhausting retries",
            SessionErrorKind::ValidationBlocked => {
                "validation found a critical issue; no commands were sent"
            }
            SessionErrorKind::UserAborted => "the operation was denied at the confirmation gate",
            SessionErrorKind::RollbackFailed => {
                "an inverse command failed; the device may be partially configured"
            }
            SessionErrorKind::Cancelled => "the run was cancelled before this device finished",
        }
    }
}

/// A session failure: kind plus device-specific detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionError {
    pub kind: SessionErrorKind,
    pub message: String,
}

impl SessionError {
    pub fn new(kind: SessionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connection(source: &ConnectorError) -> Self {
        Self::new(SessionErrorKind::Connection, source.to_string())
    }

    pub fn command(source: &ConnectorError) -> Self {
        Self::new(SessionErrorKind::Command, source.to_string())
    }

    pub fn validation_blocked(count: usize) -> Self {
        Self::new(
            SessionErrorKind::ValidationBlocked,
            format!("{count} critical finding(s) block execution"),
        )
    }

    pub fn user_aborted() -> Self {
        Self::new(SessionErrorKind::UserAborted, "confirmation denied")
    }

    pub fn rollback_failed(message: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::RollbackFailed, message)
    }

    pub fn cancelled() -> Self {
        Self::new(
            SessionErrorKind::Cancelled,
            "run cancelled by another device's failure",
        )
    }

    /// Map a connector error at a given stage onto the right kind: open
    /// failures are connection errors, everything else is a command error.
    pub fn from_connector(source: &ConnectorError) -> Self {
        match source {
            ConnectorError::Connection { .. } => Self::connection(source),
            _ => Self::command(source),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.explain(), self.message)
    }
}

impl std::error::Error for SessionError {}
