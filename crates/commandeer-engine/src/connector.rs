//! The connector contract: opening an authenticated session to one device
//! and sending commands over it.
//!
//! The connector owns transport-level retry of a single I/O operation; the
//! engine never retries `open`. Timeouts are supplied per call and a timeout
//! is treated like any other connector error.

use async_trait::async_trait;
use commandeer_core::{Credentials, Device};
use std::time::Duration;
use thiserror::Error;

/// Errors produced by a connector. The connector supplies the transient
/// classification the engine's send-retry policy relies on.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Could not establish or keep a session.
    #[error("connection to {device} failed: {reason}")]
    Connection { device: String, reason: String },

    /// The device rejected or failed a command.
    #[error("command failed on {device}: {reason}")]
    Command {
        device: String,
        reason: String,
        /// True when a retry of the same send may succeed.
        transient: bool,
    },

    /// The operation did not complete within the caller-supplied timeout.
    #[error("operation on {device} timed out after {timeout:?}")]
    Timeout { device: String, timeout: Duration },
}

impl ConnectorError {
    pub fn is_transient(&self) -> bool {
        match self {
            ConnectorError::Connection { .. } => false,
            ConnectorError::Command { transient, .. } => *transient,
            ConnectorError::Timeout { .. } => true,
        }
    }
}

/// Opens authenticated sessions to devices.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a session. The connector applies its own retry budget; a
    /// returned error is final from the engine's point of view.
    async fn open(
        &self,
        device: &Device,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Box<dyn DeviceShell>, ConnectorError>;
}

/// An open session with one device. Commands are sent one at a time.
#[async_trait]
pub trait DeviceShell: Send {
    /// Send a single command and return its raw output.
    async fn send(&mut self, command: &str, timeout: Duration) -> Result<String, ConnectorError>;

    /// Fetch the device's current configuration snapshot.
    async fn running_config(&mut self, timeout: Duration) -> Result<String, ConnectorError>;

    /// Close the session. Best effort; errors are swallowed by the connector.
    async fn close(&mut self);
}
