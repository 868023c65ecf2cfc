//! SSH connector for Commandeer.
//!
//! Drives the system `ssh` client as a child process with an interactive
//! pseudo-terminal, which keeps host key handling, ciphers and transport
//! quirks in the battle-tested OpenSSH implementation. Password
//! authentication is delegated to `sshpass`, fed through the environment so
//! secrets never appear in `argv`.
//!
//! The engine sees this crate only through the
//! [`Connector`](commandeer_engine::Connector) trait: one `open` per device,
//! one `send` per command, per-operation timeouts, and a transient/permanent
//! classification on every error.

use async_trait::async_trait;
use commandeer_core::{Credentials, Device};
use commandeer_engine::{Connector, ConnectorError, DeviceShell};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as ProcessCommand;

mod parse;
mod shell;

use shell::SshShell;

/// How the ssh client is invoked.
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// The ssh client binary.
    pub ssh_binary: String,
    /// The sshpass binary used for password authentication.
    pub sshpass_binary: String,
    /// Accept previously unseen host keys (`StrictHostKeyChecking=accept-new`).
    pub accept_unknown_hosts: bool,
    /// Extra arguments appended to every invocation.
    pub extra_args: Vec<String>,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            ssh_binary: "ssh".to_string(),
            sshpass_binary: "sshpass".to_string(),
            accept_unknown_hosts: true,
            extra_args: Vec::new(),
        }
    }
}

/// Opens interactive shell sessions over the system ssh client.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    options: SshOptions,
}

impl SshConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: SshOptions) -> Self {
        Self { options }
    }

    fn build_command(&self, device: &Device, credentials: &Credentials) -> ProcessCommand {
        let mut command = ProcessCommand::new(&self.options.sshpass_binary);
        command.arg("-e");
        command.env("SSHPASS", &credentials.password);

        command.arg(&self.options.ssh_binary);
        // Force a pty so the device presents its interactive prompt.
        command.arg("-tt");
        command.args(["-o", "NumberOfPasswordPrompts=1"]);
        if self.options.accept_unknown_hosts {
            command.args(["-o", "StrictHostKeyChecking=accept-new"]);
        }
        for arg in &self.options.extra_args {
            command.arg(arg);
        }
        command.args(["-l", &credentials.username]);
        command.arg(&device.address);

        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn open(
        &self,
        device: &Device,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Box<dyn DeviceShell>, ConnectorError> {
        tracing::debug!(device = %device.name, address = %device.address, "opening ssh session");

        let child = self
            .build_command(device, credentials)
            .spawn()
            .map_err(|e| ConnectorError::Connection {
                device: device.name.clone(),
                reason: format!("failed to spawn ssh client: {e}"),
            })?;

        let mut shell = SshShell::start(device.name.clone(), child)?;

        // Wait out the banner and login until the first device prompt.
        shell.wait_for_prompt(timeout).await.map_err(|e| {
            ConnectorError::Connection {
                device: device.name.clone(),
                reason: format!("no device prompt: {e}"),
            }
        })?;

        // Disable paging so command output arrives in one piece.
        shell.send_raw("terminal length 0", timeout).await?;
        shell.send_raw("terminal width 0", timeout).await?;

        if let Some(enable_password) = &credentials.enable_password {
            shell.enter_enable_mode(enable_password, timeout).await?;
        }

        Ok(Box::new(shell))
    }
}
