//! The interactive shell session over a spawned ssh client.

use async_trait::async_trait;
use commandeer_engine::{ConnectorError, DeviceShell};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::time::Instant;

use crate::parse;

pub(crate) struct SshShell {
    device: String,
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    /// Whether the session currently sits in configuration mode.
    in_config: bool,
}

impl SshShell {
    pub(crate) fn start(device: String, mut child: Child) -> Result<Self, ConnectorError> {
        let stdin = child.stdin.take().ok_or_else(|| ConnectorError::Connection {
            device: device.clone(),
            reason: "ssh client stdin unavailable".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| ConnectorError::Connection {
            device: device.clone(),
            reason: "ssh client stdout unavailable".to_string(),
        })?;

        Ok(Self {
            device,
            child,
            stdin,
            stdout,
            in_config: false,
        })
    }

    async fn write_raw(&mut self, data: &str) -> Result<(), ConnectorError> {
        self.stdin
            .write_all(data.as_bytes())
            .await
            .map_err(|e| ConnectorError::Connection {
                device: self.device.clone(),
                reason: format!("write failed: {e}"),
            })?;
        self.stdin
            .flush()
            .await
            .map_err(|e| ConnectorError::Connection {
                device: self.device.clone(),
                reason: format!("flush failed: {e}"),
            })
    }

    async fn write_line(&mut self, line: &str) -> Result<(), ConnectorError> {
        self.write_raw(&format!("{line}\n")).await
    }

    /// Accumulate output until the device presents a prompt, answering
    /// paging prompts along the way.
    pub(crate) async fn wait_for_prompt(
        &mut self,
        timeout: Duration,
    ) -> Result<String, ConnectorError> {
        let deadline = Instant::now() + timeout;
        let mut output = String::new();
        let mut buf = [0u8; 4096];

        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or_else(|| ConnectorError::Timeout {
                    device: self.device.clone(),
                    timeout,
                })?;

            match tokio::time::timeout(remaining, self.stdout.read(&mut buf)).await {
                Err(_) => {
                    return Err(ConnectorError::Timeout {
                        device: self.device.clone(),
                        timeout,
                    });
                }
                Ok(Err(e)) => {
                    return Err(ConnectorError::Connection {
                        device: self.device.clone(),
                        reason: format!("read failed: {e}"),
                    });
                }
                Ok(Ok(0)) => {
                    return Err(ConnectorError::Connection {
                        device: self.device.clone(),
                        reason: "session closed by device".to_string(),
                    });
                }
                Ok(Ok(n)) => {
                    output.push_str(&String::from_utf8_lossy(&buf[..n]));

                    if parse::at_paging_prompt(&output) {
                        self.write_raw(" ").await?;
                        continue;
                    }
                    if parse::ends_with_prompt(&output) {
                        return Ok(output);
                    }
                }
            }
        }
    }

    /// Send one line and return its cleaned output, surfacing device error
    /// markers as permanent command failures.
    pub(crate) async fn send_raw(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, ConnectorError> {
        self.write_line(command).await?;
        let raw = self.wait_for_prompt(timeout).await?;
        let cleaned = parse::clean_output(&raw, command);

        if let Some(error) = parse::find_device_error(&cleaned) {
            return Err(ConnectorError::Command {
                device: self.device.clone(),
                reason: error.to_string(),
                transient: false,
            });
        }
        Ok(cleaned)
    }

    /// Enter privileged exec mode. The enable password is written straight
    /// after the `enable` line; the pty buffers it for the password prompt.
    pub(crate) async fn enter_enable_mode(
        &mut self,
        enable_password: &str,
        timeout: Duration,
    ) -> Result<(), ConnectorError> {
        self.write_line("enable").await?;
        self.write_line(enable_password).await?;
        let output = self.wait_for_prompt(timeout).await?;

        let last_line = output.lines().last().unwrap_or("");
        if last_line.contains('#') {
            Ok(())
        } else {
            Err(ConnectorError::Connection {
                device: self.device.clone(),
                reason: "failed to enter privileged mode (check enable password)".to_string(),
            })
        }
    }

    async fn ensure_config_mode(&mut self, timeout: Duration) -> Result<(), ConnectorError> {
        if !self.in_config {
            self.send_raw("configure terminal", timeout).await?;
            self.in_config = true;
        }
        Ok(())
    }

    async fn ensure_exec_mode(&mut self, timeout: Duration) -> Result<(), ConnectorError> {
        if self.in_config {
            self.send_raw("end", timeout).await?;
            self.in_config = false;
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceShell for SshShell {
    async fn send(&mut self, command: &str, timeout: Duration) -> Result<String, ConnectorError> {
        if parse::is_exec_command(command) {
            self.ensure_exec_mode(timeout).await?;
        } else {
            self.ensure_config_mode(timeout).await?;
        }
        self.send_raw(command, timeout).await
    }

    async fn running_config(&mut self, timeout: Duration) -> Result<String, ConnectorError> {
        self.ensure_exec_mode(timeout).await?;
        self.send_raw("show running-config", timeout).await
    }

    async fn close(&mut self) {
        // Best effort: leave config mode, log out, then reap the client.
        if self.in_config {
            let _ = self.write_line("end").await;
            self.in_config = false;
        }
        let _ = self.write_line("exit").await;
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(device = %self.device, error = %e, "ssh client already exited");
        }
        let _ = self.child.wait().await;
    }
}
