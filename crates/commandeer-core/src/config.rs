//! Configuration types for Commandeer.
//!
//! Configuration is loaded from a single YAML file (`commandeer.yaml` by
//! convention) and shared across crates. Credentials are never stored in the
//! file; the config names the environment variables they are read from.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::Credentials;

/// Complete Commandeer configuration loaded from a file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CommandeerConfig {
    /// Path to the device inventory file (YAML or text).
    #[serde(default)]
    pub inventory: Option<PathBuf>,

    /// Directory containing user command templates.
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,

    /// Credential sourcing.
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Execution engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Run history recording.
    #[serde(default)]
    pub history: HistoryConfig,
}

impl CommandeerConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}

/// Names of the environment variables credentials are read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_username_env")]
    pub username_env: String,
    #[serde(default = "default_password_env")]
    pub password_env: String,
    #[serde(default = "default_enable_password_env")]
    pub enable_password_env: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            username_env: default_username_env(),
            password_env: default_password_env(),
            enable_password_env: default_enable_password_env(),
        }
    }
}

impl CredentialsConfig {
    /// Resolve credentials from the configured environment variables.
    /// The enable password is optional; username and password are not.
    pub fn resolve(&self) -> Result<Credentials, ConfigError> {
        let username = std::env::var(&self.username_env)
            .map_err(|_| ConfigError::MissingEnv(self.username_env.clone()))?;
        let password = std::env::var(&self.password_env)
            .map_err(|_| ConfigError::MissingEnv(self.password_env.clone()))?;
        let enable_password = std::env::var(&self.enable_password_env).ok();

        Ok(Credentials {
            username,
            password,
            enable_password,
        })
    }
}

/// Execution engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum simultaneous device sessions.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Command-send retries on transient errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Linear backoff step between retries, in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Timeout for opening a device session, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Timeout for a single command send, in seconds.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

/// Run history recording settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_enabled")]
    pub enabled: bool,

    /// Directory the history file is written to.
    #[serde(default = "default_history_directory")]
    pub directory: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: default_history_enabled(),
            directory: default_history_directory(),
        }
    }
}

/// Errors raised while loading or resolving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnv(String),
}

fn default_username_env() -> String {
    "COMMANDEER_USERNAME".to_string()
}

fn default_password_env() -> String {
    "COMMANDEER_PASSWORD".to_string()
}

fn default_enable_password_env() -> String {
    "COMMANDEER_ENABLE_PASSWORD".to_string()
}

fn default_concurrency() -> usize {
    5
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_command_timeout_secs() -> u64 {
    30
}

fn default_history_enabled() -> bool {
    true
}

fn default_history_directory() -> PathBuf {
    PathBuf::from(".commandeer/history")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_sections_are_absent() {
        let config: CommandeerConfig = serde_yaml::from_str("inventory: devices.yaml\n").unwrap();
        assert_eq!(config.inventory, Some(PathBuf::from("devices.yaml")));
        assert_eq!(config.engine.concurrency, 5);
        assert_eq!(config.engine.max_retries, 2);
        assert!(config.history.enabled);
    }

    #[test]
    fn engine_section_overrides_defaults() {
        let yaml = "engine:\n  concurrency: 2\n  max_retries: 0\n";
        let config: CommandeerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.engine.concurrency, 2);
        assert_eq!(config.engine.max_retries, 0);
        assert_eq!(config.engine.backoff_ms, 500);
    }
}
