//! Global configuration parsing and validation.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Backend process configuration: which host CLI executes each run.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackendConfig {
    /// Host CLI binary spawned once per run (e.g. `claude`).
    pub host_cli: String,
    /// Default arguments passed to the host CLI before the prompt.
    #[serde(default)]
    pub host_cli_args: Vec<String>,
    /// Working directory for the spawned process.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// Seconds to wait for the process's first stdout line before killing it.
    #[serde(default = "default_startup_timeout_seconds")]
    pub startup_timeout_seconds: u64,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_startup_timeout_seconds() -> u64 {
    30
}

impl BackendConfig {
    /// Startup timeout as a [`Duration`].
    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_seconds)
    }
}

/// Top-level configuration loaded from the TOML file passed via `--config`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// IPC socket / named-pipe name observers connect to.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
    /// Backend process settings.
    pub backend: BackendConfig,
}

fn default_ipc_name() -> String {
    "session-conductor".into()
}

impl GlobalConfig {
    /// Parse and validate a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when the TOML is malformed or a field
    /// fails validation.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field-level constraints not expressible in serde.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.ipc_name.trim().is_empty() {
            return Err(AppError::Config("ipc_name must not be empty".into()));
        }
        if self.backend.host_cli.trim().is_empty() {
            return Err(AppError::Config("backend.host_cli must not be empty".into()));
        }
        if self.backend.startup_timeout_seconds == 0 {
            return Err(AppError::Config(
                "backend.startup_timeout_seconds must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
