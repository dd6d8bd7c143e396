//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::{AppError, Result};

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    30
}

fn default_load_timeout_ms() -> u64 {
    5000
}

fn default_ipc_name() -> String {
    "compliance-gate".into()
}

/// Global configuration parsed from `compliance-gate.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Directory holding the required base rule definitions.
    pub base_dir: PathBuf,
    /// Watched directory holding dynamically published rule definitions.
    pub dynamic_dir: PathBuf,
    /// Timer trigger period for the synchronizer; `0` disables the timer.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Whether to subscribe to filesystem change notifications.
    #[serde(default = "default_true")]
    pub watch: bool,
    /// Time budget for a single loader run.
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,
    /// Named pipe / Unix socket identifier.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Timer period, or `None` when polling is disabled.
    #[must_use]
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_seconds > 0).then(|| Duration::from_secs(self.poll_interval_seconds))
    }

    /// Loader time budget.
    #[must_use]
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    fn validate(&mut self) -> Result<()> {
        if self.load_timeout_ms == 0 {
            return Err(AppError::Config(
                "load_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.ipc_name.trim().is_empty() {
            return Err(AppError::Config("ipc_name must not be empty".into()));
        }

        let base = self
            .base_dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("base_dir invalid: {err}")))?;
        if !base.is_dir() {
            return Err(AppError::Config(format!(
                "base_dir is not a directory: {}",
                base.display()
            )));
        }
        self.base_dir = base;

        if !self.dynamic_dir.exists() {
            fs::create_dir_all(&self.dynamic_dir).map_err(|err| {
                AppError::Config(format!("failed to create dynamic_dir: {err}"))
            })?;
            info!(dir = %self.dynamic_dir.display(), "created dynamic rule directory");
        }
        self.dynamic_dir = self
            .dynamic_dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("dynamic_dir invalid: {err}")))?;

        Ok(())
    }
}
