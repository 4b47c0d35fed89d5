use crate::error::{DaemonError, Result};
use crate::logrotate::Rotation;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_KEEP: u32 = 7;
const DEFAULT_TRIAL_TIMEOUT_MS: u64 = 500;

/// Defaults applied to `daemon create` when a flag is not given.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct UserConfig {
    /// Rotation cadence for new daemons ("daily", "weekly", "hourly")
    pub rotation: Option<Rotation>,
    /// Rotated log files to keep
    pub keep: Option<u32>,
    /// Compress rotated logs
    pub compress: Option<bool>,
    /// Restart daemons automatically when they exit
    pub keep_alive: Option<bool>,
    /// How long a trial run must survive to be considered a service
    pub trial_timeout_ms: Option<u64>,
}

impl UserConfig {
    /// $DAEMON_CLI_CONFIG_DIR/config.toml or ~/.config/daemon-cli/config.toml
    pub fn config_path() -> PathBuf {
        crate::clienv::config_dir().join("config.toml")
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        tracing::trace!(path = %path.display(), "Loading user config");

        if !path.exists() {
            tracing::trace!("Config file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            DaemonError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        tracing::trace!(rotation = ?config.rotation, keep = ?config.keep, compress = ?config.compress, keep_alive = ?config.keep_alive, "User config loaded");
        Ok(config)
    }

    pub fn keep(&self) -> u32 {
        self.keep.unwrap_or(DEFAULT_KEEP)
    }

    pub fn compress(&self) -> bool {
        self.compress.unwrap_or(true)
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive.unwrap_or(true)
    }

    pub fn trial_timeout(&self) -> Duration {
        Duration::from_millis(self.trial_timeout_ms.unwrap_or(DEFAULT_TRIAL_TIMEOUT_MS))
    }
}
