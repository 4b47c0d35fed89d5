//! Per-daemon logrotate policies and the shared crontab trigger.

use crate::error::{DaemonError, Result};
use crate::paths::{DaemonPaths, Layout};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

pub const CRON_MARKER: &str = "# daemon-cli-logrotate";
const LOGROTATE_BIN: &str = "logrotate";
const FALLBACK_LOGROTATE: &str = "/usr/local/bin/logrotate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    Daily,
    Weekly,
    Hourly,
}

impl Rotation {
    pub const ALL: [Rotation; 3] = [Rotation::Daily, Rotation::Weekly, Rotation::Hourly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Hourly => "hourly",
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LogrotateOptions {
    pub rotation: Rotation,
    pub keep: u32,
    pub compress: bool,
}

/// Render a policy. `copytruncate` keeps launchd's open log handle valid,
/// since the daemon is never signalled on rotation.
pub fn render(log: &Path, options: LogrotateOptions) -> String {
    let mut policy = format!(
        "\"{}\" {{\n  {}\n  rotate {}\n",
        log.display(),
        options.rotation,
        options.keep
    );
    if options.compress {
        policy.push_str("  compress\n");
    }
    policy.push_str("  missingok\n  notifempty\n  copytruncate\n}\n");
    policy
}

pub fn generate(paths: &DaemonPaths, options: LogrotateOptions) -> Result<PathBuf> {
    if let Some(parent) = paths.rotation_config.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&paths.rotation_config, render(&paths.log, options))?;
    Ok(paths.rotation_config.clone())
}

/// Cron line that rotates every managed daemon's log.
pub fn trigger_line(logrotate: &Path, layout: &Layout) -> String {
    format!(
        "@hourly {} -s {} {} {CRON_MARKER}",
        logrotate.display(),
        layout.state_file.display(),
        layout.policy_glob()
    )
}

/// Crontab with the trigger appended, or `None` when it is already present.
pub fn with_trigger(crontab: &str, line: &str) -> Option<String> {
    if crontab.contains(CRON_MARKER) {
        return None;
    }
    let trimmed = crontab.trim_end_matches('\n');
    Some(if trimmed.is_empty() {
        format!("{line}\n")
    } else {
        format!("{trimmed}\n{line}\n")
    })
}

/// Crontab without any marked line.
pub fn without_trigger(crontab: &str) -> String {
    let kept: Vec<&str> = crontab
        .lines()
        .filter(|line| !line.contains(CRON_MARKER))
        .collect();
    if kept.iter().all(|line| line.trim().is_empty()) {
        return String::new();
    }
    format!("{}\n", kept.join("\n").trim_end_matches('\n'))
}

#[allow(async_fn_in_trait)]
pub trait Scheduler {
    /// Full current schedule; empty when none exists.
    async fn read(&self) -> Result<String>;
    /// Replace the full schedule.
    async fn write(&self, content: &str) -> Result<()>;
    /// Remove the schedule entirely.
    async fn clear(&self) -> Result<()>;
}

#[allow(async_fn_in_trait)]
pub trait RotationEngine {
    /// Rotate one policy now, regardless of cadence.
    async fn force(&self, config: &Path, state: &Path) -> Result<()>;
}

/// Install the shared trigger unless it is already there.
pub async fn ensure_scheduled_trigger<C: Scheduler>(
    scheduler: &C,
    layout: &Layout,
    logrotate: &Path,
) -> Result<bool> {
    let current = scheduler.read().await?;
    match with_trigger(&current, &trigger_line(logrotate, layout)) {
        Some(updated) => {
            scheduler.write(&updated).await?;
            info!("Installed logrotate cron trigger");
            Ok(true)
        }
        None => {
            debug!("Logrotate cron trigger already present");
            Ok(false)
        }
    }
}

/// Remove the shared trigger once no policies remain. Other entries are kept.
pub async fn prune_scheduled_trigger_if_unused<C: Scheduler>(
    scheduler: &C,
    layout: &Layout,
) -> Result<bool> {
    if !layout.managed_names()?.is_empty() {
        return Ok(false);
    }

    let current = scheduler.read().await?;
    if !current.contains(CRON_MARKER) {
        return Ok(false);
    }

    let updated = without_trigger(&current);
    if updated.is_empty() {
        scheduler.clear().await?;
    } else {
        scheduler.write(&updated).await?;
    }
    info!("Removed logrotate cron trigger");
    Ok(true)
}

/// Location of the logrotate binary for the cron line.
pub fn logrotate_path() -> Option<PathBuf> {
    which::which(LOGROTATE_BIN).ok()
}

pub fn logrotate_path_or_default() -> PathBuf {
    logrotate_path().unwrap_or_else(|| PathBuf::from(FALLBACK_LOGROTATE))
}

/// The user's crontab.
#[derive(Default)]
pub struct Crontab;

impl Scheduler for Crontab {
    async fn read(&self) -> Result<String> {
        let output = Command::new("crontab")
            .arg("-l")
            .output()
            .await
            .map_err(|e| DaemonError::tool("crontab", e.to_string()))?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("no crontab for") {
            return Ok(String::new());
        }
        Err(DaemonError::tool("crontab -l", stderr.trim().to_string()))
    }

    async fn write(&self, content: &str) -> Result<()> {
        let mut child = Command::new("crontab")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DaemonError::tool("crontab", e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(content.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DaemonError::tool("crontab -", stderr.trim().to_string()));
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let output = Command::new("crontab")
            .arg("-r")
            .output()
            .await
            .map_err(|e| DaemonError::tool("crontab", e.to_string()))?;
        if !output.status.success() {
            debug!(
                "crontab -r failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// `logrotate -f -s <state> <config>`
pub struct Logrotate {
    binary: PathBuf,
}

impl Logrotate {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl Default for Logrotate {
    fn default() -> Self {
        Self::new(logrotate_path_or_default())
    }
}

impl RotationEngine for Logrotate {
    async fn force(&self, config: &Path, state: &Path) -> Result<()> {
        debug!("Forcing rotation of {}", config.display());
        let output = Command::new(&self.binary)
            .arg("-f")
            .arg("-s")
            .arg(state)
            .arg(config)
            .output()
            .await
            .map_err(|e| DaemonError::tool("logrotate", e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DaemonError::tool("logrotate", stderr.trim().to_string()));
        }
        Ok(())
    }
}
