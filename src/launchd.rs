//! launchd agent descriptors and the `launchctl` client.

use crate::error::{DaemonError, Result};
use crate::paths::{self, DaemonPaths};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct LaunchdOptions {
    pub keep_alive: bool,
}

/// One row of `launchctl list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStatus {
    pub label: String,
    pub pid: Option<u32>,
    pub last_exit: Option<i32>,
}

/// Render the agent plist. launchd runs the governor, which verifies the
/// wrapper hash before exec'ing it.
pub fn render(name: &str, paths: &DaemonPaths, governor: &Path, options: LaunchdOptions) -> String {
    let log = escape_xml(&paths.log.display().to_string());
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{governor}</string>
        <string>run</string>
        <string>{name}</string>
        <string>{wrapper}</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <{keep_alive}/>
    <key>StandardOutPath</key>
    <string>{log}</string>
    <key>StandardErrorPath</key>
    <string>{log}</string>
</dict>
</plist>
"#,
        label = escape_xml(&paths::label(name)),
        governor = escape_xml(&governor.display().to_string()),
        name = escape_xml(name),
        wrapper = escape_xml(&paths.wrapper.display().to_string()),
        keep_alive = options.keep_alive,
    )
}

pub fn generate(
    name: &str,
    paths: &DaemonPaths,
    governor: &Path,
    options: LaunchdOptions,
) -> Result<PathBuf> {
    if let Some(parent) = paths.descriptor.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&paths.descriptor, render(name, paths, governor, options))?;
    Ok(paths.descriptor.clone())
}

fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Parse `launchctl list` output (`PID\tStatus\tLabel`, header first).
pub fn parse_list(output: &str) -> Vec<UnitStatus> {
    output
        .lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let pid = cols.next()?;
            let status = cols.next()?;
            let label = cols.next()?;
            if pid == "PID" {
                return None;
            }
            Some(UnitStatus {
                label: label.to_string(),
                pid: pid.parse().ok(),
                last_exit: status.parse().ok(),
            })
        })
        .collect()
}

#[allow(async_fn_in_trait)]
pub trait Supervisor {
    /// Load and start the unit described by `descriptor`.
    async fn start(&self, descriptor: &Path) -> Result<()>;
    /// Unload the unit. Already unloaded is success.
    async fn stop(&self, descriptor: &Path) -> Result<()>;
    async fn list(&self) -> Result<Vec<UnitStatus>>;
}

/// `launchctl` in the current user's GUI domain.
pub struct Launchctl {
    domain: String,
}

impl Launchctl {
    pub fn new() -> Self {
        Self {
            domain: format!("gui/{}", crate::clienv::current_uid()),
        }
    }

    async fn run(&self, args: &[&str], descriptor: Option<&Path>) -> Result<std::process::Output> {
        let mut cmd = Command::new("launchctl");
        cmd.args(args);
        if let Some(descriptor) = descriptor {
            cmd.arg(descriptor);
        }
        debug!("Running launchctl {:?} {:?}", args, descriptor);

        let output = cmd
            .output()
            .await
            .map_err(|e| DaemonError::tool("launchctl", e.to_string()))?;
        debug!("launchctl finished with exit code: {:?}", output.status.code());
        Ok(output)
    }
}

impl Default for Launchctl {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor for Launchctl {
    async fn start(&self, descriptor: &Path) -> Result<()> {
        let output = self.run(&["bootstrap", &self.domain], Some(descriptor)).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DaemonError::tool(
                "launchctl bootstrap",
                stderr.trim().to_string(),
            ));
        }
        Ok(())
    }

    async fn stop(&self, descriptor: &Path) -> Result<()> {
        let output = self.run(&["bootout", &self.domain], Some(descriptor)).await?;
        if !output.status.success() {
            debug!(
                "Ignoring bootout failure: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<UnitStatus>> {
        let output = self.run(&["list"], None).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DaemonError::tool("launchctl list", stderr.trim().to_string()));
        }
        Ok(parse_list(&String::from_utf8_lossy(&output.stdout)))
    }
}
