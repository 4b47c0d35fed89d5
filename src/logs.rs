use crate::error::{DaemonError, Result};
use crate::paths::{self, Layout};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

pub const DEFAULT_LINES: u32 = 50;

fn tail_args(log: &Path, lines: u32, follow: bool) -> Vec<String> {
    let mut args = Vec::new();
    if follow {
        args.push("-f".to_string());
    }
    args.push("-n".to_string());
    args.push(lines.to_string());
    args.push(log.display().to_string());
    args
}

/// Print the end of a daemon's log, optionally following it until Ctrl-C.
///
/// Interrupting a follow is a normal way to finish and returns `Ok`.
pub async fn show(layout: &Layout, name: &str, lines: u32, follow: bool) -> Result<()> {
    paths::validate_name(name)?;
    let log = layout.paths(name).log;
    if !log.exists() {
        debug!(path = %log.display(), "No log file");
        return Err(DaemonError::NotFound(name.to_string()));
    }

    let args = tail_args(&log, lines, follow);
    debug!("Running tail {:?}", args);
    let mut child = Command::new("tail")
        .args(&args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DaemonError::tool("tail", e.to_string()))?;

    tokio::select! {
        status = child.wait() => {
            let status = status?;
            if !status.success() {
                return Err(DaemonError::tool("tail", format!("exited with code {:?}", status.code())));
            }
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            debug!("Interrupted, stopping tail");
            child.kill().await.ok();
            Ok(())
        }
    }
}
