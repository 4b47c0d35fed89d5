use crate::error::{DaemonError, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::debug;

/// Time allowed to collect stderr when the deadline has already passed.
const STDERR_GRACE: Duration = Duration::from_millis(100);

/// How a trial run of a command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrialOutcome {
    /// Still alive when the timeout elapsed; killed.
    StillRunning,
    /// Exited 0 before the timeout.
    ExitedCleanly,
}

/// Run `command` under `bash -c` for at most `timeout`.
///
/// Surviving the timeout or exiting 0 passes; an early non-zero exit fails
/// with the captured stderr. The command runs in its own process group and
/// the whole group is killed before returning, so nothing it started
/// outlives the trial.
pub async fn validate_command(command: &str, timeout: Duration) -> Result<TrialOutcome> {
    let deadline = Instant::now() + timeout;

    let mut cmd = Command::new("bash");
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|e| DaemonError::ValidationFailure {
        detail: format!("could not start bash: {e}"),
    })?;
    let pid = child.id();

    let status = match tokio::time::timeout_at(deadline, child.wait()).await {
        Err(_) => {
            debug!("Trial run still alive after {:?}, killing", timeout);
            kill_tree(&mut child, pid).await;
            return Ok(TrialOutcome::StillRunning);
        }
        Ok(Err(e)) => {
            kill_tree(&mut child, pid).await;
            return Err(DaemonError::ValidationFailure {
                detail: e.to_string(),
            });
        }
        Ok(Ok(status)) => status,
    };

    // Background jobs may still hold the stderr pipe open.
    kill_tree(&mut child, pid).await;
    if status.success() {
        return Ok(TrialOutcome::ExitedCleanly);
    }

    let stderr = read_stderr(&mut child, deadline).await;
    let code = status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    Err(DaemonError::ValidationFailure {
        detail: if stderr.is_empty() {
            format!("command exited immediately with code {code}")
        } else {
            format!("command exited immediately with code {code}: {stderr}")
        },
    })
}

async fn read_stderr(child: &mut Child, deadline: Instant) -> String {
    let Some(mut pipe) = child.stderr.take() else {
        return String::new();
    };
    let deadline = deadline.max(Instant::now() + STDERR_GRACE);

    let mut buf = Vec::new();
    if tokio::time::timeout_at(deadline, pipe.read_to_end(&mut buf))
        .await
        .is_err()
    {
        debug!("Stopped waiting for trial stderr");
    }
    String::from_utf8_lossy(&buf).trim().to_string()
}

/// Kill the trial's process group, then reap the shell.
///
/// `pid` is taken at spawn: `Child::id` is gone once the shell is reaped,
/// but its group lives on while background jobs remain.
#[cfg(unix)]
async fn kill_tree(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        // The group id equals the shell's pid; ESRCH once it is empty.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
    child.kill().await.ok();
}

#[cfg(not(unix))]
async fn kill_tree(child: &mut Child, _pid: Option<u32>) {
    child.kill().await.ok();
}
