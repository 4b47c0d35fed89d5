use crate::error::{DaemonError, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Exit statuses of `daemon-governor` (sysexits.h).
pub mod exit_status {
    /// Could not read the wrapper or write the allowlist.
    pub const IO_ERROR: i32 = 74;
    /// Not running as root.
    pub const NO_PERMISSION: i32 = 77;
    /// Wrapper unregistered or modified since registration; refused to run.
    pub const TAMPERED: i32 = 78;
}

/// Unprivileged side of wrapper registration.
#[allow(async_fn_in_trait)]
pub trait Registrar {
    /// Record the current content of `artifact` as the trusted version for `name`.
    async fn register(&self, name: &str, artifact: &Path) -> Result<()>;
}

/// Registers through `sudo daemon-governor register`.
///
/// stdio is inherited so the sudo password prompt reaches the terminal.
pub struct SudoGovernor {
    governor: PathBuf,
}

impl SudoGovernor {
    pub fn new(governor: PathBuf) -> Self {
        Self { governor }
    }

    pub fn governor(&self) -> &Path {
        &self.governor
    }
}

impl Default for SudoGovernor {
    fn default() -> Self {
        Self::new(crate::clienv::governor_path())
    }
}

impl Registrar for SudoGovernor {
    async fn register(&self, name: &str, artifact: &Path) -> Result<()> {
        info!(
            "Registering {} via {} (sudo)",
            artifact.display(),
            self.governor.display()
        );

        let status = Command::new("sudo")
            .arg(&self.governor)
            .arg("register")
            .arg(name)
            .arg(artifact)
            .status()
            .await
            .map_err(|e| DaemonError::tool("sudo", e.to_string()))?;

        debug!("Governor registration finished with exit code: {:?}", status.code());

        if !status.success() {
            return Err(registration_error(name, status.code()));
        }
        Ok(())
    }
}

/// Map a failed `sudo daemon-governor register` to an error.
///
/// Only the governor's I/O status means sudo worked; everything else (sudo
/// refusing, root check failing) is an authorization problem.
fn registration_error(name: &str, code: Option<i32>) -> DaemonError {
    match code {
        Some(exit_status::IO_ERROR) => DaemonError::tool(
            "daemon-governor register",
            format!("could not record the hash for '{name}' (see the governor output above)"),
        ),
        Some(code) => DaemonError::AuthorizationFailure {
            name: name.to_string(),
            detail: format!("governor exited with code {code}"),
        },
        None => DaemonError::AuthorizationFailure {
            name: name.to_string(),
            detail: "governor was terminated by a signal".to_string(),
        },
    }
}
