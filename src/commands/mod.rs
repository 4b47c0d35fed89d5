pub(crate) mod completion;
pub(crate) mod create;
pub(crate) mod edit;
pub(crate) mod list;
pub(crate) mod logs;
pub(crate) mod remove;
pub(crate) mod restart;
pub(crate) mod stop;

use daemon_cli::logrotate;
use daemon_cli::{DaemonError, SystemLifecycle, UserConfig};

/// Refuse to run where launchd or logrotate are unavailable.
pub(crate) fn preflight() -> anyhow::Result<()> {
    if !cfg!(target_os = "macos") {
        anyhow::bail!(
            "daemon-cli manages launchd services and only runs on macOS (this host is {}).",
            std::env::consts::OS
        );
    }

    if logrotate::logrotate_path().is_none() {
        return Err(DaemonError::tool(
            "logrotate",
            "not found on PATH. Install it with `brew install logrotate`.",
        )
        .into());
    }
    Ok(())
}

pub(crate) fn lifecycle() -> anyhow::Result<SystemLifecycle> {
    let defaults = UserConfig::load()?;
    tracing::trace!(?defaults, "Loaded user defaults");
    Ok(SystemLifecycle::system(defaults))
}
