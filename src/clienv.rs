use std::path::PathBuf;

/// Environment variables understood by daemon-cli.
#[derive(Debug, Clone, Copy)]
pub enum EnvVar {
    DaemonCliHome,
    DaemonCliConfigDir,
    DaemonCliGovernor,
    DaemonCliLog,
    Shell,
    Path,
    Editor,
    Visual,
    SudoUser,
}

impl EnvVar {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DaemonCliHome => "DAEMON_CLI_HOME",
            Self::DaemonCliConfigDir => "DAEMON_CLI_CONFIG_DIR",
            Self::DaemonCliGovernor => "DAEMON_CLI_GOVERNOR",
            Self::DaemonCliLog => "DAEMON_CLI_LOG",
            Self::Shell => "SHELL",
            Self::Path => "PATH",
            Self::Editor => "EDITOR",
            Self::Visual => "VISUAL",
            Self::SudoUser => "SUDO_USER",
        }
    }
}

/// Non-empty value of an environment variable.
pub fn env_opt(var: EnvVar) -> Option<String> {
    std::env::var(var.as_str()).ok().filter(|v| !v.trim().is_empty())
}

pub fn env_or(var: EnvVar, default: &str) -> String {
    env_opt(var).unwrap_or_else(|| default.to_string())
}

const APP_SUBDIR: &str = "daemon-cli";
const GOVERNOR_BIN: &str = "daemon-governor";
const FALLBACK_SHELL: &str = "/bin/sh";
const FALLBACK_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";
const FALLBACK_EDITOR: &str = "vi";
pub const LOG_FILTER_DEFAULT: &str = "warn";

/// Home directory, or $DAEMON_CLI_HOME when sandboxing every per-user path.
pub fn home_dir() -> PathBuf {
    let dir = env_opt(EnvVar::DaemonCliHome)
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    tracing::trace!(dir = %dir.display(), "Resolved home directory");
    dir
}

/// Config directory ($DAEMON_CLI_CONFIG_DIR or ~/.config/daemon-cli)
pub fn config_dir() -> PathBuf {
    let dir = env_opt(EnvVar::DaemonCliConfigDir)
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(".config").join(APP_SUBDIR));
    tracing::trace!(dir = %dir.display(), "Resolved config directory");
    dir
}

/// Shell used as the wrapper interpreter ($SHELL or /bin/sh)
pub fn user_shell() -> String {
    let shell = env_or(EnvVar::Shell, FALLBACK_SHELL);
    tracing::trace!(shell = %shell, "User shell");
    shell
}

/// PATH captured into generated wrappers
pub fn user_path() -> String {
    env_or(EnvVar::Path, FALLBACK_PATH)
}

/// Editor used by `daemon edit` ($EDITOR, $VISUAL, then vi)
pub fn editor() -> String {
    let editor = env_opt(EnvVar::Editor)
        .or_else(|| env_opt(EnvVar::Visual))
        .unwrap_or_else(|| FALLBACK_EDITOR.to_string());
    tracing::trace!(editor = %editor, "Editor");
    editor
}

/// Filter directive for the tracing subscriber ($DAEMON_CLI_LOG or "warn")
pub fn log_filter() -> String {
    env_or(EnvVar::DaemonCliLog, LOG_FILTER_DEFAULT)
}

/// User that invoked sudo, recorded as the owner of a registration
pub fn sudo_user() -> Option<String> {
    env_opt(EnvVar::SudoUser)
}

/// Governor executable.
///
/// Resolution order: $DAEMON_CLI_GOVERNOR, a sibling of the running
/// executable, then `daemon-governor` on PATH.
pub fn governor_path() -> PathBuf {
    if let Some(path) = env_opt(EnvVar::DaemonCliGovernor) {
        tracing::trace!(path = %path, "Governor from env");
        return PathBuf::from(path);
    }

    let sibling = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(GOVERNOR_BIN)))
        .filter(|candidate| candidate.is_file());
    if let Some(path) = sibling {
        tracing::trace!(path = %path.display(), "Governor next to current executable");
        return path;
    }

    let path = which::which(GOVERNOR_BIN).unwrap_or_else(|_| PathBuf::from(GOVERNOR_BIN));
    tracing::trace!(path = %path.display(), "Governor from PATH");
    path
}

/// Location of the privileged allowlist.
pub fn allowlist_path() -> PathBuf {
    if cfg!(target_os = "macos") {
        PathBuf::from("/Library/Application Support/daemon-cli/allowlist.json")
    } else {
        PathBuf::from("/var/lib/daemon-cli/allowlist.json")
    }
}

/// Current user id, used to address the launchd GUI domain.
#[cfg(unix)]
pub fn current_uid() -> u32 {
    unsafe { libc::getuid() }
}

#[cfg(not(unix))]
pub fn current_uid() -> u32 {
    0
}

/// Effective user id; the governor only registers as root.
#[cfg(unix)]
pub fn effective_uid() -> u32 {
    unsafe { libc::geteuid() }
}

#[cfg(not(unix))]
pub fn effective_uid() -> u32 {
    0
}

/// uid and gid of a local account.
#[cfg(unix)]
pub fn user_ids(name: &str) -> Option<(u32, u32)> {
    let cname = std::ffi::CString::new(name).ok()?;
    let entry = unsafe { libc::getpwnam(cname.as_ptr()) };
    if entry.is_null() {
        return None;
    }
    let entry = unsafe { &*entry };
    Some((entry.pw_uid, entry.pw_gid))
}

#[cfg(not(unix))]
pub fn user_ids(_name: &str) -> Option<(u32, u32)> {
    None
}
