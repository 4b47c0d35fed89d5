//! On-disk layout of managed daemons.
//!
//! Every artifact path is a pure function of the daemon name and the
//! process-wide [`Layout`]. There is no index file: the `*.conf` policies in
//! the rotation directory are the set of managed daemons.

use crate::error::{DaemonError, Result};
use std::fs;
use std::path::{Path, PathBuf};

const APP_SUBDIR: &str = "daemon-cli";
const LABEL_PREFIX: &str = "com.daemon-cli.";
const POLICY_EXT: &str = "conf";
const MAX_NAME_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub wrappers_dir: PathBuf,
    pub config_dir: PathBuf,
    pub logrotate_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub launch_agents_dir: PathBuf,
    pub state_file: PathBuf,
}

/// Artifact locations of one daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonPaths {
    pub wrapper: PathBuf,
    pub descriptor: PathBuf,
    pub rotation_config: PathBuf,
    pub log: PathBuf,
}

impl Layout {
    /// Layout for the current user, honouring $DAEMON_CLI_HOME and
    /// $DAEMON_CLI_CONFIG_DIR.
    pub fn from_env() -> Self {
        let home = crate::clienv::home_dir();
        let config_dir = crate::clienv::config_dir();
        let layout = Self {
            wrappers_dir: home.join(".local/share").join(APP_SUBDIR).join("wrappers"),
            logrotate_dir: config_dir.join("logrotate.d"),
            config_dir,
            logs_dir: home.join("Library/Logs").join(APP_SUBDIR),
            launch_agents_dir: home.join("Library/LaunchAgents"),
            state_file: home
                .join(".local/state")
                .join(APP_SUBDIR)
                .join("logrotate.status"),
        };
        tracing::trace!(?layout, "Resolved layout");
        layout
    }

    /// Same shape as [`Layout::from_env`], rooted at an arbitrary directory.
    pub fn rooted(root: &Path) -> Self {
        let config_dir = root.join(".config").join(APP_SUBDIR);
        Self {
            wrappers_dir: root.join(".local/share").join(APP_SUBDIR).join("wrappers"),
            logrotate_dir: config_dir.join("logrotate.d"),
            config_dir,
            logs_dir: root.join("Library/Logs").join(APP_SUBDIR),
            launch_agents_dir: root.join("Library/LaunchAgents"),
            state_file: root
                .join(".local/state")
                .join(APP_SUBDIR)
                .join("logrotate.status"),
        }
    }

    pub fn paths(&self, name: &str) -> DaemonPaths {
        DaemonPaths {
            wrapper: self.wrappers_dir.join(format!("{name}.sh")),
            descriptor: self.launch_agents_dir.join(format!("{}.plist", label(name))),
            rotation_config: self.logrotate_dir.join(format!("{name}.{POLICY_EXT}")),
            log: self.logs_dir.join(format!("{name}.log")),
        }
    }

    pub fn directories(&self) -> Vec<&Path> {
        let mut dirs = vec![
            self.wrappers_dir.as_path(),
            self.config_dir.as_path(),
            self.logrotate_dir.as_path(),
            self.logs_dir.as_path(),
            self.launch_agents_dir.as_path(),
        ];
        if let Some(state_dir) = self.state_file.parent() {
            dirs.push(state_dir);
        }
        dirs
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in self.directories() {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Glob over every rotation policy, as handed to logrotate.
    pub fn policy_glob(&self) -> String {
        format!("{}/*.{POLICY_EXT}", self.logrotate_dir.display())
    }

    /// Names of managed daemons, sorted.
    pub fn managed_names(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.logrotate_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(POLICY_EXT) {
                    return None;
                }
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn is_managed(&self, name: &str) -> bool {
        self.paths(name).rotation_config.exists()
    }

    /// Rotated siblings of a daemon's log (`<name>.log.1`, `<name>.log.2.gz`, ...).
    pub fn rotated_logs(&self, name: &str) -> Result<Vec<PathBuf>> {
        let prefix = format!("{name}.log.");
        let entries = match fs::read_dir(&self.logs_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut rotated: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
            .map(|entry| entry.path())
            .collect();
        rotated.sort();
        Ok(rotated)
    }
}

/// launchd label of a daemon.
pub fn label(name: &str) -> String {
    format!("{LABEL_PREFIX}{name}")
}

/// Reject names that could escape the artifact directories or confuse the
/// tools that receive them as arguments.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(DaemonError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() {
        return invalid("name is empty");
    }
    if name.len() > MAX_NAME_LEN {
        return invalid("name is too long");
    }
    if name.starts_with('.') || name.starts_with('-') {
        return invalid("name must not start with '.' or '-'");
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return invalid(&format!("character {c:?} is not allowed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_deterministic() {
        let layout = Layout::rooted(Path::new("/home/u"));
        assert_eq!(layout.paths("web"), layout.paths("web"));
        assert_ne!(layout.paths("web"), layout.paths("api"));
    }

    #[test]
    fn test_paths_shape() {
        let layout = Layout::rooted(Path::new("/home/u"));
        let paths = layout.paths("web");

        assert_eq!(
            paths.wrapper,
            PathBuf::from("/home/u/.local/share/daemon-cli/wrappers/web.sh")
        );
        assert_eq!(
            paths.descriptor,
            PathBuf::from("/home/u/Library/LaunchAgents/com.daemon-cli.web.plist")
        );
        assert_eq!(
            paths.rotation_config,
            PathBuf::from("/home/u/.config/daemon-cli/logrotate.d/web.conf")
        );
        assert_eq!(paths.log, PathBuf::from("/home/u/Library/Logs/daemon-cli/web.log"));
    }

    #[test]
    fn test_label() {
        assert_eq!(label("web"), "com.daemon-cli.web");
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("web").is_ok());
        assert!(validate_name("my_api-2.v1").is_ok());

        for bad in ["", ".", "..", ".hidden", "-flag", "a/b", "a b", "x\0y", "naïve"] {
            assert!(
                matches!(validate_name(bad), Err(DaemonError::InvalidName { .. })),
                "{bad:?} should be rejected"
            );
        }
        assert!(validate_name(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_managed_names_from_policies() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::rooted(dir.path());
        assert!(layout.managed_names().unwrap().is_empty());

        layout.ensure_directories().unwrap();
        fs::write(layout.paths("web").rotation_config, "").unwrap();
        fs::write(layout.paths("api").rotation_config, "").unwrap();
        fs::write(layout.logrotate_dir.join("README"), "").unwrap();

        assert_eq!(layout.managed_names().unwrap(), vec!["api", "web"]);
        assert!(layout.is_managed("web"));
        assert!(!layout.is_managed("db"));
    }

    #[test]
    fn test_rotated_logs_match_prefix_only() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::rooted(dir.path());
        layout.ensure_directories().unwrap();

        for file in ["web.log", "web.log.1", "web.log.2.gz", "webapp.log.1", "api.log.1"] {
            fs::write(layout.logs_dir.join(file), "").unwrap();
        }

        let rotated = layout.rotated_logs("web").unwrap();
        assert_eq!(
            rotated,
            vec![layout.logs_dir.join("web.log.1"), layout.logs_dir.join("web.log.2.gz")]
        );
    }

    #[test]
    fn test_policy_glob() {
        let layout = Layout::rooted(Path::new("/r"));
        assert_eq!(layout.policy_glob(), "/r/.config/daemon-cli/logrotate.d/*.conf");
    }
}
