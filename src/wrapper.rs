use crate::error::Result;
use crate::paths::DaemonPaths;
use std::fs;
use std::path::{Path, PathBuf};

const EXEC_PREFIX: &str = "exec ";

/// Render the wrapper script.
///
/// launchd starts agents with a bare environment, so the PATH of the
/// creating session is baked in. The command is exec'd so launchd sees its
/// exit status and signals directly.
pub fn render(shell: &str, path_env: &str, command: &str) -> String {
    format!(
        "#!{shell}\n\
         # Generated by daemon-cli. Edit with `daemon edit <name>`; changes\n\
         # must be re-registered before launchd will run them.\n\
         export PATH={path}\n\
         \n\
         {EXEC_PREFIX}{command}\n",
        path = shell_quote(path_env),
    )
}

/// Write the wrapper for a daemon, replacing any previous one.
pub fn generate(paths: &DaemonPaths, command: &str) -> Result<PathBuf> {
    let content = render(&crate::clienv::user_shell(), &crate::clienv::user_path(), command);
    write_executable(&paths.wrapper, &content)?;
    tracing::debug!(path = %paths.wrapper.display(), "Wrapper written");
    Ok(paths.wrapper.clone())
}

fn write_executable(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

/// Best-effort recovery of the command from wrapper contents.
pub fn recover_command(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| line.strip_prefix(EXEC_PREFIX))
        .map(|cmd| cmd.trim().to_string())
        .filter(|cmd| !cmd.is_empty())
}

/// Single-quote a value for POSIX shells.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
