use daemon_cli::completions::{self, CompletionShell};
use daemon_cli::Layout;

use crate::args::Cli;

pub(crate) fn cmd_completion(shell: Option<CompletionShell>) -> anyhow::Result<()> {
    let shell = shell.or_else(completions::detect_shell).ok_or_else(|| {
        anyhow::anyhow!("Could not detect your shell. Pass one explicitly, e.g. `daemon completion zsh`.")
    })?;

    // Completion must work even before any daemon exists.
    let names = Layout::from_env().managed_names().unwrap_or_default();
    completions::generate_completions::<Cli>(shell, "daemon", &names);
    Ok(())
}

pub(crate) fn cmd_completion_names() -> anyhow::Result<()> {
    for name in Layout::from_env().managed_names().unwrap_or_default() {
        println!("{name}");
    }
    Ok(())
}
