//! Shell completion generation with managed daemon names.
//!
//! Subcommands that take a daemon name complete from the daemons that exist
//! when the script is generated.

use std::io::Write;

use clap::builder::PossibleValuesParser;
use clap::{Command, CommandFactory, ValueEnum};
use clap_complete::{generate, Shell};

/// Subcommands whose `name` argument is an existing daemon.
const NAME_SUBCOMMANDS: [&str; 5] = ["rm", "stop", "restart", "edit", "logs"];

/// Supported shells for completion generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

impl From<CompletionShell> for Shell {
    fn from(shell: CompletionShell) -> Self {
        match shell {
            CompletionShell::Bash => Shell::Bash,
            CompletionShell::Zsh => Shell::Zsh,
            CompletionShell::Fish => Shell::Fish,
            CompletionShell::PowerShell => Shell::PowerShell,
            CompletionShell::Elvish => Shell::Elvish,
        }
    }
}

/// Write a completion script for `C` to `out`.
pub fn write_completions<C: CommandFactory>(
    shell: CompletionShell,
    bin_name: &str,
    names: &[String],
    out: &mut dyn Write,
) {
    let mut cmd = add_daemon_names(C::command(), names);
    let shell_type: Shell = shell.into();
    generate(shell_type, &mut cmd, bin_name, out);
}

/// Generate shell completions on stdout.
pub fn generate_completions<C: CommandFactory>(shell: CompletionShell, bin_name: &str, names: &[String]) {
    write_completions::<C>(shell, bin_name, names, &mut std::io::stdout());
}

fn add_daemon_names(mut cmd: Command, names: &[String]) -> Command {
    if names.is_empty() {
        return cmd;
    }

    for sub in NAME_SUBCOMMANDS {
        if cmd.find_subcommand(sub).is_none() {
            continue;
        }
        let values = names.to_vec();
        cmd = cmd.mut_subcommand(sub, move |sub_cmd| {
            sub_cmd.mut_arg("name", move |arg| {
                arg.value_parser(PossibleValuesParser::new(values))
            })
        });
    }
    cmd
}

/// Shell from $SHELL.
pub fn detect_shell() -> Option<CompletionShell> {
    std::env::var("SHELL").ok().and_then(|s| {
        if s.contains("zsh") {
            Some(CompletionShell::Zsh)
        } else if s.contains("bash") {
            Some(CompletionShell::Bash)
        } else if s.contains("fish") {
            Some(CompletionShell::Fish)
        } else if s.contains("pwsh") || s.contains("powershell") {
            Some(CompletionShell::PowerShell)
        } else if s.contains("elvish") {
            Some(CompletionShell::Elvish)
        } else {
            None
        }
    })
}
