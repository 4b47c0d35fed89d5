//! Interaction capability used by the lifecycle flows.
//!
//! Flows never talk to the terminal directly, so they can be driven by a
//! scripted implementation in tests.

use crate::error::{DaemonError, Result};
use dialoguer::console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

pub mod icons {
    pub const INFO: &str = "ℹ";
    pub const SUCCESS: &str = "✔";
    pub const WARNING: &str = "⚠";
    pub const ERROR: &str = "✖";
}

pub trait Prompter {
    fn ask_text(&self, prompt: &str, default: Option<&str>) -> Result<String>;
    /// Index of the chosen option.
    fn ask_choice(&self, prompt: &str, options: &[String]) -> Result<usize>;
    fn ask_confirm(&self, prompt: &str, default: bool) -> Result<bool>;

    /// Start or update the progress indicator.
    fn progress(&self, message: &str);
    /// Stop the progress indicator, leaving `message` behind.
    fn progress_done(&self, message: &str);

    fn info(&self, message: &str);
    fn success(&self, message: &str);
    fn warn(&self, message: &str);

    /// Open `path` in the user's editor and wait for it to close.
    fn edit_file(&self, path: &Path) -> Result<()>;
}

/// dialoguer prompts, an indicatif spinner and `$EDITOR`.
#[derive(Default)]
pub struct Terminal {
    spinner: Mutex<Option<ProgressBar>>,
}

impl Terminal {
    pub fn new() -> Self {
        Self::default()
    }

    fn require_tty(&self, prompt: &str) -> Result<()> {
        if std::io::stdin().is_terminal() {
            return Ok(());
        }
        Err(DaemonError::Io(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            format!("'{prompt}' needs an answer but stdin is not a terminal; pass it as an argument"),
        )))
    }

    /// Stop any spinner so prompts and child processes own the terminal.
    fn suspend_spinner(&self) {
        if let Ok(mut spinner) = self.spinner.lock() {
            if let Some(pb) = spinner.take() {
                pb.finish_and_clear();
            }
        }
    }
}

fn prompt_error(e: dialoguer::Error) -> DaemonError {
    DaemonError::Io(std::io::Error::other(e.to_string()))
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(spinner_style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

impl Prompter for Terminal {
    fn ask_text(&self, prompt: &str, default: Option<&str>) -> Result<String> {
        self.suspend_spinner();
        self.require_tty(prompt)?;

        let theme = ColorfulTheme::default();
        let mut input = Input::<String>::with_theme(&theme)
            .with_prompt(prompt)
            .validate_with(|value: &String| -> std::result::Result<(), &str> {
                if value.trim().is_empty() {
                    Err("Value is required")
                } else {
                    Ok(())
                }
            });
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        input
            .interact_text()
            .map(|value| value.trim().to_string())
            .map_err(prompt_error)
    }

    fn ask_choice(&self, prompt: &str, options: &[String]) -> Result<usize> {
        self.suspend_spinner();
        self.require_tty(prompt)?;

        Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(options)
            .default(0)
            .interact_opt()
            .map_err(prompt_error)?
            .ok_or(DaemonError::UserCancelled)
    }

    fn ask_confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        self.suspend_spinner();
        self.require_tty(prompt)?;

        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(default)
            .interact_opt()
            .map_err(prompt_error)?
            .ok_or(DaemonError::UserCancelled)
    }

    fn progress(&self, message: &str) {
        let Ok(mut spinner) = self.spinner.lock() else {
            return;
        };
        match spinner.as_ref() {
            Some(pb) => pb.set_message(message.to_string()),
            None => *spinner = Some(create_spinner(message)),
        }
    }

    fn progress_done(&self, message: &str) {
        self.suspend_spinner();
        println!("{} {}", style(icons::SUCCESS).green(), message);
    }

    fn info(&self, message: &str) {
        self.suspend_spinner();
        println!("{} {}", style(icons::INFO).cyan(), message);
    }

    fn success(&self, message: &str) {
        self.suspend_spinner();
        println!("{} {}", style(icons::SUCCESS).green().bold(), message);
    }

    fn warn(&self, message: &str) {
        self.suspend_spinner();
        eprintln!("{} {}", style(icons::WARNING).yellow(), style(message).yellow());
    }

    fn edit_file(&self, path: &Path) -> Result<()> {
        self.suspend_spinner();

        // Through the shell so EDITOR may carry arguments ("code --wait").
        let editor = crate::clienv::editor();
        let command = format!(
            "{} {}",
            editor,
            crate::wrapper::shell_quote(&path.display().to_string())
        );
        tracing::debug!(command = %command, "Opening editor");

        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .status()
            .map_err(|e| DaemonError::tool(editor.clone(), e.to_string()))?;

        if !status.success() {
            return Err(DaemonError::tool(
                editor,
                format!("exited with code {:?}", status.code()),
            ));
        }
        Ok(())
    }
}

/// Print a fatal error the way the CLI reports it.
pub fn print_error(error: &DaemonError) {
    if error.is_integrity() {
        eprintln!(
            "{} {}",
            style(icons::ERROR).red().bold(),
            style(error).red().bold().underlined()
        );
    } else {
        eprintln!("{} {}", style(icons::ERROR).red(), error);
    }
}

/// Human-readable byte size ("0 B", "1.5 KB", ...).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}
