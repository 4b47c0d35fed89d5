use clap::{Parser, Subcommand};
use daemon_cli::completions::CompletionShell;
use daemon_cli::logrotate::Rotation;

#[derive(Parser)]
#[command(name = "daemon")]
#[command(version)]
#[command(about = "Run shell commands as hash-verified launchd daemons", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Create and start a new daemon
    Create {
        /// Name of the daemon (prompted when omitted)
        name: Option<String>,

        /// Shell command to run (prompted when omitted)
        command: Option<String>,

        /// Log rotation interval
        #[arg(long, value_enum)]
        rotation: Option<Rotation>,

        /// Number of rotated log files to keep
        #[arg(long)]
        keep: Option<u32>,

        /// Compress rotated logs
        #[arg(long, conflicts_with = "no_compress")]
        compress: bool,

        /// Do not compress rotated logs
        #[arg(long)]
        no_compress: bool,

        /// Run once per load instead of restarting on exit
        #[arg(long)]
        no_keep_alive: bool,
    },

    /// List all managed daemons
    #[command(visible_alias = "ls")]
    List,

    /// Remove a managed daemon
    #[command(visible_alias = "remove")]
    Rm {
        /// Daemon name
        name: String,

        /// Delete the daemon's logs without asking
        #[arg(long, conflicts_with = "keep_logs")]
        delete_logs: bool,

        /// Keep the daemon's logs without asking
        #[arg(long)]
        keep_logs: bool,
    },

    /// Stop a managed daemon
    Stop {
        /// Daemon name
        name: String,
    },

    /// Restart a managed daemon (rotates its log first)
    Restart {
        /// Daemon name
        name: String,
    },

    /// Edit a daemon's wrapper script and re-register it
    Edit {
        /// Daemon name
        name: String,
    },

    /// Show a daemon's log
    Logs {
        /// Daemon name
        name: String,

        /// Follow log output until Ctrl+C
        #[arg(short = 'f', long, visible_alias = "follow")]
        tail: bool,

        /// Number of recent lines to show
        #[arg(short = 'n', long, default_value_t = daemon_cli::logs::DEFAULT_LINES)]
        lines: u32,
    },

    /// Generate shell completion scripts
    Completion {
        /// Target shell (detected from $SHELL when omitted)
        #[arg(value_enum)]
        shell: Option<CompletionShell>,
    },

    /// Print managed daemon names, one per line
    #[command(hide = true)]
    CompletionNames,
}

impl Commands {
    /// Commands that only read local state and work anywhere.
    pub(crate) fn skips_preflight(&self) -> bool {
        matches!(self, Self::Completion { .. } | Self::CompletionNames)
    }
}
