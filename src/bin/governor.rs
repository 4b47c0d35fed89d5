//! daemon-governor: privileged registrar and verified launcher.
//!
//! `register` records a wrapper's hash in the root-owned allowlist and must
//! run as root (via sudo). `run` is what launchd invokes: it reads the
//! wrapper once, checks the hash of those bytes and hands exactly them to
//! the interpreter.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use daemon_cli::clienv;
use daemon_cli::registrar::exit_status;
use daemon_cli::trust::{TrustStore, Verdict};
use daemon_cli::DaemonError;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
#[error("{0} requires sudo/root privileges.")]
struct NotRoot(&'static str);

#[derive(Parser)]
#[command(name = "daemon-governor")]
#[command(version)]
#[command(about = "Privileged hash registrar and verified launcher for daemon-cli", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a wrapper script's current hash (requires sudo)
    Register {
        /// Name of the daemon
        name: String,
        /// Path to the wrapper script
        path: PathBuf,
    },
    /// Verify a registered wrapper and exec it (invoked by launchd)
    Run {
        /// Name of the daemon
        name: String,
        /// Path to the wrapper script
        path: PathBuf,
    },
    /// Show registrations and whether they still verify
    Status {
        /// Only show this daemon
        name: Option<String>,
    },
    /// Forget a registration (requires sudo)
    Unregister {
        /// Name of the daemon
        name: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(clienv::log_filter()))
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();
    let store = TrustStore::system();

    let result = match cli.command {
        Commands::Register { name, path } => handle_register(&store, &name, &path),
        Commands::Run { name, path } => handle_run(&store, &name, &path),
        Commands::Status { name } => handle_status(&store, name.as_deref()),
        Commands::Unregister { name } => handle_unregister(&store, &name),
    };

    if let Err(e) = result {
        if e.downcast_ref::<DaemonError>().is_some_and(DaemonError::is_integrity) {
            eprintln!("Security Alert: {e:#}. Refusing to run it; re-register with `daemon edit`.");
        } else {
            eprintln!("daemon-governor: {e:#}");
        }
        std::process::exit(exit_code(&e));
    }
}

/// Status the unprivileged CLI maps back to an error kind.
fn exit_code(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<NotRoot>().is_some() {
        return exit_status::NO_PERMISSION;
    }
    match error.downcast_ref::<DaemonError>() {
        Some(DaemonError::IntegrityFailure { .. } | DaemonError::NotFound(_)) => {
            exit_status::TAMPERED
        }
        _ => exit_status::IO_ERROR,
    }
}

fn require_root(action: &'static str) -> Result<()> {
    if clienv::effective_uid() != 0 {
        return Err(NotRoot(action).into());
    }
    Ok(())
}

fn handle_register(store: &TrustStore, name: &str, path: &Path) -> Result<()> {
    require_root("Registration")?;
    daemon_cli::paths::validate_name(name)?;

    let run_as = clienv::sudo_user().unwrap_or_else(|| "root".to_string());
    let registration = store
        .register(name, path, &run_as)
        .with_context(|| format!("Failed to register {}", path.display()))?;

    println!("Registered '{}' ({})", name, &registration.hash[..12]);
    Ok(())
}

fn handle_run(store: &TrustStore, name: &str, path: &Path) -> Result<()> {
    let script = store.prepare_run(name, path)?;
    let mut command = script.command()?;
    tracing::debug!(name, run_as = %script.registration.run_as, "Wrapper verified");
    exec_as(&mut command, &script.registration.run_as)
}

#[cfg(unix)]
fn exec_as(command: &mut std::process::Command, run_as: &str) -> Result<()> {
    use std::os::unix::process::CommandExt;

    if clienv::effective_uid() == 0 {
        match clienv::user_ids(run_as) {
            Some((uid, gid)) if uid != 0 => {
                tracing::debug!(user = run_as, uid, gid, "Dropping privileges");
                command.uid(uid).gid(gid);
            }
            Some(_) => {}
            None => bail!("Registered user '{run_as}' does not exist"),
        }
    }

    // Only returns on failure.
    let err = command.exec();
    Err(anyhow!("Failed to execute script: {err}"))
}

#[cfg(not(unix))]
fn exec_as(command: &mut std::process::Command, _run_as: &str) -> Result<()> {
    let status = command.status().context("Failed to execute script")?;
    std::process::exit(status.code().unwrap_or(1));
}

fn handle_status(store: &TrustStore, name: Option<&str>) -> Result<()> {
    let entries = store
        .audit()
        .with_context(|| format!("Failed to read {}", store.path().display()))?;

    let mut shown = 0;
    for (entry_name, registration, verdict) in entries {
        if name.is_some_and(|n| n != entry_name) {
            continue;
        }
        let verdict = match verdict {
            Verdict::Verified => "verified",
            Verdict::Modified => "MODIFIED",
            Verdict::Missing => "missing",
        };
        println!(
            "{:<24} {:<9} {} (run as {})",
            entry_name,
            verdict,
            registration.path.display(),
            registration.run_as
        );
        shown += 1;
    }

    if shown == 0 {
        match name {
            Some(name) => bail!("Job '{name}' not found in allowlist."),
            None => println!("No registered daemons."),
        }
    }
    Ok(())
}

fn handle_unregister(store: &TrustStore, name: &str) -> Result<()> {
    require_root("Unregistering")?;
    if store.unregister(name)? {
        println!("Unregistered '{name}'");
    } else {
        println!("'{name}' was not registered");
    }
    Ok(())
}
