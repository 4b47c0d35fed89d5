//! Daemon lifecycle: create, edit, restart, stop, remove, list.
//!
//! Every flow is a sequential pipeline over the external collaborators:
//!
//! ```text
//! create:  name ─► trial run ─► wrapper ─► governor register ─► plist ─► logrotate ─► bootstrap ─► cron
//! edit:    hash ─► $EDITOR ─► hash ─► (changed) governor register ─► restart
//! remove:  bootout ─► delete artifacts ─► prune cron ─► (confirmed) delete logs
//! ```
//!
//! Steps that establish trust (wrapper, registration, start) abort the flow;
//! housekeeping steps (bootout, forced rotation, cron pruning) only warn.

use crate::error::{DaemonError, Result};
use crate::launchd::{self, LaunchdOptions, Launchctl, Supervisor};
use crate::logrotate::{self, Crontab, LogrotateOptions, Logrotate, Rotation, RotationEngine, Scheduler};
use crate::paths::{self, DaemonPaths, Layout};
use crate::process::{self, TrialOutcome};
use crate::registrar::{Registrar, SudoGovernor};
use crate::trust;
use crate::ui::{Prompter, Terminal};
use crate::user_config::UserConfig;
use crate::wrapper;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    pub name: Option<String>,
    pub command: Option<String>,
    pub rotation: Option<Rotation>,
    pub keep: Option<u32>,
    pub compress: Option<bool>,
    pub keep_alive: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Running,
    Stopped,
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("Running"),
            Self::Stopped => f.write_str("Stopped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonStatus {
    pub name: String,
    pub state: DaemonState,
    pub pid: Option<u32>,
    pub log_size: u64,
    /// Recovered from the wrapper; informational only.
    pub command: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Unchanged,
    Reregistered,
}

pub type SystemLifecycle = Lifecycle<Launchctl, SudoGovernor, Crontab, Logrotate, Terminal>;

pub struct Lifecycle<S, R, C, E, U> {
    layout: Layout,
    supervisor: S,
    registrar: R,
    scheduler: C,
    rotation: E,
    ui: U,
    governor: PathBuf,
    logrotate: PathBuf,
    defaults: UserConfig,
}

impl SystemLifecycle {
    pub fn system(defaults: UserConfig) -> Self {
        let registrar = SudoGovernor::default();
        let rotation = Logrotate::default();
        let governor = registrar.governor().to_path_buf();
        let logrotate = rotation.binary().to_path_buf();

        Lifecycle::new(
            Layout::from_env(),
            Launchctl::new(),
            registrar,
            Crontab,
            rotation,
            Terminal::new(),
        )
        .with_governor(governor)
        .with_logrotate(logrotate)
        .with_defaults(defaults)
    }
}

impl<S, R, C, E, U> Lifecycle<S, R, C, E, U>
where
    S: Supervisor,
    R: Registrar,
    C: Scheduler,
    E: RotationEngine,
    U: Prompter,
{
    pub fn new(layout: Layout, supervisor: S, registrar: R, scheduler: C, rotation: E, ui: U) -> Self {
        Self {
            layout,
            supervisor,
            registrar,
            scheduler,
            rotation,
            ui,
            governor: PathBuf::from("daemon-governor"),
            logrotate: PathBuf::from("logrotate"),
            defaults: UserConfig::default(),
        }
    }

    pub fn with_governor(mut self, governor: PathBuf) -> Self {
        self.governor = governor;
        self
    }

    pub fn with_logrotate(mut self, logrotate: PathBuf) -> Self {
        self.logrotate = logrotate;
        self
    }

    pub fn with_defaults(mut self, defaults: UserConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn supervisor(&self) -> &S {
        &self.supervisor
    }

    pub fn registrar(&self) -> &R {
        &self.registrar
    }

    pub fn scheduler(&self) -> &C {
        &self.scheduler
    }

    pub fn rotation(&self) -> &E {
        &self.rotation
    }

    pub fn ui(&self) -> &U {
        &self.ui
    }

    fn trial_timeout(&self) -> Duration {
        self.defaults.trial_timeout()
    }

    /// Resolve paths for a managed daemon, or `NotFound`.
    fn managed_paths(&self, name: &str) -> Result<DaemonPaths> {
        paths::validate_name(name)?;
        if !self.layout.is_managed(name) {
            return Err(DaemonError::NotFound(name.to_string()));
        }
        Ok(self.layout.paths(name))
    }

    /// Tell the user what an aborted create left on disk.
    fn report_leftovers(&self, name: &str, created: &[PathBuf]) {
        if created.is_empty() {
            return;
        }
        self.ui
            .warn(&format!("Creation of '{name}' aborted; these files were already created:"));
        for path in created {
            self.ui.warn(&format!("  {}", path.display()));
        }
        self.ui.warn(&format!(
            "Remove them with `daemon rm {name}` or fix the problem and re-run."
        ));
    }

    fn or_report<T>(&self, name: &str, created: &[PathBuf], result: Result<T>) -> Result<T> {
        result.inspect_err(|_| self.report_leftovers(name, created))
    }

    pub async fn create(&self, request: CreateRequest) -> Result<DaemonPaths> {
        let name = match request.name {
            Some(name) => name,
            None => self.ui.ask_text("Name of the daemon?", None)?,
        };
        paths::validate_name(&name)?;

        let paths = self.layout.paths(&name);
        if paths.rotation_config.exists() {
            return Err(DaemonError::DuplicateDaemon(name));
        }

        let command = match request.command {
            Some(command) => command,
            None => self.ui.ask_text("Shell command to run?", None)?,
        };
        if command.trim().is_empty() {
            return Err(DaemonError::ValidationFailure {
                detail: "command is empty".to_string(),
            });
        }

        self.ui.progress("Validating command...");
        match process::validate_command(&command, self.trial_timeout()).await {
            Ok(TrialOutcome::StillRunning) => self.ui.progress_done("Command started successfully."),
            Ok(TrialOutcome::ExitedCleanly) => self
                .ui
                .progress_done("Command exited immediately, but code was 0. Proceeding..."),
            Err(e) => {
                self.ui.warn("Command validation failed. Aborting.");
                return Err(e);
            }
        }

        let rotation = match request.rotation.or(self.defaults.rotation) {
            Some(rotation) => rotation,
            None => {
                let options: Vec<String> = Rotation::ALL.iter().map(|r| r.to_string()).collect();
                Rotation::ALL[self.ui.ask_choice("Log rotation frequency?", &options)?]
            }
        };
        let keep = match request.keep.or(self.defaults.keep) {
            Some(keep) => keep,
            None => {
                let answer = self
                    .ui
                    .ask_text("Keep how many logs?", Some(&self.defaults.keep().to_string()))?;
                answer
                    .trim()
                    .parse()
                    .map_err(|_| DaemonError::ValidationFailure {
                        detail: format!("'{}' is not a number of log files to keep", answer.trim()),
                    })?
            }
        };
        let compress = request.compress.unwrap_or_else(|| self.defaults.compress());
        let keep_alive = request.keep_alive.unwrap_or_else(|| self.defaults.keep_alive());

        self.ui.progress("Preparing environment...");
        self.layout.ensure_directories()?;

        let mut created = Vec::new();

        self.ui.progress("Generating wrapper...");
        let wrapper_path = wrapper::generate(&paths, &command)?;
        created.push(wrapper_path.clone());
        self.ui.progress_done("Wrapper generated.");

        // sudo may prompt; progress_done above released the terminal.
        self.ui.info(&format!(
            "Registering '{name}' with sudo for security (hashing)..."
        ));
        if let Err(e) = self.registrar.register(&name, &wrapper_path).await {
            self.report_leftovers(&name, &created);
            return Err(e);
        }

        self.ui.progress("Generating remaining files...");
        let descriptor = self.or_report(
            &name,
            &created,
            launchd::generate(&name, &paths, &self.governor, LaunchdOptions { keep_alive }),
        )?;
        created.push(descriptor.clone());
        let policy = self.or_report(
            &name,
            &created,
            logrotate::generate(&paths, LogrotateOptions { rotation, keep, compress }),
        )?;
        created.push(policy.clone());
        self.ui.progress_done("Files generated.");

        self.ui.info(&format!("Created wrapper at {}", wrapper_path.display()));
        self.ui.info(&format!("Generated plist at {}", descriptor.display()));
        self.ui.info(&format!("Configured logrotate for {}", policy.display()));

        self.ui.progress("Starting service via launchctl...");
        if let Err(e) = self.supervisor.start(&descriptor).await {
            self.ui.warn(&format!("Failed to start service '{name}'."));
            self.report_leftovers(&name, &created);
            return Err(e);
        }
        self.ui.progress_done(&format!("Service '{name}' started."));

        // The daemon is already running; a missing trigger only stops rotation.
        if let Err(e) =
            logrotate::ensure_scheduled_trigger(&self.scheduler, &self.layout, &self.logrotate).await
        {
            warn!(name = %name, error = %e, "Installing cron trigger failed");
            self.ui.warn(&format!(
                "The logrotate cron entry could not be installed ({e}); logs will not rotate until the next `daemon create` succeeds in adding it."
            ));
        }

        info!(name = %name, "Daemon created");
        self.ui.success(&format!("Daemon '{name}' is running."));
        Ok(paths)
    }

    pub async fn edit(&self, name: &str) -> Result<EditOutcome> {
        paths::validate_name(name)?;
        let paths = self.layout.paths(name);
        if !paths.wrapper.exists() {
            return Err(DaemonError::NotFound(name.to_string()));
        }

        let before = trust::hash_file(&paths.wrapper)?;
        self.ui.edit_file(&paths.wrapper)?;
        let after = trust::hash_file(&paths.wrapper)?;

        if before == after {
            self.ui.info("No changes detected. Exiting.");
            return Ok(EditOutcome::Unchanged);
        }

        self.ui.info(&format!("Updating hash for '{name}'..."));
        if let Err(e) = self.registrar.register(name, &paths.wrapper).await {
            self.ui.warn(&format!(
                "'{name}' has unregistered changes; launchd will refuse to run them until `daemon edit {name}` registers them."
            ));
            return Err(e);
        }
        self.ui.success(&format!("Hash updated for '{name}'."));

        self.restart(name).await?;
        Ok(EditOutcome::Reregistered)
    }

    pub async fn restart(&self, name: &str) -> Result<()> {
        let paths = self.managed_paths(name)?;

        self.ui.progress(&format!("Restarting service '{name}'..."));
        if let Err(e) = self.supervisor.stop(&paths.descriptor).await {
            warn!(name, error = %e, "Stop before restart failed");
            self.ui.warn(&format!("Failed to stop '{name}': {e}"));
        }

        self.ui.progress(&format!("Rotating logs for '{name}'..."));
        if let Err(e) = self
            .rotation
            .force(&paths.rotation_config, &self.layout.state_file)
            .await
        {
            warn!(name, error = %e, "Forced rotation failed");
            self.ui.warn(&format!("Failed to rotate logs: {e}"));
        }

        self.ui.progress(&format!("Starting service '{name}'..."));
        if let Err(e) = self.supervisor.start(&paths.descriptor).await {
            self.ui.warn(&format!("Failed to start service '{name}'."));
            return Err(e);
        }
        self.ui.progress_done(&format!("Service '{name}' restarted."));
        self.ui.success(&format!("Daemon '{name}' has been restarted."));
        Ok(())
    }

    pub async fn stop(&self, name: &str) -> Result<()> {
        let paths = self.managed_paths(name)?;

        self.ui.progress(&format!("Stopping service '{name}'..."));
        self.supervisor.stop(&paths.descriptor).await?;
        self.ui.progress_done(&format!("Service '{name}' stopped."));
        self.ui.success(&format!("Daemon '{name}' has been stopped."));
        Ok(())
    }

    /// Tear a daemon down. `delete_logs = None` asks when logs exist.
    pub async fn remove(&self, name: &str, delete_logs: Option<bool>) -> Result<()> {
        paths::validate_name(name)?;
        let paths = self.layout.paths(name);

        self.ui.progress(&format!("Stopping service '{name}'..."));
        if let Err(e) = self.supervisor.stop(&paths.descriptor).await {
            warn!(name, error = %e, "Unload during remove failed");
            self.ui.warn(&format!("Failed to stop '{name}': {e}"));
        }

        self.ui.progress("Cleaning up files...");
        for artifact in [&paths.descriptor, &paths.wrapper, &paths.rotation_config] {
            remove_if_exists(artifact)?;
        }
        if let Err(e) = logrotate::prune_scheduled_trigger_if_unused(&self.scheduler, &self.layout).await {
            warn!(error = %e, "Pruning cron trigger failed");
            self.ui.warn(&format!("Failed to clean up the logrotate cron entry: {e}"));
        }
        self.ui.progress_done("Files cleaned up.");

        let mut logs = self.layout.rotated_logs(name)?;
        if paths.log.exists() {
            logs.insert(0, paths.log.clone());
        }
        if !logs.is_empty() {
            let delete = match delete_logs {
                Some(delete) => delete,
                None => self.ui.ask_confirm(&format!("Delete logs for '{name}'?"), false)?,
            };
            if delete {
                self.ui.progress("Deleting logs...");
                for log in &logs {
                    remove_if_exists(log)?;
                }
                self.ui.progress_done("Logs deleted.");
            }
        }

        info!(name, "Daemon removed");
        self.ui.success(&format!("Daemon '{name}' removed."));
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<DaemonStatus>> {
        let names = self.layout.managed_names()?;
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let units = self.supervisor.list().await?;
        Ok(names
            .into_iter()
            .map(|name| {
                let label = paths::label(&name);
                let pid = units.iter().find(|u| u.label == label).and_then(|u| u.pid);
                let paths = self.layout.paths(&name);
                let log_size = fs::metadata(&paths.log).map(|m| m.len()).unwrap_or(0);
                let command = fs::read_to_string(&paths.wrapper)
                    .ok()
                    .and_then(|content| wrapper::recover_command(&content));

                DaemonStatus {
                    state: if pid.is_some() {
                        DaemonState::Running
                    } else {
                        DaemonState::Stopped
                    },
                    name,
                    pid,
                    log_size,
                    command,
                }
            })
            .collect())
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests;
