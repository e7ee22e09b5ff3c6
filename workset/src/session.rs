//! Workspace sessions hosted by tmux, screen, or run directly (exec).
//!
//! Every entry point normalizes the session name first, so the stored record
//! key is the same no matter how the caller spelled it. `auto` is resolved to
//! a concrete backend before any command runs and the concrete name is what
//! gets persisted.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::backend::{AUTO_ORDER, Backend, BackendPreference, parse_backend, screen_has_session};
use crate::core::policy::FailurePolicy;
use crate::core::session_name::{default_session_name, normalize};
use crate::core::types::{Defaults, SessionRecord, WorkspaceState};
use crate::error::WorksetError;
use crate::io::manifest::manifest_path;
use crate::io::process::{CommandSpec, ProcessRunner};
use crate::io::state::{load_state, save_state, timestamp};

pub const ENV_ROOT: &str = "WORKSET_ROOT";
pub const ENV_CONFIG: &str = "WORKSET_CONFIG";
pub const ENV_WORKSPACE: &str = "WORKSET_WORKSPACE";

/// What a backend needs to launch a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub name: String,
    pub root: PathBuf,
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    pub interactive: bool,
}

/// Capabilities shared by every backend.
pub trait SessionHandler {
    fn start(&self, runner: &dyn ProcessRunner, launch: &LaunchSpec) -> Result<()>;
    /// `nested` is true when the caller already runs inside this multiplexer.
    fn attach(&self, runner: &dyn ProcessRunner, name: &str, nested: bool) -> Result<()>;
    fn stop(&self, runner: &dyn ProcessRunner, name: &str) -> Result<()>;
    /// `Ok(false)` means not running; `Err` means the probe itself could not run.
    fn probe(&self, runner: &dyn ProcessRunner, name: &str) -> Result<bool>;
}

struct TmuxHandler;
struct ScreenHandler;
struct ExecHandler;

pub fn handler(backend: Backend) -> &'static dyn SessionHandler {
    match backend {
        Backend::Tmux => &TmuxHandler,
        Backend::Screen => &ScreenHandler,
        Backend::Exec => &ExecHandler,
    }
}

fn multiplexer_command(backend: Backend, args: Vec<String>) -> CommandSpec {
    CommandSpec::new(backend.program().unwrap_or_default()).args(args)
}

fn launch_command(backend: Backend, launch: &LaunchSpec) -> CommandSpec {
    let root = launch.root.display().to_string();
    let mut spec = multiplexer_command(backend, backend.start_args(&launch.name, &root, &launch.command))
        .current_dir(&launch.root);
    for (key, value) in &launch.env {
        spec = spec.env(key, value);
    }
    spec
}

impl SessionHandler for TmuxHandler {
    fn start(&self, runner: &dyn ProcessRunner, launch: &LaunchSpec) -> Result<()> {
        runner.run_checked(&launch_command(Backend::Tmux, launch))?;
        Ok(())
    }

    fn attach(&self, runner: &dyn ProcessRunner, name: &str, nested: bool) -> Result<()> {
        let spec = multiplexer_command(Backend::Tmux, Backend::Tmux.attach_args(name, nested))
            .interactive(true);
        runner.run_checked(&spec)?;
        Ok(())
    }

    fn stop(&self, runner: &dyn ProcessRunner, name: &str) -> Result<()> {
        runner.run_checked(&multiplexer_command(Backend::Tmux, Backend::Tmux.stop_args(name)))?;
        Ok(())
    }

    fn probe(&self, runner: &dyn ProcessRunner, name: &str) -> Result<bool> {
        let output = runner.run(&multiplexer_command(Backend::Tmux, Backend::Tmux.probe_args(name)))?;
        Ok(output.success())
    }
}

impl SessionHandler for ScreenHandler {
    fn start(&self, runner: &dyn ProcessRunner, launch: &LaunchSpec) -> Result<()> {
        runner.run_checked(&launch_command(Backend::Screen, launch))?;
        Ok(())
    }

    fn attach(&self, runner: &dyn ProcessRunner, name: &str, nested: bool) -> Result<()> {
        let spec = multiplexer_command(Backend::Screen, Backend::Screen.attach_args(name, nested))
            .interactive(true);
        runner.run_checked(&spec)?;
        Ok(())
    }

    fn stop(&self, runner: &dyn ProcessRunner, name: &str) -> Result<()> {
        runner.run_checked(&multiplexer_command(Backend::Screen, Backend::Screen.stop_args(name)))?;
        Ok(())
    }

    // `screen -ls` exits non-zero even when it lists sessions; only stdout counts.
    fn probe(&self, runner: &dyn ProcessRunner, name: &str) -> Result<bool> {
        let output =
            runner.run(&multiplexer_command(Backend::Screen, Backend::Screen.probe_args(name)))?;
        Ok(screen_has_session(&output.stdout, name))
    }
}

impl SessionHandler for ExecHandler {
    fn start(&self, runner: &dyn ProcessRunner, launch: &LaunchSpec) -> Result<()> {
        let (program, args) = match launch.command.split_first() {
            Some((program, args)) => (program.clone(), args.to_vec()),
            None => (default_shell(), Vec::new()),
        };
        let mut spec = CommandSpec::new(program)
            .args(args)
            .current_dir(&launch.root)
            .interactive(launch.interactive);
        for (key, value) in &launch.env {
            spec = spec.env(key, value);
        }
        runner.run_checked(&spec)?;
        Ok(())
    }

    fn attach(&self, _runner: &dyn ProcessRunner, name: &str, _nested: bool) -> Result<()> {
        Err(unsupported_exec(name))
    }

    fn stop(&self, _runner: &dyn ProcessRunner, name: &str) -> Result<()> {
        Err(unsupported_exec(name))
    }

    fn probe(&self, _runner: &dyn ProcessRunner, _name: &str) -> Result<bool> {
        Ok(false)
    }
}

fn unsupported_exec(name: &str) -> anyhow::Error {
    WorksetError::validation(format!(
        "session {name} uses unsupported backend exec (exec sessions cannot be re-entered)"
    ))
    .into()
}

fn default_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|shell| !shell.trim().is_empty())
        .unwrap_or_else(|| "sh".to_string())
}

/// Turn a preference into a concrete backend.
///
/// A fixed multiplexer must be on `PATH`. `auto` takes the first installed
/// multiplexer and falls back to exec.
pub fn resolve_backend<R: ProcessRunner + ?Sized>(
    runner: &R,
    preference: BackendPreference,
) -> Result<Backend> {
    match preference {
        BackendPreference::Fixed(Backend::Exec) => Ok(Backend::Exec),
        BackendPreference::Fixed(backend) => {
            let program = backend.program().unwrap_or_default();
            runner.look_path(program).map_err(|err| {
                WorksetError::not_found(format!("{backend} not available: {err:#}"))
            })?;
            Ok(backend)
        }
        BackendPreference::Auto => {
            let found = AUTO_ORDER.into_iter().find(|backend| {
                backend
                    .program()
                    .is_some_and(|program| runner.look_path(program).is_ok())
            });
            debug!(backend = ?found, "resolved auto backend");
            Ok(found.unwrap_or(Backend::Exec))
        }
    }
}

fn inside_multiplexer(backend: Backend) -> bool {
    backend
        .nested_env_var()
        .and_then(std::env::var_os)
        .is_some_and(|value| !value.is_empty())
}

/// The workspace a session call operates on.
#[derive(Debug, Clone, Copy)]
pub struct SessionScope<'a> {
    pub workspace: &'a str,
    pub root: &'a Path,
    pub defaults: &'a Defaults,
}

impl SessionScope<'_> {
    fn default_name(&self) -> String {
        default_session_name(&self.defaults.session_name_format, self.workspace)
    }

    fn preference(&self, requested: &str) -> Result<BackendPreference, WorksetError> {
        match requested.trim() {
            "" => parse_backend(&self.defaults.session_backend),
            requested => parse_backend(requested),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    /// Empty uses the configured name format.
    pub name: String,
    /// Empty uses `defaults.session_backend`.
    pub backend: String,
    pub command: Vec<String>,
    pub attach: bool,
    pub interactive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StartOutcome {
    pub name: String,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    pub attached: bool,
    pub persisted: bool,
    pub warnings: Vec<String>,
}

/// Start a session in the workspace root.
///
/// tmux and screen sessions are recorded in the workspace state; exec runs to
/// completion and leaves no record.
#[instrument(skip_all, fields(workspace = scope.workspace, backend = %request.backend))]
pub fn start<R: ProcessRunner>(
    runner: &R,
    scope: &SessionScope<'_>,
    request: &StartRequest,
) -> Result<StartOutcome> {
    let preference = scope.preference(&request.backend)?;
    let backend = resolve_backend(runner, preference)?;
    if request.interactive && backend != Backend::Exec {
        return Err(WorksetError::validation(
            "--interactive is only supported with the exec backend (use --backend exec)",
        )
        .into());
    }

    let requested = match request.name.trim() {
        "" => scope.default_name(),
        name => name.to_string(),
    };
    let normalized = normalize(&requested)?;
    let name = normalized.name.clone();
    let handler = handler(backend);
    let mut state = load_state(scope.root)?;
    if backend.is_persistent() {
        ensure_available(runner, handler, &state, &name, backend)?;
    }

    let launch = LaunchSpec {
        name: name.clone(),
        root: scope.root.to_path_buf(),
        command: request.command.clone(),
        env: vec![
            (ENV_ROOT.to_string(), scope.root.display().to_string()),
            (
                ENV_CONFIG.to_string(),
                manifest_path(scope.root).display().to_string(),
            ),
            (ENV_WORKSPACE.to_string(), scope.workspace.to_string()),
        ],
        interactive: request.interactive,
    };
    handler
        .start(runner, &launch)
        .with_context(|| format!("start {backend} session {name}"))?;

    let mut outcome = StartOutcome {
        name: name.clone(),
        backend: backend.as_str().to_string(),
        notice: normalized.notice(),
        ..StartOutcome::default()
    };
    if !backend.is_persistent() {
        if request.attach {
            outcome
                .warnings
                .push("attach ignored: exec sessions run in the foreground".to_string());
        }
        return Ok(outcome);
    }

    state.sessions.insert(
        name.clone(),
        SessionRecord {
            backend: backend.as_str().to_string(),
            name: name.clone(),
            command: request.command.clone(),
            started_at: timestamp(),
            last_attached: String::new(),
        },
    );
    save_state(scope.root, &state)?;
    outcome.persisted = true;
    info!(session = %name, %backend, "session started");

    if request.attach {
        match handler.attach(runner, &name, inside_multiplexer(backend)) {
            Ok(()) => {
                if let Some(record) = state.sessions.get_mut(&name) {
                    record.last_attached = timestamp();
                }
                save_state(scope.root, &state)?;
                outcome.attached = true;
            }
            Err(err) => {
                warn!(session = %name, error = %format!("{err:#}"), "attach after start failed");
                outcome
                    .warnings
                    .push(format!("session {name} started but attach failed: {err:#}"));
            }
        }
    }
    Ok(outcome)
}

fn ensure_available<R: ProcessRunner>(
    runner: &R,
    handler: &dyn SessionHandler,
    state: &WorkspaceState,
    name: &str,
    backend: Backend,
) -> Result<()> {
    if let Some(existing) = state.sessions.get(name) {
        let recorded = existing.backend.trim();
        if !recorded.is_empty() && recorded != backend.as_str() {
            return Err(WorksetError::conflict(format!(
                "session {name} already recorded with backend {recorded}"
            ))
            .into());
        }
    }
    if handler.probe(runner, name)? {
        return Err(WorksetError::conflict(format!("session {name} already running")).into());
    }
    Ok(())
}

/// Attach, stop, or show a session.
#[derive(Debug, Clone, Default)]
pub struct SessionRequest {
    /// Empty resolves to the default session if recorded, else the only one.
    pub name: String,
    /// Used when the record has no backend (or there is no record).
    pub backend: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionOutcome {
    pub name: String,
    pub backend: String,
    /// Liveness before the call; attach and stop are attempted either way.
    pub was_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    pub warnings: Vec<String>,
}

struct Target {
    name: String,
    notice: Option<String>,
}

fn resolve_target(
    state: &WorkspaceState,
    scope: &SessionScope<'_>,
    explicit: &str,
) -> Result<Target, WorksetError> {
    if !explicit.trim().is_empty() {
        let normalized = normalize(explicit)?;
        return Ok(Target {
            notice: normalized.notice(),
            name: normalized.name,
        });
    }
    if let Ok(default) = normalize(&scope.default_name()) {
        if state.sessions.contains_key(&default.name) {
            return Ok(Target {
                name: default.name,
                notice: None,
            });
        }
    }
    let mut names = state.sessions.keys();
    match (names.next(), names.next()) {
        (None, _) => Err(WorksetError::not_found(
            "no sessions recorded; pass --name to choose one",
        )),
        (Some(only), None) => Ok(Target {
            name: only.clone(),
            notice: None,
        }),
        (Some(_), Some(_)) => Err(WorksetError::validation(format!(
            "multiple sessions recorded ({}); pass --name to choose one",
            state.sessions.keys().cloned().collect::<Vec<_>>().join(", ")
        ))),
    }
}

/// Attach the terminal to a tmux or screen session.
#[instrument(skip_all, fields(workspace = scope.workspace, name = %request.name))]
pub fn attach<R: ProcessRunner>(
    runner: &R,
    scope: &SessionScope<'_>,
    request: &SessionRequest,
) -> Result<SessionOutcome> {
    let mut state = load_state(scope.root)?;
    let target = resolve_target(&state, scope, &request.name)?;
    let name = target.name;
    let recorded = state
        .sessions
        .get(&name)
        .map(|record| record.backend.trim().to_string())
        .unwrap_or_default();
    let preference = match recorded.as_str() {
        "" => scope.preference(&request.backend)?,
        recorded => parse_backend(recorded)?,
    };
    let backend = resolve_backend(runner, preference)?;
    let handler = handler(backend);
    if !backend.is_persistent() {
        return Err(unsupported_exec(&name));
    }

    let was_running = handler.probe(runner, &name)?;
    if !was_running {
        debug!(session = %name, "probe reports not running; attaching anyway");
    }
    handler
        .attach(runner, &name, inside_multiplexer(backend))
        .with_context(|| format!("attach {backend} session {name}"))?;
    if let Some(record) = state.sessions.get_mut(&name) {
        record.last_attached = timestamp();
        save_state(scope.root, &state)?;
    }
    Ok(SessionOutcome {
        name,
        backend: backend.as_str().to_string(),
        was_running,
        notice: target.notice,
        warnings: Vec::new(),
    })
}

/// Stop a session and drop its record.
///
/// A record without a backend cannot be stopped safely; `force` drops it
/// without issuing any command.
#[instrument(skip_all, fields(workspace = scope.workspace, name = %request.name, force = force))]
pub fn stop<R: ProcessRunner>(
    runner: &R,
    scope: &SessionScope<'_>,
    request: &SessionRequest,
    force: bool,
) -> Result<SessionOutcome> {
    let mut state = load_state(scope.root)?;
    let target = resolve_target(&state, scope, &request.name)?;
    let name = target.name;
    let mut outcome = SessionOutcome {
        name: name.clone(),
        notice: target.notice,
        ..SessionOutcome::default()
    };

    let record = state.sessions.get(&name);
    let recorded = record
        .map(|record| record.backend.trim().to_string())
        .unwrap_or_default();
    if record.is_some() && recorded.is_empty() && request.backend.trim().is_empty() {
        if !force {
            return Err(missing_backend(&name).into());
        }
        state.sessions.remove(&name);
        save_state(scope.root, &state)?;
        outcome
            .warnings
            .push(format!("session {name} missing backend; record dropped without stopping"));
        return Ok(outcome);
    }

    let preference = match recorded.as_str() {
        "" => scope.preference(&request.backend)?,
        recorded => parse_backend(recorded)?,
    };
    let backend = resolve_backend(runner, preference)?;
    let handler = handler(backend);
    if !backend.is_persistent() {
        return Err(unsupported_exec(&name));
    }
    outcome.backend = backend.as_str().to_string();

    outcome.was_running = handler.probe(runner, &name)?;
    if let Err(err) = handler.stop(runner, &name) {
        if outcome.was_running {
            return Err(err.context(format!("stop {backend} session {name}")));
        }
        debug!(session = %name, error = %format!("{err:#}"), "stop of idle session failed; ignoring");
    }
    if state.sessions.remove(&name).is_some() {
        save_state(scope.root, &state)?;
    }
    info!(session = %name, %backend, "session stopped");
    Ok(outcome)
}

fn missing_backend(name: &str) -> WorksetError {
    WorksetError::validation(format!(
        "session {name} missing backend; use --force to skip"
    ))
}

/// A recorded session with its current liveness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub name: String,
    /// Concrete backend when it could be resolved, else the recorded value.
    pub backend: String,
    pub running: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub started_at: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_attached: String,
    /// Why liveness could not be determined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Every recorded session in the workspace, sorted by name.
///
/// A session whose backend cannot be resolved or probed is reported as not
/// running with `error` set; it never hides the others.
pub fn list<R: ProcessRunner>(runner: &R, root: &Path) -> Result<Vec<SessionStatus>> {
    let state = load_state(root)?;
    Ok(state
        .sessions
        .iter()
        .map(|(name, record)| status_of(runner, name, record))
        .collect())
}

/// One recorded session with liveness.
pub fn show<R: ProcessRunner>(
    runner: &R,
    scope: &SessionScope<'_>,
    name: &str,
) -> Result<SessionStatus> {
    let state = load_state(scope.root)?;
    let target = resolve_target(&state, scope, name)?;
    let record = state
        .sessions
        .get(&target.name)
        .ok_or_else(|| WorksetError::not_found(format!("session {} not found", target.name)))?;
    Ok(status_of(runner, &target.name, record))
}

fn status_of<R: ProcessRunner>(runner: &R, name: &str, record: &SessionRecord) -> SessionStatus {
    let mut status = SessionStatus {
        name: name.to_string(),
        backend: record.backend.clone(),
        running: false,
        command: record.command.clone(),
        started_at: record.started_at.clone(),
        last_attached: record.last_attached.clone(),
        error: None,
    };
    match probe_record(runner, name, record) {
        Ok((backend, running)) => {
            status.backend = backend.as_str().to_string();
            status.running = running;
        }
        Err(err) => {
            warn!(session = name, error = %format!("{err:#}"), "session probe failed");
            status.error = Some(format!("{err:#}"));
        }
    }
    status
}

fn probe_record<R: ProcessRunner>(
    runner: &R,
    name: &str,
    record: &SessionRecord,
) -> Result<(Backend, bool)> {
    if record.backend.trim().is_empty() {
        return Err(anyhow!("missing backend"));
    }
    let backend = resolve_backend(runner, parse_backend(&record.backend)?)?;
    let running = handler(backend).probe(runner, name)?;
    Ok((backend, running))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub stopped: Vec<String>,
    /// Recorded but no longer running; the record was dropped.
    pub not_running: Vec<String>,
    pub warnings: Vec<String>,
}

/// Stop every recorded session of the workspace at `root`.
///
/// Under [`FailurePolicy::Strict`] the first failure aborts the teardown;
/// under `BestEffort` it becomes a warning and the failing record is kept.
/// Progress made before an abort is saved.
#[instrument(skip_all, fields(root = %root.display(), policy = ?policy))]
pub fn stop_all<R: ProcessRunner>(
    runner: &R,
    root: &Path,
    policy: FailurePolicy,
) -> Result<TeardownReport> {
    let mut state = load_state(root)?;
    let before = state.clone();
    let mut report = TeardownReport::default();
    let names: Vec<String> = state.sessions.keys().cloned().collect();

    for name in names {
        let Some(record) = state.sessions.get(&name).cloned() else {
            continue;
        };
        match teardown_one(runner, &name, &record) {
            Ok(was_running) => {
                state.sessions.remove(&name);
                if was_running {
                    report.stopped.push(name);
                } else {
                    report.not_running.push(name);
                }
            }
            Err(err) => {
                if let Err(err) = policy.absorb(err, &mut report.warnings) {
                    if state != before {
                        save_state(root, &state)?;
                    }
                    return Err(err);
                }
            }
        }
    }
    if state != before {
        save_state(root, &state)?;
    }
    Ok(report)
}

fn teardown_one<R: ProcessRunner>(runner: &R, name: &str, record: &SessionRecord) -> Result<bool> {
    let recorded = record.backend.trim();
    if recorded.is_empty() {
        return Err(missing_backend(name).into());
    }
    let backend = match parse_backend(recorded).with_context(|| format!("session {name}"))? {
        BackendPreference::Fixed(backend) if backend.is_persistent() => backend,
        _ => {
            return Err(WorksetError::validation(format!(
                "session {name} uses unsupported backend {recorded}"
            ))
            .into());
        }
    };
    let program = backend
        .program()
        .ok_or_else(|| anyhow!("session {name}: {backend} has no executable"))?;
    runner
        .look_path(program)
        .with_context(|| format!("session {name}: {backend} not available"))?;
    let handler = handler(backend);
    let running = handler
        .probe(runner, name)
        .with_context(|| format!("session {name}: probe failed"))?;
    if !running {
        debug!(session = name, "not running; dropping record");
        return Ok(false);
    }
    handler
        .stop(runner, name)
        .with_context(|| format!("session {name}: stop failed"))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, kind_of};
    use crate::test_support::FakeRunner;

    fn scope<'a>(root: &'a Path, defaults: &'a Defaults) -> SessionScope<'a> {
        SessionScope {
            workspace: "demo",
            root,
            defaults,
        }
    }

    #[test]
    fn auto_prefers_tmux_then_screen_then_exec() {
        let runner = FakeRunner::new();
        assert_eq!(
            resolve_backend(&runner, BackendPreference::Auto).expect("auto"),
            Backend::Tmux
        );
        runner.without_program("tmux");
        assert_eq!(
            resolve_backend(&runner, BackendPreference::Auto).expect("auto"),
            Backend::Screen
        );
        runner.without_program("screen");
        assert_eq!(
            resolve_backend(&runner, BackendPreference::Auto).expect("auto"),
            Backend::Exec
        );
    }

    #[test]
    fn fixed_backend_must_be_installed() {
        let runner = FakeRunner::new();
        runner.without_program("screen");
        let err = resolve_backend(&runner, BackendPreference::Fixed(Backend::Screen))
            .expect_err("missing");
        assert_eq!(kind_of(&err), ErrorKind::NotFound);
    }

    #[test]
    fn interactive_with_multiplexer_runs_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let defaults = Defaults::default();
        let runner = FakeRunner::new();
        let request = StartRequest {
            backend: "tmux".to_string(),
            interactive: true,
            ..StartRequest::default()
        };
        let err = start(&runner, &scope(temp.path(), &defaults), &request).expect_err("reject");
        assert_eq!(kind_of(&err), ErrorKind::Validation);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn interactive_allowed_when_auto_falls_back_to_exec() {
        let temp = tempfile::tempdir().expect("tempdir");
        let defaults = Defaults::default();
        let runner = FakeRunner::new();
        runner.without_program("tmux");
        runner.without_program("screen");
        let request = StartRequest {
            command: vec!["bash".to_string()],
            interactive: true,
            ..StartRequest::default()
        };
        let outcome = start(&runner, &scope(temp.path(), &defaults), &request).expect("start");
        assert_eq!(outcome.backend, "exec");
        assert!(!outcome.persisted);
        let specs = runner.specs();
        assert_eq!(specs.len(), 1);
        assert!(specs[0].interactive);
    }

    #[test]
    fn list_does_not_probe_records_without_backend() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut state = WorkspaceState::default();
        state.sessions.insert(
            "legacy".to_string(),
            SessionRecord {
                name: "legacy".to_string(),
                ..SessionRecord::default()
            },
        );
        save_state(temp.path(), &state).expect("seed");
        let runner = FakeRunner::new();

        let sessions = list(&runner, temp.path()).expect("list");

        assert_eq!(sessions.len(), 1);
        assert!(!sessions[0].running);
        assert_eq!(sessions[0].error.as_deref(), Some("missing backend"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn start_tmux_records_session_with_env() {
        let temp = tempfile::tempdir().expect("tempdir");
        let defaults = Defaults::default();
        let runner = FakeRunner::new();
        runner.respond("tmux has-session -t workset-demo", 1, "");
        let request = StartRequest {
            backend: "tmux".to_string(),
            ..StartRequest::default()
        };
        let outcome = start(&runner, &scope(temp.path(), &defaults), &request).expect("start");
        assert_eq!(outcome.name, "workset-demo");
        assert!(outcome.persisted);
        assert!(outcome.notice.is_none());

        let specs = runner.specs();
        let launch = specs
            .iter()
            .find(|spec| spec.args.first().map(String::as_str) == Some("new-session"))
            .expect("new-session issued");
        assert!(launch.env.contains(&(ENV_WORKSPACE.to_string(), "demo".to_string())));
        assert_eq!(launch.workdir.as_deref(), Some(temp.path()));

        let state = load_state(temp.path()).expect("state");
        assert_eq!(state.sessions["workset-demo"].backend, "tmux");
        assert!(!state.sessions["workset-demo"].started_at.is_empty());
    }

    #[test]
    fn start_refuses_running_session() {
        let temp = tempfile::tempdir().expect("tempdir");
        let defaults = Defaults::default();
        let runner = FakeRunner::new();
        runner.respond("tmux has-session -t workset-demo", 0, "");
        let request = StartRequest {
            backend: "tmux".to_string(),
            ..StartRequest::default()
        };
        let err = start(&runner, &scope(temp.path(), &defaults), &request).expect_err("running");
        assert_eq!(kind_of(&err), ErrorKind::Conflict);
    }

    #[test]
    fn exec_start_leaves_no_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        let defaults = Defaults::default();
        let runner = FakeRunner::new();
        let request = StartRequest {
            backend: "exec".to_string(),
            command: vec!["make".to_string(), "test".to_string()],
            attach: true,
            ..StartRequest::default()
        };
        let outcome = start(&runner, &scope(temp.path(), &defaults), &request).expect("start");
        assert!(!outcome.persisted);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(runner.calls(), vec!["make test".to_string()]);
        assert!(load_state(temp.path()).expect("state").sessions.is_empty());
    }

    #[test]
    fn screen_probe_reads_listing_despite_exit_code() {
        let runner = FakeRunner::new();
        runner.respond(
            "screen -ls",
            1,
            "There is a screen on:\n\t4242.workset-demo\t(Detached)\n1 Socket in /run/screen.\n",
        );
        assert!(handler(Backend::Screen).probe(&runner, "workset-demo").expect("probe"));
        assert!(!handler(Backend::Screen).probe(&runner, "other").expect("probe"));
    }

    #[test]
    fn probe_execution_error_is_surfaced() {
        let runner = FakeRunner::new();
        runner.fail("tmux has-session -t s1", "exec format error");
        assert!(handler(Backend::Tmux).probe(&runner, "s1").is_err());
    }

    #[test]
    fn target_resolution_prefers_default_then_single() {
        let defaults = Defaults::default();
        let root = Path::new("/ws/demo");
        let mut state = WorkspaceState::default();
        let err = resolve_target(&state, &scope(root, &defaults), "").err().expect("none");
        assert_eq!(err.kind(), ErrorKind::NotFound);

        state.sessions.insert("other".to_string(), SessionRecord::default());
        let only = resolve_target(&state, &scope(root, &defaults), "").ok().expect("single");
        assert_eq!(only.name, "other");

        state.sessions.insert("third".to_string(), SessionRecord::default());
        let err = resolve_target(&state, &scope(root, &defaults), "").err().expect("ambiguous");
        assert_eq!(err.kind(), ErrorKind::Validation);

        state.sessions.insert("workset-demo".to_string(), SessionRecord::default());
        let default = resolve_target(&state, &scope(root, &defaults), "").ok().expect("default");
        assert_eq!(default.name, "workset-demo");
    }
}
