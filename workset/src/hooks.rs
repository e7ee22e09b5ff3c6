//! Hook discovery for a repo source, and the trust gate applied when a repo
//! worktree is materialized.
//!
//! Discovery only reads `.workset/hooks.yaml`; it never runs anything. Hooks of
//! a new worktree run only when hooks are enabled and a [`HookTrust`] approves
//! them; otherwise they are reported as pending.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::hooks::{
    Hook, HookFile, HookStatus, PendingHook, REPO_HOOKS_PATH, SourceKind, SourceLocation,
    classify_source, evaluate_pending, parse_hook_file, parse_remote_url,
};
use crate::core::paths::expand_home;
use crate::core::types::{Defaults, Registry};
use crate::error::WorksetError;
use crate::io::config::home_dir;
use crate::io::hosting::SourceHost;
use crate::io::process::{CommandSpec, ProcessRunner};

/// Decides whether a repo's hooks may run.
pub trait HookTrust {
    fn is_trusted(&self, repo: &str, file: &HookFile) -> bool;
}

/// Trusts nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl HookTrust for DenyAll {
    fn is_trusted(&self, _repo: &str, _file: &HookFile) -> bool {
        false
    }
}

/// Trusts the repos the operator named explicitly.
#[derive(Debug, Clone, Default)]
pub struct TrustedRepos(BTreeSet<String>);

impl TrustedRepos {
    pub fn new<I, S>(repos: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(repos.into_iter().map(Into::into).collect())
    }
}

impl HookTrust for TrustedRepos {
    fn is_trusted(&self, repo: &str, _file: &HookFile) -> bool {
        self.0.contains(repo)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookDiscovery {
    pub source: String,
    pub kind: SourceKind,
    /// Local directory or remote URL the manifest was read from.
    pub resolved: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub git_ref: String,
    pub exists: bool,
    pub hooks: Vec<Hook>,
}

/// Read the hook manifest of `source` (alias, local path, or git URL).
///
/// `git_ref` applies to remote sources; empty uses the alias's default branch,
/// then the host's default. A missing manifest is `exists = false`, not an error.
#[instrument(skip_all, fields(source = %source, git_ref = %git_ref))]
pub fn discover<H: SourceHost>(
    registry: &Registry,
    host: &H,
    source: &str,
    git_ref: &str,
) -> Result<HookDiscovery> {
    let classified = classify_source(source, registry)?;
    let mut discovery = HookDiscovery {
        source: source.trim().to_string(),
        kind: classified.kind,
        resolved: String::new(),
        host: None,
        owner: None,
        repo: None,
        git_ref: String::new(),
        exists: false,
        hooks: Vec::new(),
    };
    let file = match classified.location {
        SourceLocation::Local(raw) => {
            let dir = resolve_local_repo(&raw)?;
            discovery.resolved = dir.display().to_string();
            read_local_hooks(&dir)?
        }
        SourceLocation::Remote(url) => {
            let remote = parse_remote_url(&url)?;
            let git_ref = match git_ref.trim() {
                "" => classified.default_ref,
                explicit => explicit.to_string(),
            };
            let content = host
                .get_file_content(&remote.host, &remote.owner, &remote.repo, REPO_HOOKS_PATH, &git_ref)
                .with_context(|| format!("fetch {REPO_HOOKS_PATH} from {url}"))?;
            discovery.resolved = url;
            discovery.host = Some(remote.host);
            discovery.owner = Some(remote.owner);
            discovery.repo = Some(remote.repo);
            discovery.git_ref = git_ref;
            content.map(|bytes| parse_hook_file(&bytes)).transpose()?
        }
    };
    if let Some(file) = file {
        discovery.exists = true;
        discovery.hooks = file.hooks;
    }
    debug!(exists = discovery.exists, hooks = discovery.hooks.len(), "hook discovery finished");
    Ok(discovery)
}

fn resolve_local_repo(raw: &str) -> Result<PathBuf> {
    let expanded = expand_home(raw, home_dir().as_deref());
    let absolute = std::path::absolute(&expanded).unwrap_or(expanded);
    if !absolute.is_dir() {
        return Err(WorksetError::not_found(format!(
            "repo path not found: {}",
            absolute.display()
        ))
        .into());
    }
    fs::canonicalize(&absolute).with_context(|| format!("resolve {}", absolute.display()))
}

/// Parse `<repo_dir>/.workset/hooks.yaml`; `None` when the file is absent.
pub fn read_local_hooks(repo_dir: &Path) -> Result<Option<HookFile>> {
    let path = repo_dir.join(REPO_HOOKS_PATH);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
    };
    parse_hook_file(&bytes)
        .with_context(|| format!("load {}", path.display()))
        .map(Some)
}

/// What happened to a repo's hooks after its worktree was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HookOutcome {
    /// Hooks found but not run (disabled or untrusted).
    pub pending: Vec<PendingHook>,
    /// One entry per hook that ran.
    pub ran: Vec<PendingHook>,
    pub warnings: Vec<String>,
}

/// Apply the trust gate to the hooks `worktree` declares for `event`.
///
/// Untrusted or disabled hooks become pending entries plus a warning naming
/// the commands that were held back. Trusted hooks run through `runner`.
#[instrument(skip_all, fields(event = %event, repo = %repo, worktree = %worktree.display()))]
pub fn process_new_worktree<R: ProcessRunner, T: HookTrust>(
    runner: &R,
    trust: &T,
    defaults: &Defaults,
    event: &str,
    repo: &str,
    worktree: &Path,
    env: &[(String, String)],
) -> Result<HookOutcome> {
    let mut outcome = HookOutcome::default();
    let Some(file) = read_local_hooks(worktree)? else {
        return Ok(outcome);
    };
    let enabled = defaults.hooks.enabled;
    let trusted = enabled && trust.is_trusted(repo, &file);
    if let Some(pending) = evaluate_pending(event, repo, &file, enabled, trusted) {
        outcome.warnings.push(pending_warning(&pending, &file));
        outcome.pending.push(pending);
        return Ok(outcome);
    }
    outcome.ran = run_hooks(runner, event, repo, worktree, &file, env)?;
    outcome.warnings.extend(
        outcome
            .ran
            .iter()
            .filter(|result| result.status == HookStatus::Failed)
            .map(|result| format!("repo {repo}: hook {} failed: {}", result.hook_ids.join(","), result.reason)),
    );
    Ok(outcome)
}

fn pending_warning(pending: &PendingHook, file: &HookFile) -> String {
    let commands: Vec<String> = file
        .hooks
        .iter()
        .filter(|hook| pending.hook_ids.contains(&hook.id))
        .map(|hook| format!("{} ({})", hook.id, hook.run.join(" ")))
        .collect();
    format!(
        "repo {}: {} hooks for {} not run: {}",
        pending.repo,
        pending.reason,
        pending.event,
        commands.join(", ")
    )
}

/// Run every hook of `file` bound to `event`, in declaration order.
///
/// A failing hook with `on_error: warn` is reported and the rest still run;
/// any other failure aborts.
pub fn run_hooks<R: ProcessRunner>(
    runner: &R,
    event: &str,
    repo: &str,
    worktree: &Path,
    file: &HookFile,
    env: &[(String, String)],
) -> Result<Vec<PendingHook>> {
    let mut results = Vec::new();
    for hook in file.hooks.iter().filter(|hook| hook.triggers_on(event)) {
        let Some((program, args)) = hook.run.split_first() else {
            continue;
        };
        let cwd = match hook.cwd.trim() {
            "" => worktree.to_path_buf(),
            cwd => worktree.join(cwd),
        };
        let mut spec = CommandSpec::new(program.as_str())
            .args(args.iter().cloned())
            .current_dir(cwd);
        for (key, value) in env {
            spec = spec.env(key, value);
        }
        for (key, value) in &hook.env {
            spec = spec.env(key, value);
        }
        info!(hook = %hook.id, "running hook");
        let (status, reason) = match runner.run_checked(&spec) {
            Ok(_) => (HookStatus::Ok, String::new()),
            Err(err) if hook.on_error.trim().eq_ignore_ascii_case("warn") => {
                warn!(hook = %hook.id, error = %format!("{err:#}"), "hook failed; continuing");
                (HookStatus::Failed, format!("{err:#}"))
            }
            Err(err) => {
                return Err(err.context(format!("repo {repo}: hook {} failed", hook.id)));
            }
        };
        results.push(PendingHook {
            event: event.to_string(),
            repo: repo.to_string(),
            hook_ids: vec![hook.id.clone()],
            status,
            reason,
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RepoAlias;
    use crate::error::{ErrorKind, kind_of};
    use crate::test_support::{FakeHost, FakeRunner};

    const HOOKS: &str = "hooks:\n  - id: bootstrap\n    on: [worktree.created]\n    run: [npm, ci]\n  - id: lint\n    on: [worktree.created]\n    run: [make, lint]\n    on_error: warn\n";

    fn write_hooks(dir: &Path) {
        fs::create_dir_all(dir.join(".workset")).expect("mkdir");
        fs::write(dir.join(REPO_HOOKS_PATH), HOOKS).expect("write hooks");
    }

    #[test]
    fn local_path_reads_manifest_from_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_hooks(temp.path());
        let source = temp.path().display().to_string();
        let discovery =
            discover(&Registry::default(), &FakeHost::new(), &source, "").expect("discover");
        assert_eq!(discovery.kind, SourceKind::LocalPath);
        assert!(discovery.exists);
        assert_eq!(discovery.hooks.len(), 2);
    }

    #[test]
    fn missing_local_manifest_is_not_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = temp.path().display().to_string();
        let discovery =
            discover(&Registry::default(), &FakeHost::new(), &source, "").expect("discover");
        assert!(!discovery.exists);
        assert!(discovery.hooks.is_empty());
    }

    #[test]
    fn url_alias_fetches_at_default_branch() {
        let mut registry = Registry::default();
        registry.repos.insert(
            "api".to_string(),
            RepoAlias {
                url: "git@github.com:acme/api.git".to_string(),
                default_branch: "develop".to_string(),
                ..RepoAlias::default()
            },
        );
        let host = FakeHost::new().with_file("acme", "api", REPO_HOOKS_PATH, HOOKS);
        let discovery = discover(&registry, &host, "api", "").expect("discover");
        assert_eq!(discovery.kind, SourceKind::Alias);
        assert!(discovery.exists);
        assert_eq!(discovery.owner.as_deref(), Some("acme"));
        assert_eq!(
            host.requests(),
            vec![format!("github.com acme/api/{REPO_HOOKS_PATH}@develop")]
        );
    }

    #[test]
    fn unclassifiable_source_is_validation_error() {
        let err = discover(&Registry::default(), &FakeHost::new(), "not a source", "")
            .expect_err("invalid");
        assert_eq!(kind_of(&err), ErrorKind::Validation);
        assert!(err.to_string().contains("registered alias, local path, or git URL"));
    }

    #[test]
    fn untrusted_hooks_are_pending_and_not_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_hooks(temp.path());
        let runner = FakeRunner::new();
        let outcome = process_new_worktree(
            &runner,
            &DenyAll,
            &Defaults::default(),
            "worktree.created",
            "api",
            temp.path(),
            &[],
        )
        .expect("process");
        assert_eq!(outcome.pending.len(), 1);
        assert_eq!(outcome.pending[0].reason, "untrusted");
        assert_eq!(outcome.pending[0].status, HookStatus::Skipped);
        assert!(outcome.warnings[0].contains("bootstrap (npm ci)"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn disabled_wins_over_trust() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_hooks(temp.path());
        let mut defaults = Defaults::default();
        defaults.hooks.enabled = false;
        let outcome = process_new_worktree(
            &FakeRunner::new(),
            &TrustedRepos::new(["api"]),
            &defaults,
            "worktree.created",
            "api",
            temp.path(),
            &[],
        )
        .expect("process");
        assert_eq!(outcome.pending[0].reason, "disabled");
    }

    #[test]
    fn trusted_hooks_run_and_warn_mode_failure_continues() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_hooks(temp.path());
        let runner = FakeRunner::new();
        runner.respond_err("make lint", 2, "lint errors");
        let outcome = process_new_worktree(
            &runner,
            &TrustedRepos::new(["api"]),
            &Defaults::default(),
            "worktree.created",
            "api",
            temp.path(),
            &[],
        )
        .expect("process");
        assert!(outcome.pending.is_empty());
        let statuses: Vec<HookStatus> = outcome.ran.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![HookStatus::Ok, HookStatus::Failed]);
        assert_eq!(runner.calls(), vec!["npm ci".to_string(), "make lint".to_string()]);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn fail_mode_hook_aborts() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_hooks(temp.path());
        let runner = FakeRunner::new();
        runner.respond_err("npm ci", 1, "network down");
        let result = process_new_worktree(
            &runner,
            &TrustedRepos::new(["api"]),
            &Defaults::default(),
            "worktree.created",
            "api",
            temp.path(),
            &[],
        );
        assert!(result.is_err());
        assert_eq!(runner.calls(), vec!["npm ci".to_string()]);
    }
}
