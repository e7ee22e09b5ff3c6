//! Safety evaluation of workspace worktrees and the destructive operations it
//! guards: workspace deletion, repo removal, and linked-worktree cleanup.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::core::paths::{clean, ensure_deletable};
use crate::core::policy::FailurePolicy;
use crate::core::safety::{
    BranchSafety, GuardedAction, RepoSafety, SafetyReport, guard, summarize_repo,
    summarize_workspace,
};
use crate::core::types::{DEFAULT_BASE_BRANCH, DEFAULT_REMOTE, Registry, RepoConfig};
use crate::error::{ErrorKind, WorksetError, kind_of};
use crate::io::config::{canonical_or_clean, load_registry, update_registry, workspace_root};
use crate::io::git::{GitClient, WorktreeRemoval};
use crate::io::manifest::{load_manifest, save_manifest};
use crate::io::process::ProcessRunner;
use crate::session;
use crate::workspaces;

/// Deepest directory level searched for linked worktrees.
const WORKTREE_SEARCH_DEPTH: usize = 3;
const DETACHED: &str = "HEAD";

/// Something a destructive action would touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyTarget {
    /// Every repo listed in the workspace manifest at this root.
    Workspace(PathBuf),
    Repo { root: PathBuf, repo: String },
}

/// Evaluate `targets` without side effects. Items are labelled `repo:branch`.
pub fn check_safety<G: GitClient>(
    git: &G,
    registry: &Registry,
    targets: &[SafetyTarget],
) -> Result<SafetyReport> {
    let mut repos = Vec::new();
    for target in targets {
        match target {
            SafetyTarget::Workspace(root) => {
                repos.extend(check_workspace_safety(git, registry, root)?);
            }
            SafetyTarget::Repo { root, repo } => {
                let manifest = load_manifest(root)?;
                let config = manifest.repo(repo).ok_or_else(|| {
                    WorksetError::not_found(format!(
                        "repo {repo} not found in workspace {}",
                        root.display()
                    ))
                })?;
                repos.push(check_repo_safety(git, registry, root, config));
            }
        }
    }
    Ok(summarize_workspace(&repos))
}

/// Per-repo findings for every repo in the manifest at `root`.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn check_workspace_safety<G: GitClient>(
    git: &G,
    registry: &Registry,
    root: &Path,
) -> Result<Vec<RepoSafety>> {
    let manifest = load_manifest(root)?;
    Ok(manifest
        .repos
        .iter()
        .map(|repo| check_repo_safety(git, registry, root, repo))
        .collect())
}

/// Inspect the worktree of `repo` inside the workspace at `root`.
///
/// Git failures are recorded on the finding; they never abort the check.
pub fn check_repo_safety<G: GitClient>(
    git: &G,
    registry: &Registry,
    root: &Path,
    repo: &RepoConfig,
) -> RepoSafety {
    let alias = registry.repos.get(&repo.name).cloned().unwrap_or_default();
    let defaults = &registry.defaults;
    let remote = first_set(&[
        repo.remotes.base.name.as_str(),
        alias.remote.as_str(),
        defaults.remote.as_str(),
        DEFAULT_REMOTE,
    ]);
    let base_branch = first_set(&[
        repo.remotes.base.default_branch.as_str(),
        alias.default_branch.as_str(),
        defaults.base_branch.as_str(),
        DEFAULT_BASE_BRANCH,
    ]);
    let path = root.join(repo.dir_name());
    let branch = evaluate_worktree(git, &path, &remote, &base_branch);
    debug!(
        repo = %repo.name,
        dirty = branch.dirty,
        unmerged = branch.unmerged,
        unpushed = branch.unpushed,
        "repo safety evaluated"
    );
    RepoSafety {
        repo: repo.name.clone(),
        remote,
        base_branch,
        branches: vec![branch],
    }
}

fn first_set(candidates: &[&str]) -> String {
    candidates
        .iter()
        .map(|candidate| candidate.trim())
        .find(|candidate| !candidate.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn evaluate_worktree<G: GitClient>(git: &G, path: &Path, remote: &str, base: &str) -> BranchSafety {
    let mut finding = BranchSafety {
        path: path.display().to_string(),
        ..BranchSafety::default()
    };
    match git.status(path) {
        Ok(status) if status.missing => {
            finding.missing = true;
            return finding;
        }
        Ok(status) => finding.dirty = status.dirty,
        Err(err) => finding.status_err = format!("{err:#}"),
    }
    finding.branch = match git.current_branch(path) {
        Ok(Some(branch)) => branch,
        Ok(None) => DETACHED.to_string(),
        Err(err) => {
            if finding.status_err.is_empty() {
                finding.status_err = format!("{err:#}");
            }
            DETACHED.to_string()
        }
    };
    let branch_ref = if finding.branch == DETACHED {
        DETACHED.to_string()
    } else {
        format!("refs/heads/{}", finding.branch)
    };

    let remote_known = match git.remote_exists(path, remote) {
        Ok(known) => known,
        Err(err) => {
            finding.unpushed_err = format!("{err:#}");
            false
        }
    };

    // Merge base: the remote's base branch, else the local one.
    let remote_base = format!("refs/remotes/{remote}/{base}");
    let local_base = format!("refs/heads/{base}");
    let base = if remote_known && ref_exists(git, path, &remote_base, &mut finding.unmerged_err) {
        Some((remote_base, format!("{remote}/{base}")))
    } else if ref_exists(git, path, &local_base, &mut finding.unmerged_err) {
        Some((local_base, format!("local {base}")))
    } else {
        None
    };
    let mut base_checked = false;
    if let Some((base_ref, label)) = base {
        match merged_into(git, path, &branch_ref, &base_ref) {
            Ok(merged) => {
                base_checked = true;
                if !merged {
                    finding.unmerged = true;
                    finding.unmerged_reason = format!("branch content not found in {label} history");
                }
            }
            Err(err) => finding.unmerged_err = format!("{err:#}"),
        }
    }

    if !remote_known {
        // Nothing can have been pushed; unmerged commits exist only here.
        finding.unpushed = finding.unmerged;
    } else if finding.branch != DETACHED {
        let remote_branch = format!("refs/remotes/{remote}/{}", finding.branch);
        match git.reference_exists(path, &remote_branch) {
            Ok(true) => match git.is_ancestor(path, &branch_ref, &remote_branch) {
                Ok(pushed) => finding.unpushed = !pushed,
                Err(err) => finding.unpushed_err = format!("{err:#}"),
            },
            Ok(false) => finding.unpushed = finding.unmerged || !base_checked,
            Err(err) => finding.unpushed_err = format!("{err:#}"),
        }
    }
    finding
}

fn ref_exists<G: GitClient>(git: &G, path: &Path, reference: &str, err_slot: &mut String) -> bool {
    match git.reference_exists(path, reference) {
        Ok(exists) => exists,
        Err(err) => {
            *err_slot = format!("{err:#}");
            false
        }
    }
}

/// Ancestry first; patch equivalence catches squash and rebase merges.
fn merged_into<G: GitClient>(git: &G, path: &Path, branch: &str, base: &str) -> Result<bool> {
    if git.is_ancestor(path, branch, base)? {
        return Ok(true);
    }
    git.is_content_merged(path, branch, base)
}

#[derive(Debug, Clone, Default)]
pub struct DeleteWorkspaceOptions {
    pub name: String,
    /// Remove the directory too; otherwise only the registry entry goes.
    pub delete_files: bool,
    pub confirmed: bool,
    pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteWorkspaceOutcome {
    pub name: String,
    pub path: PathBuf,
    pub deleted_files: bool,
    pub stopped_sessions: Vec<String>,
    pub removed_worktrees: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Unregister a workspace and, with `delete_files`, remove it from disk.
///
/// Deleting files runs the full gate: containment in the workspace root
/// (never bypassable), then risk (bypassed by `force`), then confirmation.
/// Sessions are stopped and linked worktrees released before the directory
/// goes; `force` makes those steps best-effort.
#[instrument(skip_all, fields(name = %options.name, delete_files = options.delete_files, force = options.force))]
pub fn delete_workspace<G: GitClient, R: ProcessRunner>(
    config_path: &Path,
    git: &G,
    runner: &R,
    options: &DeleteWorkspaceOptions,
) -> Result<DeleteWorkspaceOutcome> {
    let registry = load_registry(config_path)?;
    let target = workspaces::resolve(&registry, &options.name)?;
    let mut outcome = DeleteWorkspaceOutcome {
        name: target.name.clone(),
        path: target.path.clone(),
        ..DeleteWorkspaceOutcome::default()
    };

    if options.delete_files {
        let root = canonical_or_clean(&workspace_root(&registry.defaults)?);
        ensure_deletable(&root, &canonical_or_clean(&target.path))?;

        let report = workspace_report(git, &registry, &target.path, options.force)?;
        outcome.warnings.extend(report.warnings.iter().cloned());
        let action = GuardedAction::irreversible(format!("delete workspace {}", target.name));
        let policy = FailurePolicy::from_force(options.force);
        guard(&action, &report, options.confirmed, options.force, || {
            remove_workspace_dir(git, runner, &target.path, policy, &mut outcome)
        })?;
        outcome.deleted_files = true;
    }

    update_registry(config_path, |registry| {
        registry.workspaces.remove(&target.name);
        if registry.defaults.workspace == target.name {
            registry.defaults.workspace.clear();
        }
        Ok(())
    })?;
    info!(workspace = %target.name, deleted_files = outcome.deleted_files, "workspace deleted");
    Ok(outcome)
}

/// Safety of a workspace about to be deleted. A workspace without a manifest
/// has no repos to lose; with `force`, an unreadable one is only a warning.
fn workspace_report<G: GitClient>(
    git: &G,
    registry: &Registry,
    root: &Path,
    force: bool,
) -> Result<SafetyReport> {
    if !root.exists() {
        return Ok(SafetyReport::default());
    }
    match check_workspace_safety(git, registry, root) {
        Ok(repos) => Ok(summarize_workspace(&repos)),
        Err(err) if kind_of(&err) == ErrorKind::NotFound => Ok(SafetyReport::default()),
        Err(err) if force => {
            warn!(error = %format!("{err:#}"), "safety check failed; continuing under force");
            Ok(SafetyReport {
                warnings: vec![format!("safety check failed: {err:#}")],
                ..SafetyReport::default()
            })
        }
        Err(err) => Err(err),
    }
}

fn remove_workspace_dir<G: GitClient, R: ProcessRunner>(
    git: &G,
    runner: &R,
    root: &Path,
    policy: FailurePolicy,
    outcome: &mut DeleteWorkspaceOutcome,
) -> Result<()> {
    if !root.exists() {
        debug!("workspace directory already gone");
        return Ok(());
    }
    let teardown = session::stop_all(runner, root, policy)?;
    outcome.stopped_sessions = teardown.stopped;
    outcome.warnings.extend(teardown.warnings);

    let cleanup = cleanup_worktrees(git, root, policy)?;
    outcome.removed_worktrees = cleanup.removed;
    outcome.warnings.extend(cleanup.warnings);

    fs::remove_dir_all(root).with_context(|| format!("remove {}", root.display()))
}

#[derive(Debug, Clone, Default)]
pub struct RemoveRepoOptions {
    pub workspace: String,
    pub repo: String,
    /// Remove the repo's worktree directory as well as the manifest entry.
    pub delete_worktree: bool,
    pub confirmed: bool,
    pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoveRepoOutcome {
    pub workspace: String,
    pub repo: String,
    pub removed_worktree: bool,
    pub warnings: Vec<String>,
}

/// Drop a repo from a workspace manifest, optionally deleting its worktree.
#[instrument(skip_all, fields(workspace = %options.workspace, repo = %options.repo))]
pub fn remove_repo<G: GitClient>(
    config_path: &Path,
    git: &G,
    options: &RemoveRepoOptions,
) -> Result<RemoveRepoOutcome> {
    let registry = load_registry(config_path)?;
    let target = workspaces::resolve(&registry, &options.workspace)?;
    let mut manifest = load_manifest(&target.path)?;
    let repo = manifest.repo(options.repo.trim()).cloned().ok_or_else(|| {
        WorksetError::not_found(format!(
            "repo {} not found in workspace {}",
            options.repo.trim(),
            target.name
        ))
    })?;
    let mut outcome = RemoveRepoOutcome {
        workspace: target.name.clone(),
        repo: repo.name.clone(),
        ..RemoveRepoOutcome::default()
    };

    if options.delete_worktree {
        let worktree = target.path.join(repo.dir_name());
        ensure_deletable(
            &canonical_or_clean(&target.path),
            &canonical_or_clean(&worktree),
        )?;
        let report = summarize_repo(&check_repo_safety(git, &registry, &target.path, &repo));
        outcome.warnings.extend(report.warnings.iter().cloned());
        let action = GuardedAction::irreversible(format!(
            "remove repo {} from workspace {}",
            repo.name, target.name
        ));
        guard(&action, &report, options.confirmed, options.force, || {
            remove_worktree_dir(git, &worktree, options.force)
        })?;
        outcome.removed_worktree = true;
    }

    manifest.repos.retain(|entry| entry.name != repo.name);
    save_manifest(&target.path, &manifest)?;
    Ok(outcome)
}

fn remove_worktree_dir<G: GitClient>(git: &G, worktree: &Path, force: bool) -> Result<()> {
    if !worktree.exists() {
        return Ok(());
    }
    if let Some(repo) = worktree_owner(worktree)? {
        git.worktree_remove(&repo, worktree, force)?;
    }
    if worktree.exists() {
        fs::remove_dir_all(worktree).with_context(|| format!("remove {}", worktree.display()))?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    /// Linked worktrees git no longer tracked.
    pub skipped: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Release every linked worktree under `root` from its owning repository.
#[instrument(skip_all, fields(root = %root.display(), policy = ?policy))]
pub fn cleanup_worktrees<G: GitClient>(
    git: &G,
    root: &Path,
    policy: FailurePolicy,
) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    for worktree in find_linked_worktrees(root) {
        let removal = worktree_owner(&worktree).and_then(|owner| match owner {
            Some(repo) => git
                .worktree_remove(&repo, &worktree, policy == FailurePolicy::BestEffort)
                .map(Some),
            None => Ok(None),
        });
        match removal {
            Ok(Some(WorktreeRemoval::Removed)) => report.removed.push(worktree),
            Ok(Some(WorktreeRemoval::NotFound) | None) => {
                debug!(worktree = %worktree.display(), "not tracked by git; skipping");
                report.skipped.push(worktree);
            }
            Err(err) => {
                let err = err.context(format!("remove worktree {}", worktree.display()));
                policy.absorb(err, &mut report.warnings)?;
            }
        }
    }
    if !report.warnings.is_empty() {
        warn!(count = report.warnings.len(), "worktree cleanup skipped failures");
    }
    Ok(report)
}

/// Directories under `root` whose `.git` is a file (linked worktrees).
fn find_linked_worktrees(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(WORKTREE_SEARCH_DEPTH)
        .follow_links(false)
        .into_iter();
    loop {
        let entry = match walker.next() {
            None => break,
            Some(Err(_)) => continue,
            Some(Ok(entry)) => entry,
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        if entry.file_name() == ".workset" || entry.file_name() == ".git" {
            walker.skip_current_dir();
            continue;
        }
        if entry.path().join(".git").is_file() {
            found.push(entry.path().to_path_buf());
            walker.skip_current_dir();
        }
    }
    found.sort();
    found
}

/// Repository that owns the linked worktree at `worktree`.
///
/// Follows `.git` (`gitdir: <admin dir>`) and the admin dir's `commondir`.
/// Returns `None` when `worktree` is not a linked worktree.
pub fn worktree_owner(worktree: &Path) -> Result<Option<PathBuf>> {
    let dot_git = worktree.join(".git");
    if !dot_git.is_file() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(&dot_git).with_context(|| format!("read {}", dot_git.display()))?;
    let gitdir = contents
        .lines()
        .find_map(|line| line.trim().strip_prefix("gitdir:"))
        .map(str::trim)
        .filter(|gitdir| !gitdir.is_empty())
        .ok_or_else(|| anyhow!("{} has no gitdir entry", dot_git.display()))?;
    let admin = worktree.join(gitdir);
    let commondir = admin.join("commondir");
    let common = match fs::read_to_string(&commondir) {
        Ok(raw) => admin.join(raw.trim()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            // Admin dirs live at `<common>/worktrees/<name>`.
            admin
                .parent()
                .and_then(Path::parent)
                .map(Path::to_path_buf)
                .ok_or_else(|| anyhow!("cannot locate repository for {}", worktree.display()))?
        }
        Err(err) => {
            return Err(err).with_context(|| format!("read {}", commondir.display()));
        }
    };
    let common = clean(&common);
    let repo = match (common.file_name(), common.parent()) {
        (Some(name), Some(parent)) if name == ".git" => parent.to_path_buf(),
        _ => common,
    };
    Ok(Some(repo))
}
