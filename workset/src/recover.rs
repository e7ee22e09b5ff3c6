//! Registry recovery from manifests found on disk.
//!
//! Walks a workspace root for `workset.yaml` files and registers every
//! workspace the registry does not know about. With alias rebuilding enabled,
//! each manifest repo's local clone is queried through [`GitClient`] and the
//! matching repo alias gets its empty fields filled in. Per-manifest and
//! per-repo problems become warnings; only an unusable root is fatal.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::merge::{merge_if_empty, select_remote};
use crate::core::paths::expand_home;
use crate::core::types::{Defaults, Registry, RepoAlias, RepoConfig, WorkspaceManifest, WorkspaceRef};
use crate::error::WorksetError;
use crate::io::config::{
    canonical_or_clean, home_dir, load_registry, repo_store_root, update_registry, workspace_root,
};
use crate::io::git::GitClient;
use crate::io::manifest::{MANIFEST_FILE, discover_manifests, read_manifest};
use crate::io::state::timestamp;

#[derive(Debug, Clone, Default)]
pub struct RecoverOptions {
    /// Directory to scan; empty falls back to the configured, then built-in root.
    pub root: String,
    pub rebuild_repo_aliases: bool,
    /// Compute the report without saving the registry.
    pub dry_run: bool,
}

/// Outcome of a recovery pass. Every list is sorted and deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoverReport {
    pub root: PathBuf,
    pub recovered_workspaces: Vec<String>,
    pub recovered_repo_aliases: Vec<String>,
    pub conflicts: Vec<String>,
    pub warnings: Vec<String>,
}

impl RecoverReport {
    fn finish(&mut self) {
        for list in [
            &mut self.recovered_workspaces,
            &mut self.recovered_repo_aliases,
            &mut self.conflicts,
            &mut self.warnings,
        ] {
            list.sort();
            list.dedup();
        }
    }
}

/// Rebuild the registry at `config_path` from manifests under the resolved root.
///
/// The registry is written once at the end, and only when something changed;
/// a dry run never writes.
#[instrument(skip_all, fields(config = %config_path.display(), rebuild = options.rebuild_repo_aliases, dry_run = options.dry_run))]
pub fn recover<G: GitClient>(
    config_path: &Path,
    git: &G,
    options: &RecoverOptions,
) -> Result<RecoverReport> {
    if options.dry_run {
        let mut registry = load_registry(config_path)?;
        return reconcile(&mut registry, git, options);
    }
    update_registry(config_path, |registry| reconcile(registry, git, options))
}

/// Apply recovery to an in-memory registry.
pub fn reconcile<G: GitClient>(
    registry: &mut Registry,
    git: &G,
    options: &RecoverOptions,
) -> Result<RecoverReport> {
    let root = resolve_root(&options.root, &registry.defaults)?;
    let mut report = RecoverReport {
        root: root.clone(),
        ..RecoverReport::default()
    };
    let manifests = discover_manifests(&root);
    if manifests.is_empty() {
        report.warnings.push(format!(
            "no {MANIFEST_FILE} files found under {}",
            root.display()
        ));
    }
    for manifest_path in &manifests {
        recover_manifest(
            registry,
            git,
            manifest_path,
            options.rebuild_repo_aliases,
            &mut report,
        );
    }
    report.finish();
    debug!(
        workspaces = report.recovered_workspaces.len(),
        aliases = report.recovered_repo_aliases.len(),
        conflicts = report.conflicts.len(),
        warnings = report.warnings.len(),
        "recovery finished"
    );
    Ok(report)
}

/// Explicit root, else `defaults.workspace_root`, else the built-in root.
fn resolve_root(explicit: &str, defaults: &Defaults) -> Result<PathBuf> {
    let raw = match explicit.trim() {
        "" => workspace_root(defaults).ok(),
        value => Some(expand_home(value, home_dir().as_deref())),
    };
    let Some(raw) = raw.filter(|path| !path.as_os_str().is_empty()) else {
        return Err(WorksetError::validation("workspace root required").into());
    };
    let absolute = std::path::absolute(&raw).unwrap_or(raw);
    if !absolute.is_dir() {
        return Err(WorksetError::not_found(format!(
            "workspace root not found: {}",
            absolute.display()
        ))
        .into());
    }
    Ok(fs::canonicalize(&absolute).unwrap_or(absolute))
}

fn recover_manifest<G: GitClient>(
    registry: &mut Registry,
    git: &G,
    manifest_path: &Path,
    rebuild: bool,
    report: &mut RecoverReport,
) {
    let manifest = match read_manifest(manifest_path) {
        Ok(manifest) => manifest,
        Err(err) => {
            warn!(path = %manifest_path.display(), error = %format!("{err:#}"), "skipping manifest");
            report.warnings.push(format!(
                "failed to load {}: {err:#}",
                manifest_path.display()
            ));
            return;
        }
    };
    let Some(dir) = manifest_path.parent().map(canonical_or_clean) else {
        return;
    };
    let name = workspace_name(&manifest, &dir);
    if name.is_empty() {
        report.warnings.push(format!(
            "skipping {}: workspace name missing",
            manifest_path.display()
        ));
        return;
    }

    match registry.workspaces.get(&name) {
        Some(existing) => {
            if canonical_or_clean(&existing.path) != dir {
                report.conflicts.push(format!(
                    "{name} (existing {}, found {})",
                    existing.path.display(),
                    dir.display()
                ));
                return;
            }
            debug!(workspace = %name, "already registered");
        }
        None => {
            if let Some(other) = name_registered_at(registry, &dir) {
                report.conflicts.push(format!(
                    "{name} (path {} already registered as {other})",
                    dir.display()
                ));
                return;
            }
            let now = timestamp();
            registry.workspaces.insert(
                name.clone(),
                WorkspaceRef {
                    path: dir.clone(),
                    created_at: now.clone(),
                    last_used: now,
                    ..WorkspaceRef::default()
                },
            );
            info!(workspace = %name, path = %dir.display(), "recovered workspace");
            report.recovered_workspaces.push(name);
        }
    }

    if rebuild {
        rebuild_aliases(registry, git, &manifest, report);
    }
}

/// Manifest-declared name, else the directory's base name.
fn workspace_name(manifest: &WorkspaceManifest, dir: &Path) -> String {
    let declared = manifest.name.trim();
    if !declared.is_empty() {
        return declared.to_string();
    }
    dir.file_name()
        .map(|name| name.to_string_lossy().trim().to_string())
        .unwrap_or_default()
}

fn name_registered_at(registry: &Registry, dir: &Path) -> Option<String> {
    registry
        .workspaces
        .iter()
        .find(|(_, workspace)| canonical_or_clean(&workspace.path) == dir)
        .map(|(name, _)| name.clone())
}

fn rebuild_aliases<G: GitClient>(
    registry: &mut Registry,
    git: &G,
    manifest: &WorkspaceManifest,
    report: &mut RecoverReport,
) {
    let home = home_dir();
    let store_root = repo_store_root(&registry.defaults).ok();

    for repo in &manifest.repos {
        let name = repo.name.trim();
        if name.is_empty() {
            continue;
        }
        let Some(local) = local_repo_path(repo, store_root.as_deref(), home.as_deref()) else {
            debug!(repo = name, "no local clone; alias left as is");
            continue;
        };
        if !local.is_dir() {
            report.warnings.push(format!(
                "repo {name} path missing at {}",
                local.display()
            ));
            continue;
        }
        let local = canonical_or_clean(&local);
        let existing = registry.repos.get(name).cloned();
        let current = existing.clone().unwrap_or_default();
        let discovered = discover_alias(git, name, &local, &current, &registry.defaults, report);
        let merged = merge_if_empty(&current, &discovered);
        if existing.as_ref() != Some(&merged) {
            debug!(repo = name, "alias filled from local clone");
            registry.repos.insert(name.to_string(), merged);
            report.recovered_repo_aliases.push(name.to_string());
        }
    }
}

/// Explicit `local_path`, else `<store_root>/<name>` when that directory exists.
fn local_repo_path(repo: &RepoConfig, store_root: Option<&Path>, home: Option<&Path>) -> Option<PathBuf> {
    let explicit = repo.local_path.trim();
    if !explicit.is_empty() {
        return Some(expand_home(explicit, home));
    }
    store_root
        .map(|root| root.join(repo.name.trim()))
        .filter(|candidate| candidate.is_dir())
}

/// Query git for the fields `current` is missing. Failures become warnings.
fn discover_alias<G: GitClient>(
    git: &G,
    name: &str,
    local: &Path,
    current: &RepoAlias,
    defaults: &Defaults,
    report: &mut RecoverReport,
) -> RepoAlias {
    let mut discovered = RepoAlias {
        path: local.display().to_string(),
        ..RepoAlias::default()
    };

    let needs_remote = current.remote.trim().is_empty() || current.url.trim().is_empty();
    if needs_remote {
        let remotes = match git.remote_names(local) {
            Ok(remotes) => remotes,
            Err(err) => {
                report
                    .warnings
                    .push(format!("repo {name}: remote names unavailable ({err:#})"));
                Vec::new()
            }
        };
        let selected = select_remote(&defaults.remote, &remotes);
        if let Some(remote) = &selected {
            discovered.remote = remote.clone();
        }

        // The URL follows the remote the alias already tracks when git still has it.
        let recorded = current.remote.trim();
        let url_remote = if !recorded.is_empty() && remotes.iter().any(|remote| remote == recorded) {
            Some(recorded.to_string())
        } else {
            selected
        };
        let url_remote = url_remote.filter(|_| current.url.trim().is_empty());
        if let Some(remote) = url_remote {
            match git.remote_urls(local, &remote) {
                Ok(urls) => discovered.url = urls.into_iter().next().unwrap_or_default(),
                Err(err) => report.warnings.push(format!(
                    "repo {name}: remote {remote} URL unavailable ({err:#})"
                )),
            }
        }
    }

    if current.default_branch.trim().is_empty() {
        match git.current_branch(local) {
            Ok(Some(branch)) => discovered.default_branch = branch,
            Ok(None) => debug!(repo = name, "detached HEAD; default branch left unset"),
            Err(err) => report
                .warnings
                .push(format!("repo {name}: failed reading branch ({err:#})")),
        }
    }
    discovered
}
