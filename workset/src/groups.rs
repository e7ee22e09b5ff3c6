//! Repo groups: registry CRUD and applying a group to a workspace.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::groups as registry_groups;
use crate::core::hooks::{EVENT_WORKTREE_CREATED, PendingHook};
use crate::core::merge::merge_if_empty;
use crate::core::paths::expand_home;
use crate::core::types::{Group, GroupMember, RemoteConfig, Remotes, RepoAlias};
use crate::error::WorksetError;
use crate::hooks::{HookTrust, process_new_worktree};
use crate::io::config::{canonical_or_clean, home_dir, load_registry, update_registry};
use crate::io::git::GitClient;
use crate::io::manifest::{load_manifest, save_manifest};
use crate::io::process::ProcessRunner;
use crate::io::state::load_state;
use crate::session::{ENV_ROOT, ENV_WORKSPACE};
use crate::workspaces;

pub fn list(config_path: &Path) -> Result<Vec<String>> {
    Ok(registry_groups::list(&load_registry(config_path)?))
}

pub fn show(config_path: &Path, name: &str) -> Result<Group> {
    let registry = load_registry(config_path)?;
    registry
        .groups
        .get(name.trim())
        .cloned()
        .ok_or_else(|| WorksetError::not_found(format!("group {:?} not found", name.trim())).into())
}

pub fn create(config_path: &Path, name: &str, description: &str) -> Result<()> {
    update_registry(config_path, |registry| {
        Ok(registry_groups::upsert(registry, name, description)?)
    })
}

pub fn delete(config_path: &Path, name: &str) -> Result<()> {
    update_registry(config_path, |registry| Ok(registry_groups::delete(registry, name)?))
}

/// Add `repo` to `group`, binding its base and write remotes by name.
pub fn add(
    config_path: &Path,
    group: &str,
    repo: &str,
    base_remote: &str,
    write_remote: &str,
) -> Result<()> {
    let member = GroupMember {
        repo: repo.trim().to_string(),
        remotes: Remotes {
            base: remote_named(base_remote),
            write: remote_named(write_remote),
        },
    };
    update_registry(config_path, |registry| {
        Ok(registry_groups::add_member(registry, group, member)?)
    })
}

fn remote_named(name: &str) -> RemoteConfig {
    RemoteConfig {
        name: name.trim().to_string(),
        ..RemoteConfig::default()
    }
}

pub fn remove(config_path: &Path, group: &str, repo: &str) -> Result<()> {
    update_registry(config_path, |registry| {
        Ok(registry_groups::remove_member(registry, group, repo)?)
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    pub workspace: String,
    pub group: String,
    /// Repos appended to the manifest, in group order.
    pub added: Vec<String>,
    /// Repos whose worktree was created from a local alias.
    pub worktrees: Vec<String>,
    pub pending_hooks: Vec<PendingHook>,
    pub warnings: Vec<String>,
}

/// Append the group's repos to the workspace manifest.
///
/// Members the manifest already lists are skipped. Each new repo whose alias
/// points at a local clone gets a worktree on the workspace branch, then its
/// `worktree.created` hooks go through the trust gate.
#[instrument(skip_all, fields(workspace = %workspace, group = %group))]
pub fn apply<G: GitClient, R: ProcessRunner, T: HookTrust>(
    config_path: &Path,
    git: &G,
    runner: &R,
    trust: &T,
    workspace: &str,
    group: &str,
) -> Result<ApplyOutcome> {
    let registry = load_registry(config_path)?;
    let target = workspaces::resolve(&registry, workspace)?;
    let group_name = group.trim();
    let members = registry
        .groups
        .get(group_name)
        .map(|group| group.members.clone())
        .ok_or_else(|| WorksetError::not_found(format!("group {group_name:?} not found")))?;

    let mut manifest = load_manifest(&target.path)?;
    let added = registry_groups::append_members(&mut manifest, &members);
    let mut outcome = ApplyOutcome {
        workspace: target.name.clone(),
        group: group_name.to_string(),
        added: added.clone(),
        ..ApplyOutcome::default()
    };
    if added.is_empty() {
        debug!("every group member already present");
        return Ok(outcome);
    }

    let state = load_state(&target.path)?;
    let branch = match state.current_branch.trim() {
        "" => target.name.clone(),
        branch => branch.to_string(),
    };
    let home = home_dir();
    let env = [
        (ENV_ROOT.to_string(), target.path.display().to_string()),
        (ENV_WORKSPACE.to_string(), target.name.clone()),
    ];
    let mut discovered_aliases = Vec::new();
    let mut failure = None;

    for repo in manifest.repos.iter_mut().filter(|repo| added.contains(&repo.name)) {
        let Some(alias) = registry.repos.get(&repo.name) else {
            outcome
                .warnings
                .push(format!("repo {}: no registered alias; worktree not created", repo.name));
            continue;
        };
        if alias.path.trim().is_empty() {
            outcome.warnings.push(format!(
                "repo {}: alias has no local path; clone it before creating a worktree",
                repo.name
            ));
            continue;
        }
        let local = canonical_or_clean(&expand_home(alias.path.trim(), home.as_deref()));
        repo.local_path = local.display().to_string();
        let worktree = target.path.join(repo.dir_name());
        if worktree.exists() {
            outcome.warnings.push(format!(
                "repo {}: {} already exists; worktree not created",
                repo.name,
                worktree.display()
            ));
            continue;
        }
        if let Err(err) = git.worktree_add(&local, &worktree, &branch) {
            failure = Some(MemberFailure {
                repo: repo.name.clone(),
                error: err.context(format!("create worktree for repo {}", repo.name)),
                worktree_created: false,
            });
            break;
        }
        info!(repo = %repo.name, path = %worktree.display(), "worktree created");
        outcome.worktrees.push(repo.name.clone());
        discovered_aliases.push((
            repo.name.clone(),
            RepoAlias {
                remote: repo.remotes.base.name.trim().to_string(),
                default_branch: repo.remotes.base.default_branch.trim().to_string(),
                ..RepoAlias::default()
            },
        ));

        match process_new_worktree(
            runner,
            trust,
            &registry.defaults,
            EVENT_WORKTREE_CREATED,
            &repo.name,
            &worktree,
            &env,
        ) {
            Ok(hooks) => {
                outcome.pending_hooks.extend(hooks.pending);
                outcome.warnings.extend(hooks.warnings);
            }
            Err(error) => {
                failure = Some(MemberFailure {
                    repo: repo.name.clone(),
                    error,
                    worktree_created: true,
                });
                break;
            }
        }
    }

    if let Some(failure) = failure {
        // Keep every member whose worktree is on disk so a rerun sees it listed.
        let cutoff = added
            .iter()
            .position(|name| *name == failure.repo)
            .unwrap_or(added.len());
        let kept = if failure.worktree_created { cutoff + 1 } else { cutoff };
        let dropped = &added[kept.min(added.len())..];
        manifest.repos.retain(|repo| !dropped.contains(&repo.name));
        warn!(repo = %failure.repo, dropped = dropped.len(), "group apply stopped early");
        save_manifest(&target.path, &manifest)?;
        fill_aliases(config_path, &discovered_aliases)?;
        return Err(failure.error);
    }

    save_manifest(&target.path, &manifest)?;
    fill_aliases(config_path, &discovered_aliases)?;
    if !outcome.pending_hooks.is_empty() {
        warn!(pending = outcome.pending_hooks.len(), "hooks left pending");
    }
    Ok(outcome)
}

struct MemberFailure {
    repo: String,
    error: anyhow::Error,
    worktree_created: bool,
}

/// Fill empty alias fields from the remote bindings a group supplied.
fn fill_aliases(config_path: &Path, discovered: &[(String, RepoAlias)]) -> Result<()> {
    let informative: Vec<&(String, RepoAlias)> = discovered
        .iter()
        .filter(|(_, alias)| *alias != RepoAlias::default())
        .collect();
    if informative.is_empty() {
        return Ok(());
    }
    update_registry(config_path, |registry| {
        for (name, found) in informative {
            if let Some(alias) = registry.repos.get_mut(name) {
                *alias = merge_if_empty(alias, found);
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, kind_of};
    use crate::hooks::DenyAll;
    use crate::test_support::{FakeGit, FakeRepo, FakeRunner, register_workspace, write_manifest};

    #[test]
    fn crud_round_through_the_registry() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = temp.path().join("config.yaml");
        create(&config, "web", "frontend repos").expect("create");
        add(&config, "web", "api", "upstream", "origin").expect("add");
        add(&config, "web", "ui", "", "").expect("add");

        let group = show(&config, "web").expect("show");
        assert_eq!(group.description, "frontend repos");
        assert_eq!(group.members.len(), 2);
        assert_eq!(group.members[0].remotes.base.name, "upstream");

        remove(&config, "web", "ui").expect("remove");
        assert_eq!(show(&config, "web").expect("show").members.len(), 1);
        let err = remove(&config, "web", "ui").expect_err("gone");
        assert_eq!(kind_of(&err), ErrorKind::NotFound);

        delete(&config, "web").expect("delete");
        assert!(list(&config).expect("list").is_empty());
    }

    #[test]
    fn apply_creates_worktrees_and_skips_present_members() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = temp.path().join("config.yaml");
        let root = temp.path().join("ws").join("demo");
        write_manifest(&root, "demo", &["api"]);
        register_workspace(&config, "demo", &root);
        let clone = temp.path().join("repos").join("ui");
        std::fs::create_dir_all(&clone).expect("mkdir clone");
        let clone = canonical_or_clean(&clone);
        update_registry(&config, |registry| {
            registry.repos.insert(
                "ui".to_string(),
                RepoAlias {
                    path: clone.display().to_string(),
                    ..RepoAlias::default()
                },
            );
            registry_groups::add_member(registry, "web", GroupMember {
                repo: "api".to_string(),
                ..GroupMember::default()
            })?;
            registry_groups::add_member(registry, "web", GroupMember {
                repo: "ui".to_string(),
                remotes: Remotes {
                    base: RemoteConfig {
                        name: "upstream".to_string(),
                        default_branch: "trunk".to_string(),
                    },
                    ..Remotes::default()
                },
            })?;
            registry_groups::add_member(registry, "web", GroupMember {
                repo: "docs".to_string(),
                ..GroupMember::default()
            })?;
            Ok(())
        })
        .expect("seed registry");
        let git = FakeGit::new().with_repo(&clone, FakeRepo::new());

        let outcome =
            apply(&config, &git, &FakeRunner::new(), &DenyAll, "demo", "web").expect("apply");
        assert_eq!(outcome.added, vec!["ui", "docs"]);
        assert_eq!(outcome.worktrees, vec!["ui"]);
        assert_eq!(git.added(), vec![(clone.clone(), root.join("ui"), "demo".to_string())]);
        assert!(outcome.warnings.iter().any(|w| w.starts_with("repo docs: no registered alias")));

        let manifest = load_manifest(&root).expect("manifest");
        let names: Vec<&str> = manifest.repos.iter().map(|repo| repo.name.as_str()).collect();
        assert_eq!(names, vec!["api", "ui", "docs"]);
        let registry = load_registry(&config).expect("registry");
        assert_eq!(registry.repos["ui"].remote, "upstream");
        assert_eq!(registry.repos["ui"].default_branch, "trunk");

        let again =
            apply(&config, &git, &FakeRunner::new(), &DenyAll, "demo", "web").expect("reapply");
        assert!(again.added.is_empty());
    }

    #[test]
    fn failed_member_keeps_earlier_worktrees_in_manifest() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = temp.path().join("config.yaml");
        let root = temp.path().join("ws").join("demo");
        write_manifest(&root, "demo", &["api"]);
        register_workspace(&config, "demo", &root);
        let ui = temp.path().join("repos").join("ui");
        let web = temp.path().join("repos").join("web");
        std::fs::create_dir_all(&ui).expect("mkdir ui");
        std::fs::create_dir_all(&web).expect("mkdir web");
        let ui = canonical_or_clean(&ui);
        let web = canonical_or_clean(&web);
        update_registry(&config, |registry| {
            for (name, path) in [("ui", &ui), ("web", &web)] {
                registry.repos.insert(
                    name.to_string(),
                    RepoAlias {
                        path: path.display().to_string(),
                        ..RepoAlias::default()
                    },
                );
            }
            registry_groups::add_member(registry, "front", GroupMember {
                repo: "ui".to_string(),
                remotes: Remotes {
                    base: remote_named("origin"),
                    ..Remotes::default()
                },
            })?;
            for repo in ["web", "docs"] {
                registry_groups::add_member(registry, "front", GroupMember {
                    repo: repo.to_string(),
                    ..GroupMember::default()
                })?;
            }
            Ok(())
        })
        .expect("seed registry");
        let git = FakeGit::new()
            .with_repo(&ui, FakeRepo::new())
            .with_repo(&web, FakeRepo::new().failing("worktree_add", "fatal: invalid reference: demo"));

        let err = apply(&config, &git, &FakeRunner::new(), &DenyAll, "demo", "front")
            .expect_err("web fails");

        assert!(format!("{err:#}").contains("create worktree for repo web"));
        assert!(root.join("ui").is_dir());
        let manifest = load_manifest(&root).expect("manifest");
        let names: Vec<&str> = manifest.repos.iter().map(|repo| repo.name.as_str()).collect();
        assert_eq!(names, vec!["api", "ui"]);
        assert_eq!(load_registry(&config).expect("registry").repos["ui"].remote, "origin");
    }

    #[test]
    fn unknown_group_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = temp.path().join("config.yaml");
        let root = temp.path().join("demo");
        write_manifest(&root, "demo", &[]);
        register_workspace(&config, "demo", &root);
        let err = apply(&config, &FakeGit::new(), &FakeRunner::new(), &DenyAll, "demo", "nope")
            .expect_err("missing");
        assert_eq!(kind_of(&err), ErrorKind::NotFound);
    }
}
