//! Workspace registry entries: lookup, registration, and lifecycle flags.
//!
//! None of these operations touch the workspace directory; archive and pin
//! only change how the registry presents the entry.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::core::types::{Registry, WorkspaceRef};
use crate::error::WorksetError;
use crate::io::config::{canonical_or_clean, update_registry};
use crate::io::state::timestamp;

/// A registered workspace resolved by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceTarget {
    pub name: String,
    pub path: PathBuf,
}

/// Look up `name`, or `defaults.workspace` when `name` is empty.
pub fn resolve(registry: &Registry, name: &str) -> Result<WorkspaceTarget, WorksetError> {
    let name = match name.trim() {
        "" => registry.defaults.workspace.trim(),
        name => name,
    };
    if name.is_empty() {
        return Err(WorksetError::validation(
            "workspace required (pass -w or set defaults.workspace)",
        ));
    }
    registry
        .workspaces
        .get(name)
        .map(|workspace| WorkspaceTarget {
            name: name.to_string(),
            path: workspace.path.clone(),
        })
        .ok_or_else(|| WorksetError::not_found(format!("workspace {name:?} not found")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceSummary {
    pub name: String,
    pub path: PathBuf,
    pub archived: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub archived_reason: String,
    pub pinned: bool,
    pub last_used: String,
}

/// Pinned workspaces first (by `pin_order`, then name), then the rest by name.
pub fn list(registry: &Registry, include_archived: bool) -> Vec<WorkspaceSummary> {
    let mut entries: Vec<(&String, &WorkspaceRef)> = registry
        .workspaces
        .iter()
        .filter(|(_, workspace)| include_archived || !workspace.is_archived())
        .collect();
    entries.sort_by(|(a_name, a), (b_name, b)| {
        b.pinned
            .cmp(&a.pinned)
            .then_with(|| {
                if a.pinned {
                    a.pin_order.cmp(&b.pin_order)
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .then_with(|| a_name.cmp(b_name))
    });
    entries
        .into_iter()
        .map(|(name, workspace)| WorkspaceSummary {
            name: name.clone(),
            path: workspace.path.clone(),
            archived: workspace.is_archived(),
            archived_reason: workspace.archived_reason.clone(),
            pinned: workspace.pinned,
            last_used: workspace.last_used.clone(),
        })
        .collect()
}

/// Register an existing directory under `name`.
///
/// Re-registering the same name at the same path is a no-op.
#[instrument(skip_all, fields(name = %name, path = %path.display()))]
pub fn register(config_path: &Path, name: &str, path: &Path) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(WorksetError::validation("workspace name required").into());
    }
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    if !absolute.is_dir() {
        return Err(WorksetError::not_found(format!(
            "workspace directory not found: {}",
            absolute.display()
        ))
        .into());
    }
    let path = canonical_or_clean(&absolute);
    update_registry(config_path, |registry| {
        if let Some(existing) = registry.workspaces.get(name) {
            if canonical_or_clean(&existing.path) == path {
                return Ok(());
            }
            return Err(WorksetError::conflict(format!(
                "workspace {name:?} already registered at {}",
                existing.path.display()
            ))
            .into());
        }
        if let Some((other, _)) = registry
            .workspaces
            .iter()
            .find(|(_, workspace)| canonical_or_clean(&workspace.path) == path)
        {
            return Err(WorksetError::conflict(format!(
                "{} already registered as workspace {other:?}",
                path.display()
            ))
            .into());
        }
        let now = timestamp();
        registry.workspaces.insert(
            name.to_string(),
            WorkspaceRef {
                path: path.clone(),
                created_at: now.clone(),
                last_used: now,
                ..WorkspaceRef::default()
            },
        );
        Ok(())
    })
}

pub fn archive(config_path: &Path, name: &str, reason: &str) -> Result<()> {
    modify(config_path, name, |workspace| {
        workspace.archived_at = timestamp();
        workspace.archived_reason = reason.trim().to_string();
    })
}

pub fn unarchive(config_path: &Path, name: &str) -> Result<()> {
    modify(config_path, name, |workspace| {
        workspace.archived_at.clear();
        workspace.archived_reason.clear();
    })
}

/// Pin `name`. Without an explicit order it goes after every pinned workspace.
pub fn pin(config_path: &Path, name: &str, order: Option<u32>) -> Result<()> {
    update_registry(config_path, |registry| {
        let next = registry
            .workspaces
            .values()
            .filter(|workspace| workspace.pinned)
            .map(|workspace| workspace.pin_order)
            .max()
            .map_or(1, |max| max + 1);
        let target = resolve(registry, name)?;
        let workspace = registry
            .workspaces
            .get_mut(&target.name)
            .ok_or_else(|| WorksetError::not_found(format!("workspace {:?} not found", target.name)))?;
        if workspace.pinned && order.is_none() {
            return Ok(());
        }
        workspace.pinned = true;
        workspace.pin_order = order.unwrap_or(next);
        debug!(workspace = %target.name, order = workspace.pin_order, "pinned");
        Ok(())
    })
}

pub fn unpin(config_path: &Path, name: &str) -> Result<()> {
    modify(config_path, name, |workspace| {
        workspace.pinned = false;
        workspace.pin_order = 0;
    })
}

/// Stamp `last_used`.
pub fn touch(config_path: &Path, name: &str) -> Result<()> {
    modify(config_path, name, |workspace| workspace.last_used = timestamp())
}

fn modify(config_path: &Path, name: &str, f: impl FnOnce(&mut WorkspaceRef)) -> Result<()> {
    update_registry(config_path, |registry| {
        let target = resolve(registry, name)?;
        if let Some(workspace) = registry.workspaces.get_mut(&target.name) {
            f(workspace);
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, kind_of};
    use crate::io::config::load_registry;

    fn registry_with(names: &[(&str, bool, u32)]) -> Registry {
        let mut registry = Registry::default();
        for (name, pinned, order) in names {
            registry.workspaces.insert(
                (*name).to_string(),
                WorkspaceRef {
                    path: PathBuf::from(format!("/ws/{name}")),
                    pinned: *pinned,
                    pin_order: *order,
                    ..WorkspaceRef::default()
                },
            );
        }
        registry
    }

    #[test]
    fn resolve_falls_back_to_default_workspace() {
        let mut registry = registry_with(&[("demo", false, 0)]);
        let err = resolve(&registry, "").expect_err("no default");
        assert_eq!(err.kind(), ErrorKind::Validation);
        registry.defaults.workspace = "demo".to_string();
        assert_eq!(resolve(&registry, "").expect("default").path, PathBuf::from("/ws/demo"));
        assert_eq!(resolve(&registry, "other").expect_err("missing").kind(), ErrorKind::NotFound);
    }

    #[test]
    fn list_puts_pinned_first_in_pin_order() {
        let registry = registry_with(&[
            ("alpha", false, 0),
            ("beta", true, 2),
            ("gamma", true, 1),
            ("delta", false, 0),
        ]);
        let names: Vec<String> = list(&registry, true).into_iter().map(|w| w.name).collect();
        assert_eq!(names, vec!["gamma", "beta", "alpha", "delta"]);
    }

    #[test]
    fn archive_hides_from_default_listing_and_keeps_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = temp.path().join("config.yaml");
        let dir = temp.path().join("demo");
        std::fs::create_dir_all(&dir).expect("mkdir");
        register(&config, "demo", &dir).expect("register");
        archive(&config, "demo", "done").expect("archive");

        let registry = load_registry(&config).expect("load");
        assert!(list(&registry, false).is_empty());
        let archived = &registry.workspaces["demo"];
        assert_eq!(archived.archived_reason, "done");
        assert_eq!(archived.path, canonical_or_clean(&dir));

        unarchive(&config, "demo").expect("unarchive");
        let registry = load_registry(&config).expect("load");
        assert!(!registry.workspaces["demo"].is_archived());
        assert!(registry.workspaces["demo"].archived_reason.is_empty());
    }

    #[test]
    fn register_rejects_second_name_for_same_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = temp.path().join("config.yaml");
        let dir = temp.path().join("demo");
        std::fs::create_dir_all(&dir).expect("mkdir");
        register(&config, "demo", &dir).expect("register");
        register(&config, "demo", &dir).expect("same registration");
        let err = register(&config, "other", &dir).expect_err("conflict");
        assert_eq!(kind_of(&err), ErrorKind::Conflict);
    }

    #[test]
    fn pin_appends_after_existing_pins() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = temp.path().join("config.yaml");
        for name in ["a", "b"] {
            let dir = temp.path().join(name);
            std::fs::create_dir_all(&dir).expect("mkdir");
            register(&config, name, &dir).expect("register");
        }
        pin(&config, "a", None).expect("pin a");
        pin(&config, "b", None).expect("pin b");
        let registry = load_registry(&config).expect("load");
        assert_eq!(registry.workspaces["a"].pin_order, 1);
        assert_eq!(registry.workspaces["b"].pin_order, 2);

        unpin(&config, "a").expect("unpin");
        let registry = load_registry(&config).expect("load");
        assert!(!registry.workspaces["a"].pinned);
        assert_eq!(registry.workspaces["a"].pin_order, 0);
    }
}
