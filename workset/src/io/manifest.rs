//! Workspace manifests (`workset.yaml`) and their discovery on disk.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;
use walkdir::WalkDir;

use crate::core::types::WorkspaceManifest;
use crate::error::WorksetError;
use crate::io::config::write_atomic;

pub const MANIFEST_FILE: &str = "workset.yaml";

/// Directories never descended into while discovering manifests.
const PRUNED_DIRS: &[&str] = &[".git", ".workset"];

pub fn manifest_path(root: &Path) -> PathBuf {
    root.join(MANIFEST_FILE)
}

/// Read a manifest file directly.
pub fn read_manifest(path: &Path) -> Result<WorkspaceManifest> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(WorkspaceManifest::default());
    }
    serde_yaml::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Load the manifest of the workspace rooted at `root`.
pub fn load_manifest(root: &Path) -> Result<WorkspaceManifest> {
    let path = manifest_path(root);
    if !path.exists() {
        return Err(WorksetError::not_found(format!(
            "workspace manifest not found: {}",
            path.display()
        ))
        .into());
    }
    read_manifest(&path)
}

pub fn save_manifest(root: &Path, manifest: &WorkspaceManifest) -> Result<()> {
    let buf = serde_yaml::to_string(manifest).context("serialize manifest yaml")?;
    write_atomic(&manifest_path(root), &buf)
}

/// Find every `workset.yaml` under `root`, sorted by path.
///
/// VCS and tool-private directories are pruned; unreadable entries are skipped.
pub fn discover_manifests(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !PRUNED_DIRS.iter().any(|pruned| name == *pruned)
        })
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE)
        .map(|entry| entry.into_path())
        .collect();
    found.sort();
    debug!(root = %root.display(), count = found.len(), "discovered manifests");
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RepoConfig;
    use crate::error::{ErrorKind, kind_of};

    #[test]
    fn discovery_prunes_private_dirs_and_sorts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        for dir in ["b", "a", "a/.git", "c/.workset", "d/nested"] {
            fs::create_dir_all(root.join(dir)).expect("mkdir");
        }
        for file in ["b", "a", "a/.git", "c/.workset", "d/nested"] {
            fs::write(root.join(file).join(MANIFEST_FILE), "name: x\n").expect("write");
        }
        let found = discover_manifests(root);
        let expected: Vec<PathBuf> = ["a", "b", "d/nested"]
            .iter()
            .map(|dir| root.join(dir).join(MANIFEST_FILE))
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn save_then_load() {
        let temp = tempfile::tempdir().expect("tempdir");
        let manifest = WorkspaceManifest {
            name: "demo".to_string(),
            repos: vec![RepoConfig {
                name: "api".to_string(),
                local_path: "/src/api".to_string(),
                ..RepoConfig::default()
            }],
        };
        save_manifest(temp.path(), &manifest).expect("save");
        assert_eq!(load_manifest(temp.path()).expect("load"), manifest);
    }

    #[test]
    fn missing_manifest_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_manifest(temp.path()).expect_err("missing");
        assert_eq!(kind_of(&err), ErrorKind::NotFound);
    }
}
