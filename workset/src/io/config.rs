//! Global registry stored at `~/.workset/config.yaml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::core::paths::{clean, expand_home};
use crate::core::types::{Defaults, Registry};

/// Overrides the registry location.
pub const CONFIG_ENV: &str = "WORKSET_REGISTRY";

pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

fn workset_home() -> Result<PathBuf> {
    home_dir()
        .map(|home| home.join(".workset"))
        .ok_or_else(|| anyhow!("HOME is not set; pass --config"))
}

/// `$WORKSET_REGISTRY`, else `~/.workset/config.yaml`.
pub fn default_config_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    Ok(workset_home()?.join("config.yaml"))
}

pub fn builtin_workspace_root() -> Result<PathBuf> {
    Ok(workset_home()?.join("workspaces"))
}

pub fn builtin_repo_store_root() -> Result<PathBuf> {
    Ok(workset_home()?.join("repos"))
}

/// `defaults.workspace_root` with `~` expanded, else the built-in root.
pub fn workspace_root(defaults: &Defaults) -> Result<PathBuf> {
    configured_or(&defaults.workspace_root, builtin_workspace_root)
}

/// `defaults.repo_store_root` with `~` expanded, else the built-in store.
pub fn repo_store_root(defaults: &Defaults) -> Result<PathBuf> {
    configured_or(&defaults.repo_store_root, builtin_repo_store_root)
}

fn configured_or(value: &str, builtin: fn() -> Result<PathBuf>) -> Result<PathBuf> {
    match value.trim() {
        "" => builtin(),
        value => Ok(expand_home(value, home_dir().as_deref())),
    }
}

impl Registry {
    pub fn validate(&self) -> Result<()> {
        for (name, workspace) in &self.workspaces {
            if name.trim().is_empty() {
                return Err(anyhow!("workspaces: empty workspace name"));
            }
            if !workspace.path.is_absolute() {
                return Err(anyhow!(
                    "workspaces.{name}.path must be absolute (got {:?})",
                    workspace.path
                ));
            }
        }
        if self.repos.keys().any(|name| name.trim().is_empty()) {
            return Err(anyhow!("repos: empty repo alias name"));
        }
        Ok(())
    }
}

/// Load the registry from YAML.
///
/// If the file is missing, returns `Registry::default()`.
pub fn load_registry(path: &Path) -> Result<Registry> {
    if !path.exists() {
        debug!(path = %path.display(), "registry missing, using defaults");
        return Ok(Registry::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let registry: Registry = if contents.trim().is_empty() {
        Registry::default()
    } else {
        serde_yaml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?
    };
    registry.validate()?;
    Ok(registry)
}

/// Atomically write the registry to disk (temp file + rename).
pub fn save_registry(path: &Path, registry: &Registry) -> Result<()> {
    registry.validate()?;
    let buf = serde_yaml::to_string(registry).context("serialize registry yaml")?;
    write_atomic(path, &buf)
}

/// Load the registry, apply `f`, and save it if `f` changed anything.
///
/// There is no lock: two processes updating the same file concurrently race,
/// and the last rename wins. Callers in one process must not interleave
/// updates to the same path either.
pub fn update_registry<T>(path: &Path, f: impl FnOnce(&mut Registry) -> Result<T>) -> Result<T> {
    let before = load_registry(path)?;
    let mut registry = before.clone();
    let value = f(&mut registry)?;
    if registry != before {
        save_registry(path, &registry)?;
    }
    Ok(value)
}

/// Canonical form of `path`, or its lexically cleaned form when it does not exist.
pub fn canonical_or_clean(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| clean(path))
}

/// Write `contents` to `path` via a sibling temp file and `rename`.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
