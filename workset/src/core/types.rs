//! Data model shared by the registry, manifests, and per-workspace state.
//!
//! Every struct uses `#[serde(default)]` so hand-edited files with missing
//! fields still load; empty strings mean "unset" throughout.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_BRANCH: &str = "main";
pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_SESSION_BACKEND: &str = "auto";
pub const DEFAULT_SESSION_NAME_FORMAT: &str = "workset-{workspace}";

/// Global registry: workspaces, repo aliases, groups, and defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Registry {
    pub defaults: Defaults,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub repos: BTreeMap<String, RepoAlias>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, Group>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub workspaces: BTreeMap<String, WorkspaceRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Defaults {
    pub base_branch: String,
    /// Workspace used when a command omits `-w`.
    pub workspace: String,
    /// Where new workspaces live and where recovery scans by default.
    pub workspace_root: String,
    /// Where managed repo clones live (`<repo_store_root>/<repo>`).
    pub repo_store_root: String,
    pub remote: String,
    pub session_backend: String,
    /// Template for default session names; `{workspace}` is substituted.
    pub session_name_format: String,
    pub hooks: HookSettings,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            base_branch: DEFAULT_BASE_BRANCH.to_string(),
            workspace: String::new(),
            workspace_root: String::new(),
            repo_store_root: String::new(),
            remote: DEFAULT_REMOTE.to_string(),
            session_backend: DEFAULT_SESSION_BACKEND.to_string(),
            session_name_format: DEFAULT_SESSION_NAME_FORMAT.to_string(),
            hooks: HookSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HookSettings {
    pub enabled: bool,
}

impl Default for HookSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Registered workspace pointer. The manifest on disk is the source of truth.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkspaceRef {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub created_at: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_used: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub archived_at: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub archived_reason: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub pinned: bool,
    #[serde(skip_serializing_if = "is_zero")]
    pub pin_order: u32,
}

impl WorkspaceRef {
    pub fn is_archived(&self) -> bool {
        !self.archived_at.is_empty()
    }
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// Named shortcut to a repo source plus default git metadata.
///
/// Exactly one of `url` and `path` is expected to be populated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepoAlias {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub remote: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub default_branch: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Group {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub members: Vec<GroupMember>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GroupMember {
    pub repo: String,
    pub remotes: Remotes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Remotes {
    pub base: RemoteConfig,
    pub write: RemoteConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RemoteConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub default_branch: String,
}

/// Per-workspace manifest (`workset.yaml` at the workspace root).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkspaceManifest {
    pub name: String,
    pub repos: Vec<RepoConfig>,
}

impl WorkspaceManifest {
    pub fn repo(&self, name: &str) -> Option<&RepoConfig> {
        self.repos.iter().find(|repo| repo.name == name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepoConfig {
    pub name: String,
    /// Directory of the repo's worktree relative to the workspace root.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub repo_dir: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub local_path: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub managed: bool,
    pub remotes: Remotes,
}

impl RepoConfig {
    /// Worktree directory name, defaulting to the repo name.
    pub fn dir_name(&self) -> &str {
        if self.repo_dir.trim().is_empty() {
            &self.name
        } else {
            &self.repo_dir
        }
    }
}

/// Per-workspace runtime state (`.workset/state.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkspaceState {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub current_branch: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sessions: BTreeMap<String, SessionRecord>,
}

/// Persisted tmux/screen session. Keyed by normalized name.
///
/// `backend` stays a raw string: a hand-edited or legacy file may carry an
/// empty or unknown value, and teardown has to report it rather than fail to load.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionRecord {
    pub backend: String,
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub started_at: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_attached: String,
}
