//! Repo hook manifests, hook source classification, and the trust decision.
//!
//! Nothing here executes a hook. Discovery reads definitions; the pending
//! evaluation reports hooks that were found but not approved.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::Registry;
use crate::error::WorksetError;

/// Location of the hook manifest inside a repository.
pub const REPO_HOOKS_PATH: &str = ".workset/hooks.yaml";
/// Fired after a repo worktree is materialized in a workspace.
pub const EVENT_WORKTREE_CREATED: &str = "worktree.created";

const DEFAULT_HOST: &str = "github.com";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HookFile {
    pub hooks: Vec<Hook>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Hook {
    pub id: String,
    pub on: Vec<String>,
    pub run: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cwd: String,
    /// `fail` or `warn`; empty uses the caller's default.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub on_error: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl Hook {
    pub fn triggers_on(&self, event: &str) -> bool {
        self.on.iter().any(|candidate| candidate == event)
    }

    fn validate(&self) -> Result<(), WorksetError> {
        if self.id.trim().is_empty() {
            return Err(WorksetError::validation("hook id required"));
        }
        if self.on.is_empty() {
            return Err(WorksetError::validation(format!(
                "hook {}: on events required",
                self.id
            )));
        }
        if self.run.is_empty() {
            return Err(WorksetError::validation(format!(
                "hook {}: run command required",
                self.id
            )));
        }
        let on_error = self.on_error.trim().to_ascii_lowercase();
        if !matches!(on_error.as_str(), "" | "fail" | "warn") {
            return Err(WorksetError::validation(format!(
                "hook {}: invalid on_error value {:?}",
                self.id, self.on_error
            )));
        }
        Ok(())
    }
}

/// Parse and validate a hook manifest.
pub fn parse_hook_file(data: &[u8]) -> anyhow::Result<HookFile> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(HookFile::default());
    }
    let file: HookFile = serde_yaml::from_slice(data)
        .map_err(|err| WorksetError::validation(format!("parse {REPO_HOOKS_PATH}: {err}")))?;
    for hook in &file.hooks {
        hook.validate()?;
    }
    Ok(file)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Alias,
    LocalPath,
    RemoteUrl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// Unresolved local path; the caller expands `~` and canonicalizes it.
    Local(String),
    Remote(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedSource {
    pub kind: SourceKind,
    pub location: SourceLocation,
    /// Ref to read remote manifests at when the caller gives none.
    pub default_ref: String,
}

/// Classify a hook source as a registered alias, local path, or git URL.
///
/// Aliases win over the other forms; an alias with a local path is read from
/// disk even when it also records a URL.
pub fn classify_source(source: &str, registry: &Registry) -> Result<ClassifiedSource, WorksetError> {
    let source = source.trim();
    if source.is_empty() {
        return Err(WorksetError::validation("repo source required"));
    }
    if let Some(alias) = registry.repos.get(source) {
        let location = if !alias.path.trim().is_empty() {
            SourceLocation::Local(alias.path.trim().to_string())
        } else if !alias.url.trim().is_empty() {
            SourceLocation::Remote(alias.url.trim().to_string())
        } else {
            return Err(WorksetError::validation("registered repo source is empty"));
        };
        return Ok(ClassifiedSource {
            kind: SourceKind::Alias,
            location,
            default_ref: alias.default_branch.trim().to_string(),
        });
    }
    if looks_like_url(source) {
        return Ok(ClassifiedSource {
            kind: SourceKind::RemoteUrl,
            location: SourceLocation::Remote(source.to_string()),
            default_ref: String::new(),
        });
    }
    if looks_like_local_path(source) {
        return Ok(ClassifiedSource {
            kind: SourceKind::LocalPath,
            location: SourceLocation::Local(source.to_string()),
            default_ref: String::new(),
        });
    }
    Err(WorksetError::validation(
        "repo source must be a registered alias, local path, or git URL",
    ))
}

fn looks_like_url(value: &str) -> bool {
    value.contains("://") || (value.contains('@') && value.contains(':'))
}

fn looks_like_local_path(value: &str) -> bool {
    value.starts_with('~') || value.starts_with('.') || value.starts_with('/')
}

/// Host, owner, and repo extracted from a remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepo {
    pub host: String,
    pub owner: String,
    pub repo: String,
}

/// Parse `https://host/owner/repo(.git)`, `ssh://git@host:port/owner/repo`,
/// or scp-style `git@host:owner/repo.git`.
pub fn parse_remote_url(raw: &str) -> Result<RemoteRepo, WorksetError> {
    let raw = raw.trim();
    let invalid = || WorksetError::validation(format!("invalid remote URL: {raw}"));
    let (host, path) = if let Some((_, rest)) = raw.split_once("://") {
        let (authority, path) = rest.split_once('/').ok_or_else(invalid)?;
        let host = authority.rsplit('@').next().unwrap_or_default();
        let host = host.split(':').next().unwrap_or_default();
        (host, path)
    } else if raw.contains('@') && raw.contains(':') {
        let (host, path) = raw.split_once(':').ok_or_else(invalid)?;
        (host.rsplit('@').next().unwrap_or_default(), path)
    } else {
        raw.split_once('/').ok_or_else(invalid)?
    };
    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
    let [.., owner, repo] = parts.as_slice() else {
        return Err(invalid());
    };
    let host = if host.is_empty() { DEFAULT_HOST } else { host };
    Ok(RemoteRepo {
        host: host.to_string(),
        owner: (*owner).to_string(),
        repo: (*repo).to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HookStatus {
    Ok,
    Failed,
    Skipped,
}

/// Report entry for hooks discovered but not (or not successfully) run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingHook {
    pub event: String,
    pub repo: String,
    pub hook_ids: Vec<String>,
    pub status: HookStatus,
    pub reason: String,
}

/// Decide what happens to hooks a freshly materialized repo declares for `event`.
///
/// Returns `None` when nothing matches or the hooks are trusted (the caller
/// then runs them). Disabled hooks are reported before trust is considered.
pub fn evaluate_pending(
    event: &str,
    repo: &str,
    file: &HookFile,
    hooks_enabled: bool,
    trusted: bool,
) -> Option<PendingHook> {
    let hook_ids: Vec<String> = file
        .hooks
        .iter()
        .filter(|hook| hook.triggers_on(event))
        .map(|hook| hook.id.clone())
        .collect();
    if hook_ids.is_empty() {
        return None;
    }
    let reason = if !hooks_enabled {
        "disabled"
    } else if !trusted {
        "untrusted"
    } else {
        return None;
    };
    Some(PendingHook {
        event: event.to_string(),
        repo: repo.to_string(),
        hook_ids,
        status: HookStatus::Skipped,
        reason: reason.to_string(),
    })
}
