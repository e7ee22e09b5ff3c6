//! Per-workspace state storage (`.workset/state.json`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::types::WorkspaceState;
use crate::io::config::write_atomic;

/// Current UTC time as RFC3339 with second precision.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

pub fn state_path(root: &Path) -> PathBuf {
    root.join(".workset").join("state.json")
}

/// Load workspace state; a missing file is an empty state.
pub fn load_state(root: &Path) -> Result<WorkspaceState> {
    let path = state_path(root);
    if !path.exists() {
        return Ok(WorkspaceState::default());
    }
    debug!(path = %path.display(), "loading workspace state");
    let contents =
        fs::read_to_string(&path).with_context(|| format!("read state {}", path.display()))?;
    let state: WorkspaceState = serde_json::from_str(&contents)
        .with_context(|| format!("parse state {}", path.display()))?;
    debug!(sessions = state.sessions.len(), "workspace state loaded");
    Ok(state)
}

/// Atomically write workspace state to disk (temp file + rename).
pub fn save_state(root: &Path, state: &WorkspaceState) -> Result<()> {
    let path = state_path(root);
    debug!(path = %path.display(), sessions = state.sessions.len(), "writing workspace state");
    let mut buf = serde_json::to_string_pretty(state)?;
    buf.push('\n');
    write_atomic(&path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SessionRecord;

    #[test]
    fn timestamp_is_rfc3339_utc() {
        let stamp = timestamp();
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
        assert!(stamp.ends_with('Z'));
    }

    #[test]
    fn missing_state_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(load_state(temp.path()).expect("load"), WorkspaceState::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut state = WorkspaceState::default();
        state.sessions.insert(
            "workset-demo".to_string(),
            SessionRecord {
                backend: "tmux".to_string(),
                name: "workset-demo".to_string(),
                command: vec!["bash".to_string()],
                started_at: "2026-01-02T03:04:05Z".to_string(),
                last_attached: String::new(),
            },
        );
        save_state(temp.path(), &state).expect("write");
        let raw = fs::read_to_string(state_path(temp.path())).expect("read");
        assert!(raw.ends_with('\n'));
        assert_eq!(load_state(temp.path()).expect("load"), state);
    }
}
