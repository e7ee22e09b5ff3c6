//! Safety report aggregation and the gate decision for destructive actions.
//!
//! Evaluation (querying git) lives in `crate::safety`; this module only folds
//! per-branch findings into categorized lists and decides whether an action may
//! proceed.

use serde::Serialize;

use crate::error::{UnsafeOperation, WorksetError};

/// Findings for one worktree of one repo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchSafety {
    pub branch: String,
    pub path: String,
    pub dirty: bool,
    /// The expected worktree directory is absent or not a repository.
    pub missing: bool,
    pub unmerged: bool,
    pub unmerged_reason: String,
    pub unpushed: bool,
    pub status_err: String,
    pub unmerged_err: String,
    pub unpushed_err: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoSafety {
    pub repo: String,
    pub remote: String,
    pub base_branch: String,
    pub branches: Vec<BranchSafety>,
}

/// Categorized at-risk items. Workspace-level reports label items `repo:branch`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SafetyReport {
    pub dirty: Vec<String>,
    pub unmerged: Vec<String>,
    pub unpushed: Vec<String>,
    pub warnings: Vec<String>,
}

impl SafetyReport {
    pub fn is_risky(&self) -> bool {
        !(self.dirty.is_empty() && self.unmerged.is_empty() && self.unpushed.is_empty())
    }

    pub fn extend(&mut self, other: SafetyReport) {
        self.dirty.extend(other.dirty);
        self.unmerged.extend(other.unmerged);
        self.unpushed.extend(other.unpushed);
        self.warnings.extend(other.warnings);
    }
}

/// Summarize one repo with branch names as item labels.
pub fn summarize_repo(report: &RepoSafety) -> SafetyReport {
    let mut summary = SafetyReport::default();
    for branch in &report.branches {
        let name = &branch.branch;
        for (label, err) in [
            ("status failed", &branch.status_err),
            ("unmerged check failed", &branch.unmerged_err),
            ("unpushed check failed", &branch.unpushed_err),
        ] {
            if !err.is_empty() {
                summary.warnings.push(format!("{name}: {label} ({err})"));
            }
        }
        if branch.dirty {
            summary.dirty.push(name.clone());
        }
        if branch.unmerged {
            summary.unmerged.push(name.clone());
            if !branch.unmerged_reason.is_empty() {
                summary
                    .warnings
                    .push(format!("{name}: {}", branch.unmerged_reason));
            }
        }
        if branch.unpushed {
            summary.unpushed.push(name.clone());
        }
    }
    summary
}

/// Summarize several repos with `repo:branch` labels and repo-prefixed warnings.
pub fn summarize_workspace(repos: &[RepoSafety]) -> SafetyReport {
    let mut summary = SafetyReport::default();
    for repo in repos {
        let inner = summarize_repo(repo);
        let label = |branch: String| format!("{}:{branch}", repo.repo);
        summary.dirty.extend(inner.dirty.into_iter().map(&label));
        summary.unmerged.extend(inner.unmerged.into_iter().map(&label));
        summary.unpushed.extend(inner.unpushed.into_iter().map(&label));
        summary.warnings.extend(
            inner
                .warnings
                .into_iter()
                .map(|warning| format!("{}: {warning}", repo.repo)),
        );
    }
    summary
}

/// A destructive action submitted to the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardedAction {
    /// Verb phrase for messages, e.g. "delete workspace demo".
    pub description: String,
    /// Deletes files; requires explicit confirmation.
    pub irreversible: bool,
}

impl GuardedAction {
    pub fn irreversible(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            irreversible: true,
        }
    }

    pub fn reversible(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            irreversible: false,
        }
    }
}

/// Decide whether `action` may proceed given an already computed `report`.
///
/// Known risk is checked first and only `force` overrides it; the failure
/// carries every category so callers can show the user the full picture.
/// An irreversible action then needs `confirmed` regardless of risk.
pub fn check_gate(
    action: &GuardedAction,
    report: &SafetyReport,
    confirmed: bool,
    force: bool,
) -> Result<(), WorksetError> {
    if report.is_risky() && !force {
        return Err(WorksetError::Unsafe(UnsafeOperation {
            message: unsafe_message(&action.description, report),
            dirty: report.dirty.clone(),
            unmerged: report.unmerged.clone(),
            unpushed: report.unpushed.clone(),
            warnings: report.warnings.clone(),
        }));
    }
    if action.irreversible && !confirmed {
        return Err(WorksetError::confirmation_required(format!(
            "{}?",
            action.description
        )));
    }
    Ok(())
}

/// Run `op` only if [`check_gate`] allows it.
pub fn guard<T, E>(
    action: &GuardedAction,
    report: &SafetyReport,
    confirmed: bool,
    force: bool,
    op: impl FnOnce() -> Result<T, E>,
) -> anyhow::Result<T>
where
    E: Into<anyhow::Error>,
{
    check_gate(action, report, confirmed, force)?;
    op().map_err(Into::into)
}

fn unsafe_message(description: &str, report: &SafetyReport) -> String {
    let mut parts = Vec::new();
    for (label, items) in [
        ("dirty worktrees", &report.dirty),
        ("unmerged branches", &report.unmerged),
        ("unpushed branches", &report.unpushed),
    ] {
        if !items.is_empty() {
            parts.push(format!("{label}: {}", items.join(", ")));
        }
    }
    format!(
        "refusing to {description}: {} (use --force)",
        parts.join("; ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirty_report() -> SafetyReport {
        SafetyReport {
            dirty: vec!["repo-a:main".to_string()],
            ..SafetyReport::default()
        }
    }

    #[test]
    fn clean_unconfirmed_requires_confirmation() {
        let action = GuardedAction::irreversible("delete workspace demo");
        let err = check_gate(&action, &SafetyReport::default(), false, false).expect_err("gate");
        assert!(matches!(err, WorksetError::ConfirmationRequired(_)));
        assert_eq!(err.to_string(), "delete workspace demo?");
    }

    #[test]
    fn dirty_without_force_is_unsafe_with_exact_list() {
        let action = GuardedAction::irreversible("delete workspace demo");
        let err = check_gate(&action, &dirty_report(), true, false).expect_err("gate");
        let WorksetError::Unsafe(details) = err else {
            panic!("expected unsafe");
        };
        assert_eq!(details.dirty, vec!["repo-a:main".to_string()]);
        assert!(details.unmerged.is_empty());
        assert!(details.message.contains("dirty worktrees: repo-a:main"));
    }

    #[test]
    fn unsafe_wins_over_missing_confirmation() {
        let action = GuardedAction::irreversible("delete workspace demo");
        let err = check_gate(&action, &dirty_report(), false, false).expect_err("gate");
        assert!(matches!(err, WorksetError::Unsafe(_)));
    }

    #[test]
    fn force_overrides_known_risk() {
        let action = GuardedAction::irreversible("delete workspace demo");
        let value = guard(&action, &dirty_report(), true, true, || Ok::<_, anyhow::Error>(7))
            .expect("forced");
        assert_eq!(value, 7);
    }

    #[test]
    fn guard_does_not_run_op_when_refused() {
        let action = GuardedAction::reversible("remove repo api");
        let mut ran = false;
        let result = guard(&action, &dirty_report(), true, false, || {
            ran = true;
            Ok::<_, anyhow::Error>(())
        });
        assert!(result.is_err());
        assert!(!ran);
    }

    #[test]
    fn workspace_summary_labels_items_by_repo() {
        let repos = vec![RepoSafety {
            repo: "api".to_string(),
            branches: vec![BranchSafety {
                branch: "feature".to_string(),
                dirty: true,
                unpushed: true,
                status_err: String::new(),
                unmerged_err: "boom".to_string(),
                ..BranchSafety::default()
            }],
            ..RepoSafety::default()
        }];
        let summary = summarize_workspace(&repos);
        assert_eq!(summary.dirty, vec!["api:feature".to_string()]);
        assert_eq!(summary.unpushed, vec!["api:feature".to_string()]);
        assert_eq!(
            summary.warnings,
            vec!["api: feature: unmerged check failed (boom)".to_string()]
        );
    }
}
