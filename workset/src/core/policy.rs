//! Failure policy for multi-item destructive operations.

use anyhow::Result;
use tracing::warn;

/// How a bulk operation reacts to a per-item failure.
///
/// `Strict` aborts on the first failure; `BestEffort` records the failure as a
/// warning and moves on. The CLI's `--force` selects `BestEffort`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Strict,
    BestEffort,
}

impl FailurePolicy {
    pub fn from_force(force: bool) -> Self {
        if force { Self::BestEffort } else { Self::Strict }
    }

    /// Route a per-item error according to the policy.
    ///
    /// Returns `Ok(())` after recording a warning when skipping is allowed, or
    /// the original error when it is not.
    pub fn absorb(self, err: anyhow::Error, warnings: &mut Vec<String>) -> Result<()> {
        match self {
            Self::Strict => Err(err),
            Self::BestEffort => {
                warn!(error = %format!("{err:#}"), "skipping after failure");
                warnings.push(format!("{err:#}"));
                Ok(())
            }
        }
    }
}
