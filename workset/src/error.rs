//! Error taxonomy surfaced to callers.
//!
//! Operations return `anyhow::Result`. Failures that belong to the taxonomy are
//! raised as [`WorksetError`] values so callers can branch on the kind with
//! [`kind_of`]; collaborator failures (git, process, network, filesystem) stay
//! plain `anyhow` errors carrying context and propagate unchanged.

use std::fmt;

use thiserror::Error;

/// Categorized lists of at-risk items attached to an unsafe-operation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnsafeOperation {
    pub message: String,
    pub dirty: Vec<String>,
    pub unmerged: Vec<String>,
    pub unpushed: Vec<String>,
    pub warnings: Vec<String>,
}

impl fmt::Display for UnsafeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Error)]
pub enum WorksetError {
    /// Malformed or missing required input.
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    /// Name already exists, or a registry path mismatch.
    #[error("{0}")]
    Conflict(String),
    /// Irreversible action attempted without explicit confirmation.
    #[error("{0}")]
    ConfirmationRequired(String),
    #[error("{0}")]
    Unsafe(UnsafeOperation),
    /// The caller's cancellation token fired while an external call was in flight.
    #[error("{0}")]
    Cancelled(String),
}

impl WorksetError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn confirmation_required(message: impl Into<String>) -> Self {
        Self::ConfirmationRequired(message.into())
    }

    pub fn unsafe_path(message: impl Into<String>) -> Self {
        Self::Unsafe(UnsafeOperation {
            message: message.into(),
            ..UnsafeOperation::default()
        })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::ConfirmationRequired(_) => ErrorKind::ConfirmationRequired,
            Self::Unsafe(_) => ErrorKind::Unsafe,
            Self::Cancelled(_) => ErrorKind::Cancelled,
        }
    }
}

/// Discriminant of an error for callers that only care about the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    ConfirmationRequired,
    Unsafe,
    Cancelled,
    /// A wrapped collaborator error outside the taxonomy.
    Other,
}

/// Classify an `anyhow` error by searching its chain for a [`WorksetError`].
pub fn kind_of(err: &anyhow::Error) -> ErrorKind {
    as_workset_error(err).map_or(ErrorKind::Other, WorksetError::kind)
}

pub fn as_workset_error(err: &anyhow::Error) -> Option<&WorksetError> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<WorksetError>())
}

/// Borrow the unsafe-operation payload, if the error carries one.
pub fn unsafe_details(err: &anyhow::Error) -> Option<&UnsafeOperation> {
    match as_workset_error(err) {
        Some(WorksetError::Unsafe(details)) => Some(details),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    #[test]
    fn kind_survives_added_context() {
        let err = Err::<(), _>(WorksetError::not_found("workspace demo not found"))
            .context("delete workspace")
            .unwrap_err();
        assert_eq!(kind_of(&err), ErrorKind::NotFound);
    }

    #[test]
    fn plain_errors_are_other() {
        let err = anyhow::anyhow!("git remote failed");
        assert_eq!(kind_of(&err), ErrorKind::Other);
        assert!(unsafe_details(&err).is_none());
    }

    #[test]
    fn unsafe_details_expose_lists() {
        let err: anyhow::Error = WorksetError::Unsafe(UnsafeOperation {
            message: "refusing to delete".to_string(),
            dirty: vec!["repo-a:main".to_string()],
            ..UnsafeOperation::default()
        })
        .into();
        let details = unsafe_details(&err).expect("unsafe");
        assert_eq!(details.dirty, vec!["repo-a:main".to_string()]);
        assert_eq!(err.to_string(), "refusing to delete");
    }
}
