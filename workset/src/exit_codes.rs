//! Stable exit codes for workset CLI commands.

use crate::error::{ErrorKind, kind_of};

/// Command succeeded.
pub const OK: i32 = 0;
/// Collaborator failure (git, process, filesystem, network) or anything unclassified.
pub const FAILURE: i32 = 1;
/// Malformed or missing input.
pub const VALIDATION: i32 = 2;
pub const NOT_FOUND: i32 = 3;
/// Name collision or registry path mismatch.
pub const CONFLICT: i32 = 4;
/// Irreversible action needs `--yes`.
pub const CONFIRMATION_REQUIRED: i32 = 5;
/// Safety gate refused the action.
pub const UNSAFE: i32 = 6;
pub const CANCELLED: i32 = 130;

pub fn for_error(err: &anyhow::Error) -> i32 {
    match kind_of(err) {
        ErrorKind::Validation => VALIDATION,
        ErrorKind::NotFound => NOT_FOUND,
        ErrorKind::Conflict => CONFLICT,
        ErrorKind::ConfirmationRequired => CONFIRMATION_REQUIRED,
        ErrorKind::Unsafe => UNSAFE,
        ErrorKind::Cancelled => CANCELLED,
        ErrorKind::Other => FAILURE,
    }
}
