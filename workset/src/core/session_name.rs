//! Session name normalization and defaults.
//!
//! The normalized form is the storage and lookup key for every session
//! operation, so `start` and `attach` agree no matter how the caller spelled it.

use crate::error::WorksetError;

const PLACEHOLDER: char = '_';

/// Result of normalizing a requested session name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedName {
    pub name: String,
    /// True when normalization changed the requested name.
    pub adjusted: bool,
}

impl NormalizedName {
    pub fn notice(&self) -> Option<String> {
        self.adjusted.then(|| {
            format!(
                "note: session names use '{PLACEHOLDER}' for unsupported characters; using {}",
                self.name
            )
        })
    }
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
///
/// Idempotent: the output only contains characters from the safe set.
pub fn normalize(requested: &str) -> Result<NormalizedName, WorksetError> {
    let trimmed = requested.trim();
    let name: String = trimmed
        .chars()
        .map(|c| if is_safe(c) { c } else { PLACEHOLDER })
        .collect();
    if name.is_empty() {
        return Err(WorksetError::validation(format!(
            "session name derived from {requested:?} is empty; use --name to set one"
        )));
    }
    let adjusted = name != requested;
    Ok(NormalizedName { name, adjusted })
}

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Expand the configured name format for `workspace`.
pub fn default_session_name(format: &str, workspace: &str) -> String {
    let format = if format.trim().is_empty() {
        crate::core::types::DEFAULT_SESSION_NAME_FORMAT
    } else {
        format
    };
    format.replace("{workspace}", workspace)
}
