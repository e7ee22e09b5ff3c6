//! Additive merge of discovered repo metadata into registered aliases.

use crate::core::types::RepoAlias;

/// Fill every empty field of `existing` from `discovered`.
///
/// Populated fields are never overwritten, so applying the merge repeatedly
/// with the same input is a no-op after the first pass.
pub fn merge_if_empty(existing: &RepoAlias, discovered: &RepoAlias) -> RepoAlias {
    RepoAlias {
        url: pick(&existing.url, &discovered.url),
        path: pick(&existing.path, &discovered.path),
        remote: pick(&existing.remote, &discovered.remote),
        default_branch: pick(&existing.default_branch, &discovered.default_branch),
    }
}

fn pick(existing: &str, discovered: &str) -> String {
    if existing.trim().is_empty() {
        discovered.trim().to_string()
    } else {
        existing.to_string()
    }
}

/// Choose which remote an alias should track.
///
/// Prefers `preferred` when the repo has it, otherwise the sole remote. With
/// several remotes and none matching, the choice is left unresolved.
pub fn select_remote(preferred: &str, remotes: &[String]) -> Option<String> {
    let preferred = preferred.trim();
    if !preferred.is_empty() && remotes.iter().any(|name| name == preferred) {
        return Some(preferred.to_string());
    }
    match remotes {
        [only] => Some(only.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alias(url: &str, path: &str, remote: &str, branch: &str) -> RepoAlias {
        RepoAlias {
            url: url.to_string(),
            path: path.to_string(),
            remote: remote.to_string(),
            default_branch: branch.to_string(),
        }
    }

    #[test]
    fn populated_fields_win() {
        let existing = alias("", "/src/a", "origin", "");
        let discovered = alias("https://example.com/a.git", "/other/a", "upstream", "main");
        let merged = merge_if_empty(&existing, &discovered);
        assert_eq!(merged, alias("https://example.com/a.git", "/src/a", "origin", "main"));
    }

    #[test]
    fn whitespace_counts_as_empty() {
        let merged = merge_if_empty(&alias("", "", "  ", ""), &alias("", "", "origin", ""));
        assert_eq!(merged.remote, "origin");
    }

    #[test]
    fn merge_is_idempotent() {
        let existing = alias("", "", "", "");
        let discovered = alias("u", "p", "r", "b");
        let once = merge_if_empty(&existing, &discovered);
        assert_eq!(merge_if_empty(&once, &discovered), once);
    }

    #[test]
    fn select_remote_prefers_configured_default() {
        let remotes = vec!["upstream".to_string(), "origin".to_string()];
        assert_eq!(select_remote("origin", &remotes), Some("origin".to_string()));
    }

    #[test]
    fn select_remote_falls_back_to_sole_remote() {
        let remotes = vec!["upstream".to_string()];
        assert_eq!(select_remote("origin", &remotes), Some("upstream".to_string()));
    }

    #[test]
    fn select_remote_leaves_ambiguous_unresolved() {
        let remotes = vec!["fork".to_string(), "upstream".to_string()];
        assert_eq!(select_remote("origin", &remotes), None);
        assert_eq!(select_remote("origin", &[]), None);
    }
}
