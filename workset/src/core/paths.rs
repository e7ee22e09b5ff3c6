//! Lexical path helpers: home expansion, cleaning, and containment.

use std::path::{Component, Path, PathBuf};

use crate::error::WorksetError;

/// Expand a leading `~` using `home`.
pub fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    match (path, home) {
        ("~", Some(home)) => home.to_path_buf(),
        (p, Some(home)) if p.starts_with("~/") => home.join(&p[2..]),
        (p, _) => PathBuf::from(p),
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True when `target` lies strictly inside `root` after cleaning both.
pub fn is_within(root: &Path, target: &Path) -> bool {
    let root = clean(root);
    let target = clean(target);
    target != root && target.starts_with(&root)
}

/// Reject deleting anything that is not strictly inside the workspace root.
///
/// Not subject to `--force`: a target outside the root means the registry
/// points somewhere it should not.
pub fn ensure_deletable(root: &Path, target: &Path) -> Result<(), WorksetError> {
    if is_within(root, target) {
        return Ok(());
    }
    Err(WorksetError::unsafe_path(format!(
        "refusing to delete {}: outside workspace root {}",
        target.display(),
        root.display()
    )))
}
