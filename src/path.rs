//! Path helpers shared by the classifier, the shared-file engine, and repair.

use std::path::{Component, Path, PathBuf};

use normalize_path::NormalizePath;
use path_slash::PathExt;

/// Get the user's home directory.
pub fn home_dir() -> Option<PathBuf> {
    home::home_dir()
}

/// Format a filesystem path for user-facing output.
///
/// Replaces the home directory prefix with `~`. Paths outside home are
/// returned unchanged.
pub fn format_path_for_display(path: &Path) -> String {
    if let Some(home) = home_dir()
        && let Ok(stripped) = path.strip_prefix(&home)
    {
        if stripped.as_os_str().is_empty() {
            return "~".to_string();
        }
        return PathBuf::from("~").join(stripped).display().to_string();
    }

    path.display().to_string()
}

/// Path of `path` relative to `base`, computed lexically.
///
/// Both paths are normalized first so `a/./b` and `a/b` compare equal.
pub fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    pathdiff::diff_paths(path.normalize(), base.normalize())
}

/// True iff `path` is `base` or lies inside it.
///
/// This is the "relative path does not start with a parent-traversal segment"
/// test.
pub fn is_within(path: &Path, base: &Path) -> bool {
    match relative_to(path, base) {
        Some(rel) => !matches!(rel.components().next(), Some(Component::ParentDir)),
        None => false,
    }
}

/// True iff `path` lies inside `base` and is not `base` itself.
pub fn is_strictly_within(path: &Path, base: &Path) -> bool {
    match relative_to(path, base) {
        Some(rel) => {
            !rel.as_os_str().is_empty()
                && !matches!(rel.components().next(), Some(Component::ParentDir))
        }
        None => false,
    }
}

/// Relative path with `/` separators, as used for branch names.
///
/// Returns `None` when `path` is not inside `base`.
pub fn relative_slash(path: &Path, base: &Path) -> Option<String> {
    if !is_within(path, base) {
        return None;
    }
    relative_to(path, base).map(|rel| rel.to_slash_lossy().into_owned())
}

/// Remove empty directories from `start` upward, stopping at `stop`.
///
/// Best-effort: the first non-empty or unremovable directory ends the walk.
/// `stop` itself is never removed.
pub fn remove_empty_parents(start: &Path, stop: &Path) {
    let mut current = start.to_path_buf();
    while is_strictly_within(&current, stop) {
        match std::fs::remove_dir(&current) {
            Ok(()) => log::debug!("Removed empty directory {}", current.display()),
            Err(_) => break,
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
}
