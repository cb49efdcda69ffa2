//! Path classification: managed worktrees versus anomalies.

use std::path::{Path, PathBuf};

use normalize_path::NormalizePath;
use serde::Serialize;

use super::Layout;
use crate::git::Worktree;
use crate::path::{is_strictly_within, is_within};

/// True iff `path` is inside the repository root and is not the backing
/// store.
pub fn is_managed(layout: &Layout, path: &Path) -> bool {
    is_within(path, layout.root()) && path.normalize() != layout.backing_store()
}

/// True iff `path` lies strictly inside another worktree's directory.
///
/// `others` may include `path` itself; it is ignored.
pub fn is_nested<'p>(path: &Path, others: impl IntoIterator<Item = &'p Path>) -> bool {
    let path = path.normalize();
    others
        .into_iter()
        .any(|other| other.normalize() != path && is_strictly_within(&path, other))
}

/// Where a worktree sits relative to the layout.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Placement {
    /// At `<root>/<branch>`
    Managed,
    /// Inside the root, but the directory does not match the branch
    Mismatched,
    /// Inside another worktree's directory
    Nested,
    /// Outside the repository root
    External,
    /// Registered, but the directory is gone
    Missing,
}

impl Placement {
    pub fn is_managed(self) -> bool {
        self == Placement::Managed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorktreeStatus {
    #[serde(flatten)]
    pub worktree: Worktree,
    pub placement: Placement,
    /// `<root>/<branch>`, for worktrees on a branch
    pub expected: Option<PathBuf>,
}

/// Classify every worktree.
///
/// The classic-layout root checkout is always managed, and never counts as
/// an enclosing worktree when checking for nesting. Detached worktrees
/// inside the root have no expected path and are treated as managed unless
/// nested.
pub fn status(layout: &Layout, worktrees: &[Worktree]) -> Vec<WorktreeStatus> {
    let enclosing: Vec<&Path> = worktrees
        .iter()
        .map(|wt| wt.path.as_path())
        .filter(|p| !layout.is_root_checkout(p))
        .collect();

    worktrees
        .iter()
        .map(|wt| {
            let expected = wt.branch.as_deref().map(|b| layout.expected_path(b));
            let placement = if layout.is_root_checkout(&wt.path) {
                Placement::Managed
            } else if wt.is_missing() {
                Placement::Missing
            } else if !is_managed(layout, &wt.path) {
                Placement::External
            } else if is_nested(&wt.path, enclosing.iter().copied()) {
                Placement::Nested
            } else if expected
                .as_ref()
                .is_some_and(|e| *e != wt.path.normalize())
            {
                Placement::Mismatched
            } else {
                Placement::Managed
            };
            WorktreeStatus {
                worktree: wt.clone(),
                placement,
                expected,
            }
        })
        .collect()
}
