//! Identifier resolution: a user-supplied string to exactly one worktree.

use std::path::Path;

use normalize_path::NormalizePath;

use crate::git::{GitError, Worktree};
use crate::path::is_within;

/// Identifier that always means the default-branch worktree.
pub const DEFAULT_SENTINEL: &str = "@";

/// Resolve `identifier` against the current worktrees.
///
/// First match wins:
/// 1. `""`: the worktree containing `context` (the deepest one if several
///    contain it), else the default-branch worktree, else
///    [`GitError::NotInWorktree`]
/// 2. `@`: the default-branch worktree, else
///    [`GitError::DefaultWorktreeNotFound`]
/// 3. an exact branch name
/// 4. a path that, joined onto `root`, equals a worktree path (absolute
///    paths match directly)
/// 5. the directory name of exactly one worktree
/// 6. the directory name of several worktrees: [`GitError::AmbiguousMatch`]
/// 7. otherwise [`GitError::NotFound`]
pub fn resolve<'w>(
    worktrees: &'w [Worktree],
    root: &Path,
    identifier: &str,
    context: Option<&Path>,
    default_branch: &str,
) -> Result<&'w Worktree, GitError> {
    if identifier.is_empty() {
        let containing = context.and_then(|cwd| {
            worktrees
                .iter()
                .filter(|wt| is_within(cwd, &wt.path))
                .max_by_key(|wt| wt.path.components().count())
        });
        return containing
            .or_else(|| worktrees.iter().find(|wt| wt.is_main))
            .ok_or(GitError::NotInWorktree);
    }

    if identifier == DEFAULT_SENTINEL {
        return worktrees
            .iter()
            .find(|wt| wt.is_main)
            .ok_or_else(|| GitError::DefaultWorktreeNotFound {
                branch: default_branch.to_string(),
            });
    }

    if let Some(wt) = worktrees
        .iter()
        .find(|wt| wt.branch.as_deref() == Some(identifier))
    {
        return Ok(wt);
    }

    let candidate = root.join(identifier).normalize();
    if let Some(wt) = worktrees.iter().find(|wt| wt.path.normalize() == candidate) {
        return Ok(wt);
    }

    let by_name: Vec<&Worktree> = worktrees
        .iter()
        .filter(|wt| wt.dir_name() == Some(identifier))
        .collect();
    match by_name.as_slice() {
        [wt] => Ok(*wt),
        [] => Err(GitError::NotFound {
            identifier: identifier.to_string(),
        }),
        many => Err(GitError::AmbiguousMatch {
            identifier: identifier.to_string(),
            matches: many.iter().map(|wt| wt.path.clone()).collect(),
        }),
    }
}
