//! Structural repairs: worktrees whose directory, branch, and registration
//! disagree.
//!
//! - **Mismatch**: inside the root, but the directory is not `<root>/<branch>`.
//!   Fixed by moving the directory (branch is truth) or renaming the branch
//!   (directory is truth).
//! - **External**: outside the root. Fixed by moving it to `<root>/<branch>`.
//! - **Broken**: registered at a path that no longer exists. Never repaired
//!   automatically; the caller supplies the new location to [`fix_paths`].
//!
//! Every multi-step repair undoes its completed steps in reverse order when a
//! later step fails.

use std::fs;
use std::path::{Path, PathBuf};

use normalize_path::NormalizePath;
use serde::Serialize;

use crate::config::Config;
use crate::git::{GitError, Worktree};
use crate::path::{is_strictly_within, relative_slash, remove_empty_parents};
use crate::rollback::Rollback;
use crate::shared::{self, fs_ops::move_entry};
use crate::worktree::{Layout, Placement, Repo, is_nested, resolve, status};

mod rename;

pub use rename::{RenameOutcome, rename};

/// A detected inconsistency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RepairTarget {
    Mismatch {
        path: PathBuf,
        branch: String,
        expected: PathBuf,
        /// Also inside another worktree's directory
        nested: bool,
    },
    External {
        path: PathBuf,
        branch: String,
        expected: PathBuf,
    },
    Broken {
        path: PathBuf,
        branch: Option<String>,
        /// `<root>/<branch>`, when it verifiably holds this worktree
        suggested: Option<PathBuf>,
    },
}

impl RepairTarget {
    pub fn path(&self) -> &Path {
        match self {
            RepairTarget::Mismatch { path, .. }
            | RepairTarget::External { path, .. }
            | RepairTarget::Broken { path, .. } => path,
        }
    }

    pub fn branch(&self) -> Option<&str> {
        match self {
            RepairTarget::Mismatch { branch, .. } | RepairTarget::External { branch, .. } => {
                Some(branch)
            }
            RepairTarget::Broken { branch, .. } => branch.as_deref(),
        }
    }
}

/// Which side of a mismatch is correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
pub enum Strategy {
    /// Move the directory to match the branch
    #[default]
    #[strum(serialize = "branch")]
    BranchIsTruth,
    /// Rename the branch to match the directory
    #[strum(serialize = "dir")]
    DirIsTruth,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum RepairAction {
    Moved { from: PathBuf, to: PathBuf },
    BranchRenamed { from: String, to: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairOutcome {
    pub action: RepairAction,
    /// Post-repair propagation problems; the repair itself succeeded
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RepairStatus {
    Repaired(RepairOutcome),
    Failed { error: String },
    NeedsManualPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairResult {
    pub target: RepairTarget,
    pub status: RepairStatus,
}

/// Find every worktree that needs repair.
///
/// The classic-layout root checkout and detached worktrees are never
/// candidates.
pub fn detect(repo: &Repo, config: &Config) -> anyhow::Result<Vec<RepairTarget>> {
    let layout = repo.layout();
    let worktrees = repo.worktrees(config)?;
    let mut targets = Vec::new();

    for entry in status(layout, &worktrees) {
        let wt = &entry.worktree;
        if entry.placement == Placement::Missing {
            targets.push(RepairTarget::Broken {
                path: wt.path.clone(),
                branch: wt.branch.clone(),
                suggested: suggest_location(layout, wt),
            });
            continue;
        }
        let (Some(branch), Some(expected)) = (&wt.branch, entry.expected) else {
            if !entry.placement.is_managed() {
                log::debug!("Skipping detached worktree {}", wt.path.display());
            }
            continue;
        };
        match entry.placement {
            Placement::Managed | Placement::Missing => {}
            Placement::External => targets.push(RepairTarget::External {
                path: wt.path.clone(),
                branch: branch.clone(),
                expected,
            }),
            Placement::Mismatched | Placement::Nested => {
                if wt.path.normalize() != expected {
                    targets.push(RepairTarget::Mismatch {
                        path: wt.path.clone(),
                        branch: branch.clone(),
                        expected,
                        nested: entry.placement == Placement::Nested,
                    });
                }
            }
        }
    }
    Ok(targets)
}

/// `<root>/<branch>`, if it holds the checkout a missing registration refers to.
///
/// Only suggested when the candidate's `.git` file names an administrative
/// directory whose `gitdir` points back at the missing path.
fn suggest_location(layout: &Layout, wt: &Worktree) -> Option<PathBuf> {
    let candidate = layout.expected_path(wt.branch.as_deref()?);
    if candidate == wt.path.normalize() {
        return None;
    }
    (registered_gitdir(&candidate)? == wt.path.join(".git").normalize()).then_some(candidate)
}

/// The `.git` path that `checkout`'s administrative directory is registered
/// for: `<checkout>/.git` names the admin dir, whose `gitdir` file points
/// back at a checkout.
fn registered_gitdir(checkout: &Path) -> Option<PathBuf> {
    let link = fs::read_to_string(checkout.join(".git")).ok()?;
    let admin = checkout.join(link.trim().strip_prefix("gitdir:")?.trim());
    let registered = fs::read_to_string(admin.join("gitdir")).ok()?;
    Some(admin.join(registered.trim()).normalize())
}

/// Repair one target.
///
/// External targets are always moved; `strategy` applies to mismatches.
/// Broken targets fail with [`GitError::BrokenWorktree`].
pub fn repair(
    repo: &Repo,
    config: &Config,
    target: &RepairTarget,
    strategy: Strategy,
) -> anyhow::Result<RepairOutcome> {
    match target {
        RepairTarget::Broken {
            path,
            branch,
            suggested,
        } => Err(GitError::BrokenWorktree {
            path: path.clone(),
            branch: branch.clone(),
            suggested: suggested.clone(),
        }
        .into()),
        RepairTarget::External {
            path,
            branch,
            expected,
        } => move_worktree(repo, config, branch, path, expected),
        RepairTarget::Mismatch {
            path,
            branch,
            expected,
            ..
        } => match strategy {
            Strategy::BranchIsTruth => move_worktree(repo, config, branch, path, expected),
            Strategy::DirIsTruth => rename_to_dir(repo, config, branch, path),
        },
    }
}

/// Repair the worktree `identifier` resolves to, if it needs it.
pub fn repair_one(
    repo: &Repo,
    config: &Config,
    identifier: &str,
    context: Option<&Path>,
    strategy: Strategy,
) -> anyhow::Result<Option<RepairOutcome>> {
    let worktrees = repo.worktrees(config)?;
    let wt = resolve(
        &worktrees,
        repo.layout().root(),
        identifier,
        context,
        config.default_branch_or_fallback(),
    )?;
    let target = detect(repo, config)?
        .into_iter()
        .find(|t| t.path() == wt.path);
    match target {
        Some(target) => repair(repo, config, &target, strategy).map(Some),
        None => Ok(None),
    }
}

/// Repair every detected target independently.
///
/// Each repair rolls back on its own failure without affecting the others.
/// Broken targets are reported as needing a manual path.
pub fn repair_all(
    repo: &Repo,
    config: &Config,
    strategy: Strategy,
) -> anyhow::Result<Vec<RepairResult>> {
    let mut targets = detect(repo, config)?;
    // Deepest first, so moving a nested worktree out happens before its
    // enclosing worktree moves
    targets.sort_by_key(|t| std::cmp::Reverse(t.path().components().count()));

    Ok(targets
        .into_iter()
        .map(|target| {
            let status = match &target {
                RepairTarget::Broken { .. } => RepairStatus::NeedsManualPath,
                _ => match repair(repo, config, &target, strategy) {
                    Ok(outcome) => RepairStatus::Repaired(outcome),
                    Err(e) => {
                        log::warn!("Repair of {} failed: {e:#}", target.path().display());
                        RepairStatus::Failed {
                            error: format!("{e:#}"),
                        }
                    }
                },
            };
            RepairResult { target, status }
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixOutcome {
    pub branch: Option<String>,
    pub from: PathBuf,
    pub to: PathBuf,
    pub warnings: Vec<String>,
}

/// Register the caller-supplied new location of a moved worktree.
///
/// `new_path` must be a directory containing the worktree's `.git` file,
/// and that file must still name this worktree's metadata. Nothing is
/// re-registered otherwise.
pub fn fix_paths(
    repo: &Repo,
    config: &Config,
    identifier: &str,
    new_path: &Path,
) -> anyhow::Result<FixOutcome> {
    let worktrees = repo.worktrees(config)?;
    let wt = resolve(
        &worktrees,
        repo.layout().root(),
        identifier,
        None,
        config.default_branch_or_fallback(),
    )?;
    let from = wt.path.clone();
    let branch = wt.branch.clone();
    let to = new_path.normalize();

    if !to.join(".git").is_file() {
        return Err(GitError::Other {
            message: format!("{} is not a linked worktree (no .git file)", to.display()),
        }
        .into());
    }

    // The .git file must belong to this worktree, not some other one
    let owner = registered_gitdir(&to);
    if owner.as_deref() != Some(from.join(".git").normalize().as_path()) {
        let owner = owner
            .as_deref()
            .and_then(Path::parent)
            .map(|p| format!("it belongs to {}", p.display()))
            .unwrap_or_else(|| "its .git file names no worktree metadata".to_string());
        return Err(GitError::Other {
            message: format!(
                "{} is not the checkout of {}: {owner}",
                to.display(),
                wt.display_name()
            ),
        }
        .into());
    }

    repo.backend().reregister_worktree(&to)?;

    let registered = repo
        .worktrees(config)?
        .into_iter()
        .any(|w| w.path.normalize() == to && w.branch == branch);
    if !registered {
        return Err(GitError::BackendFailure {
            action: format!("register {} at {}", wt.display_name(), to.display()),
            error: "the worktree is not registered at the new path".into(),
        }
        .into());
    }
    log::info!("Registered {} at {}", wt.display_name(), to.display());

    let warnings = propagate_after_move(repo, config, &from, &to);
    Ok(FixOutcome {
        branch,
        from,
        to,
        warnings,
    })
}

/// Fail if other registered worktrees live inside `path`.
///
/// Moving `path` would carry their checkouts along and leave their
/// registrations pointing at the old location.
pub(super) fn refuse_nested(path: &Path, worktrees: &[Worktree]) -> anyhow::Result<()> {
    let nested: Vec<PathBuf> = worktrees
        .iter()
        .filter(|w| !w.bare && !w.is_missing() && is_nested(&w.path, [path]))
        .map(|w| w.path.clone())
        .collect();
    if nested.is_empty() {
        return Ok(());
    }
    Err(GitError::NestedWorktrees {
        path: path.to_path_buf(),
        nested,
    }
    .into())
}

/// Move a worktree directory and re-register it; undo the move if
/// registration fails.
fn move_worktree(
    repo: &Repo,
    config: &Config,
    branch: &str,
    from: &Path,
    to: &Path,
) -> anyhow::Result<RepairOutcome> {
    let layout = repo.layout();
    if to.symlink_metadata().is_ok() {
        return Err(GitError::AlreadyExists {
            path: to.to_path_buf(),
        }
        .into());
    }
    if is_strictly_within(to, from) {
        return Err(GitError::Other {
            message: format!(
                "Cannot move {} into its own subdirectory {}",
                from.display(),
                to.display()
            ),
        }
        .into());
    }
    refuse_nested(from, &repo.worktrees(config)?)?;

    let mut rollback = Rollback::new(format!("move {branch} to {}", to.display()));
    move_entry(from, to)?;
    let (undo_from, undo_to, root) = (from.to_path_buf(), to.to_path_buf(), layout.root().to_path_buf());
    rollback.push(format!("move {} back", to.display()), move || {
        move_entry(&undo_to, &undo_from)?;
        if let Some(parent) = undo_to.parent() {
            remove_empty_parents(parent, &root);
        }
        Ok(())
    });

    if let Err(e) = repo.backend().reregister_worktree(to) {
        return Err(rollback.unwind(e));
    }
    rollback.commit();

    if let Some(parent) = from.parent() {
        remove_empty_parents(parent, layout.root());
    }
    log::info!("Moved {branch} from {} to {}", from.display(), to.display());

    let warnings = propagate_after_move(repo, config, from, to);
    Ok(RepairOutcome {
        action: RepairAction::Moved {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        },
        warnings,
    })
}

/// Rename the branch to the directory's path relative to the root.
fn rename_to_dir(
    repo: &Repo,
    config: &Config,
    branch: &str,
    path: &Path,
) -> anyhow::Result<RepairOutcome> {
    if branch == config.default_branch_or_fallback() {
        return Err(GitError::CannotModifyDefault {
            branch: branch.to_string(),
            action: "rename the branch of".into(),
        }
        .into());
    }
    let Some(new_branch) = relative_slash(path, repo.layout().root()) else {
        return Err(GitError::Other {
            message: format!("{} is outside the repository root", path.display()),
        }
        .into());
    };
    if repo.backend().ref_exists(&new_branch)? {
        return Err(GitError::BranchAlreadyExists { branch: new_branch }.into());
    }

    repo.backend().rename_branch(branch, &new_branch)?;
    log::info!("Renamed branch {branch} to {new_branch}");
    Ok(RepairOutcome {
        action: RepairAction::BranchRenamed {
            from: branch.to_string(),
            to: new_branch,
        },
        warnings: Vec::new(),
    })
}

/// Fix links broken by a move and fill in missing shared files.
///
/// The structural change is already complete, so failures here are
/// warnings.
fn propagate_after_move(repo: &Repo, config: &Config, from: &Path, to: &Path) -> Vec<String> {
    let mut warnings = Vec::new();
    if let Err(e) = shared::relink_moved(repo, config, from, to) {
        log::warn!("Could not relink shared files after move: {e:#}");
        warnings.push(format!("Shared links were not updated: {e:#}"));
    }
    if let Err(e) = shared::apply_to_worktree(repo, config, to) {
        log::warn!("Could not propagate shared files to {}: {e:#}", to.display());
        warnings.push(format!("Shared files were not propagated: {e:#}"));
    }
    warnings
}
