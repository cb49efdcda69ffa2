//! Renaming a consistent worktree's branch and directory together.

use std::path::{Path, PathBuf};

use normalize_path::NormalizePath;
use serde::Serialize;

use super::{propagate_after_move, refuse_nested};
use crate::config::Config;
use crate::git::GitError;
use crate::path::{is_strictly_within, remove_empty_parents};
use crate::rollback::Rollback;
use crate::shared::fs_ops::move_entry;
use crate::worktree::{Repo, resolve};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameOutcome {
    pub old_branch: String,
    pub new_branch: String,
    pub old_path: PathBuf,
    pub new_path: PathBuf,
    pub warnings: Vec<String>,
}

/// Progress through a rename. Every state before `Registered` can roll back
/// to `Consistent`; `Registered` is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenameState {
    Consistent,
    BranchRenamed,
    DirectoryMoved,
    Registered,
}

struct RenamePlan<'r, 'a> {
    repo: &'r Repo<'a>,
    old_branch: String,
    new_branch: String,
    old_path: PathBuf,
    new_path: PathBuf,
}

impl<'r, 'a> RenamePlan<'r, 'a> {
    /// Perform the step leaving `state`, recording its undo.
    fn advance(
        &self,
        state: RenameState,
        rollback: &mut Rollback<'a>,
    ) -> anyhow::Result<RenameState> {
        let backend = self.repo.backend();
        match state {
            RenameState::Consistent => {
                backend.rename_branch(&self.old_branch, &self.new_branch)?;
                let (old, new) = (self.old_branch.clone(), self.new_branch.clone());
                rollback.push(format!("rename branch {new} back to {old}"), move || {
                    backend.rename_branch(&new, &old)
                });
                Ok(RenameState::BranchRenamed)
            }
            RenameState::BranchRenamed => {
                move_entry(&self.old_path, &self.new_path)?;
                let (old, new) = (self.old_path.clone(), self.new_path.clone());
                let root = self.repo.layout().root().to_path_buf();
                rollback.push(format!("move {} back", new.display()), move || {
                    move_entry(&new, &old)?;
                    if let Some(parent) = new.parent() {
                        remove_empty_parents(parent, &root);
                    }
                    Ok(())
                });
                Ok(RenameState::DirectoryMoved)
            }
            RenameState::DirectoryMoved => {
                backend.reregister_worktree(&self.new_path)?;
                Ok(RenameState::Registered)
            }
            RenameState::Registered => Ok(RenameState::Registered),
        }
    }

    fn execute(&self) -> anyhow::Result<()> {
        let mut rollback = Rollback::new(format!(
            "rename {} to {}",
            self.old_branch, self.new_branch
        ));
        let mut state = RenameState::Consistent;
        while state != RenameState::Registered {
            match self.advance(state, &mut rollback) {
                Ok(next) => {
                    log::debug!("rename {}: {state:?} -> {next:?}", self.old_branch);
                    state = next;
                }
                Err(e) => return Err(rollback.unwind(e)),
            }
        }
        rollback.commit();
        Ok(())
    }
}

/// Rename a worktree's branch to `new_branch` and move its directory to
/// `<root>/<new_branch>`.
///
/// Only runs on a consistent worktree (directory matches branch); a failed
/// step undoes the completed ones in reverse order.
pub fn rename(
    repo: &Repo,
    config: &Config,
    identifier: &str,
    context: Option<&Path>,
    new_branch: &str,
) -> anyhow::Result<RenameOutcome> {
    let layout = repo.layout();
    let worktrees = repo.worktrees(config)?;
    let wt = resolve(
        &worktrees,
        layout.root(),
        identifier,
        context,
        config.default_branch_or_fallback(),
    )?;

    let Some(old_branch) = wt.branch.clone() else {
        return Err(GitError::DetachedHead {
            path: wt.path.clone(),
        }
        .into());
    };
    if wt.is_main || layout.is_root_checkout(&wt.path) {
        return Err(GitError::CannotModifyDefault {
            branch: old_branch,
            action: "rename".into(),
        }
        .into());
    }
    if wt.is_missing() {
        return Err(GitError::BrokenWorktree {
            path: wt.path.clone(),
            branch: Some(old_branch),
            suggested: None,
        }
        .into());
    }
    let expected = layout.expected_path(&old_branch);
    if expected != wt.path.normalize() {
        return Err(GitError::InconsistentWorktree {
            branch: old_branch,
            path: wt.path.clone(),
            expected,
        }
        .into());
    }
    if new_branch.trim().is_empty() || new_branch == old_branch {
        return Err(GitError::Other {
            message: format!("Worktree is already named {old_branch}"),
        }
        .into());
    }
    if repo.backend().ref_exists(new_branch)? {
        return Err(GitError::BranchAlreadyExists {
            branch: new_branch.to_string(),
        }
        .into());
    }
    let new_path = layout.expected_path(new_branch);
    if new_path.symlink_metadata().is_ok() {
        return Err(GitError::AlreadyExists { path: new_path }.into());
    }
    if is_strictly_within(&new_path, &wt.path) {
        return Err(GitError::Other {
            message: format!(
                "Cannot move {} into its own subdirectory",
                wt.path.display()
            ),
        }
        .into());
    }
    refuse_nested(&wt.path, &worktrees)?;

    let plan = RenamePlan {
        repo,
        old_branch,
        new_branch: new_branch.to_string(),
        old_path: wt.path.clone(),
        new_path,
    };
    plan.execute()?;

    if let Some(parent) = plan.old_path.parent() {
        remove_empty_parents(parent, layout.root());
    }
    log::info!(
        "Renamed {} to {} at {}",
        plan.old_branch,
        plan.new_branch,
        plan.new_path.display()
    );

    let warnings = propagate_after_move(repo, config, &plan.old_path, &plan.new_path);
    Ok(RenameOutcome {
        old_branch: plan.old_branch,
        new_branch: plan.new_branch,
        old_path: plan.old_path,
        new_path: plan.new_path,
        warnings,
    })
}
