//! Creating and removing worktrees at their managed locations.

use std::path::{Path, PathBuf};

use color_print::cformat;
use serde::Serialize;

use super::{Repo, resolve};
use crate::config::Config;
use crate::git::GitError;
use crate::path::{format_path_for_display, remove_empty_parents};
use crate::rollback::Rollback;
use crate::shared::{self, ApplyReport, CommandOutcome};

#[derive(Debug, Clone, Serialize)]
pub struct CreateReport {
    pub branch: String,
    pub path: PathBuf,
    pub shared: ApplyReport,
    pub commands: Vec<CommandOutcome>,
    /// Propagation and command failures; the worktree itself was created
    pub warnings: Vec<String>,
}

/// Create a worktree for `branch` at `<root>/<branch>`.
///
/// With `create_new`, the branch is created from `base` (or HEAD). After
/// the worktree exists, file-based shared entries are propagated into it
/// and command entries run there; their failures become warnings.
pub fn create(
    repo: &Repo,
    config: &Config,
    branch: &str,
    create_new: bool,
    base: Option<&str>,
) -> anyhow::Result<CreateReport> {
    let layout = repo.layout();
    let backend = repo.backend();
    let path = layout.expected_path(branch);

    if path.symlink_metadata().is_ok() {
        return Err(GitError::AlreadyExists { path }.into());
    }
    let worktrees = repo.worktrees(config)?;
    if let Some(existing) = worktrees
        .iter()
        .find(|wt| wt.branch.as_deref() == Some(branch))
    {
        return Err(GitError::Other {
            message: cformat!(
                "Branch <bold>{branch}</> is already checked out at <bold>{}</>",
                format_path_for_display(&existing.path)
            ),
        }
        .into());
    }
    if create_new && backend.ref_exists(branch)? {
        return Err(GitError::BranchAlreadyExists {
            branch: branch.to_string(),
        }
        .into());
    }
    if !create_new && !backend.ref_exists(branch)? {
        return Err(GitError::Other {
            message: cformat!(
                "Branch <bold>{branch}</> does not exist; pass <bright-black>--create</> to create it"
            ),
        }
        .into());
    }

    backend.add_worktree(&path, branch, create_new, base)?;
    log::info!("Created worktree {} for {branch}", path.display());

    let mut warnings = Vec::new();
    let shared = match shared::apply_to_worktree(repo, config, &path) {
        Ok(report) => report,
        Err(e) => {
            log::warn!("Shared files not propagated to {}: {e:#}", path.display());
            warnings.push(format!("Shared files were not propagated: {e:#}"));
            ApplyReport::default()
        }
    };

    let commands = shared::run_create_commands(config, &path);
    for outcome in commands.iter().filter(|o| !o.success) {
        warnings.push(format!("Command failed: {}", outcome.command));
    }

    Ok(CreateReport {
        branch: branch.to_string(),
        path,
        shared,
        commands,
        warnings,
    })
}

/// Remove the worktree `identifier` resolves to, then any parent
/// directories the removal left empty (up to the root).
///
/// Shared links and unchanged shared copies are deleted first; they are put
/// back if the removal fails.
///
/// The default-branch worktree is never removed.
pub fn remove(
    repo: &Repo,
    config: &Config,
    identifier: &str,
    context: Option<&Path>,
    force: bool,
) -> anyhow::Result<PathBuf> {
    let layout = repo.layout();
    let worktrees = repo.worktrees(config)?;
    let target = resolve(
        &worktrees,
        layout.root(),
        identifier,
        context,
        config.default_branch_or_fallback(),
    )?;

    if target.is_main || layout.is_root_checkout(&target.path) {
        return Err(GitError::CannotModifyDefault {
            branch: target.display_name(),
            action: "remove".into(),
        }
        .into());
    }

    let path = target.path.clone();
    // Git refuses to remove a worktree holding untracked shared links
    let mut rollback = Rollback::new(format!("remove {}", target.display_name()));
    let removed = shared::withdraw(repo, config, &worktrees, &path, &mut rollback)
        .and_then(|_| repo.backend().remove_worktree(&path, force));
    if let Err(e) = removed {
        return Err(rollback.unwind(e));
    }
    rollback.commit();
    if let Some(parent) = path.parent() {
        remove_empty_parents(parent, layout.root());
    }
    log::info!("Removed worktree {}", path.display());
    Ok(path)
}
