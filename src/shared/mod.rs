//! Shared-file propagation engine.
//!
//! Keeps configured files, directories, and commands propagated to every
//! worktree. A file-based entry has one canonical location:
//!
//! - **managed**: `<root>/.shared/<source>`; every worktree, including the
//!   default-branch one, receives a symlink or copy of it
//! - **non-managed**: `<default worktree>/<source>`; every *other* worktree
//!   receives a symlink or copy
//!
//! Command entries run once in each newly created worktree and are never
//! applied retroactively.
//!
//! Every mutating operation checks all targets first and aborts with
//! [`GitError::ConflictDetected`] before touching anything if one would be
//! overwritten. Re-applying after a successful apply is a no-op.

use std::path::{Component, Path, PathBuf};

use normalize_path::NormalizePath;
use serde::Serialize;
use tempfile::TempDir;

use crate::config::{Config, ConfigStore, SharedEntry, SharedKind};
use crate::git::{GitError, Worktree};
use crate::path::{format_path_for_display, is_within, relative_to, remove_empty_parents};
use crate::rollback::Rollback;
use crate::shell_exec::run_shell_in;
use crate::worktree::{Layout, Repo, main_worktree};

pub(crate) mod fs_ops;

use fs_ops::{
    TargetState, copy_entry, create_symlink, inspect, move_entry, park_entry, remove_entry,
    resolve_link,
};

/// A target that applying an entry would overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub source: String,
    pub worktree: PathBuf,
    pub target: PathBuf,
}

/// Why targets are being checked.
///
/// Adding a new entry treats a diverged copy as a conflict; re-applying an
/// existing entry treats it as the user's own, independent copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Add,
    Reapply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Apply,
    Skip,
    Conflict,
}

fn decide(kind: SharedKind, intent: Intent, state: TargetState) -> Decision {
    match (kind, state) {
        (_, TargetState::Missing) => Decision::Apply,
        (_, TargetState::Linked) => Decision::Skip,
        (SharedKind::Copy, TargetState::Identical) => Decision::Skip,
        (SharedKind::Copy, TargetState::SameType) if intent == Intent::Reapply => Decision::Skip,
        (SharedKind::Command, _) => Decision::Skip,
        _ => Decision::Conflict,
    }
}

/// Targets touched or left alone by an apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub applied: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

impl ApplyReport {
    fn extend(&mut self, other: ApplyReport) {
        self.applied.extend(other.applied);
        self.skipped.extend(other.skipped);
    }

    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddReport {
    pub entry: SharedEntry,
    /// `(from, to)` when a managed source was moved into the shared directory
    pub relocated: Option<(PathBuf, PathBuf)>,
    pub apply: ApplyReport,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoveReport {
    pub removed: Vec<PathBuf>,
    /// Copies (and foreign entries) left in place
    pub skipped: Vec<PathBuf>,
    /// Where a managed source's canonical copy was moved back to
    pub restored: Option<PathBuf>,
    /// A managed canonical copy that could not be moved back
    pub kept: Option<PathBuf>,
}

/// Result of one command entry run in a new worktree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub command: String,
    pub success: bool,
    pub output: String,
}

/// Where an entry's content lives and which worktrees receive it.
struct Plan {
    entry: SharedEntry,
    canonical: PathBuf,
    /// Current location of the content; differs from `canonical` only while
    /// a managed source is still in the default-branch worktree
    content: PathBuf,
    relocate_from: Option<PathBuf>,
    /// `(worktree, target)` pairs
    targets: Vec<(PathBuf, PathBuf)>,
}

impl Plan {
    fn build(
        layout: &Layout,
        worktrees: &[Worktree],
        default_branch: &str,
        entry: &SharedEntry,
        intent: Intent,
    ) -> anyhow::Result<Self> {
        let main = main_worktree(worktrees);
        let live = || worktrees.iter().filter(|wt| !wt.is_missing());
        let target_of = |wt: &Worktree| (wt.path.clone(), wt.path.join(&entry.source));
        let require_main = || {
            main.ok_or_else(|| GitError::DefaultWorktreeNotFound {
                branch: default_branch.to_string(),
            })
        };

        if entry.managed {
            let canonical = layout.shared_dir().join(&entry.source);
            let targets = live().map(target_of).collect();
            if exists(&canonical) {
                return Ok(Self {
                    entry: entry.clone(),
                    content: canonical.clone(),
                    canonical,
                    relocate_from: None,
                    targets,
                });
            }
            let original = require_main()?.path.join(&entry.source);
            if intent == Intent::Add && exists(&original) && !is_symlink(&original) {
                return Ok(Self {
                    entry: entry.clone(),
                    canonical,
                    content: original.clone(),
                    relocate_from: Some(original),
                    targets,
                });
            }
            return Err(GitError::SourceMissing {
                source: entry.source.clone(),
                path: canonical,
            }
            .into());
        }

        let main = require_main()?;
        let canonical = main.path.join(&entry.source);
        if !exists(&canonical) {
            return Err(GitError::SourceMissing {
                source: entry.source.clone(),
                path: canonical,
            }
            .into());
        }
        Ok(Self {
            entry: entry.clone(),
            content: canonical.clone(),
            canonical,
            relocate_from: None,
            targets: live()
                .filter(|wt| wt.path != main.path)
                .map(target_of)
                .collect(),
        })
    }

    fn restrict_to(mut self, worktree: &Path) -> Self {
        self.targets.retain(|(wt, _)| wt == worktree);
        self
    }

    fn conflicts(&self, intent: Intent) -> anyhow::Result<Vec<Conflict>> {
        let mut conflicts = Vec::new();
        for (worktree, target) in &self.targets {
            // The source itself is about to be moved away
            if self.relocate_from.as_deref() == Some(target.as_path()) {
                continue;
            }
            let state = inspect(target, &self.canonical, &self.content)?;
            if decide(self.entry.kind, intent, state) == Decision::Conflict {
                log::debug!(
                    "Conflict for {}: {} is {state:?}",
                    self.entry.source,
                    target.display()
                );
                conflicts.push(Conflict {
                    source: self.entry.source.clone(),
                    worktree: worktree.clone(),
                    target: target.clone(),
                });
            }
        }
        Ok(conflicts)
    }

    /// Create every missing target. Existing targets are skipped, never
    /// overwritten.
    fn apply(&self) -> anyhow::Result<ApplyReport> {
        let mut report = ApplyReport::default();
        for (_, target) in &self.targets {
            if exists(target) {
                report.skipped.push(target.clone());
                continue;
            }
            match self.entry.kind {
                SharedKind::Symlink => create_symlink(&self.canonical, target)?,
                SharedKind::Copy => copy_entry(&self.canonical, target)?,
                SharedKind::Command => continue,
            }
            report.applied.push(target.clone());
        }
        Ok(report)
    }
}

/// Whether anything (including a dangling symlink) sits at `path`.
fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

fn is_symlink(path: &Path) -> bool {
    path.symlink_metadata()
        .is_ok_and(|m| m.file_type().is_symlink())
}

/// Reject sources that would escape a worktree.
fn validate_source(source: &str) -> Result<(), GitError> {
    let path = Path::new(source);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if source.trim().is_empty() || escapes {
        return Err(GitError::Other {
            message: format!("Shared source must be a relative path inside the worktree: {source}"),
        });
    }
    Ok(())
}

fn conflict_error(conflicts: Vec<Conflict>) -> anyhow::Error {
    GitError::ConflictDetected { conflicts }.into()
}

/// Targets that applying `entry` would overwrite.
pub fn check_conflicts(
    repo: &Repo,
    config: &Config,
    entry: &SharedEntry,
    intent: Intent,
) -> anyhow::Result<Vec<Conflict>> {
    if !entry.kind.is_file_based() {
        return Ok(Vec::new());
    }
    let worktrees = repo.worktrees(config)?;
    Plan::build(
        repo.layout(),
        &worktrees,
        config.default_branch_or_fallback(),
        entry,
        intent,
    )?
    .conflicts(intent)
}

/// Configure a new shared source and propagate it to every worktree.
///
/// Returns the updated config, already persisted to `store`. Nothing is
/// touched if any worktree has a conflicting entry. A managed source is
/// first moved from the default-branch worktree into the shared directory.
pub fn add(
    repo: &Repo,
    config: &Config,
    store: &dyn ConfigStore,
    source: &str,
    kind: SharedKind,
    managed: bool,
) -> anyhow::Result<(Config, AddReport)> {
    if config.find_shared(source).is_some() {
        return Err(GitError::SourceAlreadyConfigured {
            source: source.to_string(),
        }
        .into());
    }
    let entry = SharedEntry::new(source, kind, managed);

    if !kind.is_file_based() {
        let updated = config.with_shared(entry.clone());
        store.save(&updated)?;
        log::info!("Added command entry: {source}");
        return Ok((
            updated,
            AddReport {
                entry,
                relocated: None,
                apply: ApplyReport::default(),
            },
        ));
    }

    validate_source(source)?;
    let worktrees = repo.worktrees(config)?;
    let plan = Plan::build(
        repo.layout(),
        &worktrees,
        config.default_branch_or_fallback(),
        &entry,
        Intent::Add,
    )?;
    let conflicts = plan.conflicts(Intent::Add)?;
    if !conflicts.is_empty() {
        return Err(conflict_error(conflicts));
    }

    let mut rollback = Rollback::new(format!("share {source}"));
    let mut relocated = None;
    if let Some(from) = &plan.relocate_from {
        move_entry(from, &plan.canonical)?;
        let (from, to) = (from.clone(), plan.canonical.clone());
        relocated = Some((from.clone(), to.clone()));
        rollback.push(format!("move {} back", to.display()), move || {
            move_entry(&to, &from)
        });
    }

    let updated = config.with_shared(entry.clone());
    if let Err(e) = store.save(&updated) {
        return Err(rollback.unwind(e));
    }
    rollback.commit();

    let apply = plan.apply()?;
    log::info!(
        "Shared {source}: {} applied, {} skipped",
        apply.applied.len(),
        apply.skipped.len()
    );
    Ok((
        updated,
        AddReport {
            entry,
            relocated,
            apply,
        },
    ))
}

/// Stop sharing `source`.
///
/// Symlinks pointing at the canonical location are always removed. Copies
/// are removed only with `remove_copies`. A managed source's canonical copy
/// is moved back into the default-branch worktree when that location is
/// free. The config entry is deleted after the filesystem cleanup; if saving
/// it fails, the cleanup is undone.
pub fn remove(
    repo: &Repo,
    config: &Config,
    store: &dyn ConfigStore,
    source: &str,
    remove_copies: bool,
) -> anyhow::Result<(Config, RemoveReport)> {
    let Some(entry) = config.find_shared(source).cloned() else {
        return Err(GitError::SourceNotConfigured {
            source: source.to_string(),
        }
        .into());
    };
    let updated = config.without_shared(source);
    let mut report = RemoveReport::default();

    if !entry.kind.is_file_based() {
        store.save(&updated)?;
        return Ok((updated, report));
    }

    let layout = repo.layout();
    let worktrees = repo.worktrees(config)?;
    let main = main_worktree(&worktrees);
    let canonical = if entry.managed {
        layout.shared_dir().join(source)
    } else {
        main.ok_or_else(|| GitError::DefaultWorktreeNotFound {
            branch: config.default_branch_or_fallback().to_string(),
        })?
        .path
        .join(source)
    };

    // Removed entries stay parked until the config is saved
    let mut parked = Vec::new();
    let mut rollback = Rollback::new(format!("unshare {source}"));
    let cleared = clear_targets(
        layout,
        &worktrees,
        &entry,
        &canonical,
        remove_copies,
        &mut rollback,
        &mut parked,
        &mut report,
    )
    .and_then(|()| store.save(&updated));
    if let Err(e) = cleared {
        return Err(rollback.unwind(e));
    }
    rollback.commit();
    drop(parked);

    log::info!(
        "Unshared {source}: {} removed, {} skipped",
        report.removed.len(),
        report.skipped.len()
    );
    Ok((updated, report))
}

/// Filesystem half of [`remove`]. Every step records its undo.
#[allow(clippy::too_many_arguments)]
fn clear_targets(
    layout: &Layout,
    worktrees: &[Worktree],
    entry: &SharedEntry,
    canonical: &Path,
    remove_copies: bool,
    rollback: &mut Rollback<'_>,
    parked: &mut Vec<TempDir>,
    report: &mut RemoveReport,
) -> anyhow::Result<()> {
    let source = entry.source.as_str();
    for wt in worktrees.iter().filter(|wt| !wt.is_missing()) {
        let target = wt.path.join(source);
        if !entry.managed && target == canonical {
            continue;
        }
        let Ok(meta) = target.symlink_metadata() else {
            continue;
        };
        let ours = if meta.file_type().is_symlink() {
            resolve_link(&target).is_ok_and(|resolved| resolved == canonical)
        } else {
            entry.kind == SharedKind::Copy && remove_copies
        };
        if !ours {
            report.skipped.push(target);
            continue;
        }
        let (holder, at) = park_entry(&target)?;
        parked.push(holder);
        let restore = target.clone();
        rollback.push(format!("restore {}", target.display()), move || {
            move_entry(&at, &restore)
        });
        report.removed.push(target);
    }

    if !entry.managed || !exists(canonical) {
        return Ok(());
    }
    let home = main_worktree(worktrees).map(|m| m.path.join(source));
    match home {
        Some(home) if !exists(&home) => {
            move_entry(canonical, &home)?;
            let (from, to) = (canonical.to_path_buf(), home.clone());
            rollback.push(format!("move {} back", home.display()), move || {
                move_entry(&to, &from)
            });
            if let Some(parent) = canonical.parent() {
                remove_empty_parents(parent, &layout.shared_dir());
            }
            report.restored = Some(home);
        }
        _ => {
            log::warn!(
                "Keeping {}: default worktree location is occupied",
                canonical.display()
            );
            report.kept = Some(canonical.to_path_buf());
        }
    }
    Ok(())
}

/// Take propagated entries out of the worktree at `worktree` so it can be
/// removed: symlinks to a canonical location, and copies still identical to
/// it. Anything else stays for the removal to refuse.
///
/// Each deletion records how to recreate it on `rollback`.
pub(crate) fn withdraw(
    repo: &Repo,
    config: &Config,
    worktrees: &[Worktree],
    worktree: &Path,
    rollback: &mut Rollback<'_>,
) -> anyhow::Result<Vec<PathBuf>> {
    let main = main_worktree(worktrees);
    let mut withdrawn = Vec::new();
    for entry in config.file_entries() {
        let canonical = if entry.managed {
            repo.layout().shared_dir().join(&entry.source)
        } else if let Some(main) = main {
            main.path.join(&entry.source)
        } else {
            continue;
        };
        let target = worktree.join(&entry.source);
        if target == canonical || !(is_symlink(&target) || exists(&canonical)) {
            continue;
        }
        let state = inspect(&target, &canonical, &canonical)?;
        let kind = match state {
            TargetState::Linked => SharedKind::Symlink,
            TargetState::Identical if entry.kind == SharedKind::Copy => SharedKind::Copy,
            _ => continue,
        };
        remove_entry(&target)?;
        let (from, to) = (canonical.clone(), target.clone());
        rollback.push(format!("put back {}", target.display()), move || {
            match kind {
                SharedKind::Copy => copy_entry(&from, &to),
                _ => create_symlink(&from, &to),
            }
        });
        withdrawn.push(target);
    }
    if !withdrawn.is_empty() {
        log::debug!(
            "Withdrew {} shared entries from {}",
            withdrawn.len(),
            worktree.display()
        );
    }
    Ok(withdrawn)
}

/// Build plans and check every file entry, optionally for one worktree.
fn checked_plans(
    repo: &Repo,
    config: &Config,
    worktrees: &[Worktree],
    only: Option<&Path>,
) -> anyhow::Result<Vec<Plan>> {
    let mut plans = Vec::new();
    let mut conflicts = Vec::new();
    for entry in config.file_entries() {
        let plan = Plan::build(
            repo.layout(),
            worktrees,
            config.default_branch_or_fallback(),
            entry,
            Intent::Reapply,
        )?;
        let plan = match only {
            Some(path) => plan.restrict_to(path),
            None => plan,
        };
        conflicts.extend(plan.conflicts(Intent::Reapply)?);
        plans.push(plan);
    }
    if !conflicts.is_empty() {
        return Err(conflict_error(conflicts));
    }
    Ok(plans)
}

/// Re-apply every file entry to every worktree.
///
/// All entries are checked before any is applied; one conflict anywhere
/// aborts the whole batch.
pub fn apply_all(repo: &Repo, config: &Config) -> anyhow::Result<ApplyReport> {
    let worktrees = repo.worktrees(config)?;
    let plans = checked_plans(repo, config, &worktrees, None)?;
    let mut report = ApplyReport::default();
    for plan in &plans {
        report.extend(plan.apply()?);
    }
    Ok(report)
}

/// Apply every file entry to one worktree (after create or repair).
pub fn apply_to_worktree(
    repo: &Repo,
    config: &Config,
    worktree: &Path,
) -> anyhow::Result<ApplyReport> {
    let worktrees = repo.worktrees(config)?;
    let plans = checked_plans(repo, config, &worktrees, Some(worktree))?;
    let mut report = ApplyReport::default();
    for plan in &plans {
        report.extend(plan.apply()?);
    }
    Ok(report)
}

/// Fix symlinks broken by moving a worktree from `from` to `to`.
///
/// Links are relative, so moving a worktree breaks links inside it, and
/// moving the default-branch worktree breaks links pointing into it. A link
/// is rewritten only if it pointed at the canonical location before the
/// move. Returns the rewritten targets.
pub fn relink_moved(
    repo: &Repo,
    config: &Config,
    from: &Path,
    to: &Path,
) -> anyhow::Result<Vec<PathBuf>> {
    let worktrees = repo.worktrees(config)?;
    let main = main_worktree(&worktrees);
    let before_move = |p: &Path| -> PathBuf {
        match relative_to(p, to) {
            Some(rel) if is_within(p, to) => from.join(rel),
            _ => p.to_path_buf(),
        }
    };

    let mut relinked = Vec::new();
    for entry in config
        .file_entries()
        .filter(|e| e.kind == SharedKind::Symlink)
    {
        let canonical = if entry.managed {
            repo.layout().shared_dir().join(&entry.source)
        } else {
            match main {
                Some(main) => main.path.join(&entry.source),
                None => continue,
            }
        };
        let old_canonical = before_move(&canonical);

        for wt in worktrees.iter().filter(|wt| !wt.is_missing()) {
            let target = wt.path.join(&entry.source);
            let old_target = before_move(&target);
            if (old_target == target && old_canonical == canonical) || !is_symlink(&target) {
                continue;
            }
            let Ok(text) = std::fs::read_link(&target) else {
                continue;
            };
            let base = old_target.parent().unwrap_or(Path::new(""));
            let pointed = base.join(text).normalize();
            if pointed == old_canonical {
                remove_entry(&target)?;
                create_symlink(&canonical, &target)?;
                relinked.push(target);
            }
        }
    }
    Ok(relinked)
}

/// Run every command entry in a newly created worktree, in order.
///
/// Failures are reported per command and do not stop later commands.
pub fn run_create_commands(config: &Config, worktree: &Path) -> Vec<CommandOutcome> {
    let context = worktree
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    config
        .command_entries()
        .map(|entry| {
            let command = entry.source.clone();
            match run_shell_in(&command, worktree, context.as_deref()) {
                Ok(outcome) => CommandOutcome {
                    command,
                    success: outcome.success,
                    output: outcome.output,
                },
                Err(e) => CommandOutcome {
                    command,
                    success: false,
                    output: format!(
                        "failed to start in {}: {e}",
                        format_path_for_display(worktree)
                    ),
                },
            }
        })
        .collect()
}
