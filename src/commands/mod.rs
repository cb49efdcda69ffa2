//! Command handlers: run one library operation, then render its result.
//!
//! Primary data goes to stdout; progress, warnings, and hints to stderr.

use std::path::{Path, PathBuf};

use color_print::cformat;

use arbor::config::{Config, SharedKind, TomlConfigStore};
use arbor::git::Worktree;
use arbor::path::format_path_for_display;
use arbor::repair::{self, RepairAction, RepairStatus, RepairTarget, Strategy};
use arbor::shared;
use arbor::styling::{
    eprintln, hint_message, info_message, println, success_message, suggest_command,
    warning_message,
};
use arbor::worktree::{self, Placement, Repo, lifecycle};

use crate::cli::OutputFormat;

/// Everything a handler needs: the repository view, its config, and where
/// the command was invoked from.
pub(crate) struct Context<'a> {
    pub repo: Repo<'a>,
    pub config: Config,
    pub store: TomlConfigStore,
    pub cwd: PathBuf,
}

impl Context<'_> {
    fn cwd(&self) -> Option<&Path> {
        Some(&self.cwd)
    }
}

fn show(path: &Path) -> String {
    format_path_for_display(path)
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("{}", warning_message(warning));
    }
}

fn branch_label(wt: &Worktree) -> String {
    match &wt.branch {
        Some(branch) => branch.clone(),
        None => format!("(detached {})", short_sha(&wt.head)),
    }
}

fn short_sha(head: &str) -> &str {
    head.get(..7).unwrap_or(head)
}

/// Default-branch worktree first, then by path.
fn display_order(a: &Worktree, b: &Worktree) -> std::cmp::Ordering {
    b.is_main.cmp(&a.is_main).then_with(|| a.path.cmp(&b.path))
}

pub(crate) fn handle_list(ctx: &Context) -> anyhow::Result<()> {
    let mut worktrees = ctx.repo.worktrees(&ctx.config)?;
    worktrees.sort_by(display_order);
    let width = worktrees
        .iter()
        .map(|wt| branch_label(wt).len())
        .max()
        .unwrap_or(0);
    for wt in &worktrees {
        let marker = if wt.is_main { "@" } else { " " };
        println!(
            "{marker} {:<width$}  {}",
            branch_label(wt),
            show(&wt.path)
        );
    }
    Ok(())
}

pub(crate) fn handle_status(ctx: &Context, format: OutputFormat) -> anyhow::Result<()> {
    let worktrees = ctx.repo.worktrees(&ctx.config)?;
    let mut statuses = worktree::status(ctx.repo.layout(), &worktrees);
    statuses.sort_by(|a, b| display_order(&a.worktree, &b.worktree));

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    let width = statuses
        .iter()
        .map(|s| branch_label(&s.worktree).len())
        .max()
        .unwrap_or(0);
    let mut needs_repair = false;
    for s in &statuses {
        let label = format!("{:<width$}", branch_label(&s.worktree));
        let path = show(&s.worktree.path);
        match (s.placement, &s.expected) {
            (Placement::Managed, _) => {
                println!("{}", cformat!("<green>✓</> {label}  {path}"));
            }
            (Placement::Missing, _) => {
                needs_repair = true;
                println!("{}", cformat!("<red>✗</> {label}  {path} <red>(missing)</>"));
            }
            (placement, Some(expected)) => {
                needs_repair = true;
                println!(
                    "{}",
                    cformat!(
                        "<yellow>▲</> {label}  {path} <yellow>({placement}, expected {})</>",
                        show(expected)
                    )
                );
            }
            (placement, None) => {
                needs_repair = true;
                println!(
                    "{}",
                    cformat!("<yellow>▲</> {label}  {path} <yellow>({placement})</>")
                );
            }
        }
    }
    if needs_repair {
        eprintln!(
            "{}",
            hint_message(cformat!(
                "To fix, run <bright-black>{}</>",
                suggest_command("repair", &[], &[])
            ))
        );
    }
    Ok(())
}

pub(crate) fn handle_resolve(ctx: &Context, name: &str) -> anyhow::Result<()> {
    let worktrees = ctx.repo.worktrees(&ctx.config)?;
    let wt = worktree::resolve(
        &worktrees,
        ctx.repo.layout().root(),
        name,
        ctx.cwd(),
        ctx.config.default_branch_or_fallback(),
    )?;
    println!("{}", wt.path.display());
    Ok(())
}

pub(crate) fn handle_create(
    ctx: &Context,
    branch: &str,
    create: bool,
    base: Option<&str>,
) -> anyhow::Result<()> {
    let report = lifecycle::create(&ctx.repo, &ctx.config, branch, create, base)?;
    let verb = if create { "Created branch and worktree" } else { "Created worktree" };
    eprintln!(
        "{}",
        success_message(cformat!(
            "{verb} for <bold>{}</> @ <bold>{}</>",
            report.branch,
            show(&report.path)
        ))
    );
    if !report.shared.applied.is_empty() {
        eprintln!(
            "{}",
            info_message(format!(
                "Linked {} shared {}",
                report.shared.applied.len(),
                if report.shared.applied.len() == 1 { "entry" } else { "entries" }
            ))
        );
    }
    for outcome in report.commands.iter().filter(|o| o.success) {
        eprintln!("{}", info_message(cformat!("Ran <bright-black>{}</>", outcome.command)));
    }
    print_warnings(&report.warnings);
    println!("{}", report.path.display());
    Ok(())
}

pub(crate) fn handle_remove(ctx: &Context, name: &str, force: bool) -> anyhow::Result<()> {
    let path = lifecycle::remove(&ctx.repo, &ctx.config, name, ctx.cwd(), force)?;
    eprintln!(
        "{}",
        success_message(cformat!("Removed worktree <bold>{}</>", show(&path)))
    );
    Ok(())
}

pub(crate) fn handle_rename(ctx: &Context, name: &str, new_branch: &str) -> anyhow::Result<()> {
    let outcome = repair::rename(&ctx.repo, &ctx.config, name, ctx.cwd(), new_branch)?;
    eprintln!(
        "{}",
        success_message(cformat!(
            "Renamed <bold>{}</> to <bold>{}</> @ <bold>{}</>",
            outcome.old_branch,
            outcome.new_branch,
            show(&outcome.new_path)
        ))
    );
    print_warnings(&outcome.warnings);
    Ok(())
}

fn describe_action(action: &RepairAction) -> String {
    match action {
        RepairAction::Moved { from, to } => {
            cformat!("Moved <bold>{}</> to <bold>{}</>", show(from), show(to))
        }
        RepairAction::BranchRenamed { from, to } => {
            cformat!("Renamed branch <bold>{from}</> to <bold>{to}</>")
        }
    }
}

/// Returns whether every repair succeeded.
pub(crate) fn handle_repair(
    ctx: &Context,
    name: Option<&str>,
    strategy: Strategy,
) -> anyhow::Result<bool> {
    if let Some(name) = name {
        match repair::repair_one(&ctx.repo, &ctx.config, name, ctx.cwd(), strategy)? {
            Some(outcome) => {
                eprintln!("{}", success_message(describe_action(&outcome.action)));
                print_warnings(&outcome.warnings);
            }
            None => eprintln!("{}", info_message("Nothing to repair")),
        }
        return Ok(true);
    }

    let results = repair::repair_all(&ctx.repo, &ctx.config, strategy)?;
    if results.is_empty() {
        eprintln!("{}", info_message("All worktrees are where they belong"));
        return Ok(true);
    }

    let mut ok = true;
    for result in &results {
        match &result.status {
            RepairStatus::Repaired(outcome) => {
                eprintln!("{}", success_message(describe_action(&outcome.action)));
                print_warnings(&outcome.warnings);
            }
            RepairStatus::Failed { error } => {
                ok = false;
                eprintln!(
                    "{}",
                    warning_message(cformat!(
                        "Could not repair <bold>{}</>: {error}",
                        show(result.target.path())
                    ))
                );
            }
            RepairStatus::NeedsManualPath => {
                ok = false;
                let RepairTarget::Broken {
                    path,
                    branch,
                    suggested,
                } = &result.target
                else {
                    continue;
                };
                let name = branch.as_deref().unwrap_or("(detached)");
                eprintln!(
                    "{}",
                    warning_message(cformat!(
                        "<bold>{name}</> is registered at <bold>{}</>, which no longer exists",
                        show(path)
                    ))
                );
                let new_path = suggested
                    .as_deref()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "<new-path>".to_string());
                eprintln!(
                    "{}",
                    hint_message(cformat!(
                        "If it was moved, run <bright-black>{}</>",
                        suggest_command("fix-paths", &[name, &new_path], &[])
                    ))
                );
            }
        }
    }
    Ok(ok)
}

pub(crate) fn handle_fix_paths(ctx: &Context, name: &str, new_path: &Path) -> anyhow::Result<()> {
    let new_path = if new_path.is_absolute() {
        new_path.to_path_buf()
    } else {
        ctx.cwd.join(new_path)
    };
    let outcome = repair::fix_paths(&ctx.repo, &ctx.config, name, &new_path)?;
    eprintln!(
        "{}",
        success_message(cformat!(
            "Registered <bold>{}</> at <bold>{}</>",
            outcome.branch.as_deref().unwrap_or("(detached)"),
            show(&outcome.to)
        ))
    );
    print_warnings(&outcome.warnings);
    Ok(())
}

pub(crate) fn handle_share_add(
    ctx: &Context,
    source: &str,
    kind: SharedKind,
    managed: bool,
) -> anyhow::Result<()> {
    let (_, report) = shared::add(&ctx.repo, &ctx.config, &ctx.store, source, kind, managed)?;
    if let Some((from, to)) = &report.relocated {
        eprintln!(
            "{}",
            info_message(cformat!("Moved <bold>{}</> to <bold>{}</>", show(from), show(to)))
        );
    }
    eprintln!(
        "{}",
        success_message(cformat!(
            "Sharing <bold>{source}</> ({kind}) with {} {}",
            report.apply.applied.len(),
            if report.apply.applied.len() == 1 { "worktree" } else { "worktrees" }
        ))
    );
    Ok(())
}

pub(crate) fn handle_share_remove(
    ctx: &Context,
    source: &str,
    remove_copies: bool,
) -> anyhow::Result<()> {
    let (_, report) = shared::remove(&ctx.repo, &ctx.config, &ctx.store, source, remove_copies)?;
    eprintln!(
        "{}",
        success_message(cformat!(
            "Stopped sharing <bold>{source}</>; removed {} {}",
            report.removed.len(),
            if report.removed.len() == 1 { "entry" } else { "entries" }
        ))
    );
    if let Some(restored) = &report.restored {
        eprintln!("{}", info_message(cformat!("Restored <bold>{}</>", show(restored))));
    }
    if let Some(kept) = &report.kept {
        eprintln!(
            "{}",
            warning_message(cformat!(
                "Kept canonical copy at <bold>{}</>; its original location is occupied",
                show(kept)
            ))
        );
    }
    if !report.skipped.is_empty() && !remove_copies {
        eprintln!(
            "{}",
            hint_message(cformat!(
                "Left {} copies in place; to delete them, run <bright-black>{}</>",
                report.skipped.len(),
                suggest_command("share", &["remove", source], &["--remove-copies"])
            ))
        );
    }
    Ok(())
}

pub(crate) fn handle_share_apply(ctx: &Context) -> anyhow::Result<()> {
    let report = shared::apply_all(&ctx.repo, &ctx.config)?;
    if report.is_noop() {
        eprintln!("{}", info_message("Every worktree is up to date"));
    } else {
        eprintln!(
            "{}",
            success_message(format!("Applied {} shared entries", report.applied.len()))
        );
    }
    Ok(())
}

pub(crate) fn handle_share_list(ctx: &Context) -> anyhow::Result<()> {
    for entry in &ctx.config.shared {
        let kind: &str = entry.kind.into();
        let managed = if entry.managed { " (managed)" } else { "" };
        println!("{kind:<8} {}{managed}", entry.source);
    }
    Ok(())
}
