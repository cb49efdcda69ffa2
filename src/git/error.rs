//! Arbor error types and formatting
//!
//! - **`GitError`** - typed enum for domain errors that can be pattern-matched
//!   and tested. Use `.into()` to convert to `anyhow::Error` while preserving
//!   the type for `downcast_ref`. Display produces styled output for users.
//! - **`detect_ref_conflict`** - the single place that inspects raw git error
//!   text, turning branch-hierarchy collisions into [`GitError::RefConflict`].

use std::path::PathBuf;
use std::sync::LazyLock;

use color_print::cformat;
use regex::Regex;

use crate::path::format_path_for_display;
use crate::shared::Conflict;
use crate::styling::{error_message, format_with_gutter, hint_message, suggest_command};

/// Domain errors for worktree resolution, propagation, and repair.
///
/// ```ignore
/// return Err(GitError::NotFound { identifier: "feature".into() }.into());
///
/// if let Some(GitError::AmbiguousMatch { matches, .. }) = err.downcast_ref() {
///     // print disambiguation hints
/// }
/// ```
#[derive(Debug, Clone)]
pub enum GitError {
    // Resolution errors
    NotFound {
        identifier: String,
    },
    AmbiguousMatch {
        identifier: String,
        /// Every worktree path whose directory name matched
        matches: Vec<PathBuf>,
    },
    NotInWorktree,
    DefaultWorktreeNotFound {
        branch: String,
    },

    // Shared-file errors
    ConflictDetected {
        conflicts: Vec<Conflict>,
    },
    SourceAlreadyConfigured {
        source: String,
    },
    SourceNotConfigured {
        source: String,
    },
    SourceMissing {
        source: String,
        path: PathBuf,
    },

    // Naming and structure errors
    RefConflict {
        attempted: String,
        conflicting: String,
    },
    AlreadyExists {
        path: PathBuf,
    },
    BranchAlreadyExists {
        branch: String,
    },
    DetachedHead {
        path: PathBuf,
    },
    CannotModifyDefault {
        branch: String,
        action: String,
    },
    InconsistentWorktree {
        branch: String,
        path: PathBuf,
        expected: PathBuf,
    },
    BrokenWorktree {
        path: PathBuf,
        branch: Option<String>,
        suggested: Option<PathBuf>,
    },
    /// Moving `path` would carry these other worktrees along with it
    NestedWorktrees {
        path: PathBuf,
        nested: Vec<PathBuf>,
    },

    // Execution errors
    BackendFailure {
        action: String,
        error: String,
    },
    RollbackFailed {
        action: String,
        error: String,
        rollback_errors: Vec<String>,
    },
    ParseError {
        message: String,
    },
    Other {
        message: String,
    },
}

impl std::error::Error for GitError {}

impl std::fmt::Display for GitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitError::NotFound { identifier } => {
                let list_cmd = suggest_command("list", &[], &[]);
                write!(
                    f,
                    "{}\n{}",
                    error_message(cformat!("No worktree matches <bold>{identifier}</>")),
                    hint_message(cformat!(
                        "To see available worktrees, run <bright-black>{list_cmd}</>"
                    ))
                )
            }

            GitError::AmbiguousMatch {
                identifier,
                matches,
            } => {
                let paths = matches
                    .iter()
                    .map(|p| format_path_for_display(p))
                    .collect::<Vec<_>>()
                    .join("\n");
                write!(
                    f,
                    "{}\n{}\n{}",
                    error_message(cformat!(
                        "<bold>{identifier}</> matches {} worktrees",
                        matches.len()
                    )),
                    format_with_gutter(&paths, None),
                    hint_message("Specify the branch name or a path relative to the repository root")
                )
            }

            GitError::NotInWorktree => write!(
                f,
                "{}\n{}",
                error_message("Not in a worktree"),
                hint_message("Run from inside a worktree, or specify a branch name")
            ),

            GitError::DefaultWorktreeNotFound { branch } => write!(
                f,
                "{}\n{}",
                error_message(cformat!(
                    "No worktree is checked out on the default branch <bold>{branch}</>"
                )),
                hint_message(cformat!(
                    "Set <bright-black>default-branch</> in <bright-black>.arbor.toml</> or create the worktree"
                ))
            ),

            GitError::ConflictDetected { conflicts } => {
                let lines = conflicts
                    .iter()
                    .map(|c| {
                        format!(
                            "{}: {}",
                            c.source,
                            format_path_for_display(&c.target)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                let noun = if conflicts.len() == 1 {
                    "location"
                } else {
                    "locations"
                };
                write!(
                    f,
                    "{}\n{}\n{}",
                    error_message(format!(
                        "Existing files would be overwritten at {} {noun}; nothing was changed",
                        conflicts.len()
                    )),
                    format_with_gutter(&lines, None),
                    hint_message("Move or delete these files, then run the command again")
                )
            }

            GitError::SourceAlreadyConfigured { source } => write!(
                f,
                "{}",
                error_message(cformat!("<bold>{source}</> is already shared"))
            ),

            GitError::SourceNotConfigured { source } => {
                let list_cmd = suggest_command("share", &["list"], &[]);
                write!(
                    f,
                    "{}\n{}",
                    error_message(cformat!("<bold>{source}</> is not shared")),
                    hint_message(cformat!(
                        "To list shared sources, run <bright-black>{list_cmd}</>"
                    ))
                )
            }

            GitError::SourceMissing { source, path } => {
                let path_display = format_path_for_display(path);
                write!(
                    f,
                    "{}",
                    error_message(cformat!(
                        "Source for <bold>{source}</> not found at <bold>{path_display}</>"
                    ))
                )
            }

            GitError::RefConflict {
                attempted,
                conflicting,
            } => write!(
                f,
                "{}\n{}",
                error_message(cformat!(
                    "Cannot create branch <bold>{attempted}</>: it collides with existing branch <bold>{conflicting}</>"
                )),
                hint_message(
                    "A branch name cannot also be a directory of other branch names (e.g. feat and feat/x)"
                )
            ),

            GitError::AlreadyExists { path } => {
                let path_display = format_path_for_display(path);
                write!(
                    f,
                    "{}",
                    error_message(cformat!("Path already exists: <bold>{path_display}</>"))
                )
            }

            GitError::BranchAlreadyExists { branch } => write!(
                f,
                "{}",
                error_message(cformat!("Branch <bold>{branch}</> already exists"))
            ),

            GitError::DetachedHead { path } => {
                let path_display = format_path_for_display(path);
                write!(
                    f,
                    "{}\n{}",
                    error_message(cformat!(
                        "Worktree at <bold>{path_display}</> is not on a branch (detached HEAD)"
                    )),
                    hint_message(cformat!(
                        "To switch to a branch, run <bright-black>git switch <<branch>></>"
                    ))
                )
            }

            GitError::CannotModifyDefault { branch, action } => write!(
                f,
                "{}",
                error_message(cformat!(
                    "Cannot {action} the default-branch worktree <bold>{branch}</>"
                ))
            ),

            GitError::InconsistentWorktree {
                branch,
                path,
                expected,
            } => {
                let repair_cmd = suggest_command("repair", &[branch], &[]);
                write!(
                    f,
                    "{}\n{}",
                    error_message(cformat!(
                        "Worktree for <bold>{branch}</> is at <bold>{}</>, expected <bold>{}</>",
                        format_path_for_display(path),
                        format_path_for_display(expected)
                    )),
                    hint_message(cformat!(
                        "To fix the location first, run <bright-black>{repair_cmd}</>"
                    ))
                )
            }

            GitError::BrokenWorktree {
                path,
                branch,
                suggested,
            } => {
                let path_display = format_path_for_display(path);
                let name = branch.as_deref().unwrap_or("(detached)");
                let new_path = suggested
                    .as_deref()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "<new-path>".to_string());
                let fix_cmd = suggest_command("fix-paths", &[name, &new_path], &[]);
                write!(
                    f,
                    "{}\n{}",
                    error_message(cformat!(
                        "Worktree <bold>{name}</> is registered at <bold>{path_display}</>, which no longer exists"
                    )),
                    hint_message(cformat!(
                        "To register its new location, run <bright-black>{fix_cmd}</>"
                    ))
                )
            }

            GitError::NestedWorktrees { path, nested } => {
                let header = error_message(cformat!(
                    "Cannot move <bold>{}</>: other worktrees are inside it",
                    format_path_for_display(path)
                ));
                let inner = nested
                    .iter()
                    .map(|p| format_path_for_display(p))
                    .collect::<Vec<_>>()
                    .join("\n");
                let repair_cmd = suggest_command("repair", &[], &[]);
                write!(
                    f,
                    "{}\n{}",
                    format_error_block(header, &inner),
                    hint_message(cformat!(
                        "Move them out first with <bright-black>{repair_cmd}</>, or remove them"
                    ))
                )
            }

            GitError::BackendFailure { action, error } => {
                let header = error_message(format!("Failed to {action}"));
                write!(f, "{}", format_error_block(header, error))
            }

            GitError::RollbackFailed {
                action,
                error,
                rollback_errors,
            } => {
                let header = error_message(format!(
                    "Failed to {action}, and undoing the partial change also failed"
                ));
                let details = std::iter::once(format!("error: {error}"))
                    .chain(rollback_errors.iter().map(|e| format!("rollback: {e}")))
                    .collect::<Vec<_>>()
                    .join("\n");
                write!(
                    f,
                    "{}\n{}",
                    format_error_block(header, &details),
                    hint_message("The repository may need manual cleanup; run `git worktree list` to inspect it")
                )
            }

            GitError::ParseError { message } | GitError::Other { message } => {
                write!(f, "{}", error_message(message))
            }
        }
    }
}

/// Format an error with header and gutter content
fn format_error_block(header: impl Into<String>, error: &str) -> String {
    let header = header.into();
    let trimmed = error.trim();
    if trimmed.is_empty() {
        header
    } else {
        format!("{header}\n{}", format_with_gutter(trimmed, None))
    }
}

/// `'refs/heads/feat' exists; cannot create 'refs/heads/feat/x'`
static EXISTS_CANNOT_CREATE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"'refs/heads/(?P<existing>[^']+)' exists; cannot create 'refs/heads/(?P<new>[^']+)'")
        .ok()
});

/// `there is a non-empty directory '.git/refs/heads/feat' blocking reference 'refs/heads/feat'`
static DIRECTORY_BLOCKING: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"directory '(?:[^']*/)?refs/heads/(?P<existing>[^']+)' blocking reference 'refs/heads/(?P<new>[^']+)'")
        .ok()
});

/// Recognize a branch-hierarchy collision in git's error output.
///
/// Git refuses `feat/x` when `feat` exists (and `feat` when any `feat/...`
/// exists) because refs are stored as paths. Input is the raw stderr of a
/// failed `git branch -m` / `git worktree add -b`; `attempted` is the branch
/// the caller tried to create. Returns `Some(GitError::RefConflict)` naming
/// both refs, or `None` for any other failure.
///
/// ```
/// use arbor::git::{GitError, detect_ref_conflict};
///
/// let stderr = "fatal: cannot lock ref 'refs/heads/feat/x': 'refs/heads/feat' exists; cannot create 'refs/heads/feat/x'";
/// let err = detect_ref_conflict("feat/x", stderr).unwrap();
/// assert!(matches!(err, GitError::RefConflict { ref conflicting, .. } if conflicting == "feat"));
/// assert!(detect_ref_conflict("feat", "fatal: not a git repository").is_none());
/// ```
pub fn detect_ref_conflict(attempted: &str, error: &str) -> Option<GitError> {
    if let Some(caps) = EXISTS_CANNOT_CREATE.as_ref().and_then(|re| re.captures(error)) {
        return Some(GitError::RefConflict {
            attempted: caps["new"].to_string(),
            conflicting: caps["existing"].to_string(),
        });
    }

    // The blocking directory holds branches below the attempted name; which
    // one is unknown, so name the namespace.
    if let Some(caps) = DIRECTORY_BLOCKING.as_ref().and_then(|re| re.captures(error)) {
        return Some(GitError::RefConflict {
            attempted: caps["new"].to_string(),
            conflicting: format!("{}/*", &caps["existing"]),
        });
    }

    // Older git: "unable to resolve reference 'refs/heads/feat/x': Not a directory"
    if error.contains(&format!("'refs/heads/{attempted}'")) && error.contains("Not a directory") {
        let conflicting = attempted
            .rsplit_once('/')
            .map(|(parent, _)| parent.to_string())
            .unwrap_or_else(|| attempted.to_string());
        return Some(GitError::RefConflict {
            attempted: attempted.to_string(),
            conflicting,
        });
    }

    None
}
