//! Version-control backend: the worktree model and the `git` adapter.
//!
//! The core never runs git directly. It talks to a [`VcsBackend`], whose
//! production implementation is [`GitBackend`]; tests use
//! [`testing::FakeBackend`].

use std::path::{Path, PathBuf};

mod error;
mod parse;
mod repository;
pub mod testing;

pub use error::{GitError, detect_ref_conflict};
pub use repository::GitBackend;

/// A checkout directory bound to one branch (or a detached commit).
///
/// Never cached: every logical operation re-lists worktrees from the backend.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Worktree {
    pub path: PathBuf,
    pub head: String,
    /// `None` when detached
    pub branch: Option<String>,
    /// The backing store itself, never a real checkout
    pub bare: bool,
    pub detached: bool,
    pub locked: Option<String>,
    /// Set by git when the registered directory no longer exists
    pub prunable: Option<String>,
    /// Checked out on the configured default branch
    pub is_main: bool,
}

impl Worktree {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            head: String::new(),
            branch: None,
            bare: false,
            detached: false,
            locked: None,
            prunable: None,
            is_main: false,
        }
    }

    /// Final path segment (directory basename).
    pub fn dir_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Whether the registered directory is gone from disk.
    pub fn is_missing(&self) -> bool {
        self.prunable.is_some() || !self.path.exists()
    }

    /// Branch name for display; detached worktrees show their short HEAD.
    pub fn display_name(&self) -> String {
        match &self.branch {
            Some(branch) => branch.clone(),
            None => format!("({})", self.head.get(..8).unwrap_or(&self.head)),
        }
    }
}

/// Operations the core needs from the versioned-storage system.
///
/// Each call may fail with an opaque backend error. Implementations convert
/// branch-hierarchy collisions into [`GitError::RefConflict`] via
/// [`detect_ref_conflict`]; everything else is wrapped as
/// [`GitError::BackendFailure`].
pub trait VcsBackend {
    /// All registered worktrees, including the bare backing store entry.
    fn list_worktrees(&self) -> anyhow::Result<Vec<Worktree>>;

    /// Create a checkout at `path` for `branch`.
    ///
    /// With `create_new`, the branch is created from `base_ref` (or HEAD).
    fn add_worktree(
        &self,
        path: &Path,
        branch: &str,
        create_new: bool,
        base_ref: Option<&str>,
    ) -> anyhow::Result<()>;

    fn remove_worktree(&self, path: &Path, force: bool) -> anyhow::Result<()>;

    fn rename_branch(&self, old: &str, new: &str) -> anyhow::Result<()>;

    /// Whether a local branch with this name exists.
    fn ref_exists(&self, branch: &str) -> anyhow::Result<bool>;

    /// Point the backend's registration at the worktree now living at `path`.
    fn reregister_worktree(&self, path: &Path) -> anyhow::Result<()>;
}
