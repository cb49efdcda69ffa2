//! Worktree catalog, name resolution, path classification, and lifecycle.

use std::path::{Path, PathBuf};

use normalize_path::NormalizePath;

use crate::config::{CONFIG_FILE_NAME, Config};
use crate::git::{GitBackend, VcsBackend, Worktree};

mod classify;
pub mod lifecycle;
mod resolve;

pub use classify::{Placement, WorktreeStatus, is_managed, is_nested, status};
pub use resolve::{DEFAULT_SENTINEL, resolve};

/// Directory holding canonical copies of managed shared sources.
pub const SHARED_DIR_NAME: &str = ".shared";

/// Fixed locations of one repository.
///
/// The bare layout keeps the backing store at `<root>/.bare` and every
/// worktree at `<root>/<branch>`. The classic layout keeps it at
/// `<root>/.git`, with the root itself checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
    backing_store: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>, backing_store: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let backing_store: PathBuf = backing_store.into();
        Self {
            root: root.normalize(),
            backing_store: backing_store.normalize(),
        }
    }

    /// Bare layout rooted at `root`.
    pub fn bare(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let backing_store = root.join(".bare");
        Self::new(root, backing_store)
    }

    /// Layout of the repository a [`GitBackend`] was discovered in.
    pub fn for_git(backend: &GitBackend) -> Self {
        let backing_store = if backend.command_dir() == backend.root() {
            backend.root().join(".git")
        } else {
            backend.command_dir().to_path_buf()
        };
        Self::new(backend.root(), backing_store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn backing_store(&self) -> &Path {
        &self.backing_store
    }

    pub fn shared_dir(&self) -> PathBuf {
        self.root.join(SHARED_DIR_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    /// Where the worktree for `branch` belongs: `<root>/<branch>`.
    pub fn expected_path(&self, branch: &str) -> PathBuf {
        self.root.join(branch).normalize()
    }

    /// Whether `path` is the checked-out root of a classic layout.
    pub fn is_root_checkout(&self, path: &Path) -> bool {
        path.normalize() == self.root
    }
}

/// A repository as seen by one invocation: the backend plus its layout.
///
/// Holds no worktree state; every query re-lists from the backend.
pub struct Repo<'a> {
    backend: &'a dyn VcsBackend,
    layout: Layout,
}

impl<'a> Repo<'a> {
    pub fn new(backend: &'a dyn VcsBackend, layout: Layout) -> Self {
        Self { backend, layout }
    }

    pub fn backend(&self) -> &'a dyn VcsBackend {
        self.backend
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Current non-bare worktrees, with `is_main` set for the one on the
    /// configured default branch.
    ///
    /// Fails only if the backend fails; there is no partial list.
    pub fn worktrees(&self, config: &Config) -> anyhow::Result<Vec<Worktree>> {
        let default_branch = config.default_branch_or_fallback();
        let mut worktrees: Vec<Worktree> = self
            .backend
            .list_worktrees()?
            .into_iter()
            .filter(|wt| !wt.bare && wt.path.normalize() != self.layout.backing_store)
            .collect();
        for wt in &mut worktrees {
            wt.is_main = wt.branch.as_deref() == Some(default_branch);
        }
        log::debug!("Catalog has {} worktrees", worktrees.len());
        Ok(worktrees)
    }
}

/// The worktree checked out on the default branch.
pub fn main_worktree(worktrees: &[Worktree]) -> Option<&Worktree> {
    worktrees.iter().find(|wt| wt.is_main)
}
