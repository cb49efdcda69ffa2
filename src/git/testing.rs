//! In-memory [`VcsBackend`] for tests.
//!
//! Worktree directories are real (under a temp dir) so filesystem moves can
//! be observed; registrations, branches, and failures live in memory. Each
//! worktree gets a `.git` file naming its administrative directory, whose
//! `gitdir` file points back at the checkout, the way git links a linked
//! worktree to its metadata.
//! [`reregister_worktree`](VcsBackend::reregister_worktree) follows that
//! link and rewrites `gitdir` just like `git worktree repair`.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::bail;
use tempfile::TempDir;

use super::{GitError, VcsBackend, Worktree, detect_ref_conflict};

/// Backend operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    List,
    Add,
    Remove,
    RenameBranch,
    Reregister,
}

#[derive(Debug, Clone)]
struct FakeEntry {
    id: String,
    worktree: Worktree,
}

#[derive(Debug)]
pub struct FakeBackend {
    entries: RefCell<Vec<FakeEntry>>,
    branches: RefCell<BTreeSet<String>>,
    failures: RefCell<HashMap<FakeOp, String>>,
    calls: RefCell<Vec<String>>,
    next_id: RefCell<usize>,
    /// Holds `worktrees/<id>/gitdir` for every registration
    admin: TempDir,
}

impl Default for FakeBackend {
    fn default() -> Self {
        let admin = tempfile::tempdir()
            .unwrap_or_else(|e| panic!("FakeBackend could not create its admin dir: {e}"));
        Self {
            entries: RefCell::default(),
            branches: RefCell::default(),
            failures: RefCell::default(),
            calls: RefCell::default(),
            next_id: RefCell::default(),
            admin,
        }
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worktree, creating its directory and `.git` link file.
    pub fn with_worktree(self, path: impl Into<PathBuf>, branch: &str) -> Self {
        let path = path.into();
        self.create_checkout(&path, Some(branch));
        self
    }

    /// Register a detached worktree.
    pub fn with_detached(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.create_checkout(&path, None);
        self
    }

    /// Register a worktree whose directory does not exist.
    pub fn with_missing(self, path: impl Into<PathBuf>, branch: &str) -> Self {
        let id = self.allocate_id();
        let path = path.into();
        self.write_admin(&id, &path);
        let mut worktree = Worktree::new(path);
        worktree.branch = Some(branch.to_string());
        self.branches.borrow_mut().insert(branch.to_string());
        self.entries.borrow_mut().push(FakeEntry { id, worktree });
        self
    }

    /// Register the bare backing-store entry.
    pub fn with_bare(self, path: impl Into<PathBuf>) -> Self {
        let mut worktree = Worktree::new(path.into());
        worktree.bare = true;
        self.entries.borrow_mut().push(FakeEntry {
            id: String::new(),
            worktree,
        });
        self
    }

    /// Add a branch with no worktree.
    pub fn with_branch(self, branch: &str) -> Self {
        self.branches.borrow_mut().insert(branch.to_string());
        self
    }

    /// Make every later call of `op` fail with `message`.
    pub fn fail_on(&self, op: FakeOp, message: &str) {
        self.failures.borrow_mut().insert(op, message.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures.borrow_mut().clear();
    }

    /// Mutating calls made so far, e.g. `rename feature -> feat`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn branches(&self) -> Vec<String> {
        self.branches.borrow().iter().cloned().collect()
    }

    /// Registered path for `branch`, if any.
    pub fn registered_path(&self, branch: &str) -> Option<PathBuf> {
        self.entries
            .borrow()
            .iter()
            .find(|e| e.worktree.branch.as_deref() == Some(branch))
            .map(|e| e.worktree.path.clone())
    }

    fn allocate_id(&self) -> String {
        let mut next = self.next_id.borrow_mut();
        *next += 1;
        format!("wt{next}")
    }

    fn admin_dir(&self, id: &str) -> PathBuf {
        self.admin.path().join("worktrees").join(id)
    }

    /// Point `worktrees/<id>/gitdir` at `checkout`.
    fn write_admin(&self, id: &str, checkout: &Path) {
        let dir = self.admin_dir(id);
        if let Err(e) = std::fs::create_dir_all(&dir).and_then(|()| {
            std::fs::write(dir.join("gitdir"), format!("{}\n", checkout.join(".git").display()))
        }) {
            panic!("FakeBackend could not write {}: {e}", dir.display());
        }
    }

    fn create_checkout(&self, path: &Path, branch: Option<&str>) {
        let id = self.allocate_id();
        let link = format!("gitdir: {}\n", self.admin_dir(&id).display());
        if let Err(e) = std::fs::create_dir_all(path)
            .and_then(|()| std::fs::write(path.join(".git"), link))
        {
            panic!("FakeBackend could not create {}: {e}", path.display());
        }
        self.write_admin(&id, path);
        let mut worktree = Worktree::new(path.to_path_buf());
        worktree.head = format!("{id:0>40}");
        worktree.branch = branch.map(str::to_string);
        worktree.detached = branch.is_none();
        if let Some(branch) = branch {
            self.branches.borrow_mut().insert(branch.to_string());
        }
        self.entries.borrow_mut().push(FakeEntry { id, worktree });
    }

    fn check_failure(&self, op: FakeOp) -> anyhow::Result<()> {
        if let Some(message) = self.failures.borrow().get(&op) {
            bail!(GitError::BackendFailure {
                action: format!("{op:?}"),
                error: message.clone(),
            });
        }
        Ok(())
    }

    /// Git's refusal when a branch name would nest under (or contain) another.
    fn hierarchy_error(&self, new: &str) -> Option<String> {
        self.branches.borrow().iter().find_map(|existing| {
            let nested = new.starts_with(&format!("{existing}/"))
                || existing.starts_with(&format!("{new}/"));
            nested.then(|| {
                format!(
                    "error: 'refs/heads/{existing}' exists; cannot create 'refs/heads/{new}'\nfatal: Branch rename failed"
                )
            })
        })
    }
}

impl VcsBackend for FakeBackend {
    fn list_worktrees(&self) -> anyhow::Result<Vec<Worktree>> {
        self.check_failure(FakeOp::List)?;
        Ok(self
            .entries
            .borrow()
            .iter()
            .map(|e| {
                let mut wt = e.worktree.clone();
                if !wt.bare && !wt.path.exists() {
                    wt.prunable = Some("gitdir file points to non-existent location".into());
                }
                wt
            })
            .collect())
    }

    fn add_worktree(
        &self,
        path: &Path,
        branch: &str,
        create_new: bool,
        _base_ref: Option<&str>,
    ) -> anyhow::Result<()> {
        self.calls.borrow_mut().push(format!("add {branch}"));
        self.check_failure(FakeOp::Add)?;
        if create_new {
            if self.branches.borrow().contains(branch) {
                bail!(GitError::BackendFailure {
                    action: format!("create worktree for {branch}"),
                    error: format!("fatal: a branch named '{branch}' already exists"),
                });
            }
            if let Some(error) = self.hierarchy_error(branch) {
                return Err(detect_ref_conflict(branch, &error)
                    .unwrap_or(GitError::BackendFailure {
                        action: format!("create worktree for {branch}"),
                        error,
                    })
                    .into());
            }
        } else if !self.branches.borrow().contains(branch) {
            bail!(GitError::BackendFailure {
                action: format!("create worktree for {branch}"),
                error: format!("fatal: invalid reference: {branch}"),
            });
        }
        if path.exists() {
            bail!(GitError::BackendFailure {
                action: format!("create worktree for {branch}"),
                error: format!("fatal: '{}' already exists", path.display()),
            });
        }
        self.create_checkout(path, Some(branch));
        Ok(())
    }

    fn remove_worktree(&self, path: &Path, force: bool) -> anyhow::Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("remove {}", path.display()));
        self.check_failure(FakeOp::Remove)?;
        // Everything but `.git` counts as an untracked file
        let untracked = std::fs::read_dir(path)
            .map(|entries| entries.flatten().any(|e| e.file_name() != ".git"))
            .unwrap_or(false);
        if untracked && !force {
            bail!(GitError::BackendFailure {
                action: "remove worktree".into(),
                error: format!(
                    "fatal: '{}' contains modified or untracked files, use --force to delete it",
                    path.display()
                ),
            });
        }
        let mut entries = self.entries.borrow_mut();
        let Some(index) = entries.iter().position(|e| e.worktree.path == path) else {
            bail!(GitError::BackendFailure {
                action: "remove worktree".into(),
                error: format!("fatal: '{}' is not a working tree", path.display()),
            });
        };
        entries.remove(index);
        if path.exists() {
            std::fs::remove_dir_all(path)?;
        }
        Ok(())
    }

    fn rename_branch(&self, old: &str, new: &str) -> anyhow::Result<()> {
        self.calls.borrow_mut().push(format!("rename {old} -> {new}"));
        self.check_failure(FakeOp::RenameBranch)?;
        if !self.branches.borrow().contains(old) {
            bail!(GitError::BackendFailure {
                action: format!("rename branch {old} to {new}"),
                error: format!("error: refname refs/heads/{old} not found"),
            });
        }
        if self.branches.borrow().contains(new) {
            bail!(GitError::BackendFailure {
                action: format!("rename branch {old} to {new}"),
                error: format!("fatal: a branch named '{new}' already exists"),
            });
        }
        // A branch may be renamed into its own namespace only after it is gone
        self.branches.borrow_mut().remove(old);
        if let Some(error) = self.hierarchy_error(new) {
            self.branches.borrow_mut().insert(old.to_string());
            return Err(detect_ref_conflict(new, &error)
                .unwrap_or(GitError::BackendFailure {
                    action: format!("rename branch {old} to {new}"),
                    error,
                })
                .into());
        }
        self.branches.borrow_mut().insert(new.to_string());
        for entry in self.entries.borrow_mut().iter_mut() {
            if entry.worktree.branch.as_deref() == Some(old) {
                entry.worktree.branch = Some(new.to_string());
            }
        }
        Ok(())
    }

    fn ref_exists(&self, branch: &str) -> anyhow::Result<bool> {
        self.check_failure(FakeOp::List)?;
        Ok(self.branches.borrow().contains(branch))
    }

    fn reregister_worktree(&self, path: &Path) -> anyhow::Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("reregister {}", path.display()));
        self.check_failure(FakeOp::Reregister)?;
        let link = std::fs::read_to_string(path.join(".git"))?;
        let worktrees = self.admin.path().join("worktrees");
        let id = link
            .trim()
            .strip_prefix("gitdir:")
            .map(|admin| PathBuf::from(admin.trim()))
            .and_then(|admin| admin.strip_prefix(&worktrees).ok()?.to_str().map(str::to_string));
        let Some(id) = id else {
            bail!(GitError::BackendFailure {
                action: "register worktree".into(),
                error: format!("fatal: not a valid worktree: {}", path.display()),
            });
        };
        let mut entries = self.entries.borrow_mut();
        let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
            bail!(GitError::BackendFailure {
                action: "register worktree".into(),
                error: format!("fatal: unknown worktree id {id}"),
            });
        };
        entry.worktree.path = path.to_path_buf();
        entry.worktree.prunable = None;
        self.write_admin(&id, path);
        Ok(())
    }
}
