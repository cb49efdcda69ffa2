// Some helpers are only used by a subset of the test files.
#![allow(dead_code)]

//! # Test Utilities for arbor
//!
//! `TestRepo` builds real git repositories in temporary directories, in the
//! bare layout (`<root>/.bare` plus one directory per worktree) or the
//! classic layout (`<root>/.git` with the root checked out).
//!
//! ## Environment Isolation
//!
//! Git commands run with an isolated environment set on each `Command`:
//! - No global or system git config
//! - Deterministic commit timestamps
//! - Consistent locale settings
//!
//! ## Path Canonicalization
//!
//! Paths are canonicalized (via `dunce`) so they compare equal to what git
//! reports, including on macOS where `/var` is a symlink to `/private/var`.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use arbor::config::{Config, ConfigStore, TomlConfigStore};
use arbor::git::GitBackend;
use arbor::worktree::{Layout, Repo};
use tempfile::TempDir;

/// The epoch used for deterministic timestamps in tests (2025-01-01T00:00:00Z).
pub const TEST_EPOCH: u64 = 1735776000;

const NULL_DEVICE: &str = "/dev/null";

/// Canonicalize a path without Windows verbatim prefix (`\\?\`).
pub fn canonicalize(path: &Path) -> std::io::Result<PathBuf> {
    dunce::canonicalize(path)
}

/// Configure a git command with isolated environment for testing.
pub fn configure_git_cmd(cmd: &mut Command, git_config_path: &Path) {
    cmd.env("GIT_CONFIG_GLOBAL", git_config_path);
    cmd.env("GIT_CONFIG_SYSTEM", NULL_DEVICE);
    cmd.env("GIT_AUTHOR_DATE", "2025-01-01T00:00:00Z");
    cmd.env("GIT_COMMITTER_DATE", "2025-01-01T00:00:00Z");
    cmd.env("LC_ALL", "C");
    cmd.env("LANG", "C");
    cmd.env("SOURCE_DATE_EPOCH", TEST_EPOCH.to_string());
    cmd.env("GIT_TERMINAL_PROMPT", "0");
}

fn check_git_status(output: &Output, cmd: &str) {
    if !output.status.success() {
        panic!(
            "git {cmd} failed:\nstdout: {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

pub struct TestRepo {
    _temp_dir: TempDir, // Must keep to ensure cleanup on drop
    root: PathBuf,
    /// A sibling of `root`, for worktrees placed outside the repository
    outside: PathBuf,
    git_config_path: PathBuf,
    bare: bool,
}

impl TestRepo {
    /// Bare layout with `main` checked out at `<root>/main`.
    pub fn bare() -> Self {
        let repo = Self::scaffold(true);
        let parent = repo.root.parent().unwrap().to_path_buf();
        let seed = parent.join("seed");
        std::fs::create_dir(&seed).unwrap();
        repo.run_git_in(&seed, &["init", "-q", "-b", "main"]);
        repo.commit_in(&seed, "Initial commit");

        repo.run_git_in(&parent, &["clone", "-q", "--bare", "seed", "repo/.bare"]);
        let main = repo.root.join("main");
        repo.run_git(&["worktree", "add", "-q", main.to_str().unwrap(), "main"]);
        repo
    }

    /// Classic layout: `<root>/.git`, with `main` checked out at the root.
    pub fn classic() -> Self {
        let repo = Self::scaffold(false);
        repo.run_git(&["init", "-q", "-b", "main"]);
        repo.commit_in(&repo.root, "Initial commit");
        repo
    }

    fn scaffold(bare: bool) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("repo");
        let outside = temp_dir.path().join("outside");
        std::fs::create_dir(&root).unwrap();
        std::fs::create_dir(&outside).unwrap();
        let root = canonicalize(&root).unwrap();
        let outside = canonicalize(&outside).unwrap();

        let git_config_path = temp_dir.path().join("test-gitconfig");
        std::fs::write(
            &git_config_path,
            "[user]\n\tname = Test User\n\temail = test@example.com\n\
             [init]\n\tdefaultBranch = main\n\
             [advice]\n\tdetachedHead = false\n",
        )
        .unwrap();

        Self {
            _temp_dir: temp_dir,
            root,
            outside,
            git_config_path,
            bare,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn outside(&self) -> &Path {
        &self.outside
    }

    /// Where git runs: `.bare` or the root checkout.
    pub fn backing_store(&self) -> PathBuf {
        if self.bare {
            self.root.join(".bare")
        } else {
            self.root.clone()
        }
    }

    /// The default-branch worktree.
    pub fn main_path(&self) -> PathBuf {
        if self.bare {
            self.root.join("main")
        } else {
            self.root.clone()
        }
    }

    #[must_use]
    pub fn git_command(&self) -> Command {
        let mut cmd = Command::new("git");
        configure_git_cmd(&mut cmd, &self.git_config_path);
        cmd.current_dir(self.backing_store());
        cmd
    }

    /// Run a git command in the backing store, panicking on failure.
    pub fn run_git(&self, args: &[&str]) {
        let output = self.git_command().args(args).output().unwrap();
        check_git_status(&output, &args.join(" "));
    }

    pub fn run_git_in(&self, dir: &Path, args: &[&str]) {
        let output = self
            .git_command()
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        check_git_status(&output, &args.join(" "));
    }

    /// Run a git command in the backing store and return trimmed stdout.
    pub fn git_output(&self, args: &[&str]) -> String {
        let output = self.git_command().args(args).output().unwrap();
        check_git_status(&output, &args.join(" "));
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    pub fn commit_in(&self, dir: &Path, message: &str) {
        std::fs::write(dir.join("file.txt"), message).unwrap();
        self.run_git_in(dir, &["add", "file.txt"]);
        self.run_git_in(dir, &["commit", "-q", "-m", message]);
    }

    /// Create `branch` and check it out at `path` (relative to the root).
    pub fn add_worktree_at(&self, branch: &str, path: &str) -> PathBuf {
        let dest = self.root.join(path);
        self.run_git(&["worktree", "add", "-q", "-b", branch, dest.to_str().unwrap()]);
        dest
    }

    /// Create `branch` and check it out at `<root>/<branch>`.
    pub fn add_worktree(&self, branch: &str) -> PathBuf {
        self.add_worktree_at(branch, branch)
    }

    /// Create `branch` and check it out outside the root.
    pub fn add_external_worktree(&self, branch: &str, dir_name: &str) -> PathBuf {
        let dest = self.outside.join(dir_name);
        self.run_git(&["worktree", "add", "-q", "-b", branch, dest.to_str().unwrap()]);
        dest
    }

    pub fn create_branch(&self, branch: &str) {
        self.run_git(&["branch", branch, "main"]);
    }

    pub fn branch_exists(&self, branch: &str) -> bool {
        self.git_command()
            .args(["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")])
            .output()
            .unwrap()
            .status
            .success()
    }

    /// `(path, branch)` pairs from `git worktree list --porcelain`, skipping
    /// the bare entry.
    pub fn registered(&self) -> Vec<(PathBuf, Option<String>)> {
        let listing = self.git_output(&["worktree", "list", "--porcelain"]);
        listing
            .split("\n\n")
            .filter(|block| !block.lines().any(|l| l == "bare"))
            .filter_map(|block| {
                let mut lines = block.lines();
                let path = lines.next()?.strip_prefix("worktree ")?;
                let branch = block
                    .lines()
                    .find_map(|l| l.strip_prefix("branch refs/heads/"))
                    .map(str::to_string);
                Some((PathBuf::from(path), branch))
            })
            .collect()
    }

    pub fn registered_path_of(&self, branch: &str) -> Option<PathBuf> {
        self.registered()
            .into_iter()
            .find(|(_, b)| b.as_deref() == Some(branch))
            .map(|(p, _)| p)
    }

    pub fn backend(&self) -> GitBackend {
        GitBackend::discover(&self.main_path()).unwrap()
    }

    pub fn store(&self) -> TomlConfigStore {
        TomlConfigStore::for_root(&self.root)
    }

    pub fn config(&self) -> Config {
        self.store().load().unwrap()
    }

    pub fn write_config(&self, contents: &str) {
        std::fs::write(self.root.join(".arbor.toml"), contents).unwrap();
    }

    /// An `arbor` command running in `dir` with the isolated git env.
    #[must_use]
    pub fn arbor_command_in(&self, dir: &Path) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_arbor"));
        for (key, _) in std::env::vars() {
            if key.starts_with("GIT_") {
                cmd.env_remove(&key);
            }
        }
        configure_git_cmd(&mut cmd, &self.git_config_path);
        cmd.env_remove("CLICOLOR_FORCE");
        cmd.env("NO_COLOR", "1");
        cmd.env("RUST_LOG", "warn");
        cmd.env("HOME", self.root.parent().unwrap().join("home"));
        cmd.current_dir(dir);
        cmd
    }

    #[must_use]
    pub fn arbor_command(&self) -> Command {
        self.arbor_command_in(&self.main_path())
    }
}

/// A [`Repo`] over `backend`, laid out the way git reports it.
pub fn repo_view(backend: &GitBackend) -> Repo<'_> {
    Repo::new(backend, Layout::for_git(backend))
}

/// Insta settings that replace the temp directories with placeholders.
pub fn setup_snapshot_settings(repo: &TestRepo) -> insta::Settings {
    let mut settings = insta::Settings::clone_current();
    settings.add_filter(&regex::escape(repo.outside().to_str().unwrap()), "_OUTSIDE_");
    settings.add_filter(&regex::escape(repo.root().to_str().unwrap()), "_REPO_");
    settings
}

#[rstest::fixture]
pub fn repo() -> TestRepo {
    TestRepo::bare()
}

#[rstest::fixture]
pub fn classic_repo() -> TestRepo {
    TestRepo::classic()
}
