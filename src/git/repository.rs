//! `git` implementation of [`VcsBackend`].

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, bail};
use dunce::canonicalize;

use super::{GitError, VcsBackend, Worktree, detect_ref_conflict};
use crate::path::format_path_for_display;
use crate::shell_exec::run;

/// Git backend rooted at one repository.
///
/// `command_dir` is where git runs: the bare backing store for the bare
/// layout, or the root checkout for the classic layout.
#[derive(Debug, Clone)]
pub struct GitBackend {
    root: PathBuf,
    command_dir: PathBuf,
}

impl GitBackend {
    /// Backend running git in `command_dir`, for a repository rooted at `root`.
    pub fn at(root: impl Into<PathBuf>, command_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            command_dir: command_dir.into(),
        }
    }

    /// Locate the repository containing `cwd`.
    ///
    /// The repository root is the parent of the git common dir, so both
    /// `<root>/.bare` and `<root>/.git` layouts resolve to `<root>`.
    pub fn discover(cwd: &Path) -> anyhow::Result<Self> {
        let mut cmd = Command::new("git");
        cmd.args(["rev-parse", "--path-format=absolute", "--git-common-dir"]);
        cmd.current_dir(cwd);
        let output = run(&mut cmd, None).context("Failed to execute: git rev-parse")?;
        if !output.status.success() {
            return Err(GitError::Other {
                message: format!(
                    "Not inside a git repository: {}",
                    format_path_for_display(cwd)
                ),
            }
            .into());
        }

        let common_dir = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
        let common_dir = canonicalize(&common_dir).unwrap_or(common_dir);
        let root = common_dir
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| GitError::ParseError {
                message: format!("Git common dir has no parent: {}", common_dir.display()),
            })?;

        // Classic layout: `<root>/.git` with the root itself checked out
        let command_dir = if common_dir.file_name().is_some_and(|n| n == ".git") {
            root.clone()
        } else {
            common_dir
        };

        log::debug!(
            "Repository root {} (git runs in {})",
            root.display(),
            command_dir.display()
        );
        Ok(Self::at(root, command_dir))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn command_dir(&self) -> &Path {
        &self.command_dir
    }

    fn logging_context(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string())
    }

    /// Run a git command in the backend's directory, returning stdout.
    ///
    /// A non-zero exit becomes an error carrying git's stderr (and stdout,
    /// since some commands report errors there).
    pub fn run_command(&self, args: &[&str]) -> anyhow::Result<String> {
        let mut cmd = Command::new("git");
        cmd.args(args);
        cmd.current_dir(&self.command_dir);

        let output = run(&mut cmd, Some(&self.logging_context()))
            .with_context(|| format!("Failed to execute: git {}", args.join(" ")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).replace('\r', "\n");
            for line in stderr.trim().lines() {
                log::debug!("  ! {}", line);
            }
            let stdout = String::from_utf8_lossy(&output.stdout);
            let error_msg = [stderr.trim(), stdout.trim()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            bail!("{}", error_msg);
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        for line in stdout.trim().lines() {
            log::debug!("  {}", line);
        }
        Ok(stdout)
    }

    /// Run a mutating command, mapping failures onto typed errors.
    fn run_mutation(&self, args: &[&str], action: String, branch: Option<&str>) -> anyhow::Result<()> {
        match self.run_command(args) {
            Ok(_) => Ok(()),
            Err(e) => {
                let error = e.to_string();
                if let Some(branch) = branch
                    && let Some(conflict) = detect_ref_conflict(branch, &error)
                {
                    return Err(conflict.into());
                }
                Err(GitError::BackendFailure { action, error }.into())
            }
        }
    }
}

fn path_str(path: &Path) -> anyhow::Result<&str> {
    path.to_str().ok_or_else(|| {
        GitError::Other {
            message: format!(
                "Worktree path contains invalid UTF-8: {}",
                format_path_for_display(path)
            ),
        }
        .into()
    })
}

impl VcsBackend for GitBackend {
    fn list_worktrees(&self) -> anyhow::Result<Vec<Worktree>> {
        let stdout = self
            .run_command(&["worktree", "list", "--porcelain"])
            .map_err(|e| GitError::BackendFailure {
                action: "list worktrees".into(),
                error: e.to_string(),
            })?;
        Ok(Worktree::parse_porcelain_list(&stdout)?)
    }

    fn add_worktree(
        &self,
        path: &Path,
        branch: &str,
        create_new: bool,
        base_ref: Option<&str>,
    ) -> anyhow::Result<()> {
        let path = path_str(path)?;
        let mut args = vec!["worktree", "add"];
        if create_new {
            args.extend(["-b", branch, path]);
            if let Some(base) = base_ref {
                args.push(base);
            }
        } else {
            args.extend([path, branch]);
        }
        self.run_mutation(
            &args,
            format!("create worktree for {branch}"),
            create_new.then_some(branch),
        )
    }

    fn remove_worktree(&self, path: &Path, force: bool) -> anyhow::Result<()> {
        let path_arg = path_str(path)?;
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(path_arg);
        self.run_mutation(
            &args,
            format!("remove worktree at {}", format_path_for_display(path)),
            None,
        )
    }

    fn rename_branch(&self, old: &str, new: &str) -> anyhow::Result<()> {
        self.run_mutation(
            &["branch", "-m", old, new],
            format!("rename branch {old} to {new}"),
            Some(new),
        )
    }

    fn ref_exists(&self, branch: &str) -> anyhow::Result<bool> {
        let reference = format!("refs/heads/{branch}");
        // The pattern also matches refs below it (`refs/heads/<branch>/...`)
        let refs = self
            .run_command(&["for-each-ref", "--format=%(refname)", &reference])
            .with_context(|| format!("Failed to look up branch {branch}"))?;
        Ok(refs.lines().any(|line| line == reference))
    }

    fn reregister_worktree(&self, path: &Path) -> anyhow::Result<()> {
        let path_arg = path_str(path)?;
        self.run_mutation(
            &["worktree", "repair", path_arg],
            format!("register worktree at {}", format_path_for_display(path)),
            None,
        )
    }
}
