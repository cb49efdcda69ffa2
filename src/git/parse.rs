//! Git output parsing

use std::path::PathBuf;

use super::{GitError, Worktree};

impl Worktree {
    /// Parse `git worktree list --porcelain` output.
    ///
    /// Entries are separated by blank lines. Bare entries are kept here;
    /// the catalog filters them.
    pub(crate) fn parse_porcelain_list(output: &str) -> Result<Vec<Self>, GitError> {
        let mut worktrees = Vec::new();
        let mut current: Option<Worktree> = None;

        for line in output.lines() {
            if line.is_empty() {
                if let Some(wt) = current.take() {
                    worktrees.push(wt);
                }
                continue;
            }

            let (key, value) = match line.split_once(' ') {
                Some((k, v)) => (k, Some(v)),
                None => (line, None),
            };

            match (key, current.as_mut()) {
                ("worktree", _) => {
                    let path = value.ok_or_else(|| GitError::ParseError {
                        message: "worktree line missing path".to_string(),
                    })?;
                    if let Some(wt) = current.take() {
                        worktrees.push(wt);
                    }
                    current = Some(Worktree::new(PathBuf::from(path)));
                }
                ("HEAD", Some(wt)) => {
                    wt.head = value
                        .ok_or_else(|| GitError::ParseError {
                            message: "HEAD line missing SHA".to_string(),
                        })?
                        .to_string();
                }
                ("branch", Some(wt)) => {
                    let branch_ref = value.ok_or_else(|| GitError::ParseError {
                        message: "branch line missing ref".to_string(),
                    })?;
                    let branch = branch_ref
                        .strip_prefix("refs/heads/")
                        .unwrap_or(branch_ref)
                        .to_string();
                    wt.branch = Some(branch);
                }
                ("bare", Some(wt)) => wt.bare = true,
                ("detached", Some(wt)) => wt.detached = true,
                ("locked", Some(wt)) => wt.locked = Some(value.unwrap_or_default().to_string()),
                ("prunable", Some(wt)) => {
                    wt.prunable = Some(value.unwrap_or_default().to_string());
                }
                // Unknown attributes, or attributes before the first worktree
                _ => {}
            }
        }

        if let Some(wt) = current {
            worktrees.push(wt);
        }

        Ok(worktrees)
    }
}
