//! Undo stack for multi-step mutations.
//!
//! Each committed step pushes its reverse. On failure the stack unwinds in
//! reverse order; if an undo step fails too, both the original error and
//! every undo failure are reported together.

use ansi_str::AnsiStr;

use crate::git::GitError;

type Undo<'a> = Box<dyn FnOnce() -> anyhow::Result<()> + 'a>;

pub(crate) struct Rollback<'a> {
    action: String,
    steps: Vec<(String, Undo<'a>)>,
}

impl<'a> Rollback<'a> {
    /// Start an empty stack for `action` (e.g. "rename feature to feat").
    pub(crate) fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            steps: Vec::new(),
        }
    }

    /// Record the reverse of a step that just succeeded.
    pub(crate) fn push(
        &mut self,
        description: impl Into<String>,
        undo: impl FnOnce() -> anyhow::Result<()> + 'a,
    ) {
        let description = description.into();
        log::debug!("[{}] committed step; undo is: {description}", self.action);
        self.steps.push((description, Box::new(undo)));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.steps.len()
    }

    /// Every step succeeded; drop the undo actions.
    pub(crate) fn commit(self) {
        log::debug!("[{}] done after {} steps", self.action, self.steps.len());
    }

    /// Undo every recorded step, newest first, and return the error to report.
    ///
    /// Returns `error` unchanged when every undo succeeds, otherwise
    /// [`GitError::RollbackFailed`] carrying both.
    pub(crate) fn unwind(self, error: anyhow::Error) -> anyhow::Error {
        log::debug!(
            "[{}] failed, undoing {} steps: {}",
            self.action,
            self.steps.len(),
            plain(&error)
        );
        let mut failures = Vec::new();
        for (description, undo) in self.steps.into_iter().rev() {
            match undo() {
                Ok(()) => log::debug!("[{}] undid: {description}", self.action),
                Err(e) => {
                    log::warn!("[{}] could not {description}: {e:#}", self.action);
                    failures.push(format!("{description}: {}", plain(&e)));
                }
            }
        }

        if failures.is_empty() {
            error
        } else {
            GitError::RollbackFailed {
                action: self.action,
                error: plain(&error),
                rollback_errors: failures,
            }
            .into()
        }
    }
}

/// Single-line, unstyled rendering of an error chain.
fn plain(error: &anyhow::Error) -> String {
    format!("{error:#}")
        .ansi_strip()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}
