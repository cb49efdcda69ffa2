//! Git worktree fleet management.
//!
//! Arbor keeps every worktree of a repository at `<root>/<branch>`, keeps
//! configured files propagated into all of them, and repairs worktrees whose
//! directory, branch, and git registration have drifted apart.
//!
//! - [`worktree`]: catalog, name resolution, path classification, create/remove
//! - [`shared`]: symlink/copy/command propagation with conflict pre-checks
//! - [`repair`]: mismatch/external/broken repairs and rename, with rollback
//!
//! All operations take the backend ([`git::VcsBackend`]) and the
//! [`config::Config`] explicitly; nothing is cached between calls.

pub mod config;
pub mod git;
pub mod path;
pub mod repair;
mod rollback;
pub mod shared;
pub mod shell_exec;
pub mod styling;
pub mod worktree;

pub use git::GitError;
