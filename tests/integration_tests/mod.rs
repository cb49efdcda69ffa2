// Integration tests drive real git and rely on Unix symlinks
#![cfg(unix)]

pub mod cli;
pub mod git_backend;
pub mod lifecycle;
pub mod repair;
pub mod shared;
