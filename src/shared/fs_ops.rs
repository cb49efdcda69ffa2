//! Filesystem primitives for shared-file propagation.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use normalize_path::NormalizePath;
use tempfile::TempDir;

use crate::path::relative_to;

/// What currently sits at a target location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TargetState {
    Missing,
    /// A symlink resolving to the canonical location
    Linked,
    /// A regular file byte-identical to the canonical content
    Identical,
    /// A file or directory of the same type as the canonical content
    SameType,
    /// Anything else, including symlinks pointing elsewhere
    Other,
}

/// Resolve a symlink's target text the way the OS would, lexically.
pub(crate) fn resolve_link(link: &Path) -> std::io::Result<PathBuf> {
    let text = fs::read_link(link)?;
    let base = link.parent().unwrap_or(Path::new(""));
    Ok(base.join(text).normalize())
}

/// Inspect `target` against the canonical location `canonical`, whose
/// current content lives at `content` (these differ only while a managed
/// source is being relocated).
pub(crate) fn inspect(target: &Path, canonical: &Path, content: &Path) -> anyhow::Result<TargetState> {
    let meta = match fs::symlink_metadata(target) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(TargetState::Missing),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to inspect {}", target.display()));
        }
    };

    if meta.file_type().is_symlink() {
        let resolved = resolve_link(target)
            .with_context(|| format!("Failed to read link {}", target.display()))?;
        return Ok(if resolved == canonical.normalize() {
            TargetState::Linked
        } else {
            TargetState::Other
        });
    }

    let source_meta = fs::metadata(content)
        .with_context(|| format!("Failed to inspect {}", content.display()))?;
    if meta.is_file() && source_meta.is_file() {
        if meta.len() == source_meta.len() && fs::read(target)? == fs::read(content)? {
            return Ok(TargetState::Identical);
        }
        return Ok(TargetState::SameType);
    }
    if meta.is_dir() && source_meta.is_dir() {
        return Ok(TargetState::SameType);
    }
    Ok(TargetState::Other)
}

/// Create a relative symlink at `target` pointing to `canonical`.
pub(crate) fn create_symlink(canonical: &Path, target: &Path) -> anyhow::Result<()> {
    let parent = target
        .parent()
        .with_context(|| format!("No parent directory for {}", target.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create {}", parent.display()))?;
    let link_text = relative_to(canonical, parent).unwrap_or_else(|| canonical.to_path_buf());

    #[cfg(unix)]
    std::os::unix::fs::symlink(&link_text, target)
        .with_context(|| format!("Failed to link {}", target.display()))?;

    #[cfg(windows)]
    {
        let result = if canonical.is_dir() {
            std::os::windows::fs::symlink_dir(&link_text, target)
        } else {
            std::os::windows::fs::symlink_file(&link_text, target)
        };
        result.with_context(|| format!("Failed to link {}", target.display()))?;
    }

    log::debug!("Linked {} -> {}", target.display(), link_text.display());
    Ok(())
}

/// Copy `source` (file or directory) to `target`, preserving permissions.
pub(crate) fn copy_entry(source: &Path, target: &Path) -> anyhow::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    if source.is_dir() {
        copy_dir_recursive(source, target)?;
    } else {
        copy_file(source, target)?;
    }
    log::debug!("Copied {} -> {}", source.display(), target.display());
    Ok(())
}

fn copy_file(source: &Path, target: &Path) -> anyhow::Result<()> {
    reflink_copy::reflink_or_copy(source, target).with_context(|| {
        format!("Failed to copy {} to {}", source.display(), target.display())
    })?;
    // A reflink clones data only; carry the mode bits over explicitly
    let permissions = fs::metadata(source)?.permissions();
    fs::set_permissions(target, permissions)
        .with_context(|| format!("Failed to set permissions on {}", target.display()))?;
    Ok(())
}

/// Copy a directory recursively, skipping `.git` entries and symlinks
fn copy_dir_recursive(source: &Path, target: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(target)
        .with_context(|| format!("Failed to create {}", target.display()))?;

    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let file_name = entry.file_name();
        if file_name == ".git" || file_type.is_symlink() {
            continue;
        }

        let src_path = entry.path();
        let dest_path = target.join(file_name);
        if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dest_path)?;
        } else {
            copy_file(&src_path, &dest_path)?;
        }
    }

    let permissions = fs::metadata(source)?.permissions();
    fs::set_permissions(target, permissions)?;
    Ok(())
}

/// Remove whatever sits at `target` (symlink, file, or directory tree).
pub(crate) fn remove_entry(target: &Path) -> anyhow::Result<()> {
    let meta = fs::symlink_metadata(target)
        .with_context(|| format!("Failed to inspect {}", target.display()))?;
    let result = if meta.is_dir() {
        fs::remove_dir_all(target)
    } else {
        // Symlinks (including links to directories) and files
        remove_file_or_link(target)
    };
    result.with_context(|| format!("Failed to remove {}", target.display()))?;
    log::debug!("Removed {}", target.display());
    Ok(())
}

#[cfg(unix)]
fn remove_file_or_link(target: &Path) -> std::io::Result<()> {
    fs::remove_file(target)
}

#[cfg(windows)]
fn remove_file_or_link(target: &Path) -> std::io::Result<()> {
    // Directory symlinks on Windows are removed as directories
    fs::remove_file(target).or_else(|_| fs::remove_dir(target))
}

/// Move `from` to `to`, creating `to`'s parent directories.
pub(crate) fn move_entry(from: &Path, to: &Path) -> anyhow::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::rename(from, to)
        .with_context(|| format!("Failed to move {} to {}", from.display(), to.display()))?;
    log::debug!("Moved {} -> {}", from.display(), to.display());
    Ok(())
}

/// Move `target` into a fresh temporary directory beside it.
///
/// Dropping the returned directory deletes the entry; moving the returned
/// path back restores it unchanged.
pub(crate) fn park_entry(target: &Path) -> anyhow::Result<(TempDir, PathBuf)> {
    let parent = target
        .parent()
        .with_context(|| format!("No parent directory for {}", target.display()))?;
    let holder = tempfile::Builder::new()
        .prefix(".arbor-removing-")
        .tempdir_in(parent)
        .with_context(|| format!("Failed to create a staging directory in {}", parent.display()))?;
    let parked = holder.path().join("entry");
    fs::rename(target, &parked)
        .with_context(|| format!("Failed to remove {}", target.display()))?;
    log::debug!("Parked {} at {}", target.display(), parked.display());
    Ok((holder, parked))
}
