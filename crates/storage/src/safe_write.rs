// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The safe-write gate
//!
//! Every write into the real project tree passes through here. The write
//! path's directory is resolved through `realpath` and prefix-checked
//! against the mode's allowlist; enhance-mode writes must additionally be
//! covered by an active lock grant. Symlinks cannot smuggle a write out of
//! the allowed roots because the comparison happens on resolved paths.

use std::path::{Component, Path, PathBuf};
use temper_core::{sanitize_message, Error, LockManager};

/// Resolve a relative write target against the project root.
pub fn resolve_project_path(project_root: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        target.to_path_buf()
    } else {
        project_root.join(target)
    }
}

/// Canonicalize the deepest existing ancestor of `path` and re-append the
/// rest. Lets new files in not-yet-created directories be checked.
fn canonicalize_best_effort(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut remainder: Vec<std::ffi::OsString> = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(real) => {
                let mut result = real;
                for part in remainder.iter().rev() {
                    result.push(part);
                }
                return result;
            }
            Err(_) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    remainder.push(name.to_os_string());
                    existing = parent.to_path_buf();
                }
                _ => return path.to_path_buf(),
            },
        }
    }
}

/// Reject paths that try to climb out with `..` after resolution input.
fn has_parent_components(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

/// Check that `path`'s directory lies within one of the allowlist roots.
pub fn check_allowlist(
    path: &Path,
    project_root: &Path,
    allowlist: &[PathBuf],
) -> Result<(), Error> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let real_dir = canonicalize_best_effort(dir);
    if has_parent_components(&real_dir) {
        return Err(Error::PathEscape(sanitize_message(
            &path.display().to_string(),
            project_root,
        )));
    }

    for entry in allowlist {
        let root = canonicalize_best_effort(&resolve_project_path(project_root, entry));
        if real_dir.starts_with(&root) {
            return Ok(());
        }
    }

    Err(Error::PathEscape(sanitize_message(
        &path.display().to_string(),
        project_root,
    )))
}

/// Validated write into the project tree.
///
/// `grant` is `(lock manager, grant id)`; when present the grant must
/// exist, be active, and cover `path` exactly. Hardening passes no grant;
/// enhance always does.
pub fn safe_write(
    path: &Path,
    content: &[u8],
    project_root: &Path,
    allowlist: &[PathBuf],
    grant: Option<(&LockManager, &str)>,
) -> Result<(), Error> {
    check_allowlist(path, project_root, allowlist)?;

    if let Some((locks, grant_id)) = grant {
        locks.check_grant_covers(grant_id, path)?;
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    tracing::debug!(path = %path.display(), bytes = content.len(), "safe write");
    Ok(())
}

#[cfg(test)]
#[path = "safe_write_tests.rs"]
mod tests;
