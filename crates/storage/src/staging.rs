// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Staging-tree discipline
//!
//! Agents never write project files directly. Write-phase prompts point
//! them at a staging directory that mirrors the project tree; after the
//! call returns, the supervisor copies every staged file into its real
//! location through the safe-write gate.

use crate::safe_write::safe_write;
use std::path::{Path, PathBuf};
use temper_core::{Error, LockManager};
use walkdir::WalkDir;

/// Reset a staging directory to empty (remove-then-make).
pub fn clean_staging(dir: &Path) -> Result<(), Error> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Copy every staged file into the project tree through the safe-write
/// gate. Returns the list of project-relative paths written.
pub fn copy_from_staging(
    staging_dir: &Path,
    project_root: &Path,
    allowlist: &[PathBuf],
    grant: Option<(&LockManager, &str)>,
) -> Result<Vec<PathBuf>, Error> {
    let mut written = Vec::new();

    for entry in WalkDir::new(staging_dir).follow_links(false) {
        let entry = entry.map_err(|e| Error::Io(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(staging_dir)
            .map_err(|e| Error::Io(e.to_string()))?;
        let dest = project_root.join(rel);
        let content = std::fs::read(entry.path())?;
        safe_write(&dest, &content, project_root, allowlist, grant)?;
        written.push(rel.to_path_buf());
    }

    tracing::info!(
        staging = %staging_dir.display(),
        files = written.len(),
        "copied staging tree into project"
    );
    Ok(written)
}

#[cfg(test)]
#[path = "staging_tests.rs"]
mod tests;
