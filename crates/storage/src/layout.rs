// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sidecar directory layout
//!
//! Artifacts live in a hidden directory next to the target:
//! `<targetDir>/<sidecarName>/<targetBasename>/<file>`. Hardening and
//! enhance use separate roots so either pipeline can be reset without
//! touching the other.

use std::path::{Path, PathBuf};

/// Hardening sidecar for one target.
#[derive(Debug, Clone)]
pub struct HardenSidecar {
    root: PathBuf,
}

impl HardenSidecar {
    /// `source_path` is the target file; `sidecar_name` is `.harden` by
    /// default.
    pub fn new(source_path: &Path, sidecar_name: &str, target_name: &str) -> Self {
        let dir = source_path.parent().unwrap_or(Path::new("."));
        Self {
            root: dir.join(sidecar_name).join(target_name),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.root
    }

    pub fn analysis(&self) -> PathBuf {
        self.root.join("analysis.json")
    }

    pub fn hardened(&self) -> PathBuf {
        self.root.join("hardened.json")
    }

    pub fn test_results(&self) -> PathBuf {
        self.root.join("test_results.json")
    }

    pub fn ci_results(&self) -> PathBuf {
        self.root.join("ci_results.json")
    }

    pub fn verification(&self) -> PathBuf {
        self.root.join("verification.json")
    }

    pub fn staging(&self) -> PathBuf {
        self.root.join("staging")
    }
}

/// Enhance sidecar for one target.
#[derive(Debug, Clone)]
pub struct EnhanceSidecar {
    root: PathBuf,
}

impl EnhanceSidecar {
    pub fn new(source_path: &Path, sidecar_name: &str, target_name: &str) -> Self {
        let dir = source_path.parent().unwrap_or(Path::new("."));
        Self {
            root: dir.join(sidecar_name).join(target_name),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.root
    }

    pub fn analysis(&self) -> PathBuf {
        self.root.join("analysis.json")
    }

    pub fn research_status(&self) -> PathBuf {
        self.root.join("research_status.json")
    }

    pub fn research_dir(&self) -> PathBuf {
        self.root.join("research")
    }

    /// `research/<slug>.md` for one completed topic.
    pub fn research_note(&self, slug: &str) -> PathBuf {
        self.research_dir().join(format!("{slug}.md"))
    }

    pub fn extract(&self) -> PathBuf {
        self.root.join("extract.json")
    }

    pub fn synthesize(&self) -> PathBuf {
        self.root.join("synthesize.json")
    }

    pub fn audit(&self) -> PathBuf {
        self.root.join("audit.json")
    }

    pub fn decisions(&self) -> PathBuf {
        self.root.join("decisions.json")
    }

    pub fn deferred(&self) -> PathBuf {
        self.root.join("decisions").join("deferred.json")
    }

    pub fn rejected(&self) -> PathBuf {
        self.root.join("decisions").join("rejected.json")
    }

    pub fn batches(&self) -> PathBuf {
        self.root.join("batches.json")
    }

    pub fn batches_dir(&self) -> PathBuf {
        self.root.join("batches")
    }

    pub fn batch(&self, batch_id: &str) -> BatchSidecar {
        BatchSidecar {
            root: self.batches_dir().join(batch_id),
        }
    }
}

/// Per-batch artifact directory under an enhance sidecar.
#[derive(Debug, Clone)]
pub struct BatchSidecar {
    root: PathBuf,
}

impl BatchSidecar {
    pub fn dir(&self) -> &Path {
        &self.root
    }

    pub fn apply(&self) -> PathBuf {
        self.root.join("apply.json")
    }

    pub fn test_results(&self) -> PathBuf {
        self.root.join("test_results.json")
    }

    pub fn ci_results(&self) -> PathBuf {
        self.root.join("ci_results.json")
    }

    pub fn verification(&self) -> PathBuf {
        self.root.join("verification.json")
    }

    pub fn staging(&self) -> PathBuf {
        self.root.join("staging")
    }
}

#[cfg(test)]
#[path = "layout_tests.rs"]
mod tests;
