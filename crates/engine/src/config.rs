// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration
//!
//! Defaults cover a conventional Rails project; everything can be
//! overridden from `temper.toml` at the project root or the
//! `TEMPER_*` environment variables.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use temper_core::Error;

/// Default lock acquisition timeout for batch execution.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Maps a source file to its test file; `None` means run the full suite.
pub type TestPathResolver = dyn Fn(&Path) -> Option<PathBuf> + Send + Sync;

/// One static-analysis command.
#[derive(Debug, Clone, Deserialize)]
pub struct CiCommand {
    pub name: String,
    /// Spawnable argv, not a shell string.
    pub command: Vec<String>,
}

/// Configuration for a [`crate::PipelineEngine`].
#[derive(Clone)]
pub struct EngineConfig {
    pub project_root: PathBuf,
    /// Hidden sidecar directory names.
    pub harden_sidecar: String,
    pub enhance_sidecar: String,
    /// Per-mode write allowlists, relative to the project root.
    pub harden_allowlist: Vec<PathBuf>,
    pub enhance_allowlist: Vec<PathBuf>,
    /// Discovery glob, relative to the project root.
    pub discovery_glob: String,
    /// Basenames (without extension) excluded from discovery.
    pub discovery_excludes: Vec<String>,
    /// Project test command; the resolved test path is appended when a
    /// target-specific run is possible.
    pub test_command: Vec<String>,
    pub ci_commands: Vec<CiCommand>,
    /// Source file → test file; falls back to the Rails `test/` convention.
    pub test_path_resolver: Option<Arc<TestPathResolver>>,
    pub agent_bin: String,
    pub api_key: Option<String>,
    pub api_model: String,
    pub lock_timeout: Duration,
}

impl EngineConfig {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            harden_sidecar: ".harden".to_string(),
            enhance_sidecar: ".enhance".to_string(),
            harden_allowlist: to_paths(&["app", "lib", "test", "spec"]),
            enhance_allowlist: to_paths(&[
                "app/controllers",
                "app/views",
                "app/models",
                "app/services",
                "test",
            ]),
            discovery_glob: "app/**/*.rb".to_string(),
            discovery_excludes: vec![
                "application_record".to_string(),
                "application_controller".to_string(),
            ],
            test_command: vec!["bin/rails".to_string(), "test".to_string()],
            ci_commands: Vec::new(),
            test_path_resolver: None,
            agent_bin: "claude".to_string(),
            api_key: None,
            api_model: "claude-sonnet-4-5".to_string(),
            lock_timeout: LOCK_TIMEOUT,
        }
    }

    /// Load `temper.toml` from the project root when present, then apply
    /// environment overrides.
    pub fn load(project_root: impl Into<PathBuf>) -> Result<Self, Error> {
        let mut config = Self::new(project_root);
        let file = config.project_root.join("temper.toml");
        if file.exists() {
            let raw = std::fs::read_to_string(&file)?;
            let parsed: ConfigFile =
                toml::from_str(&raw).map_err(|e| Error::Io(format!("temper.toml: {e}")))?;
            config.apply_file(parsed);
        }
        config.apply_env();
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(v) = file.harden_sidecar {
            self.harden_sidecar = v;
        }
        if let Some(v) = file.enhance_sidecar {
            self.enhance_sidecar = v;
        }
        if let Some(v) = file.harden_allowlist {
            self.harden_allowlist = v.iter().map(PathBuf::from).collect();
        }
        if let Some(v) = file.enhance_allowlist {
            self.enhance_allowlist = v.iter().map(PathBuf::from).collect();
        }
        if let Some(v) = file.discovery_glob {
            self.discovery_glob = v;
        }
        if let Some(v) = file.discovery_excludes {
            self.discovery_excludes = v;
        }
        if let Some(v) = file.test_command {
            self.test_command = v;
        }
        if let Some(v) = file.ci_commands {
            self.ci_commands = v;
        }
        if let Some(v) = file.agent_bin {
            self.agent_bin = v;
        }
        if let Some(v) = file.api_key {
            self.api_key = Some(v);
        }
        if let Some(v) = file.api_model {
            self.api_model = v;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("TEMPER_AGENT_BIN") {
            self.agent_bin = v;
        }
        if let Ok(v) = std::env::var("TEMPER_API_KEY") {
            if !v.is_empty() {
                self.api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("TEMPER_API_MODEL") {
            self.api_model = v;
        }
    }

    /// Resolve the test path for a source file.
    pub fn resolve_test_path(&self, source: &Path) -> Option<PathBuf> {
        match &self.test_path_resolver {
            Some(resolver) => resolver(source),
            None => rails_test_path(&self.project_root, source),
        }
    }
}

/// `app/models/user.rb` → `test/models/user_test.rb`, if it exists.
fn rails_test_path(project_root: &Path, source: &Path) -> Option<PathBuf> {
    let rel = source.strip_prefix(project_root).ok()?;
    let rel = rel.strip_prefix("app").ok()?;
    let stem = rel.file_stem()?.to_str()?;
    let test_rel = rel
        .parent()
        .map(|p| p.join(format!("{stem}_test.rb")))
        .unwrap_or_else(|| PathBuf::from(format!("{stem}_test.rb")));
    let candidate = project_root.join("test").join(test_rel);
    candidate.exists().then_some(candidate)
}

fn to_paths(entries: &[&str]) -> Vec<PathBuf> {
    entries.iter().map(PathBuf::from).collect()
}

/// Serde shape of `temper.toml`.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    harden_sidecar: Option<String>,
    enhance_sidecar: Option<String>,
    harden_allowlist: Option<Vec<String>>,
    enhance_allowlist: Option<Vec<String>>,
    discovery_glob: Option<String>,
    discovery_excludes: Option<Vec<String>>,
    test_command: Option<Vec<String>>,
    ci_commands: Option<Vec<CiCommand>>,
    agent_bin: Option<String>,
    api_key: Option<String>,
    api_model: Option<String>,
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
