// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Target discovery
//!
//! Walks the project for files matching the configured glob, skipping
//! excluded basenames and anything under hidden directories (which also
//! keeps sidecar trees out of discovery). Each target is enriched with
//! sidecar-derived metadata for the UI's attention ordering.

use crate::config::EngineConfig;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobMatcher};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use temper_core::{Error, Target};
use temper_storage::{read_json, HardenSidecar};
use walkdir::WalkDir;

/// Discover targets under the project root, sorted by
/// `(needs_attention, risk_order, name)`.
pub fn discover_targets(config: &EngineConfig) -> Result<Vec<Target>, Error> {
    let matcher = build_matcher(&config.discovery_glob)?;
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut targets = Vec::new();

    let walk = WalkDir::new(&config.project_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()));

    for entry in walk {
        let entry = entry.map_err(|e| Error::Io(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = match entry.path().strip_prefix(&config.project_root) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        if !matcher.is_match(rel) {
            continue;
        }

        let name = match entry.path().file_stem().and_then(|s| s.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        if config.discovery_excludes.iter().any(|ex| ex == &name) {
            continue;
        }
        if !seen.insert(name.clone()) {
            tracing::warn!(name, path = %rel.display(), "duplicate target basename, skipping");
            continue;
        }

        let mut target = Target::new(name, entry.path(), rel);
        enrich_from_sidecar(&mut target, config);
        targets.push(target);
    }

    targets.sort_by_key(Target::sort_key);
    tracing::info!(count = targets.len(), "discovery complete");
    Ok(targets)
}

fn build_matcher(glob: &str) -> Result<GlobMatcher, Error> {
    Ok(Glob::new(glob)
        .map_err(|e| Error::Io(format!("bad discovery glob: {e}")))?
        .compile_matcher())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Attach analysis mtime, risk, finding count, and the stale flag.
fn enrich_from_sidecar(target: &mut Target, config: &EngineConfig) {
    let sidecar = HardenSidecar::new(&target.source_path, &config.harden_sidecar, &target.name);
    let analysis_path = sidecar.analysis();

    let analysis_mtime = mtime(&analysis_path);
    target.analyzed_at = analysis_mtime;

    if let Some(analysis) = read_json(&analysis_path) {
        target.risk = analysis
            .get("overall_risk")
            .and_then(Value::as_str)
            .map(str::to_string);
        target.finding_count = analysis
            .get("findings")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
    }

    let source_mtime = mtime(&target.source_path);
    target.stale = match (source_mtime, analysis_mtime) {
        (Some(source), Some(analysis)) => source > analysis,
        _ => false,
    };
    target.needs_attention = target.analyzed_at.is_none() || target.stale;
}

fn mtime(path: &Path) -> Option<DateTime<Utc>> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
