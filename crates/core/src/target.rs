// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Discovered targets and their sidecar-derived metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A source file discovered by the configured glob.
///
/// Identified by its basename without extension; immutable after discovery
/// until the next reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub name: String,
    pub source_path: PathBuf,
    pub relative_path: PathBuf,
    /// When the hardening analysis sidecar was last written, if ever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
    /// `overall_risk` from the analysis sidecar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<String>,
    #[serde(default)]
    pub finding_count: usize,
    /// Source modified after its analysis was written.
    #[serde(default)]
    pub stale: bool,
    /// No analysis yet, or the analysis is stale.
    #[serde(default)]
    pub needs_attention: bool,
}

impl Target {
    pub fn new(
        name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        relative_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.into(),
            relative_path: relative_path.into(),
            analyzed_at: None,
            risk: None,
            finding_count: 0,
            stale: false,
            needs_attention: true,
        }
    }

    /// Sort key: needs-attention targets first, then riskier, then by name.
    pub fn sort_key(&self) -> (bool, u8, String) {
        (
            !self.needs_attention,
            risk_order(self.risk.as_deref()),
            self.name.clone(),
        )
    }
}

/// Ordering weight for risk labels; riskier sorts first.
pub fn risk_order(risk: Option<&str>) -> u8 {
    match risk {
        Some("critical") => 0,
        Some("high") => 1,
        Some("medium") => 2,
        Some("low") => 3,
        _ => 4,
    }
}

#[cfg(test)]
#[path = "target_tests.rs"]
mod tests;
