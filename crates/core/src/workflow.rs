// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-target workflow state machine record

use crate::batch::Batch;
use crate::mode::Mode;
use crate::research::ResearchTopic;
use crate::status::WorkflowStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Per-target state machine record.
///
/// A workflow's `status` uniquely determines which artifact fields are
/// meaningful; mutators always write data fields before the status that
/// announces them so a snapshot taken under the engine mutex is coherent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub name: String,
    pub source_path: PathBuf,
    pub relative_path: PathBuf,
    pub mode: Mode,
    pub status: WorkflowStatus,

    // Hardening artifacts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_results: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<Value>,

    // Enhance artifacts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e_analysis: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub research_topics: Vec<ResearchTopic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub possible_items: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_items: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e_decisions: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub batches: Vec<Batch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_batch_id: Option<String>,
    /// Per-batch progress markers keyed by batch id (e.g. `"tested"`),
    /// kept for resume after restart.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub e_batch_state: BTreeMap<String, Value>,

    // Bookkeeping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Source file contents captured just before the first apply, read back
    /// by the verify phase prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_source: Option<String>,
    /// Prompts sent to the agent, keyed by phase (`apply_prompt`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub prompts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// Create a fresh workflow in `idle`.
    pub fn new(
        name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        relative_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.into(),
            relative_path: relative_path.into(),
            mode: Mode::Hardening,
            status: WorkflowStatus::Idle,
            analysis: None,
            decision: None,
            apply_result: None,
            test_results: None,
            ci_results: None,
            verification: None,
            e_analysis: None,
            research_topics: Vec::new(),
            possible_items: None,
            ready_items: None,
            audit_result: None,
            e_decisions: None,
            batches: Vec::new(),
            current_batch_id: None,
            e_batch_state: BTreeMap::new(),
            error: None,
            original_source: None,
            prompts: BTreeMap::new(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Record a failure: sanitized message plus the `error` status.
    ///
    /// Message first, status second; observers that see `error` always see
    /// the message.
    pub fn mark_error(&mut self, message: String) {
        self.error = Some(message);
        self.status = WorkflowStatus::Error;
    }

    /// Store a prompt under its phase key for the UI snapshot.
    pub fn record_prompt(&mut self, key: &str, prompt: &str) {
        self.prompts.insert(key.to_string(), prompt.to_string());
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
