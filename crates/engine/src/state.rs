// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Global engine state
//!
//! One process-wide map of discovery results, per-target workflows,
//! errors, and queries, mutated only under the engine mutex. Within a
//! workflow, data fields are always written before the status field that
//! announces them, so any snapshot taken under the mutex is coherent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use temper_core::{Query, Target, Workflow, WorkflowStatus};

/// Engine-level phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnginePhase {
    #[default]
    Idle,
    Discovering,
    Ready,
}

impl EnginePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnginePhase::Idle => "idle",
            EnginePhase::Discovering => "discovering",
            EnginePhase::Ready => "ready",
        }
    }
}

impl Serialize for EnginePhase {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EnginePhase {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "idle" => Ok(EnginePhase::Idle),
            "discovering" => Ok(EnginePhase::Discovering),
            "ready" => Ok(EnginePhase::Ready),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["idle", "discovering", "ready"],
            )),
        }
    }
}

/// One entry in the global error list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    pub at: DateTime<Utc>,
}

/// The process-wide mutable state, guarded by the engine mutex.
#[derive(Debug, Default)]
pub struct EngineState {
    pub phase: EnginePhase,
    pub targets: Vec<Target>,
    pub workflows: BTreeMap<String, Workflow>,
    pub errors: Vec<ErrorEntry>,
    pub queries: Vec<Query>,
}

/// Guard variants for [`crate::PipelineEngine::try_transition`].
#[derive(Debug, Clone)]
pub enum Guard {
    /// Create (or reuse) the workflow; refuse while its status is in the
    /// active set.
    NotActive,
    /// Current status must equal this value.
    Status(WorkflowStatus),
    /// Current status must be one of these values.
    AnyOf(Vec<WorkflowStatus>),
}

impl Guard {
    /// Whether `current` passes this guard.
    pub fn admits(&self, current: WorkflowStatus) -> bool {
        match self {
            Guard::NotActive => !current.is_active(),
            Guard::Status(required) => current == *required,
            Guard::AnyOf(allowed) => allowed.contains(&current),
        }
    }

    /// Human-readable mismatch message.
    pub fn mismatch(&self, name: &str, current: WorkflowStatus) -> String {
        match self {
            Guard::NotActive => {
                format!("{name} has an operation in flight (status {current})")
            }
            Guard::Status(required) => {
                format!("{name} is {current}, expected {required}")
            }
            Guard::AnyOf(allowed) => {
                let allowed: Vec<&str> = allowed.iter().map(|s| s.as_str()).collect();
                format!("{name} is {current}, expected one of {}", allowed.join(", "))
            }
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
