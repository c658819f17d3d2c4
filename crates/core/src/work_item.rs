// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler work items

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkItemStatus {
    Queued,
    Dispatching,
    Active,
    Done,
}

/// A queued unit of dispatch.
///
/// Carries the lock request; the dispatch callback itself lives beside the
/// item in the scheduler's queue (closures are not part of the serialized
/// snapshot).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: String,
    pub workflow_name: String,
    /// Phase label used for priority mapping (e.g. `e_applying`).
    pub phase: String,
    /// Absolute write paths to lock before dispatch; empty for lock-free work.
    #[serde(default)]
    pub lock_request: Vec<PathBuf>,
    pub status: WorkItemStatus,
    pub queued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_id: Option<String>,
}

impl WorkItem {
    pub fn new(
        workflow_name: impl Into<String>,
        phase: impl Into<String>,
        lock_request: Vec<PathBuf>,
        queued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_name: workflow_name.into(),
            phase: phase.into(),
            lock_request,
            status: WorkItemStatus::Queued,
            queued_at,
            dispatched_at: None,
            grant_id: None,
        }
    }
}
