// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ad-hoc operator questions answered by the agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Queries kept in memory before pruning kicks in.
pub const MAX_QUERIES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Pending,
    Complete,
    Error,
}

/// An operator question handled asynchronously, outside the workflow state
/// machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub id: String,
    pub target_name: String,
    /// `"question"` or `"explain_finding"`.
    #[serde(rename = "type")]
    pub query_type: String,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finding_id: Option<String>,
    pub status: QueryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Query {
    pub fn new(
        target_name: impl Into<String>,
        query_type: impl Into<String>,
        question: impl Into<String>,
        finding_id: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            target_name: target_name.into(),
            query_type: query_type.into(),
            question: question.into(),
            finding_id,
            status: QueryStatus::Pending,
            result: None,
            error: None,
            created_at,
        }
    }
}

/// Prune the query list down to [`MAX_QUERIES`], oldest completed first.
///
/// Pending queries are only evicted once no completed or errored entries
/// remain to drop.
pub fn prune_queries(queries: &mut Vec<Query>) {
    while queries.len() > MAX_QUERIES {
        let victim = queries
            .iter()
            .enumerate()
            .filter(|(_, q)| q.status != QueryStatus::Pending)
            .min_by_key(|(_, q)| q.created_at)
            .map(|(i, _)| i)
            .unwrap_or(0);
        queries.remove(victim);
    }
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
