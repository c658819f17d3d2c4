// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Research topics produced by the enhance analysis phase

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-topic resolution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicStatus {
    Pending,
    Researching,
    Completed,
    Rejected,
}

impl fmt::Display for TopicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TopicStatus::Pending => "pending",
            TopicStatus::Researching => "researching",
            TopicStatus::Completed => "completed",
            TopicStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// A free-text research prompt, resolved per topic by either the web-search
/// API or an operator paste.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchTopic {
    pub prompt: String,
    pub status: TopicStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ResearchTopic {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            status: TopicStatus::Pending,
            result: None,
        }
    }
}

/// The research phase completes when every non-rejected topic is completed.
///
/// Vacuously true for an empty list and for a list where every topic was
/// rejected; the orchestrator moves straight on to extraction in both cases.
pub fn research_complete(topics: &[ResearchTopic]) -> bool {
    topics
        .iter()
        .filter(|t| t.status != TopicStatus::Rejected)
        .all(|t| t.status == TopicStatus::Completed)
}

/// Filesystem slug for a topic: lowercase, non-alphanumerics folded to `_`,
/// truncated to 50 chars.
pub fn research_slug(prompt: &str) -> String {
    let slug: String = prompt
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    slug.chars().take(50).collect()
}

#[cfg(test)]
#[path = "research_tests.rs"]
mod tests;
