// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batches planned by the enhance pipeline

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// A group of approved items executed together under one lock grant.
///
/// Items are opaque agent JSON; the engine reads only `id`, `items`,
/// `write_targets`, and `estimated_effort`. The `write_targets` list (file
/// paths relative to the project root, never directories) is the lock
/// request for the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: String,
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub write_targets: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_effort: Option<String>,
}

impl Batch {
    /// Decode the agent's batch-planning response.
    ///
    /// Accepts `{"batches": [...]}` with either camelCase or snake_case
    /// key spellings per batch; batches without an `id` are rejected.
    pub fn list_from_plan(plan: &Value) -> Result<Vec<Batch>, String> {
        let raw = plan
            .get("batches")
            .and_then(Value::as_array)
            .ok_or_else(|| "batch plan has no \"batches\" array".to_string())?;

        let mut batches = Vec::with_capacity(raw.len());
        for (index, entry) in raw.iter().enumerate() {
            let id = entry
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("batch {index} has no id"))?
                .to_string();
            let items = entry
                .get("items")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let write_targets = entry
                .get("writeTargets")
                .or_else(|| entry.get("write_targets"))
                .and_then(Value::as_array)
                .map(|paths| {
                    paths
                        .iter()
                        .filter_map(Value::as_str)
                        .map(PathBuf::from)
                        .collect()
                })
                .unwrap_or_default();
            let estimated_effort = entry
                .get("estimatedEffort")
                .or_else(|| entry.get("estimated_effort"))
                .and_then(Value::as_str)
                .map(str::to_string);
            batches.push(Batch {
                id,
                items,
                write_targets,
                estimated_effort,
            });
        }
        Ok(batches)
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
