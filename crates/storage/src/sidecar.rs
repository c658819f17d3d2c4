// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sidecar file IO
//!
//! JSON artifacts are pretty-printed with a trailing newline. Reads are
//! lenient: a missing or malformed file is `None`, and the owning phase
//! simply re-runs (phases are idempotent with respect to their inputs).

use serde_json::Value;
use std::path::Path;
use temper_core::Error;

/// Write a pretty-printed JSON artifact, creating parent directories.
pub fn write_json(path: &Path, value: &Value) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut body = serde_json::to_string_pretty(value)?;
    body.push('\n');
    std::fs::write(path, body)?;
    Ok(())
}

/// Read a JSON artifact; missing or malformed files are `None`.
pub fn read_json(path: &Path) -> Option<Value> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "malformed sidecar, treating as absent");
            None
        }
    }
}

/// Write a text artifact (research notes), creating parent directories.
pub fn write_text(path: &Path, content: &str) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Read a text artifact; missing files are `None`.
pub fn read_text(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

/// Merge an array of decision records into an existing sidecar array by id.
///
/// Records are `{id, title, description, decision, notes?, timestamp}`;
/// an incoming record replaces any existing record with the same id.
pub fn merge_decision_records(path: &Path, incoming: &[Value]) -> Result<(), Error> {
    let mut merged: Vec<Value> = read_json(path)
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default();

    for record in incoming {
        let id = record.get("id").and_then(Value::as_str);
        match id {
            Some(id) => {
                if let Some(existing) = merged
                    .iter_mut()
                    .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
                {
                    *existing = record.clone();
                } else {
                    merged.push(record.clone());
                }
            }
            None => merged.push(record.clone()),
        }
    }

    write_json(path, &Value::Array(merged))
}

#[cfg(test)]
#[path = "sidecar_tests.rs"]
mod tests;
