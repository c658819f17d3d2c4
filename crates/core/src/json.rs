// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tolerant extraction of JSON objects from agent output
//!
//! Agents are instructed to return a bare JSON object, but in practice the
//! text arrives wrapped in code fences or preceded by prose. The parse is
//! three attempts, strictest first; anything that does not yield an object
//! (arrays and primitives included) is a parse error.

use crate::error::Error;
use serde_json::Value;

/// How much raw text to quote in a parse error.
const ERROR_SNIPPET_LEN: usize = 200;

/// Parse agent output into a JSON object.
pub fn parse_agent_json(raw: &str) -> Result<Value, Error> {
    let trimmed = raw.trim();

    // 1. As-is.
    if let Some(obj) = parse_object(trimmed) {
        return Ok(obj);
    }

    // 2. Strip ```json / ``` fences.
    if let Some(inner) = strip_fences(trimmed) {
        if let Some(obj) = parse_object(inner) {
            return Ok(obj);
        }
    }

    // 3. Slice from first `{` to last `}`.
    if let Some(slice) = brace_slice(trimmed) {
        if let Some(obj) = parse_object(slice) {
            return Ok(obj);
        }
    }

    Err(Error::Parse(snippet(trimmed)))
}

fn parse_object(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

fn strip_fences(text: &str) -> Option<&str> {
    let rest = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))?;
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    Some(rest.trim())
}

fn brace_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn snippet(text: &str) -> String {
    let mut end = text.len().min(ERROR_SNIPPET_LEN);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
#[path = "json_tests.rs"]
mod tests;
