// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across the pipeline

use std::path::Path;
use thiserror::Error;

/// Errors that can surface from pipeline operations.
///
/// Every async phase task is wrapped by the engine's guarded spawner, which
/// converts any of these into `workflow.status = "error"` plus a sanitized
/// message. State-guard failures are returned synchronously to the caller
/// and never touch workflow state.
#[derive(Debug, Error)]
pub enum Error {
    /// Agent response was not a well-formed JSON object. Carries the first
    /// 200 chars of the raw text.
    #[error("agent response is not a JSON object: {0}")]
    Parse(String),
    /// Non-zero exit from the agent CLI or a tool. Carries captured output
    /// truncated to 500 chars.
    #[error("subprocess failed: {0}")]
    Subprocess(String),
    #[error("timed out")]
    Timeout,
    #[error("cancelled")]
    Cancelled,
    /// A write path failed the realpath allowlist check.
    #[error("path escapes allowed write roots: {0}")]
    PathEscape(String),
    /// Grant missing, expired, released, or not covering the requested path.
    #[error("lock violation: {0}")]
    LockViolation(String),
    /// A write lock was requested on a directory.
    #[error("cannot lock a directory: {0}")]
    OverLock(String),
    /// `try_transition` guard mismatch.
    #[error("{0}")]
    StateGuard(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Io(err.to_string())
    }
}

/// Replace the project root (and its resolved realpath) with `<project>`.
///
/// Error messages flow to the UI and into sidecar files; absolute paths of
/// the operator's machine must not leak.
pub fn sanitize_message(message: &str, project_root: &Path) -> String {
    let mut out = message.to_string();
    let display = project_root.display().to_string();
    if !display.is_empty() {
        out = out.replace(&display, "<project>");
    }
    if let Ok(real) = project_root.canonicalize() {
        let real_display = real.display().to_string();
        if !real_display.is_empty() && real_display != display {
            out = out.replace(&real_display, "<project>");
        }
    }
    out
}

/// Truncate captured subprocess output for error messages.
pub fn truncate_output(output: &str, max: usize) -> String {
    if output.len() <= max {
        output.to_string()
    } else {
        let mut end = max;
        while !output.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &output[..end])
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
