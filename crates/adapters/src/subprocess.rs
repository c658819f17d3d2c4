// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervised subprocess execution
//!
//! Children are spawned into their own process group with merged
//! stdout/stderr. The supervisor polls for exit with a non-blocking reap;
//! on deadline or cooperative cancellation it sends TERM to the group,
//! waits half a second, then KILLs the group and reaps. Pipe readers are
//! owned by drain tasks and closed on every exit path.

use crate::process_group;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use temper_core::CancelFlag;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

/// Default timeout for project test and static-analysis commands.
pub const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for one agent CLI invocation.
pub const AGENT_CLI_TIMEOUT: Duration = Duration::from_secs(120);

/// Exit poll interval.
const REAP_POLL: Duration = Duration::from_millis(100);

/// Grace between TERM and KILL.
const TERM_GRACE: Duration = Duration::from_millis(500);

/// Errors from supervised execution. A non-zero exit is not an error at
/// this layer; it is reported through [`CommandOutput::success`].
#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("timed out")]
    TimedOut,
    #[error("cancelled")]
    Cancelled,
}

/// Captured result of a supervised run.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Merged stdout and stderr.
    pub output: String,
    /// Whether the child exited zero.
    pub success: bool,
}

/// Run `cmd` with `args`, supervised.
///
/// The child runs in its own process group under `cwd` (when given) with
/// stdin closed. Returns the merged output and exit disposition, or an
/// error for spawn failure, deadline, or cancellation.
pub async fn run_supervised(
    cmd: &str,
    args: &[String],
    timeout: Duration,
    cwd: Option<&Path>,
    cancel: &CancelFlag,
) -> Result<CommandOutput, SubprocessError> {
    let mut command = Command::new(cmd);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    #[cfg(unix)]
    // SAFETY: setpgid is async-signal-safe; nothing else runs between
    // fork and exec.
    #[allow(unsafe_code)]
    unsafe {
        command.pre_exec(|| process_group::set_process_group());
    }

    tracing::debug!(cmd, ?args, ?cwd, "spawning supervised subprocess");

    let mut child = command
        .spawn()
        .map_err(|e| SubprocessError::Spawn(format!("{cmd}: {e}")))?;

    let buffer: Arc<parking_lot::Mutex<Vec<u8>>> = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let mut drains = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        drains.push(tokio::spawn(drain(stdout, Arc::clone(&buffer))));
    }
    if let Some(stderr) = child.stderr.take() {
        drains.push(tokio::spawn(drain(stderr, Arc::clone(&buffer))));
    }

    let deadline = tokio::time::Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                kill_group(&mut child).await;
                finish_drains(drains).await;
                return Err(SubprocessError::Spawn(format!("wait failed: {e}")));
            }
        }

        if cancel.is_cancelled() {
            tracing::info!(cmd, "cancelling subprocess");
            kill_group(&mut child).await;
            finish_drains(drains).await;
            return Err(SubprocessError::Cancelled);
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!(cmd, timeout_secs = timeout.as_secs(), "subprocess deadline elapsed");
            kill_group(&mut child).await;
            finish_drains(drains).await;
            return Err(SubprocessError::TimedOut);
        }

        tokio::time::sleep(REAP_POLL).await;
    };

    finish_drains(drains).await;
    let output = String::from_utf8_lossy(&buffer.lock()).into_owned();
    tracing::debug!(cmd, success = status.success(), bytes = output.len(), "subprocess exited");

    Ok(CommandOutput {
        output,
        success: status.success(),
    })
}

async fn drain(mut reader: impl AsyncReadExt + Unpin, buffer: Arc<parking_lot::Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buffer.lock().extend_from_slice(&chunk[..n]),
        }
    }
}

async fn finish_drains(drains: Vec<tokio::task::JoinHandle<()>>) {
    for handle in drains {
        let _ = handle.await;
    }
}

/// TERM the group, grace, KILL the group, reap.
async fn kill_group(child: &mut Child) {
    if let Some(pid) = child.id() {
        let _ = process_group::term_process_group(pid);
        tokio::time::sleep(TERM_GRACE).await;
        let _ = process_group::kill_process_group(pid);
    } else {
        let _ = child.kill().await;
    }
    let _ = child.wait().await;
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
