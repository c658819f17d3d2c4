// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracking of spawned phase tasks

use parking_lot::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

struct Tracked {
    workflow: Option<String>,
    handle: JoinHandle<()>,
}

/// Registry of in-flight phase tasks.
///
/// Dead handles are pruned each time a new task is tracked; `reset` and
/// `shutdown` use `wait_idle`/`abort_all` to drain or kill the rest.
#[derive(Default)]
pub struct TaskTracker {
    tasks: Mutex<Vec<Tracked>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a spawned task, pruning finished entries first.
    pub fn track(&self, workflow: Option<String>, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.handle.is_finished());
        tasks.push(Tracked { workflow, handle });
    }

    /// Number of still-running tasks.
    pub fn len(&self) -> usize {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.handle.is_finished());
        tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until every tracked task finishes, up to `timeout`.
    /// Returns true when fully drained.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_empty() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Abort every still-running task.
    pub fn abort_all(&self) {
        let mut tasks = self.tasks.lock();
        for task in tasks.drain(..) {
            if !task.handle.is_finished() {
                tracing::warn!(workflow = ?task.workflow, "aborting lingering task");
                task.handle.abort();
            }
        }
    }
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
