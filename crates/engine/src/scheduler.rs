// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work scheduler
//!
//! A priority queue of work items dispatched when a CLI slot and the
//! item's requested locks are simultaneously available. Lock acquisition
//! is all-or-nothing through the [`LockManager`]; an item whose locks
//! conflict stays queued and younger disjoint items may pass it.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use temper_core::clock::SharedClock;
use temper_core::{CancelFlag, Error, LockGrant, LockManager, WorkItem, WorkItemStatus};

/// Dispatch loop tick interval.
const DISPATCH_TICK: Duration = Duration::from_millis(500);

/// Items queued longer than this escalate past every normal priority.
const STARVATION_AGE: Duration = Duration::from_secs(600);

/// Budget for `stop` to join the loop and drain active items.
const STOP_BUDGET: Duration = Duration::from_secs(10);

/// A dispatched unit of work.
pub type WorkFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Callback invoked on dispatch with the grant acquired for the item's
/// lock request (`None` for lock-free items).
pub type WorkCallback = Box<dyn FnOnce(Option<LockGrant>) -> WorkFuture + Send>;

struct QueuedItem {
    item: WorkItem,
    callback: WorkCallback,
}

struct SchedulerInner {
    queue: Mutex<Vec<QueuedItem>>,
    active: Mutex<HashMap<String, WorkItem>>,
    running: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    loop_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    shutdown: CancelFlag,
    locks: LockManager,
    clock: SharedClock,
    slot_free: Arc<dyn Fn() -> bool + Send + Sync>,
}

/// Priority-queue dispatcher over the lock manager.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

/// Lower sorts first; enhance apply work beats extraction beats analysis.
fn phase_priority(phase: &str, age: Duration) -> i8 {
    if age >= STARVATION_AGE {
        return -1;
    }
    match phase {
        "e_applying" => 0,
        "e_extracting" => 1,
        "e_analyzing" => 2,
        _ => 3,
    }
}

impl Scheduler {
    pub fn new(
        locks: LockManager,
        clock: SharedClock,
        slot_free: Arc<dyn Fn() -> bool + Send + Sync>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                queue: Mutex::new(Vec::new()),
                active: Mutex::new(HashMap::new()),
                running: Mutex::new(Vec::new()),
                loop_handle: Mutex::new(None),
                shutdown: CancelFlag::new(),
                locks,
                clock,
                slot_free,
            }),
        }
    }

    /// Start the dispatch loop; idempotent.
    pub fn start(&self) {
        let mut handle = self.inner.loop_handle.lock();
        if handle.is_some() {
            return;
        }
        self.inner.shutdown.clear();
        let inner = Arc::clone(&self.inner);
        *handle = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(DISPATCH_TICK).await;
                if inner.shutdown.is_cancelled() {
                    return;
                }
                dispatch_tick(&inner);
            }
        }));
    }

    /// Queue a work item for dispatch.
    pub fn enqueue(&self, item: WorkItem, callback: WorkCallback) {
        tracing::debug!(
            item_id = %item.id,
            workflow = %item.workflow_name,
            phase = %item.phase,
            locks = item.lock_request.len(),
            "enqueueing work item"
        );
        self.inner.queue.lock().push(QueuedItem { item, callback });
    }

    /// Drop every queued item (engine reset). Active items are unaffected.
    pub fn clear(&self) -> usize {
        let mut queue = self.inner.queue.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    /// Stop the loop and wait up to 10 s for active work to drain;
    /// stragglers are aborted.
    pub async fn stop(&self) {
        let deadline = tokio::time::Instant::now() + STOP_BUDGET;
        self.inner.shutdown.cancel();
        let handle = self.inner.loop_handle.lock().take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout_at(deadline, handle).await;
        }

        while !self.inner.active.lock().is_empty() {
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let mut running = self.inner.running.lock();
        for handle in running.drain(..) {
            if !handle.is_finished() {
                handle.abort();
            }
        }
        self.inner.active.lock().clear();
    }

    pub fn queue_depth(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Snapshot of in-flight items for the UI.
    pub fn active_items(&self) -> Vec<WorkItem> {
        let mut items: Vec<WorkItem> = self.inner.active.lock().values().cloned().collect();
        items.sort_by(|a, b| a.dispatched_at.cmp(&b.dispatched_at));
        items
    }

    /// One dispatch pass, exposed for deterministic tests.
    #[cfg(test)]
    pub(crate) fn tick(&self) {
        dispatch_tick(&self.inner);
    }
}

fn sort_key(item: &WorkItem, now: DateTime<Utc>) -> (i8, DateTime<Utc>) {
    let age = (now - item.queued_at).to_std().unwrap_or_default();
    (phase_priority(&item.phase, age), item.queued_at)
}

fn dispatch_tick(inner: &Arc<SchedulerInner>) {
    let now = inner.clock.now();
    let mut dispatches: Vec<(QueuedItem, Option<LockGrant>)> = Vec::new();

    {
        let mut queue = inner.queue.lock();
        queue.sort_by_key(|q| sort_key(&q.item, now));

        let mut index = 0;
        while index < queue.len() {
            if !(inner.slot_free)() {
                break;
            }

            let lock_request = queue[index].item.lock_request.clone();
            if lock_request.is_empty() {
                dispatches.push((queue.remove(index), None));
                continue;
            }

            match inner
                .locks
                .try_acquire(&queue[index].item.workflow_name, &lock_request)
            {
                Ok(Some(grant)) => {
                    dispatches.push((queue.remove(index), Some(grant)));
                }
                Ok(None) => {
                    // Locks busy; leave queued, try the next item.
                    index += 1;
                }
                Err(Error::OverLock(path)) => {
                    tracing::error!(
                        item_id = %queue[index].item.id,
                        path,
                        "discarding work item with directory lock request"
                    );
                    queue.remove(index);
                }
                Err(e) => {
                    tracing::error!(item_id = %queue[index].item.id, error = %e, "lock acquisition failed");
                    queue.remove(index);
                }
            }
        }
    }

    for (queued, grant) in dispatches {
        launch(inner, queued, grant);
    }
}

fn launch(inner: &Arc<SchedulerInner>, queued: QueuedItem, grant: Option<LockGrant>) {
    let QueuedItem { mut item, callback } = queued;
    item.status = WorkItemStatus::Active;
    item.dispatched_at = Some(inner.clock.now());
    item.grant_id = grant.as_ref().map(|g| g.id.clone());

    tracing::info!(
        item_id = %item.id,
        workflow = %item.workflow_name,
        phase = %item.phase,
        grant = ?item.grant_id,
        "dispatching work item"
    );

    let item_id = item.id.clone();
    inner.active.lock().insert(item_id.clone(), item);

    let task_inner = Arc::clone(inner);
    let grant_id = grant.as_ref().map(|g| g.id.clone());
    let handle = tokio::spawn(async move {
        callback(grant).await;
        if let Some(grant_id) = grant_id {
            task_inner.locks.release(&grant_id);
        }
        task_inner.active.lock().remove(&item_id);
    });

    let mut running = inner.running.lock();
    running.retain(|h| !h.is_finished());
    running.push(handle);
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
