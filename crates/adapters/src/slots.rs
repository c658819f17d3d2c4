// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded slot pools for agent invocations
//!
//! Waiters wake every 5 seconds to re-observe the cancel flag, so a pool
//! can never strand a task past cancellation by more than one wake
//! interval.

use std::sync::Arc;
use temper_core::{CancelFlag, Error};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Wake interval for cancellation re-checks while waiting on a slot.
const WAIT_SLICE: Duration = Duration::from_secs(5);

/// A bounded pool of call slots.
#[derive(Clone)]
pub struct SlotPool {
    name: &'static str,
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

/// Held slot; returned to the pool on drop.
pub struct SlotGuard {
    _permit: OwnedSemaphorePermit,
}

impl SlotPool {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Acquire a slot, waiting as long as it takes unless cancelled.
    pub async fn acquire(&self, cancel: &CancelFlag) -> Result<SlotGuard, Error> {
        loop {
            cancel.check()?;
            match tokio::time::timeout(WAIT_SLICE, Arc::clone(&self.semaphore).acquire_owned())
                .await
            {
                Ok(Ok(permit)) => return Ok(SlotGuard { _permit: permit }),
                // The semaphore is never closed.
                Ok(Err(_)) => return Err(Error::Cancelled),
                Err(_elapsed) => {
                    tracing::trace!(pool = self.name, "slot wait slice elapsed, re-checking cancel");
                }
            }
        }
    }

    /// Try to take a slot without waiting.
    pub fn try_acquire(&self) -> Option<SlotGuard> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| SlotGuard { _permit: permit })
    }

    /// Whether a slot is free right now (dispatch predicate for the
    /// scheduler; racy by nature, callers re-check by acquiring).
    pub fn has_free_slot(&self) -> bool {
        self.semaphore.available_permits() > 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }
}

#[cfg(test)]
#[path = "slots_tests.rs"]
mod tests;
