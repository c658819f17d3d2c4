// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-level write lock manager
//!
//! Grants are all-or-nothing: a request either locks every path it names or
//! nothing at all, which eliminates hold-and-wait and with it any need for a
//! lock ordering discipline. Two grants conflict iff any write path appears
//! in both. A background reaper releases grants whose TTL has lapsed.

use crate::clock::{Clock, SystemClock};
use crate::error::Error;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// How long a grant lives without renewal.
pub const GRANT_TTL: Duration = Duration::from_secs(30 * 60);

/// Poll interval for blocking acquisition.
const ACQUIRE_POLL: Duration = Duration::from_millis(500);

/// A set of file-level write locks held by one work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockGrant {
    pub id: String,
    pub holder: String,
    pub write_paths: Vec<PathBuf>,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub released: bool,
}

impl LockGrant {
    /// Active iff not released and not past its expiry.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.released && self.expires_at > now
    }

    /// Whether this grant covers `path` exactly.
    pub fn covers(&self, path: &Path) -> bool {
        self.write_paths.iter().any(|p| p == path)
    }

    fn conflicts_with(&self, paths: &[PathBuf]) -> bool {
        self.write_paths.iter().any(|p| paths.contains(p))
    }
}

/// Tracks write-lock grants over files.
#[derive(Clone)]
pub struct LockManager {
    grants: Arc<Mutex<HashMap<String, LockGrant>>>,
    clock: Arc<dyn Clock>,
    ttl: ChronoDuration,
}

impl LockManager {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            grants: Arc::new(Mutex::new(HashMap::new())),
            clock,
            ttl: ChronoDuration::from_std(GRANT_TTL).unwrap_or(ChronoDuration::MAX),
        }
    }

    /// Attempt to lock every path in `write_paths` at once.
    ///
    /// Returns `Ok(None)` when any path is already covered by an active
    /// grant. Requesting a lock on an existing directory is an `OverLock`
    /// error and leaves the grant table untouched.
    pub fn try_acquire(
        &self,
        holder: &str,
        write_paths: &[PathBuf],
    ) -> Result<Option<LockGrant>, Error> {
        for path in write_paths {
            if path.is_dir() {
                return Err(Error::OverLock(path.display().to_string()));
            }
        }

        let now = self.clock.now();
        let mut grants = self.grants.lock();
        let conflict = grants
            .values()
            .any(|g| g.is_active(now) && g.conflicts_with(write_paths));
        if conflict {
            return Ok(None);
        }

        let grant = LockGrant {
            id: Uuid::new_v4().to_string(),
            holder: holder.to_string(),
            write_paths: write_paths.to_vec(),
            acquired_at: now,
            expires_at: now + self.ttl,
            released: false,
        };
        grants.insert(grant.id.clone(), grant.clone());
        Ok(Some(grant))
    }

    /// Blocking acquisition: poll every 0.5 s until success or `timeout`.
    pub async fn acquire(
        &self,
        holder: &str,
        write_paths: &[PathBuf],
        timeout: Duration,
    ) -> Result<LockGrant, Error> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(grant) = self.try_acquire(holder, write_paths)? {
                return Ok(grant);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            tokio::time::sleep(ACQUIRE_POLL).await;
        }
    }

    /// Release a grant; idempotent, unknown ids are ignored.
    pub fn release(&self, grant_id: &str) {
        let mut grants = self.grants.lock();
        if let Some(grant) = grants.get_mut(grant_id) {
            grant.released = true;
        }
    }

    /// Extend a grant's expiry by the TTL; no-op once released.
    pub fn renew(&self, grant_id: &str) {
        let now = self.clock.now();
        let mut grants = self.grants.lock();
        if let Some(grant) = grants.get_mut(grant_id) {
            if !grant.released {
                grant.expires_at = now + self.ttl;
            }
        }
    }

    /// Look up a grant and require it to be active and to cover `path`.
    pub fn check_grant_covers(&self, grant_id: &str, path: &Path) -> Result<(), Error> {
        let now = self.clock.now();
        let grants = self.grants.lock();
        let grant = grants
            .get(grant_id)
            .ok_or_else(|| Error::LockViolation(format!("no such grant: {grant_id}")))?;
        if !grant.is_active(now) {
            return Err(Error::LockViolation(format!(
                "grant {grant_id} is released or expired"
            )));
        }
        if !grant.covers(path) {
            return Err(Error::LockViolation(format!(
                "grant {grant_id} does not cover {}",
                path.display()
            )));
        }
        Ok(())
    }

    /// Diagnostic: active grants intersecting any of `write_paths`.
    pub fn check_conflicts(&self, write_paths: &[PathBuf]) -> Vec<LockGrant> {
        let now = self.clock.now();
        let grants = self.grants.lock();
        grants
            .values()
            .filter(|g| g.is_active(now) && g.conflicts_with(write_paths))
            .cloned()
            .collect()
    }

    /// All currently active grants.
    pub fn active_grants(&self) -> Vec<LockGrant> {
        let now = self.clock.now();
        let grants = self.grants.lock();
        let mut active: Vec<LockGrant> = grants
            .values()
            .filter(|g| g.is_active(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| a.acquired_at.cmp(&b.acquired_at));
        active
    }

    /// Release every grant (used by engine reset).
    pub fn release_all(&self) {
        let mut grants = self.grants.lock();
        for grant in grants.values_mut() {
            grant.released = true;
        }
    }

    /// One reaper pass: mark expired grants released, drop released ones.
    pub fn reap_expired(&self) -> usize {
        let now = self.clock.now();
        let mut grants = self.grants.lock();
        let mut reaped = 0;
        for grant in grants.values_mut() {
            if !grant.released && grant.expires_at <= now {
                grant.released = true;
                reaped += 1;
                tracing::warn!(grant_id = %grant.id, holder = %grant.holder, "reaped expired lock grant");
            }
        }
        grants.retain(|_, g| !g.released);
        reaped
    }

    /// Run the reaper loop until `shutdown` resolves.
    ///
    /// Ticks every `interval` (60 s in production).
    pub async fn run_reaper(&self, interval: Duration, shutdown: crate::CancelFlag) {
        loop {
            tokio::time::sleep(interval).await;
            if shutdown.is_cancelled() {
                return;
            }
            self.reap_expired();
        }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
