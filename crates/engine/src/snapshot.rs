// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cached state snapshots for SSE
//!
//! Serializing the full state on every SSE poll would thrash under many
//! connected browsers; the rendered JSON is cached for 100 ms and
//! re-rendered only when the state version moved. A watch channel carries
//! the version so the HTTP layer can push on change instead of polling
//! blind.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Freshness window for the rendered snapshot.
const CACHE_WINDOW: Duration = Duration::from_millis(100);

/// Connection lifetime the HTTP layer enforces on SSE streams.
pub const SSE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(20 * 60);

struct Cached {
    version: u64,
    rendered_at: Instant,
    json: Arc<String>,
}

/// Version-aware cache of the serialized engine state.
pub struct SnapshotCache {
    cached: Mutex<Option<Cached>>,
    watch_tx: watch::Sender<u64>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        let (watch_tx, _) = watch::channel(0);
        Self {
            cached: Mutex::new(None),
            watch_tx,
        }
    }

    /// Announce a new state version to SSE subscribers.
    pub fn notify(&self, version: u64) {
        let _ = self.watch_tx.send_replace(version);
    }

    /// Subscribe to state version changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.watch_tx.subscribe()
    }

    /// Return the cached snapshot, or render a fresh one.
    ///
    /// Within the freshness window the cache is returned as-is; past it,
    /// the cache is still reused while the version is unchanged (the JSON
    /// would be identical).
    pub fn get_or_render(&self, version: u64, render: impl FnOnce() -> String) -> Arc<String> {
        let mut cached = self.cached.lock();
        if let Some(entry) = cached.as_ref() {
            if entry.version == version || entry.rendered_at.elapsed() < CACHE_WINDOW {
                return Arc::clone(&entry.json);
            }
        }

        let json = Arc::new(render());
        *cached = Some(Cached {
            version,
            rendered_at: Instant::now(),
            json: Arc::clone(&json),
        });
        json
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
