// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn tracks_and_prunes_finished_tasks() {
    let tracker = TaskTracker::new();
    tracker.track(Some("user".to_string()), tokio::spawn(async {}));
    tokio::time::sleep(Duration::from_millis(50)).await;
    // Tracking a new task prunes the finished one.
    tracker.track(None, tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }));
    assert_eq!(tracker.len(), 1);
}

#[tokio::test]
async fn wait_idle_drains() {
    let tracker = TaskTracker::new();
    tracker.track(None, tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }));
    assert!(tracker.wait_idle(Duration::from_secs(2)).await);
    assert!(tracker.is_empty());
}

#[tokio::test]
async fn wait_idle_times_out_on_stuck_tasks() {
    let tracker = TaskTracker::new();
    tracker.track(None, tokio::spawn(async {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }));
    assert!(!tracker.wait_idle(Duration::from_millis(200)).await);
    tracker.abort_all();
    assert!(tracker.wait_idle(Duration::from_secs(1)).await);
}
