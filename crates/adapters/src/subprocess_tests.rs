// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Instant;

fn sh(script: &str) -> Vec<String> {
    vec!["-c".to_string(), script.to_string()]
}

#[tokio::test]
async fn captures_stdout_on_success() {
    let cancel = CancelFlag::new();
    let result = run_supervised("sh", &sh("echo hello"), Duration::from_secs(5), None, &cancel)
        .await
        .unwrap();
    assert!(result.success);
    assert!(result.output.contains("hello"));
}

#[tokio::test]
async fn merges_stdout_and_stderr() {
    let cancel = CancelFlag::new();
    let result = run_supervised(
        "sh",
        &sh("echo to-out; echo to-err 1>&2"),
        Duration::from_secs(5),
        None,
        &cancel,
    )
    .await
    .unwrap();
    assert!(result.output.contains("to-out"));
    assert!(result.output.contains("to-err"));
}

#[tokio::test]
async fn nonzero_exit_is_not_an_error() {
    let cancel = CancelFlag::new();
    let result = run_supervised("sh", &sh("echo oops; exit 3"), Duration::from_secs(5), None, &cancel)
        .await
        .unwrap();
    assert!(!result.success);
    assert!(result.output.contains("oops"));
}

#[tokio::test]
async fn respects_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
    let cancel = CancelFlag::new();
    let result = run_supervised(
        "sh",
        &sh("cat marker.txt"),
        Duration::from_secs(5),
        Some(dir.path()),
        &cancel,
    )
    .await
    .unwrap();
    assert!(result.output.contains("here"));
}

#[tokio::test]
async fn missing_binary_is_a_spawn_error() {
    let cancel = CancelFlag::new();
    let err = run_supervised(
        "definitely-not-a-real-binary",
        &[],
        Duration::from_secs(5),
        None,
        &cancel,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SubprocessError::Spawn(_)));
}

#[tokio::test]
async fn deadline_kills_the_process_group() {
    let cancel = CancelFlag::new();
    let started = Instant::now();
    let err = run_supervised(
        "sh",
        &sh("sleep 30"),
        Duration::from_millis(300),
        None,
        &cancel,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SubprocessError::TimedOut));
    assert_eq!(err.to_string(), "timed out");
    // TERM + 500ms grace + KILL, well under the child's sleep.
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn cancellation_kills_within_the_poll_interval() {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        flag.cancel();
    });

    let started = Instant::now();
    let err = run_supervised("sh", &sh("sleep 30"), Duration::from_secs(60), None, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, SubprocessError::Cancelled));
    assert_eq!(err.to_string(), "cancelled");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn kill_reaches_children_of_the_child() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("grandchild-ran");
    // The backgrounded subshell would write the marker after 2s if it
    // survived the group kill.
    let script = format!(
        "(sleep 2 && touch {}) & sleep 30",
        marker.display()
    );
    let cancel = CancelFlag::new();
    let err = run_supervised("sh", &sh(&script), Duration::from_millis(200), None, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, SubprocessError::TimedOut));

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(!marker.exists(), "grandchild outlived the group kill");
}

#[tokio::test]
async fn repeated_runs_leak_nothing() {
    let cancel = CancelFlag::new();
    for _ in 0..50 {
        let result = run_supervised("sh", &sh("echo tick"), Duration::from_secs(5), None, &cancel)
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("tick"));
    }
}
