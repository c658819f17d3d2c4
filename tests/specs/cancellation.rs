// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellation specs.

use crate::prelude::*;
use std::time::Duration;
use temper_core::WorkflowStatus;

/// Cancelling mid-subprocess kills the child's process group and routes
/// the task into `error` with a "cancelled" message.
#[tokio::test]
async fn cancel_mid_test_run_errors_the_workflow() {
    let project = project_with(|config| {
        config.test_command = vec!["sleep".to_string(), "60".to_string()];
    });
    script_hardening(&project);

    project.engine.discover().await.unwrap();
    project.engine.run_analysis("user").unwrap();
    wait_for(&project, "user", WorkflowStatus::HAwaitingDecisions).await;
    project
        .engine
        .submit_decision("user", serde_json::json!({"action": "approve"}))
        .unwrap();

    // Let the chain get into the long test subprocess, then cancel.
    wait_for(&project, "user", WorkflowStatus::HTesting).await;
    let started = std::time::Instant::now();
    project.engine.cancel();

    wait_for(&project, "user", WorkflowStatus::Error).await;
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "kill happened well before the 60s sleep"
    );
    let error = project.engine.workflow_data("user", "error").unwrap();
    assert_eq!(error.as_str().unwrap(), "cancelled");
}

#[tokio::test]
async fn cancelled_workflow_can_restart_after_reset() {
    let project = project_with(|config| {
        config.test_command = vec!["sleep".to_string(), "60".to_string()];
    });
    script_hardening(&project);
    project.engine.discover().await.unwrap();
    project.engine.run_analysis("user").unwrap();
    wait_for(&project, "user", WorkflowStatus::HAwaitingDecisions).await;
    project
        .engine
        .submit_decision("user", serde_json::json!({"action": "approve"}))
        .unwrap();
    wait_for(&project, "user", WorkflowStatus::HTesting).await;

    project.engine.reset().await;
    project.engine.discover().await.unwrap();

    // Sidecars from the interrupted run resume the workflow.
    assert_eq!(
        project.engine.workflow_status("user"),
        Some(WorkflowStatus::HHardened)
    );
}
