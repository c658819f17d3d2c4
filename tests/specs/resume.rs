// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resume-after-restart specs.

use crate::prelude::*;
use serde_json::json;
use temper_core::WorkflowStatus;

/// Sidecars written by a previous process are enough to restore the
/// workflow on the next discover (scenario: crash during research).
#[tokio::test]
async fn restart_resumes_pending_research() {
    let project = project();
    let sidecar = enhance_sidecar(&project);
    temper_storage::write_json(
        &sidecar.analysis(),
        &json!({"summary": "x", "research_topics": ["topic a", "topic b"]}),
    )
    .unwrap();
    temper_storage::write_json(
        &sidecar.research_status(),
        &json!({"topics": [
            {"prompt": "topic a", "status": "completed", "result": "done"},
            {"prompt": "topic b", "status": "pending"}
        ]}),
    )
    .unwrap();

    project.engine.discover().await.unwrap();

    assert_eq!(
        project.engine.workflow_status("user"),
        Some(WorkflowStatus::EAwaitingResearch)
    );
    let topics = project.engine.workflow_data("user", "researchTopics").unwrap();
    assert_eq!(topics.as_array().unwrap().len(), 2);
    assert_eq!(topics[0]["status"], "completed");
    assert_eq!(topics[1]["status"], "pending");
}

/// The full reset→discover round trip restores the same statuses the
/// engine held before, because status is a pure function of the
/// sidecars.
#[tokio::test]
async fn reset_then_discover_is_idempotent() {
    let project = project();
    harden_to_complete(&project).await;
    let before = project.engine.workflow_status("user");

    project.engine.reset().await;
    project.engine.discover().await.unwrap();
    assert_eq!(project.engine.workflow_status("user"), before);
    assert_eq!(before, Some(WorkflowStatus::HComplete));
}

/// A half-written sidecar is treated as absent and the phase re-runs.
#[tokio::test]
async fn corrupt_sidecar_falls_back_to_the_previous_step() {
    let project = project();
    let sidecar = harden_sidecar(&project);
    temper_storage::write_json(&sidecar.analysis(), &json!({"findings": []})).unwrap();
    std::fs::create_dir_all(sidecar.dir()).unwrap();
    std::fs::write(sidecar.hardened(), "{truncated by crash").unwrap();

    project.engine.discover().await.unwrap();
    assert_eq!(
        project.engine.workflow_status("user"),
        Some(WorkflowStatus::HAwaitingDecisions)
    );
}

/// Completed batches stay completed across restarts; the partial batch
/// resumes at its last completed step.
#[tokio::test]
async fn partial_batch_resumes_mid_chain() {
    let project = project();
    let sidecar = enhance_sidecar(&project);
    temper_storage::write_json(&sidecar.analysis(), &json!({"summary": "x"})).unwrap();
    temper_storage::write_json(
        &sidecar.batches(),
        &json!({"batches": [{"id": "b1"}, {"id": "b2"}]}),
    )
    .unwrap();
    temper_storage::write_json(&sidecar.batch("b1").verification(), &json!({"status": "verified"}))
        .unwrap();
    temper_storage::write_json(&sidecar.batch("b2").apply(), &json!({"changes": []})).unwrap();

    project.engine.discover().await.unwrap();
    assert_eq!(
        project.engine.workflow_status("user"),
        Some(WorkflowStatus::EBatchApplied)
    );
    let state = project.engine.workflow_data("user", "eBatchState").unwrap();
    assert_eq!(state["b1"], "verified");
    assert_eq!(state["b2"], "applied");
    assert_eq!(
        project
            .engine
            .workflow_data("user", "currentBatchId")
            .unwrap(),
        "b2"
    );
}
