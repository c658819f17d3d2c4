// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Enhance pipeline specs.

use crate::prelude::*;
use temper_core::WorkflowStatus;

fn script_enhance_chain(project: &Project) {
    project.agent.on_cli(
        "enhancement opportunities",
        r#"{"summary": "ok", "opportunities": [], "research_topics": ["a", "b", "c"]}"#,
    );
    project.agent.on_cli(
        "Extract concrete enhancement items",
        r#"{"items": [{"id": "i1", "title": "index"}]}"#,
    );
    project.agent.on_cli(
        "Synthesize and deduplicate",
        r#"{"items": [{"id": "i1", "title": "index"}]}"#,
    );
    project.agent.on_cli(
        "Audit these enhancement items",
        r#"{"annotated_items": [{"id": "i1"}]}"#,
    );
}

#[tokio::test]
async fn research_with_rejection_completes_when_others_are_done() {
    let project = project();
    harden_to_complete(&project).await;
    script_enhance_chain(&project);

    project.engine.run_enhance_analysis("user").unwrap();
    wait_for(&project, "user", WorkflowStatus::EAwaitingResearch).await;

    project.engine.submit_research("user", 0, "notes a").unwrap();
    project.engine.reject_research_topic("user", 1).unwrap();
    project.engine.submit_research("user", 2, "notes c").unwrap();

    // Only non-rejected topics are required; both are completed, so the
    // workflow moves through extraction to the decision gate.
    wait_for(&project, "user", WorkflowStatus::EAwaitingDecisions).await;

    let sidecar = enhance_sidecar(&project);
    assert!(json_artifact(&sidecar.extract()));
    assert!(json_artifact(&sidecar.synthesize()));
    assert!(json_artifact(&sidecar.audit()));
    assert!(sidecar.research_note("a").exists());
    assert!(json_artifact(&sidecar.research_status()));
}

#[tokio::test]
async fn full_enhance_pipeline_reaches_complete() {
    let project = project();
    harden_to_complete(&project).await;
    script_enhance_chain(&project);

    project.engine.run_enhance_analysis("user").unwrap();
    wait_for(&project, "user", WorkflowStatus::EAwaitingResearch).await;
    for topic in 0..3 {
        project
            .engine
            .submit_research("user", topic, "notes")
            .unwrap();
    }
    wait_for(&project, "user", WorkflowStatus::EAwaitingDecisions).await;

    project.agent.on_cli(
        "Group these approved enhancement items",
        r#"{"batches": [{"id": "b1", "items": [{"id": "i1"}], "writeTargets": ["app/models/user.rb"], "estimatedEffort": "low"}]}"#,
    );
    project
        .engine
        .submit_enhance_decisions(
            "user",
            serde_json::json!({"items": [
                {"id": "i1", "title": "index", "description": "add it", "decision": "approve"},
                {"id": "i2", "title": "cache", "description": "later", "decision": "defer"}
            ]}),
        )
        .unwrap();
    // Decisions only persist; planning is triggered as its own call.
    assert_eq!(
        project.engine.workflow_status("user"),
        Some(WorkflowStatus::EAwaitingDecisions)
    );
    project.engine.run_batch_planning("user").unwrap();
    wait_for(&project, "user", WorkflowStatus::EAwaitingBatchApproval).await;

    let sidecar = enhance_sidecar(&project);
    let deferred = temper_storage::read_json(&sidecar.deferred()).unwrap();
    assert_eq!(deferred.as_array().unwrap().len(), 1);

    project.agent.on_cli(
        "Implement this enhancement batch",
        r#"{"changes": [{"file": "app/models/user.rb"}]}"#,
    );
    project.agent.write_file_on_cli(
        "Implement this enhancement batch",
        sidecar.batch("b1").staging().join("app/models/user.rb"),
        "class User < ApplicationRecord\n  scope :recent, -> { order(created_at: :desc) }\nend\n",
    );
    project.agent.on_cli("Verify", r#"{"status": "verified"}"#);

    project.engine.run_batch_execution("user").unwrap();
    wait_for(&project, "user", WorkflowStatus::EEnhanceComplete).await;

    let batch = sidecar.batch("b1");
    assert!(json_artifact(&batch.apply()));
    assert!(json_artifact(&batch.test_results()));
    assert!(json_artifact(&batch.ci_results()));
    assert!(json_artifact(&batch.verification()));
    assert!(project.engine.active_grants().is_empty());

    let source = std::fs::read_to_string(project.dir.path().join("app/models/user.rb")).unwrap();
    assert!(source.contains("scope :recent"));
}
