// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock contention specs.

use crate::prelude::*;
use std::time::Duration;
use temper_core::WorkflowStatus;
use temper_engine::Guard;

/// Two targets whose batches claim the same file: the second stays
/// queued until the first releases its grant, then dispatches.
#[tokio::test]
async fn contending_batches_serialize_and_both_finish() {
    let project = project();
    std::fs::write(
        project.dir.path().join("app/models/account.rb"),
        "class Account < ApplicationRecord\nend\n",
    )
    .unwrap();
    harden_to_complete(&project).await;

    // Drive both targets to batch approval; both batches claim user.rb.
    for (name, batch_id) in [("user", "b-user"), ("account", "b-acct")] {
        if name == "account" {
            project
                .engine
                .try_transition(name, Guard::NotActive, WorkflowStatus::HComplete)
                .unwrap();
        }
        project.agent.on_cli(
            "enhancement opportunities",
            r#"{"summary": "", "opportunities": [], "research_topics": []}"#,
        );
        project.agent.on_cli(
            "Extract concrete enhancement items",
            r#"{"items": [{"id": "i1"}]}"#,
        );
        project
            .agent
            .on_cli("Synthesize and deduplicate", r#"{"items": [{"id": "i1"}]}"#);
        project.agent.on_cli(
            "Audit these enhancement items",
            r#"{"annotated_items": [{"id": "i1"}]}"#,
        );
        project.agent.on_cli(
            "Group these approved enhancement items",
            &format!(
                r#"{{"batches": [{{"id": "{batch_id}", "items": [{{"id": "i1"}}], "writeTargets": ["app/models/user.rb"]}}]}}"#
            ),
        );

        project.engine.run_enhance_analysis(name).unwrap();
        wait_for(&project, name, WorkflowStatus::EAwaitingDecisions).await;
        project
            .engine
            .submit_enhance_decisions(
                name,
                serde_json::json!({"items": [{"id": "i1", "decision": "approve"}]}),
            )
            .unwrap();
        project.engine.run_batch_planning(name).unwrap();
        wait_for(&project, name, WorkflowStatus::EAwaitingBatchApproval).await;
    }

    // Slow agent calls so the first batch holds its grant long enough to
    // observe the second waiting.
    project.agent.set_cli_delay(Duration::from_millis(400));
    project
        .agent
        .on_cli("Implement this enhancement batch", r#"{"changes": []}"#);
    project
        .agent
        .on_cli("Implement this enhancement batch", r#"{"changes": []}"#);
    project.agent.on_cli("Verify", r#"{"status": "verified"}"#);
    project.agent.on_cli("Verify", r#"{"status": "verified"}"#);

    project.engine.run_batch_execution("user").unwrap();
    project.engine.run_batch_execution("account").unwrap();

    // While one batch runs, the other is queued behind the shared path.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut saw_contention = false;
    while tokio::time::Instant::now() < deadline {
        if project.engine.queue_depth() == 1 && !project.engine.active_grants().is_empty() {
            saw_contention = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(saw_contention, "second batch never waited on the lock");

    wait_for(&project, "user", WorkflowStatus::EEnhanceComplete).await;
    wait_for(&project, "account", WorkflowStatus::EEnhanceComplete).await;
    assert!(project.engine.active_grants().is_empty());
    assert_eq!(project.engine.queue_depth(), 0);
}

#[tokio::test]
async fn reset_releases_grants_and_empties_the_queue() {
    let project = project();
    harden_to_complete(&project).await;

    // Park a grant and a queued item, then reset.
    project.agent.on_cli(
        "enhancement opportunities",
        r#"{"summary": "", "opportunities": [], "research_topics": ["t"]}"#,
    );
    project.engine.run_enhance_analysis("user").unwrap();
    wait_for(&project, "user", WorkflowStatus::EAwaitingResearch).await;

    project.engine.reset().await;
    assert!(project.engine.active_grants().is_empty());
    assert_eq!(project.engine.queue_depth(), 0);
    assert_eq!(project.engine.workflow_status("user"), None);
}
