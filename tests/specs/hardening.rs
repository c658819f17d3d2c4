// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hardening pipeline specs.

use crate::prelude::*;
use temper_core::WorkflowStatus;
use temper_engine::Guard;

#[tokio::test]
async fn happy_path_reaches_complete_with_all_sidecars() {
    let project = project_with(|config| {
        config.ci_commands = vec![temper_engine::CiCommand {
            name: "lint".to_string(),
            command: vec!["true".to_string()],
        }];
    });
    script_hardening(&project);

    project.engine.discover().await.unwrap();
    project
        .engine
        .try_transition("user", Guard::NotActive, WorkflowStatus::HAnalyzing)
        .unwrap();
    project.engine.run_analysis("user").unwrap();
    wait_for(&project, "user", WorkflowStatus::HAwaitingDecisions).await;

    project
        .engine
        .submit_decision("user", serde_json::json!({"action": "approve"}))
        .unwrap();
    wait_for(&project, "user", WorkflowStatus::HComplete).await;

    let sidecar = harden_sidecar(&project);
    assert!(json_artifact(&sidecar.analysis()));
    assert!(json_artifact(&sidecar.hardened()));
    assert!(json_artifact(&sidecar.test_results()));
    assert!(json_artifact(&sidecar.ci_results()));
    assert!(json_artifact(&sidecar.verification()));

    let source = std::fs::read_to_string(project.dir.path().join("app/models/user.rb")).unwrap();
    assert!(source.contains("validates :email"), "staged change landed");
}

#[tokio::test]
async fn exhausted_fix_loop_records_three_attempts() {
    let project = project_with(|config| {
        config.test_command = vec!["false".to_string()];
    });
    script_hardening(&project);

    project.engine.discover().await.unwrap();
    project.engine.run_analysis("user").unwrap();
    wait_for(&project, "user", WorkflowStatus::HAwaitingDecisions).await;
    project
        .engine
        .submit_decision("user", serde_json::json!({"action": "approve"}))
        .unwrap();
    wait_for(&project, "user", WorkflowStatus::HTestsFailed).await;

    let results = temper_storage::read_json(&harden_sidecar(&project).test_results()).unwrap();
    assert_eq!(results["passed"], false);
    assert_eq!(results["attempts"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn snapshot_exposes_workflows_and_prompts() {
    let project = project();
    harden_to_complete(&project).await;

    let snapshot: serde_json::Value =
        serde_json::from_str(&project.engine.to_json()).unwrap();
    let workflow = &snapshot["workflows"]["user"];
    assert_eq!(workflow["status"], "h_complete");
    assert!(workflow["prompts"]["analysis_prompt"].is_string());
    assert!(workflow["prompts"]["apply_prompt"].is_string());
    assert!(workflow["prompts"]["verify_prompt"].is_string());
}
