// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{testbed, testbed_with, wait_for_any, wait_for_status, TestBed};
use serde_json::json;
use std::time::Duration;
use temper_core::QueryStatus;

async fn analyzed(bed: &TestBed) {
    bed.engine.discover().await.unwrap();
    bed.agent
        .on_cli("Analyze", r#"{"findings": [{"id": "f1", "title": "raw sql"}], "overall_risk": "low"}"#);
    bed.engine.run_analysis("user").unwrap();
    wait_for_status(bed, "user", WorkflowStatus::HAwaitingDecisions).await;
}

#[tokio::test]
async fn analysis_writes_sidecar_and_awaits_decisions() {
    let bed = testbed();
    analyzed(&bed).await;

    let analysis = bed.engine.workflow_data("user", "analysis").unwrap();
    assert_eq!(analysis["overall_risk"], "low");
    let sidecar = sidecar_for(&bed);
    assert!(sidecar.analysis().exists());
}

fn sidecar_for(bed: &TestBed) -> temper_storage::HardenSidecar {
    temper_storage::HardenSidecar::new(
        &bed.dir.path().join("app/models/user.rb"),
        ".harden",
        "user",
    )
}

#[tokio::test]
async fn happy_path_runs_apply_test_ci_verify_to_complete() {
    let bed = testbed_with(|config| {
        config.ci_commands = vec![crate::config::CiCommand {
            name: "lint".to_string(),
            command: vec!["true".to_string()],
        }];
    });
    analyzed(&bed).await;

    let sidecar = sidecar_for(&bed);
    bed.agent
        .on_cli("Apply the approved hardening", r#"{"changes": [{"file": "app/models/user.rb"}]}"#);
    bed.agent.write_file_on_cli(
        "Apply the approved hardening",
        sidecar.staging().join("app/models/user.rb"),
        "class User < ApplicationRecord\n  validates :email, presence: true\nend\n",
    );
    bed.agent.on_cli("Verify", r#"{"status": "verified", "notes": []}"#);

    bed.engine
        .submit_decision("user", json!({"action": "approve"}))
        .unwrap();
    wait_for_status(&bed, "user", WorkflowStatus::HComplete).await;

    assert!(sidecar.analysis().exists());
    assert!(sidecar.hardened().exists());
    assert!(sidecar.test_results().exists());
    assert!(sidecar.ci_results().exists());
    assert!(sidecar.verification().exists());
    let hardened = std::fs::read_to_string(bed.dir.path().join("app/models/user.rb")).unwrap();
    assert!(hardened.contains("validates :email"));
}

#[tokio::test]
async fn skip_decision_is_terminal() {
    let bed = testbed();
    analyzed(&bed).await;

    bed.engine
        .submit_decision("user", json!({"action": "skip"}))
        .unwrap();
    wait_for_status(&bed, "user", WorkflowStatus::HSkipped).await;
    assert!(bed.engine.workflow_data("user", "completedAt").is_some());
}

#[tokio::test]
async fn submit_decision_requires_awaiting_decisions() {
    let bed = testbed();
    bed.engine.discover().await.unwrap();
    let err = bed
        .engine
        .submit_decision("user", json!({"action": "approve"}))
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn double_submit_is_refused() {
    let bed = testbed();
    analyzed(&bed).await;
    bed.agent.set_cli_delay(Duration::from_millis(300));

    bed.engine
        .submit_decision("user", json!({"action": "approve"}))
        .unwrap();
    let second = bed
        .engine
        .submit_decision("user", json!({"action": "approve"}));
    assert!(matches!(second, Err(Error::StateGuard(_))));
}

#[tokio::test]
async fn exhausted_fix_loop_lands_in_tests_failed() {
    let bed = testbed_with(|config| {
        config.test_command = vec!["false".to_string()];
    });
    analyzed(&bed).await;

    bed.engine
        .submit_decision("user", json!({"action": "approve"}))
        .unwrap();
    wait_for_status(&bed, "user", WorkflowStatus::HTestsFailed).await;

    let results = temper_storage::read_json(&sidecar_for(&bed).test_results()).unwrap();
    assert_eq!(results["attempts"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn run_testing_retries_from_tests_failed_through_to_complete() {
    let bed = testbed_with(|config| {
        config.test_command = vec![
            "test".to_string(),
            "-f".to_string(),
            "test/pass_marker".to_string(),
        ];
    });
    analyzed(&bed).await;
    bed.agent.on_cli("Verify", r#"{"status": "verified"}"#);

    bed.engine
        .submit_decision("user", json!({"action": "approve"}))
        .unwrap();
    wait_for_status(&bed, "user", WorkflowStatus::HTestsFailed).await;

    // Operator fixes the project out of band, then retries.
    std::fs::write(bed.dir.path().join("test/pass_marker"), "").unwrap();
    bed.engine.run_testing("user").unwrap();
    wait_for_status(&bed, "user", WorkflowStatus::HComplete).await;
}

#[tokio::test]
async fn run_testing_rejects_wrong_states() {
    let bed = testbed();
    analyzed(&bed).await;
    let err = bed.engine.run_testing("user").unwrap_err();
    assert!(matches!(err, Error::StateGuard(_)));
}

#[tokio::test]
async fn run_ci_checks_retries_from_ci_failed() {
    let bed = testbed_with(|config| {
        config.ci_commands = vec![crate::config::CiCommand {
            name: "lint".to_string(),
            command: vec![
                "test".to_string(),
                "-f".to_string(),
                "test/ci_marker".to_string(),
            ],
        }];
    });
    analyzed(&bed).await;
    bed.agent.on_cli("Verify", r#"{"status": "verified"}"#);

    bed.engine
        .submit_decision("user", json!({"action": "approve"}))
        .unwrap();
    wait_for_status(&bed, "user", WorkflowStatus::HCiFailed).await;

    std::fs::write(bed.dir.path().join("test/ci_marker"), "").unwrap();
    bed.engine.run_ci_checks("user").unwrap();
    wait_for_status(&bed, "user", WorkflowStatus::HComplete).await;
}

#[tokio::test]
async fn error_retries_back_through_analysis() {
    let bed = testbed();
    bed.engine.discover().await.unwrap();
    bed.agent.fail_cli("Analyze", "agent crashed");
    bed.agent.on_cli("Analyze", r#"{"findings": [], "overall_risk": "low"}"#);

    bed.engine.run_analysis("user").unwrap();
    wait_for_status(&bed, "user", WorkflowStatus::Error).await;

    // error → h_analyzing is an allowed re-entry.
    bed.engine.run_analysis("user").unwrap();
    wait_for_status(&bed, "user", WorkflowStatus::HAwaitingDecisions).await;
    assert_eq!(bed.engine.workflow_data("user", "error"), None);
}

#[tokio::test]
async fn load_existing_analysis_skips_the_agent() {
    let bed = testbed();
    bed.engine.discover().await.unwrap();
    temper_storage::write_json(
        &sidecar_for(&bed).analysis(),
        &json!({"findings": [{"id": "old"}], "overall_risk": "medium"}),
    )
    .unwrap();

    bed.engine.load_existing_analysis("user").unwrap();
    assert_eq!(
        bed.engine.workflow_status("user"),
        Some(WorkflowStatus::HAwaitingDecisions)
    );
    let analysis = bed.engine.workflow_data("user", "analysis").unwrap();
    assert_eq!(analysis["overall_risk"], "medium");
    assert!(bed.agent.calls().is_empty());
}

#[tokio::test]
async fn load_existing_analysis_without_sidecar_is_not_found() {
    let bed = testbed();
    bed.engine.discover().await.unwrap();
    let err = bed.engine.load_existing_analysis("user").unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

// ---- queries -------------------------------------------------------------

async fn wait_for_query(bed: &TestBed, id: &str) -> temper_core::Query {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let query = bed
            .engine
            .queries()
            .into_iter()
            .find(|q| q.id == id)
            .expect("query exists");
        if query.status != QueryStatus::Pending {
            return query;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "query never settled"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn ask_question_resolves_asynchronously() {
    let bed = testbed();
    analyzed(&bed).await;
    bed.agent
        .on_cli("Answer this question", r#"{"answer": "it is safe"}"#);

    let id = bed.engine.ask_question("user", "is this safe?").unwrap();
    let query = wait_for_query(&bed, &id).await;
    assert_eq!(query.status, QueryStatus::Complete);
    assert_eq!(query.result.as_deref(), Some("it is safe"));
}

#[tokio::test]
async fn failed_question_marks_the_query_not_the_workflow() {
    let bed = testbed();
    analyzed(&bed).await;
    bed.agent.fail_cli("Answer this question", "no agent today");

    let id = bed.engine.ask_question("user", "anything?").unwrap();
    let query = wait_for_query(&bed, &id).await;
    assert_eq!(query.status, QueryStatus::Error);
    assert_eq!(
        bed.engine.workflow_status("user"),
        Some(WorkflowStatus::HAwaitingDecisions),
        "workflow untouched by query failure"
    );
}

#[tokio::test]
async fn explain_finding_requires_a_known_id() {
    let bed = testbed();
    analyzed(&bed).await;
    bed.agent
        .on_cli("Explain this analysis finding", r#"{"answer": "because sql"}"#);

    let id = bed.engine.explain_finding("user", "f1").unwrap();
    let query = wait_for_query(&bed, &id).await;
    assert_eq!(query.status, QueryStatus::Complete);
    assert_eq!(query.finding_id.as_deref(), Some("f1"));

    let missing = bed.engine.explain_finding("user", "nope").unwrap_err();
    assert!(matches!(missing, Error::NotFound(_)));
}

#[tokio::test]
async fn chain_halts_where_the_operator_must_intervene() {
    let bed = testbed_with(|config| {
        config.test_command = vec!["false".to_string()];
    });
    analyzed(&bed).await;
    bed.engine
        .submit_decision("user", json!({"action": "approve"}))
        .unwrap();
    let landed = wait_for_any(
        &bed,
        "user",
        &[WorkflowStatus::HTestsFailed, WorkflowStatus::HComplete],
    )
    .await;
    assert_eq!(landed, WorkflowStatus::HTestsFailed);
    // Verify never ran.
    assert!(!sidecar_for(&bed).verification().exists());
}
