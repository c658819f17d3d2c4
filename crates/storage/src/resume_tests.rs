// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::sidecar::write_json;
use serde_json::json;
use std::path::Path;
use temper_core::TopicStatus;

fn harden_sidecar(dir: &Path) -> HardenSidecar {
    HardenSidecar::new(&dir.join("user.rb"), ".harden", "user")
}

fn enhance_sidecar(dir: &Path) -> EnhanceSidecar {
    EnhanceSidecar::new(&dir.join("user.rb"), ".enhance", "user")
}

#[test]
fn no_sidecars_means_no_resume() {
    let dir = tempfile::tempdir().unwrap();
    assert!(resume_hardening(&harden_sidecar(dir.path())).is_none());
    assert!(resume_enhance(&enhance_sidecar(dir.path())).is_none());
}

#[test]
fn analysis_alone_resumes_awaiting_decisions() {
    let dir = tempfile::tempdir().unwrap();
    let sidecar = harden_sidecar(dir.path());
    write_json(&sidecar.analysis(), &json!({"findings": [], "overall_risk": "low"})).unwrap();
    let resumed = resume_hardening(&sidecar).unwrap();
    assert_eq!(resumed.status, Some(WorkflowStatus::HAwaitingDecisions));
    assert!(resumed.analysis.is_some());
}

#[test]
fn corrupt_analysis_is_treated_as_absent() {
    let dir = tempfile::tempdir().unwrap();
    let sidecar = harden_sidecar(dir.path());
    std::fs::create_dir_all(sidecar.dir()).unwrap();
    std::fs::write(sidecar.analysis(), "{half written").unwrap();
    assert!(resume_hardening(&sidecar).is_none());
}

#[test]
fn hardening_ladder_walks_completeness() {
    let dir = tempfile::tempdir().unwrap();
    let sidecar = harden_sidecar(dir.path());
    write_json(&sidecar.analysis(), &json!({"findings": []})).unwrap();
    write_json(&sidecar.hardened(), &json!({"changes": []})).unwrap();
    assert_eq!(
        resume_hardening(&sidecar).unwrap().status,
        Some(WorkflowStatus::HHardened)
    );

    write_json(&sidecar.test_results(), &json!({"passed": false, "attempts": []})).unwrap();
    assert_eq!(
        resume_hardening(&sidecar).unwrap().status,
        Some(WorkflowStatus::HTestsFailed)
    );

    write_json(&sidecar.test_results(), &json!({"passed": true, "attempts": []})).unwrap();
    assert_eq!(
        resume_hardening(&sidecar).unwrap().status,
        Some(WorkflowStatus::HTested)
    );

    write_json(&sidecar.ci_results(), &json!({"passed": true, "checks": []})).unwrap();
    assert_eq!(
        resume_hardening(&sidecar).unwrap().status,
        Some(WorkflowStatus::HCiPassed)
    );

    write_json(&sidecar.verification(), &json!({"status": "verified"})).unwrap();
    assert_eq!(
        resume_hardening(&sidecar).unwrap().status,
        Some(WorkflowStatus::HComplete)
    );
}

#[test]
fn enhance_analysis_with_pending_research_resumes_awaiting_research() {
    let dir = tempfile::tempdir().unwrap();
    let sidecar = enhance_sidecar(dir.path());
    write_json(
        &sidecar.analysis(),
        &json!({"research_topics": ["topic a", "topic b"]}),
    )
    .unwrap();
    write_json(
        &sidecar.research_status(),
        &json!({"topics": [
            {"prompt": "topic a", "status": "completed", "result": "done"},
            {"prompt": "topic b", "status": "pending"}
        ]}),
    )
    .unwrap();

    let resumed = resume_enhance(&sidecar).unwrap();
    assert_eq!(resumed.status, Some(WorkflowStatus::EAwaitingResearch));
    assert_eq!(resumed.research_topics.len(), 2);
    assert_eq!(resumed.research_topics[0].status, TopicStatus::Completed);
    assert_eq!(resumed.research_topics[1].status, TopicStatus::Pending);
}

#[test]
fn topics_fall_back_to_analysis_prompts() {
    let dir = tempfile::tempdir().unwrap();
    let sidecar = enhance_sidecar(dir.path());
    write_json(&sidecar.analysis(), &json!({"research_topics": ["only topic"]})).unwrap();
    let resumed = resume_enhance(&sidecar).unwrap();
    assert_eq!(resumed.status, Some(WorkflowStatus::EAwaitingResearch));
    assert_eq!(resumed.research_topics[0].prompt, "only topic");
    assert_eq!(resumed.research_topics[0].status, TopicStatus::Pending);
}

#[test]
fn research_done_resumes_at_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let sidecar = enhance_sidecar(dir.path());
    write_json(&sidecar.analysis(), &json!({"research_topics": ["a"]})).unwrap();
    write_json(
        &sidecar.research_status(),
        &json!({"topics": [{"prompt": "a", "status": "completed", "result": "r"}]}),
    )
    .unwrap();
    let resumed = resume_enhance(&sidecar).unwrap();
    assert_eq!(resumed.status, Some(WorkflowStatus::EExtracting));
}

#[test]
fn audit_without_decisions_resumes_awaiting_decisions() {
    let dir = tempfile::tempdir().unwrap();
    let sidecar = enhance_sidecar(dir.path());
    write_json(&sidecar.analysis(), &json!({})).unwrap();
    write_json(&sidecar.audit(), &json!({"annotated_items": []})).unwrap();
    let resumed = resume_enhance(&sidecar).unwrap();
    assert_eq!(resumed.status, Some(WorkflowStatus::EAwaitingDecisions));
    assert!(resumed.audit_result.is_some());
}

#[test]
fn batches_without_progress_resume_awaiting_approval() {
    let dir = tempfile::tempdir().unwrap();
    let sidecar = enhance_sidecar(dir.path());
    write_json(&sidecar.analysis(), &json!({})).unwrap();
    write_json(
        &sidecar.batches(),
        &json!({"batches": [{"id": "b1", "writeTargets": ["app/models/user.rb"]}]}),
    )
    .unwrap();
    let resumed = resume_enhance(&sidecar).unwrap();
    assert_eq!(resumed.status, Some(WorkflowStatus::EAwaitingBatchApproval));
    assert_eq!(resumed.batches.len(), 1);
}

#[test]
fn partial_batch_resumes_at_its_last_completed_step() {
    let dir = tempfile::tempdir().unwrap();
    let sidecar = enhance_sidecar(dir.path());
    write_json(&sidecar.analysis(), &json!({})).unwrap();
    write_json(
        &sidecar.batches(),
        &json!({"batches": [{"id": "b1"}, {"id": "b2"}]}),
    )
    .unwrap();
    write_json(&sidecar.batch("b1").verification(), &json!({"status": "verified"})).unwrap();
    write_json(&sidecar.batch("b2").apply(), &json!({"changes": []})).unwrap();
    write_json(&sidecar.batch("b2").test_results(), &json!({"passed": true})).unwrap();

    let resumed = resume_enhance(&sidecar).unwrap();
    assert_eq!(resumed.status, Some(WorkflowStatus::EBatchTested));
    assert_eq!(resumed.current_batch_id.as_deref(), Some("b2"));
    assert_eq!(
        resumed.e_batch_state.get("b1"),
        Some(&serde_json::Value::String("verified".to_string()))
    );
    assert_eq!(
        resumed.e_batch_state.get("b2"),
        Some(&serde_json::Value::String("tested".to_string()))
    );
}

#[test]
fn all_batches_verified_resumes_enhance_complete() {
    let dir = tempfile::tempdir().unwrap();
    let sidecar = enhance_sidecar(dir.path());
    write_json(&sidecar.analysis(), &json!({})).unwrap();
    write_json(&sidecar.batches(), &json!({"batches": [{"id": "b1"}, {"id": "b2"}]})).unwrap();
    for id in ["b1", "b2"] {
        write_json(&sidecar.batch(id).verification(), &json!({"status": "verified"})).unwrap();
    }
    let resumed = resume_enhance(&sidecar).unwrap();
    assert_eq!(resumed.status, Some(WorkflowStatus::EEnhanceComplete));
}

#[test]
fn resume_is_stable_across_repeated_scans() {
    let dir = tempfile::tempdir().unwrap();
    let sidecar = enhance_sidecar(dir.path());
    write_json(&sidecar.analysis(), &json!({"research_topics": ["a"]})).unwrap();
    let first = resume_enhance(&sidecar).unwrap();
    let second = resume_enhance(&sidecar).unwrap();
    assert_eq!(first.status, second.status);
    assert_eq!(first.research_topics.len(), second.research_topics.len());
}
