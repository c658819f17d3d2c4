// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resume-from-sidecars
//!
//! Derives the initial workflow status for a target from sidecar file
//! presence, in descending order of completeness. Corrupt files read as
//! absent, so a half-written artifact simply re-runs its phase.

use crate::layout::{EnhanceSidecar, HardenSidecar};
use crate::sidecar::read_json;
use serde_json::Value;
use std::collections::BTreeMap;
use temper_core::{research_complete, Batch, Mode, ResearchTopic, WorkflowStatus};

/// Workflow fields reconstructed from disk.
#[derive(Debug, Clone, Default)]
pub struct ResumedWorkflow {
    pub mode: Mode,
    pub status: Option<WorkflowStatus>,
    pub analysis: Option<Value>,
    pub apply_result: Option<Value>,
    pub test_results: Option<Value>,
    pub ci_results: Option<Value>,
    pub verification: Option<Value>,
    pub e_analysis: Option<Value>,
    pub research_topics: Vec<ResearchTopic>,
    pub possible_items: Option<Value>,
    pub ready_items: Option<Value>,
    pub audit_result: Option<Value>,
    pub e_decisions: Option<Value>,
    pub batches: Vec<Batch>,
    pub current_batch_id: Option<String>,
    pub e_batch_state: BTreeMap<String, Value>,
}

fn passed(value: &Value) -> bool {
    value.get("passed").and_then(Value::as_bool).unwrap_or(false)
}

/// Reconstruct hardening progress. `None` when no sidecars exist.
pub fn resume_hardening(sidecar: &HardenSidecar) -> Option<ResumedWorkflow> {
    let mut resumed = ResumedWorkflow {
        mode: Mode::Hardening,
        analysis: read_json(&sidecar.analysis()),
        apply_result: read_json(&sidecar.hardened()),
        test_results: read_json(&sidecar.test_results()),
        ci_results: read_json(&sidecar.ci_results()),
        verification: read_json(&sidecar.verification()),
        ..ResumedWorkflow::default()
    };

    let status = if resumed.verification.is_some() {
        WorkflowStatus::HComplete
    } else if let Some(ci) = &resumed.ci_results {
        if passed(ci) {
            WorkflowStatus::HCiPassed
        } else {
            WorkflowStatus::HCiFailed
        }
    } else if let Some(tests) = &resumed.test_results {
        if passed(tests) {
            WorkflowStatus::HTested
        } else {
            WorkflowStatus::HTestsFailed
        }
    } else if resumed.apply_result.is_some() {
        WorkflowStatus::HHardened
    } else if resumed.analysis.is_some() {
        WorkflowStatus::HAwaitingDecisions
    } else {
        return None;
    };

    resumed.status = Some(status);
    Some(resumed)
}

/// Reconstruct enhance progress. `None` when the enhance analysis is
/// absent (the pipeline never started).
pub fn resume_enhance(sidecar: &EnhanceSidecar) -> Option<ResumedWorkflow> {
    let e_analysis = read_json(&sidecar.analysis())?;

    let mut resumed = ResumedWorkflow {
        mode: Mode::Enhance,
        e_analysis: Some(e_analysis),
        research_topics: load_topics(sidecar),
        possible_items: read_json(&sidecar.extract()),
        ready_items: read_json(&sidecar.synthesize()),
        audit_result: read_json(&sidecar.audit()),
        e_decisions: read_json(&sidecar.decisions()),
        ..ResumedWorkflow::default()
    };

    if let Some(plan) = read_json(&sidecar.batches()) {
        if let Ok(batches) = Batch::list_from_plan(&plan) {
            resumed.batches = batches;
            let status = resume_batches(sidecar, &mut resumed);
            resumed.status = Some(status);
            return Some(resumed);
        }
    }

    let status = if resumed.e_decisions.is_some() || resumed.audit_result.is_some() {
        WorkflowStatus::EAwaitingDecisions
    } else if research_complete(&resumed.research_topics) {
        WorkflowStatus::EExtracting
    } else {
        WorkflowStatus::EAwaitingResearch
    };
    resumed.status = Some(status);
    Some(resumed)
}

/// Walk batches in order and derive the resume point from per-batch
/// artifacts.
fn resume_batches(sidecar: &EnhanceSidecar, resumed: &mut ResumedWorkflow) -> WorkflowStatus {
    let mut any_progress = false;
    let batches = resumed.batches.clone();

    for batch in &batches {
        let dir = sidecar.batch(&batch.id);
        let verification = read_json(&dir.verification());
        if verification.is_some() {
            any_progress = true;
            resumed
                .e_batch_state
                .insert(batch.id.clone(), Value::String("verified".to_string()));
            continue;
        }

        let ci = read_json(&dir.ci_results());
        let tests = read_json(&dir.test_results());
        let apply = read_json(&dir.apply());

        let step = if let Some(ci) = &ci {
            Some(if passed(ci) {
                WorkflowStatus::EBatchCiPassed
            } else {
                WorkflowStatus::ECiFailed
            })
        } else if let Some(tests) = &tests {
            Some(if passed(tests) {
                WorkflowStatus::EBatchTested
            } else {
                WorkflowStatus::ETestsFailed
            })
        } else if apply.is_some() {
            Some(WorkflowStatus::EBatchApplied)
        } else {
            None
        };

        match step {
            Some(status) => {
                resumed.current_batch_id = Some(batch.id.clone());
                resumed.e_batch_state.insert(
                    batch.id.clone(),
                    Value::String(batch_state_label(status).to_string()),
                );
                return status;
            }
            // First batch with no artifacts at all: everything before it
            // was verified, so resume here awaiting execution, or at
            // approval if nothing has run yet.
            None => break,
        }
    }

    if any_progress
        && batches
            .iter()
            .all(|b| read_json(&sidecar.batch(&b.id).verification()).is_some())
    {
        return WorkflowStatus::EEnhanceComplete;
    }

    WorkflowStatus::EAwaitingBatchApproval
}

fn batch_state_label(status: WorkflowStatus) -> &'static str {
    match status {
        WorkflowStatus::EBatchApplied => "applied",
        WorkflowStatus::EBatchTested => "tested",
        WorkflowStatus::ETestsFailed => "tests_failed",
        WorkflowStatus::EBatchCiPassed => "ci_passed",
        WorkflowStatus::ECiFailed => "ci_failed",
        _ => "pending",
    }
}

/// Topics come from `research_status.json` once any research has been
/// recorded, else from the analysis' `research_topics` prompt list.
fn load_topics(sidecar: &EnhanceSidecar) -> Vec<ResearchTopic> {
    if let Some(status) = read_json(&sidecar.research_status()) {
        if let Some(topics) = status.get("topics") {
            if let Ok(topics) = serde_json::from_value::<Vec<ResearchTopic>>(topics.clone()) {
                return topics;
            }
        }
    }

    read_json(&sidecar.analysis())
        .and_then(|analysis| {
            analysis.get("research_topics").and_then(Value::as_array).map(|prompts| {
                prompts
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ResearchTopic::new)
                    .collect()
            })
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "resume_tests.rs"]
mod tests;
