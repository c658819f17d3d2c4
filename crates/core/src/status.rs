// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow status set

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a per-target workflow.
///
/// Every status is prefixed `h_` (hardening) or `e_` (enhance) except the
/// shared values `idle`, `discovering`, `ready`, and `error`. The string
/// forms are the wire/sidecar representation and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowStatus {
    Idle,
    Discovering,
    Ready,
    Error,
    // Hardening
    HAnalyzing,
    HAwaitingDecisions,
    HSkipped,
    HApplying,
    HHardened,
    HTesting,
    HFixing,
    HTested,
    HTestsFailed,
    HCiChecking,
    HCiPassed,
    HCiFailed,
    HVerifying,
    HComplete,
    // Enhance
    EAnalyzing,
    EAwaitingResearch,
    EExtracting,
    ESynthesizing,
    EAuditing,
    EAwaitingDecisions,
    EPlanningBatches,
    EAwaitingBatchApproval,
    EApplying,
    EBatchApplied,
    ETesting,
    EFixingTests,
    EBatchTested,
    ECiChecking,
    EFixingCi,
    EBatchCiPassed,
    EVerifying,
    EBatchComplete,
    ETestsFailed,
    ECiFailed,
    EEnhanceComplete,
}

/// Statuses representing in-flight asynchronous work.
///
/// `try_transition` with the not-active guard refuses to start a new
/// operation while the workflow sits in any of these. Hardening shares one
/// `h_fixing` status across its test-fix and CI-fix loops.
pub const ACTIVE_STATUSES: [WorkflowStatus; 17] = [
    WorkflowStatus::HAnalyzing,
    WorkflowStatus::HApplying,
    WorkflowStatus::HTesting,
    WorkflowStatus::HFixing,
    WorkflowStatus::HCiChecking,
    WorkflowStatus::HVerifying,
    WorkflowStatus::EAnalyzing,
    WorkflowStatus::EExtracting,
    WorkflowStatus::ESynthesizing,
    WorkflowStatus::EAuditing,
    WorkflowStatus::EPlanningBatches,
    WorkflowStatus::EApplying,
    WorkflowStatus::ETesting,
    WorkflowStatus::EFixingTests,
    WorkflowStatus::ECiChecking,
    WorkflowStatus::EFixingCi,
    WorkflowStatus::EVerifying,
];

impl WorkflowStatus {
    /// Stable string form used in sidecars and the UI snapshot.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Idle => "idle",
            WorkflowStatus::Discovering => "discovering",
            WorkflowStatus::Ready => "ready",
            WorkflowStatus::Error => "error",
            WorkflowStatus::HAnalyzing => "h_analyzing",
            WorkflowStatus::HAwaitingDecisions => "h_awaiting_decisions",
            WorkflowStatus::HSkipped => "h_skipped",
            WorkflowStatus::HApplying => "h_applying",
            WorkflowStatus::HHardened => "h_hardened",
            WorkflowStatus::HTesting => "h_testing",
            WorkflowStatus::HFixing => "h_fixing",
            WorkflowStatus::HTested => "h_tested",
            WorkflowStatus::HTestsFailed => "h_tests_failed",
            WorkflowStatus::HCiChecking => "h_ci_checking",
            WorkflowStatus::HCiPassed => "h_ci_passed",
            WorkflowStatus::HCiFailed => "h_ci_failed",
            WorkflowStatus::HVerifying => "h_verifying",
            WorkflowStatus::HComplete => "h_complete",
            WorkflowStatus::EAnalyzing => "e_analyzing",
            WorkflowStatus::EAwaitingResearch => "e_awaiting_research",
            WorkflowStatus::EExtracting => "e_extracting",
            WorkflowStatus::ESynthesizing => "e_synthesizing",
            WorkflowStatus::EAuditing => "e_auditing",
            WorkflowStatus::EAwaitingDecisions => "e_awaiting_decisions",
            WorkflowStatus::EPlanningBatches => "e_planning_batches",
            WorkflowStatus::EAwaitingBatchApproval => "e_awaiting_batch_approval",
            WorkflowStatus::EApplying => "e_applying",
            WorkflowStatus::EBatchApplied => "e_batch_applied",
            WorkflowStatus::ETesting => "e_testing",
            WorkflowStatus::EFixingTests => "e_fixing_tests",
            WorkflowStatus::EBatchTested => "e_batch_tested",
            WorkflowStatus::ECiChecking => "e_ci_checking",
            WorkflowStatus::EFixingCi => "e_fixing_ci",
            WorkflowStatus::EBatchCiPassed => "e_batch_ci_passed",
            WorkflowStatus::EVerifying => "e_verifying",
            WorkflowStatus::EBatchComplete => "e_batch_complete",
            WorkflowStatus::ETestsFailed => "e_tests_failed",
            WorkflowStatus::ECiFailed => "e_ci_failed",
            WorkflowStatus::EEnhanceComplete => "e_enhance_complete",
        }
    }

    /// Whether this status represents in-flight asynchronous work.
    pub fn is_active(&self) -> bool {
        ACTIVE_STATUSES.contains(self)
    }

    /// All statuses, in declaration order.
    pub fn all() -> &'static [WorkflowStatus] {
        &[
            WorkflowStatus::Idle,
            WorkflowStatus::Discovering,
            WorkflowStatus::Ready,
            WorkflowStatus::Error,
            WorkflowStatus::HAnalyzing,
            WorkflowStatus::HAwaitingDecisions,
            WorkflowStatus::HSkipped,
            WorkflowStatus::HApplying,
            WorkflowStatus::HHardened,
            WorkflowStatus::HTesting,
            WorkflowStatus::HFixing,
            WorkflowStatus::HTested,
            WorkflowStatus::HTestsFailed,
            WorkflowStatus::HCiChecking,
            WorkflowStatus::HCiPassed,
            WorkflowStatus::HCiFailed,
            WorkflowStatus::HVerifying,
            WorkflowStatus::HComplete,
            WorkflowStatus::EAnalyzing,
            WorkflowStatus::EAwaitingResearch,
            WorkflowStatus::EExtracting,
            WorkflowStatus::ESynthesizing,
            WorkflowStatus::EAuditing,
            WorkflowStatus::EAwaitingDecisions,
            WorkflowStatus::EPlanningBatches,
            WorkflowStatus::EAwaitingBatchApproval,
            WorkflowStatus::EApplying,
            WorkflowStatus::EBatchApplied,
            WorkflowStatus::ETesting,
            WorkflowStatus::EFixingTests,
            WorkflowStatus::EBatchTested,
            WorkflowStatus::ECiChecking,
            WorkflowStatus::EFixingCi,
            WorkflowStatus::EBatchCiPassed,
            WorkflowStatus::EVerifying,
            WorkflowStatus::EBatchComplete,
            WorkflowStatus::ETestsFailed,
            WorkflowStatus::ECiFailed,
            WorkflowStatus::EEnhanceComplete,
        ]
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown workflow status: {s}"))
    }
}

impl Serialize for WorkflowStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for WorkflowStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
