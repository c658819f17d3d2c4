// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt builders
//!
//! Every prompt demands a single JSON object back; write-phase prompts
//! direct the agent at the staging directory instead of letting it touch
//! project files. The texts here are deliberately compact; the agent is
//! expected to read any project file it needs on its own.

use serde_json::Value;
use std::path::Path;

pub fn analysis(relative_path: &Path, source: &str) -> String {
    format!(
        "Analyze {path} for robustness problems: unvalidated input, missing error \
         handling, race conditions, N+1 queries, and injection risks.\n\n\
         Source:\n{source}\n\n\
         Respond with only a JSON object: \
         {{\"findings\": [{{\"id\", \"title\", \"description\", \"severity\", \"recommendation\"}}], \
         \"overall_risk\": \"critical|high|medium|low\"}}",
        path = relative_path.display()
    )
}

pub fn apply(
    relative_path: &Path,
    source: &str,
    analysis: &Value,
    decision: &Value,
    staging_dir: &Path,
) -> String {
    format!(
        "Apply the approved hardening changes to {path}.\n\n\
         Analysis:\n{analysis}\n\nOperator decision:\n{decision}\n\n\
         Current source:\n{source}\n\n\
         Write every changed file under {staging} mirroring the project tree \
         (e.g. {staging}/app/models/...). Do not modify project files directly.\n\
         Respond with only a JSON object: {{\"changes\": [{{\"file\", \"summary\"}}]}}",
        path = relative_path.display(),
        staging = staging_dir.display()
    )
}

pub fn fix_tests(
    relative_path: &Path,
    source: &str,
    test_output: &str,
    analysis: &Value,
    staging_dir: &Path,
) -> String {
    format!(
        "Tests failed after changes to {path}.\n\nTest output:\n{test_output}\n\n\
         Analysis context:\n{analysis}\n\nCurrent source:\n{source}\n\n\
         Write corrected files under {staging} mirroring the project tree.\n\
         Respond with only a JSON object: {{\"changes\": [{{\"file\", \"summary\"}}]}}",
        path = relative_path.display(),
        staging = staging_dir.display()
    )
}

pub fn fix_ci(
    relative_path: &Path,
    source: &str,
    ci_output: &str,
    analysis: &Value,
    staging_dir: &Path,
) -> String {
    format!(
        "Static analysis failed after changes to {path}.\n\nCheck output:\n{ci_output}\n\n\
         Analysis context:\n{analysis}\n\nCurrent source:\n{source}\n\n\
         Write corrected files under {staging} mirroring the project tree.\n\
         Respond with only a JSON object: {{\"changes\": [{{\"file\", \"summary\"}}]}}",
        path = relative_path.display(),
        staging = staging_dir.display()
    )
}

pub fn verify(relative_path: &Path, original: &str, current: &str, analysis: &Value) -> String {
    format!(
        "Verify the changes to {path}. Confirm behavior is preserved and the \
         flagged findings are addressed.\n\n\
         Analysis:\n{analysis}\n\nOriginal source:\n{original}\n\nCurrent source:\n{current}\n\n\
         Respond with only a JSON object: \
         {{\"status\": \"verified|concerns\", \"notes\": [..]}}",
        path = relative_path.display()
    )
}

pub fn enhance_analysis(relative_path: &Path, source: &str) -> String {
    format!(
        "Analyze {path} for enhancement opportunities: missing capabilities, \
         better abstractions, performance wins, and developer-experience gaps.\n\n\
         Source:\n{source}\n\n\
         Respond with only a JSON object: \
         {{\"summary\", \"opportunities\": [..], \"research_topics\": [\"...\"]}}",
        path = relative_path.display()
    )
}

pub fn research_api(topic: &str, relative_path: &Path) -> String {
    format!(
        "Research the following topic in the context of enhancing {path}:\n\n{topic}\n\n\
         Use web search where it helps. Summarize concrete, current guidance \
         with sources as markdown.",
        path = relative_path.display()
    )
}

pub fn extract(relative_path: &Path, analysis: &Value, research: &str) -> String {
    format!(
        "Extract concrete enhancement items for {path} from the analysis and \
         research below.\n\nAnalysis:\n{analysis}\n\nResearch notes:\n{research}\n\n\
         Respond with only a JSON object: \
         {{\"items\": [{{\"id\", \"title\", \"description\", \"source\"}}]}}",
        path = relative_path.display()
    )
}

pub fn synthesize(relative_path: &Path, items: &Value) -> String {
    format!(
        "Synthesize and deduplicate these candidate enhancement items for \
         {path}; merge overlaps, drop non-actionable entries, and order by value.\n\n\
         Items:\n{items}\n\n\
         Respond with only a JSON object: \
         {{\"items\": [{{\"id\", \"title\", \"description\", \"effort\", \"value\"}}]}}",
        path = relative_path.display()
    )
}

pub fn audit(relative_path: &Path, items: &Value, deferred: &Value, rejected: &Value) -> String {
    format!(
        "Audit these enhancement items for {path} against earlier operator \
         decisions. Annotate items that repeat or conflict with a deferred or \
         rejected decision; do not remove any item.\n\n\
         Items:\n{items}\n\nPreviously deferred:\n{deferred}\n\nPreviously rejected:\n{rejected}\n\n\
         Respond with only a JSON object: \
         {{\"annotated_items\": [{{\"id\", \"title\", \"description\", \"annotation\"}}]}}",
        path = relative_path.display()
    )
}

pub fn plan_batches(relative_path: &Path, items: &Value) -> String {
    format!(
        "Group these approved enhancement items for {path} into execution \
         batches. Items touching the same files belong in one batch. For each \
         batch list every file it will write (files only, never directories).\n\n\
         Items:\n{items}\n\n\
         Respond with only a JSON object: \
         {{\"batches\": [{{\"id\", \"items\": [..], \"writeTargets\": [\"path\"], \
         \"estimatedEffort\": \"low|medium|high\"}}]}}",
        path = relative_path.display()
    )
}

pub fn batch_apply(
    relative_path: &Path,
    source: &str,
    items: &Value,
    decision: &Value,
    staging_dir: &Path,
) -> String {
    format!(
        "Implement this enhancement batch for {path}.\n\nBatch items:\n{items}\n\n\
         Operator decisions:\n{decision}\n\nCurrent source:\n{source}\n\n\
         Write every changed file under {staging} mirroring the project tree. \
         Only write files the batch declared as write targets.\n\
         Respond with only a JSON object: {{\"changes\": [{{\"file\", \"summary\"}}]}}",
        path = relative_path.display(),
        staging = staging_dir.display()
    )
}

pub fn question(relative_path: &Path, question: &str, analysis: Option<&Value>) -> String {
    let context = analysis
        .map(|a| format!("\n\nAnalysis context:\n{a}"))
        .unwrap_or_default();
    format!(
        "Answer this question about {path}:{context}\n\n{question}\n\n\
         Respond with only a JSON object: {{\"answer\": \"...\"}}",
        path = relative_path.display()
    )
}

pub fn explain_finding(relative_path: &Path, finding: &Value) -> String {
    format!(
        "Explain this analysis finding for {path} in depth: why it matters, \
         how it could bite, and what a fix looks like.\n\nFinding:\n{finding}\n\n\
         Respond with only a JSON object: {{\"answer\": \"...\"}}",
        path = relative_path.display()
    )
}
