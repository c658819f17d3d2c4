// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Enhance orchestrator
//!
//! Per target: analysis with research topics, per-topic research (web
//! search or operator paste), an extract→synthesize→audit chain, operator
//! decisions, batch planning, and sequential batch execution where each
//! batch holds one lock grant end-to-end. Batches of different targets
//! run concurrently when their write sets are disjoint.

use crate::engine::PipelineEngine;
use crate::phases::shared::{
    self, ApplyParams, ApplyPromptCtx, CiParams, FixPromptCtx, TestParams, VerifyParams,
    VerifyPromptCtx,
};
use crate::prompts;
use crate::state::Guard;
use serde_json::{json, Value};
use std::path::PathBuf;
use temper_adapters::{AgentAdapter, AgentError};
use temper_core::{
    parse_agent_json, research_complete, research_slug, Batch, Error, LockGrant, ResearchTopic,
    TopicStatus, WorkItem, Workflow, WorkflowStatus,
};
use temper_storage::{
    merge_decision_records, read_json, resolve_project_path, write_json, write_text,
    BatchSidecar, EnhanceSidecar,
};

fn sidecar<A: AgentAdapter>(engine: &PipelineEngine<A>, wf: &Workflow) -> EnhanceSidecar {
    EnhanceSidecar::new(
        &wf.source_path,
        &engine.inner.config.enhance_sidecar,
        &wf.name,
    )
}

fn e_analysis_of(wf: &Workflow) -> Value {
    wf.e_analysis.clone().unwrap_or_else(|| json!({}))
}

fn e_decisions_of(wf: &Workflow) -> Value {
    wf.e_decisions.clone().unwrap_or_else(|| json!({}))
}

fn mark_batch(wf: &mut Workflow, label: &str) {
    if let Some(id) = wf.current_batch_id.clone() {
        wf.e_batch_state.insert(id, Value::String(label.to_string()));
    }
}

fn store_batch_apply(wf: &mut Workflow, _value: Value) {
    mark_batch(wf, "applied");
}

fn store_batch_tests(wf: &mut Workflow, value: Value) {
    let passed = value.get("passed").and_then(Value::as_bool).unwrap_or(false);
    mark_batch(wf, if passed { "tested" } else { "tests_failed" });
}

fn store_batch_ci(wf: &mut Workflow, value: Value) {
    let passed = value.get("passed").and_then(Value::as_bool).unwrap_or(false);
    mark_batch(wf, if passed { "ci_passed" } else { "ci_failed" });
}

fn store_batch_verification(wf: &mut Workflow, _value: Value) {
    mark_batch(wf, "verified");
}

// ---- E0: analysis --------------------------------------------------------

/// Start the enhance analysis. Entered from a completed hardening or
/// enhance pipeline, or as the retry from `error`.
pub(crate) fn run_enhance_analysis<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
) -> Result<(), Error> {
    engine.try_transition(
        name,
        Guard::AnyOf(vec![
            WorkflowStatus::HComplete,
            WorkflowStatus::EEnhanceComplete,
            WorkflowStatus::Error,
        ]),
        WorkflowStatus::EAnalyzing,
    )?;

    let engine_task = engine.clone();
    let name_task = name.to_string();
    engine.spawn_phase(name, async move {
        enhance_analysis_task(&engine_task, &name_task).await
    });
    Ok(())
}

async fn enhance_analysis_task<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
) -> Result<(), Error> {
    let wf = engine.workflow_snapshot(name)?;
    let source = std::fs::read_to_string(&wf.source_path)?;
    let prompt = prompts::enhance_analysis(&wf.relative_path, &source);

    let raw = engine
        .inner
        .agent
        .cli_call(&prompt, &engine.inner.cancel)
        .await?;
    let parsed = parse_agent_json(&raw)?;
    write_json(&sidecar(engine, &wf).analysis(), &parsed)?;

    let topics: Vec<ResearchTopic> = parsed
        .get("research_topics")
        .and_then(Value::as_array)
        .map(|prompts| {
            prompts
                .iter()
                .filter_map(Value::as_str)
                .map(ResearchTopic::new)
                .collect()
        })
        .unwrap_or_default();
    let no_topics = topics.is_empty();

    engine.mutate(|state| {
        if let Some(wf) = state.workflows.get_mut(name) {
            wf.e_analysis = Some(parsed.clone());
            wf.research_topics = topics;
            wf.record_prompt("enhance_analysis_prompt", &prompt);
            wf.status = if no_topics {
                WorkflowStatus::EExtracting
            } else {
                WorkflowStatus::EAwaitingResearch
            };
        }
    });

    if no_topics {
        enqueue_extract_chain(engine, name);
    }
    Ok(())
}

// ---- E1: research --------------------------------------------------------

/// Record an operator-pasted research result for one topic.
pub(crate) fn submit_research<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
    topic: usize,
    result: &str,
) -> Result<(), Error> {
    let prompt = update_topic(engine, name, topic, |t| {
        t.status = TopicStatus::Completed;
        t.result = Some(result.to_string());
    })?;

    persist_research(engine, name, Some((&prompt, result)))?;
    maybe_complete_research(engine, name);
    Ok(())
}

/// Resolve one topic through the web-search API in a background task.
///
/// A failed call reverts the topic to pending and logs to the engine
/// error list; the workflow status is never touched.
pub(crate) fn submit_research_api<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
    topic: usize,
) -> Result<(), Error> {
    if !engine.inner.agent.api_available() {
        return Err(AgentError::NoApiKey.into());
    }

    let prompt = update_topic(engine, name, topic, |t| {
        t.status = TopicStatus::Researching;
    })?;
    persist_research(engine, name, None)?;

    let wf = engine.workflow_snapshot(name)?;
    let api_prompt = prompts::research_api(&prompt, &wf.relative_path);
    let model = engine.inner.config.api_model.clone();
    let engine_task = engine.clone();
    let name_task = name.to_string();

    engine.spawn_detached(async move {
        let outcome = engine_task
            .inner
            .agent
            .api_call(&api_prompt, &model, &engine_task.inner.cancel)
            .await;

        match outcome {
            Ok(text) => {
                let updated = update_topic(&engine_task, &name_task, topic, |t| {
                    t.status = TopicStatus::Completed;
                    t.result = Some(text.clone());
                });
                if let Ok(prompt) = updated {
                    let _ = persist_research(&engine_task, &name_task, Some((&prompt, &text)));
                    maybe_complete_research(&engine_task, &name_task);
                }
            }
            Err(err) => {
                tracing::warn!(workflow = %name_task, topic, error = %err, "research api call failed");
                let _ = update_topic(&engine_task, &name_task, topic, |t| {
                    t.status = TopicStatus::Pending;
                    t.result = None;
                });
                let _ = persist_research(&engine_task, &name_task, None);
                engine_task.record_error(Some(&name_task), &format!("research failed: {err}"));
            }
        }
    });
    Ok(())
}

/// Drop a topic from the research requirement.
pub(crate) fn reject_research_topic<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
    topic: usize,
) -> Result<(), Error> {
    update_topic(engine, name, topic, |t| {
        t.status = TopicStatus::Rejected;
    })?;
    persist_research(engine, name, None)?;
    maybe_complete_research(engine, name);
    Ok(())
}

/// Apply `f` to one topic under the mutex; returns the topic prompt.
fn update_topic<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
    topic: usize,
    f: impl FnOnce(&mut ResearchTopic),
) -> Result<String, Error> {
    engine.mutate(|state| {
        let wf = state
            .workflows
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("workflow {name}")))?;
        if wf.status != WorkflowStatus::EAwaitingResearch {
            return Err(Error::StateGuard(format!(
                "{name} is {}, expected e_awaiting_research",
                wf.status
            )));
        }
        let entry = wf
            .research_topics
            .get_mut(topic)
            .ok_or_else(|| Error::NotFound(format!("research topic {topic} on {name}")))?;
        f(entry);
        Ok(entry.prompt.clone())
    })
}

/// Write `research_status.json` (and optionally one topic's markdown).
fn persist_research<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
    note: Option<(&str, &str)>,
) -> Result<(), Error> {
    let wf = engine.workflow_snapshot(name)?;
    let sidecar = sidecar(engine, &wf);
    write_json(
        &sidecar.research_status(),
        &json!({"topics": wf.research_topics}),
    )?;
    if let Some((prompt, result)) = note {
        let slug = research_slug(prompt);
        write_text(
            &sidecar.research_note(&slug),
            &format!("# {prompt}\n\n{result}\n"),
        )?;
    }
    Ok(())
}

/// When every non-rejected topic is completed, move on to extraction.
fn maybe_complete_research<A: AgentAdapter>(engine: &PipelineEngine<A>, name: &str) {
    let advanced = engine.mutate(|state| {
        let Some(wf) = state.workflows.get_mut(name) else {
            return false;
        };
        if wf.status == WorkflowStatus::EAwaitingResearch
            && research_complete(&wf.research_topics)
        {
            wf.status = WorkflowStatus::EExtracting;
            return true;
        }
        false
    });

    if advanced {
        tracing::info!(workflow = name, "research complete, queueing extraction");
        enqueue_extract_chain(engine, name);
    }
}

// ---- E2-E4: extract / synthesize / audit ---------------------------------

/// Queue the extraction chain through the scheduler (lock-free work, but
/// subject to CLI slot availability).
pub(crate) fn enqueue_extract_chain<A: AgentAdapter>(engine: &PipelineEngine<A>, name: &str) {
    let item = WorkItem::new(name, "e_extracting", Vec::new(), engine.inner.clock.now());
    let engine_task = engine.clone();
    let name_task = name.to_string();
    engine.inner.scheduler.enqueue(
        item,
        Box::new(move |_grant| {
            Box::pin(async move {
                if let Err(err) = extract_chain(&engine_task, &name_task).await {
                    engine_task.fail_workflow(&name_task, &err);
                }
            })
        }),
    );
}

/// The synchronous E2→E3→E4 chain. The three work functions are pure
/// agent calls; this entry point owns every status transition.
async fn extract_chain<A: AgentAdapter>(engine: &PipelineEngine<A>, name: &str) -> Result<(), Error> {
    if engine.workflow_status(name) != Some(WorkflowStatus::EExtracting) {
        return Ok(());
    }
    let wf = engine.workflow_snapshot(name)?;
    let sidecar = sidecar(engine, &wf);

    // E2: extract
    let extracted = extract_work(engine, &wf, &sidecar).await?;
    engine.mutate(|state| {
        if let Some(wf) = state.workflows.get_mut(name) {
            wf.possible_items = Some(extracted.clone());
            wf.status = WorkflowStatus::ESynthesizing;
        }
    });

    // E3: synthesize
    let synthesized = synthesize_work(engine, &wf, &sidecar, &extracted).await?;
    engine.mutate(|state| {
        if let Some(wf) = state.workflows.get_mut(name) {
            wf.ready_items = Some(synthesized.clone());
            wf.status = WorkflowStatus::EAuditing;
        }
    });

    // E4: audit (annotates, never filters)
    let audited = audit_work(engine, &wf, &sidecar, &synthesized).await?;
    engine.mutate(|state| {
        if let Some(wf) = state.workflows.get_mut(name) {
            wf.audit_result = Some(audited.clone());
            wf.status = WorkflowStatus::EAwaitingDecisions;
        }
    });
    Ok(())
}

async fn extract_work<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    wf: &Workflow,
    sidecar: &EnhanceSidecar,
) -> Result<Value, Error> {
    let research = wf
        .research_topics
        .iter()
        .filter(|t| t.status == TopicStatus::Completed)
        .filter_map(|t| t.result.as_ref().map(|r| format!("## {}\n\n{r}", t.prompt)))
        .collect::<Vec<_>>()
        .join("\n\n");

    let prompt = prompts::extract(&wf.relative_path, &e_analysis_of(wf), &research);
    let raw = engine
        .inner
        .agent
        .cli_call(&prompt, &engine.inner.cancel)
        .await?;
    let parsed = parse_agent_json(&raw)?;
    write_json(&sidecar.extract(), &parsed)?;
    record_prompt(engine, &wf.name, "extract_prompt", &prompt);
    Ok(parsed)
}

async fn synthesize_work<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    wf: &Workflow,
    sidecar: &EnhanceSidecar,
    extracted: &Value,
) -> Result<Value, Error> {
    let prompt = prompts::synthesize(&wf.relative_path, extracted);
    let raw = engine
        .inner
        .agent
        .cli_call(&prompt, &engine.inner.cancel)
        .await?;
    let parsed = parse_agent_json(&raw)?;
    write_json(&sidecar.synthesize(), &parsed)?;
    record_prompt(engine, &wf.name, "synthesize_prompt", &prompt);
    Ok(parsed)
}

async fn audit_work<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    wf: &Workflow,
    sidecar: &EnhanceSidecar,
    items: &Value,
) -> Result<Value, Error> {
    let deferred = read_json(&sidecar.deferred()).unwrap_or_else(|| json!([]));
    let rejected = read_json(&sidecar.rejected()).unwrap_or_else(|| json!([]));

    let prompt = prompts::audit(&wf.relative_path, items, &deferred, &rejected);
    let raw = engine
        .inner
        .agent
        .cli_call(&prompt, &engine.inner.cancel)
        .await?;
    let parsed = parse_agent_json(&raw)?;
    write_json(&sidecar.audit(), &parsed)?;
    record_prompt(engine, &wf.name, "audit_prompt", &prompt);
    Ok(parsed)
}

fn record_prompt<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
    key: &'static str,
    prompt: &str,
) {
    engine.mutate(|state| {
        if let Some(wf) = state.workflows.get_mut(name) {
            wf.record_prompt(key, prompt);
        }
    });
}

// ---- E5: decisions -------------------------------------------------------

/// Persist operator decisions. Batch planning is a separate operation
/// (`run_batch_planning`), invoked explicitly once the decisions are in.
pub(crate) fn submit_enhance_decisions<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
    decisions: Value,
) -> Result<(), Error> {
    engine.guarded_update(
        name,
        Guard::Status(WorkflowStatus::EAwaitingDecisions),
        WorkflowStatus::EAwaitingDecisions,
        |wf| {
            wf.e_decisions = Some(decisions.clone());
        },
    )?;

    let wf = engine.workflow_snapshot(name)?;
    let sidecar = sidecar(engine, &wf);
    write_json(&sidecar.decisions(), &decisions)?;
    persist_decision_records(engine, &sidecar, &decisions)?;
    Ok(())
}

/// Split deferred/rejected records out of the decision set and merge
/// them into the per-target decision sidecars by id.
fn persist_decision_records<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    sidecar: &EnhanceSidecar,
    decisions: &Value,
) -> Result<(), Error> {
    let Some(items) = decisions.get("items").and_then(Value::as_array) else {
        return Ok(());
    };
    let timestamp = engine.inner.clock.now().to_rfc3339();

    let stamp = |item: &Value| {
        let mut record = item.clone();
        if let Some(map) = record.as_object_mut() {
            map.insert("timestamp".to_string(), Value::String(timestamp.clone()));
        }
        record
    };

    let deferred: Vec<Value> = items
        .iter()
        .filter(|i| matches!(decision_of_item(i), Some("defer" | "deferred")))
        .map(stamp)
        .collect();
    let rejected: Vec<Value> = items
        .iter()
        .filter(|i| matches!(decision_of_item(i), Some("reject" | "rejected")))
        .map(stamp)
        .collect();

    if !deferred.is_empty() {
        merge_decision_records(&sidecar.deferred(), &deferred)?;
    }
    if !rejected.is_empty() {
        merge_decision_records(&sidecar.rejected(), &rejected)?;
    }
    Ok(())
}

fn decision_of_item(item: &Value) -> Option<&str> {
    item.get("decision").and_then(Value::as_str)
}

fn approved_items(decisions: &Value, fallback: &Value) -> Value {
    let approved: Vec<Value> = decisions
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|i| {
                    matches!(
                        decision_of_item(i),
                        Some("approve" | "approved" | "accept" | "accepted")
                    )
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    if approved.is_empty() {
        fallback.clone()
    } else {
        Value::Array(approved)
    }
}

// ---- E6: batch planning --------------------------------------------------

/// Claim the planning status and dispatch the planning task. The
/// transition is the atomic gate: a second call while planning is in
/// flight fails the guard.
pub(crate) fn run_batch_planning<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
) -> Result<(), Error> {
    engine.try_transition(
        name,
        Guard::Status(WorkflowStatus::EAwaitingDecisions),
        WorkflowStatus::EPlanningBatches,
    )?;
    spawn_planning(engine, name);
    Ok(())
}

/// Unbounded replan: back from approval into planning.
pub(crate) fn replan_batches<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
) -> Result<(), Error> {
    engine.try_transition(
        name,
        Guard::Status(WorkflowStatus::EAwaitingBatchApproval),
        WorkflowStatus::EPlanningBatches,
    )?;
    spawn_planning(engine, name);
    Ok(())
}

fn spawn_planning<A: AgentAdapter>(engine: &PipelineEngine<A>, name: &str) {
    let engine_task = engine.clone();
    let name_task = name.to_string();
    engine.spawn_phase(name, async move {
        planning_task(&engine_task, &name_task).await
    });
}

async fn planning_task<A: AgentAdapter>(engine: &PipelineEngine<A>, name: &str) -> Result<(), Error> {
    if engine.workflow_status(name) != Some(WorkflowStatus::EPlanningBatches) {
        return Ok(());
    }
    let wf = engine.workflow_snapshot(name)?;
    let sidecar = sidecar(engine, &wf);
    let items = approved_items(
        &e_decisions_of(&wf),
        &wf.ready_items.clone().unwrap_or_else(|| json!([])),
    );

    let prompt = prompts::plan_batches(&wf.relative_path, &items);
    let raw = engine
        .inner
        .agent
        .cli_call(&prompt, &engine.inner.cancel)
        .await?;
    let parsed = parse_agent_json(&raw)?;
    let batches = Batch::list_from_plan(&parsed).map_err(Error::Parse)?;
    write_json(&sidecar.batches(), &parsed)?;

    engine.mutate(|state| {
        if let Some(wf) = state.workflows.get_mut(name) {
            wf.batches = batches;
            wf.record_prompt("plan_batches_prompt", &prompt);
            wf.status = WorkflowStatus::EAwaitingBatchApproval;
        }
    });
    Ok(())
}

// ---- E7-E10: batch execution ---------------------------------------------

/// Queue batch execution. The work item carries the first pending
/// batch's write targets so the scheduler only dispatches when those
/// locks are free; later batches acquire their own grants in-task.
pub(crate) fn run_batch_execution<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
) -> Result<(), Error> {
    match engine.workflow_status(name) {
        Some(s @ (WorkflowStatus::ETestsFailed | WorkflowStatus::ECiFailed)) => {
            engine.try_transition(
                name,
                Guard::Status(s),
                WorkflowStatus::EAwaitingBatchApproval,
            )?;
        }
        Some(
            WorkflowStatus::EAwaitingBatchApproval
            | WorkflowStatus::EBatchApplied
            | WorkflowStatus::EBatchTested
            | WorkflowStatus::EBatchCiPassed,
        ) => {}
        Some(other) => {
            return Err(Error::StateGuard(format!(
                "{name} is {other}, expected e_awaiting_batch_approval"
            )))
        }
        None => return Err(Error::NotFound(format!("workflow {name}"))),
    }

    let wf = engine.workflow_snapshot(name)?;
    if wf.batches.is_empty() {
        return Err(Error::StateGuard(format!("{name} has no planned batches")));
    }

    let first_pending = wf
        .batches
        .iter()
        .find(|b| batch_label(&wf, &b.id) != Some("verified".to_string()));
    let lock_request: Vec<PathBuf> = first_pending
        .map(|b| {
            b.write_targets
                .iter()
                .map(|t| resolve_project_path(&engine.inner.config.project_root, t))
                .collect()
        })
        .unwrap_or_default();

    let item = WorkItem::new(name, "e_applying", lock_request, engine.inner.clock.now());
    let engine_task = engine.clone();
    let name_task = name.to_string();
    engine.inner.scheduler.enqueue(
        item,
        Box::new(move |grant| {
            Box::pin(async move {
                if let Err(err) = batch_execution_task(&engine_task, &name_task, grant).await {
                    engine_task.fail_workflow(&name_task, &err);
                }
            })
        }),
    );
    Ok(())
}

fn batch_label(wf: &Workflow, batch_id: &str) -> Option<String> {
    wf.e_batch_state
        .get(batch_id)
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum BatchStep {
    Apply,
    Test,
    Ci,
    Verify,
}

/// Iterate batches in order, skipping verified ones, one grant per
/// batch held across its apply→test→ci→verify chain.
async fn batch_execution_task<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
    mut provided: Option<LockGrant>,
) -> Result<(), Error> {
    let wf = engine.workflow_snapshot(name)?;
    let sidecar = sidecar(engine, &wf);
    let batches = wf.batches.clone();
    let total = batches.len();

    for batch in &batches {
        let current = engine.workflow_snapshot(name)?;
        let label = batch_label(&current, &batch.id);
        if label.as_deref() == Some("verified") {
            continue;
        }

        let start = match label.as_deref() {
            Some("applied") => BatchStep::Test,
            Some("tested") => BatchStep::Ci,
            Some("ci_passed") => BatchStep::Verify,
            Some("tests_failed") => BatchStep::Test,
            Some("ci_failed") => BatchStep::Ci,
            _ => BatchStep::Apply,
        };

        // Move the workflow onto this batch and to the resting status the
        // first step's guard expects.
        let entry_status = match start {
            BatchStep::Apply => None,
            BatchStep::Test => Some(WorkflowStatus::EBatchApplied),
            BatchStep::Ci => Some(WorkflowStatus::EBatchTested),
            BatchStep::Verify => Some(WorkflowStatus::EBatchCiPassed),
        };
        engine.mutate(|state| {
            if let Some(wf) = state.workflows.get_mut(name) {
                wf.current_batch_id = Some(batch.id.clone());
                if let Some(status) = entry_status {
                    wf.status = status;
                }
            }
        });

        let write_paths: Vec<PathBuf> = batch
            .write_targets
            .iter()
            .map(|t| resolve_project_path(&engine.inner.config.project_root, t))
            .collect();

        // Reuse the scheduler's grant when it covers this batch, else
        // acquire a fresh one.
        let grant = match provided.take() {
            Some(grant) if write_paths.iter().all(|p| grant.covers(p)) => grant,
            other => {
                if let Some(stale) = other {
                    engine.inner.locks.release(&stale.id);
                }
                engine
                    .inner
                    .locks
                    .acquire(
                        &format!("{name}/{}", batch.id),
                        &write_paths,
                        engine.inner.config.lock_timeout,
                    )
                    .await?
            }
        };

        let batch_dir = sidecar.batch(&batch.id);
        let result = run_single_batch(engine, name, batch, &batch_dir, &grant.id, start).await;
        engine.inner.locks.release(&grant.id);
        result?;

        if engine.workflow_status(name) != Some(WorkflowStatus::EBatchComplete) {
            // Fix loops exhausted or an operator retry point; stop here.
            return Ok(());
        }
    }

    // Last batch complete: the enhance pipeline is done.
    tracing::info!(workflow = name, batches = total, "all batches complete");
    let now = engine.inner.clock.now();
    let _ = engine.guarded_update(
        name,
        Guard::Status(WorkflowStatus::EBatchComplete),
        WorkflowStatus::EEnhanceComplete,
        |wf| {
            wf.completed_at = Some(now);
        },
    );
    Ok(())
}

/// One batch's apply→test→ci→verify chain under a single grant, renewed
/// between phases.
async fn run_single_batch<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
    batch: &Batch,
    batch_dir: &BatchSidecar,
    grant_id: &str,
    start: BatchStep,
) -> Result<(), Error> {
    let allowlist = engine.inner.config.enhance_allowlist.clone();
    let items = Value::Array(batch.items.clone());

    if start <= BatchStep::Apply {
        shared::shared_apply(
            engine,
            name,
            ApplyParams {
                applying: WorkflowStatus::EApplying,
                applied: WorkflowStatus::EBatchApplied,
                skipped: None,
                sidecar_dir: batch_dir.dir().to_path_buf(),
                sidecar_file: batch_dir.apply(),
                staging_dir: batch_dir.staging(),
                prompt_key: "batch_apply_prompt",
                allowlist: allowlist.clone(),
                grant_id: Some(grant_id.to_string()),
                analysis_of: e_analysis_of,
                decision_of: e_decisions_of,
                store_result: store_batch_apply,
                build_prompt: Box::new(move |ctx: ApplyPromptCtx<'_>| {
                    prompts::batch_apply(
                        ctx.relative_path,
                        ctx.source,
                        &items,
                        ctx.decision,
                        ctx.staging_dir,
                    )
                }),
            },
        )
        .await?;
        engine.inner.locks.renew(grant_id);
        if engine.workflow_status(name) != Some(WorkflowStatus::EBatchApplied) {
            return Ok(());
        }
    }

    if start <= BatchStep::Test {
        shared::shared_test(
            engine,
            name,
            TestParams {
                guard: WorkflowStatus::EBatchApplied,
                testing: WorkflowStatus::ETesting,
                fixing: WorkflowStatus::EFixingTests,
                tested: WorkflowStatus::EBatchTested,
                failed: WorkflowStatus::ETestsFailed,
                results_file: batch_dir.test_results(),
                staging_dir: batch_dir.staging(),
                prompt_key: "batch_test_fix_prompt",
                allowlist: allowlist.clone(),
                grant_id: Some(grant_id.to_string()),
                analysis_of: e_analysis_of,
                store_results: store_batch_tests,
                build_fix_prompt: Box::new(|ctx: FixPromptCtx<'_>| {
                    prompts::fix_tests(
                        ctx.relative_path,
                        ctx.source,
                        ctx.output,
                        ctx.analysis,
                        ctx.staging_dir,
                    )
                }),
            },
        )
        .await?;
        engine.inner.locks.renew(grant_id);
        if engine.workflow_status(name) != Some(WorkflowStatus::EBatchTested) {
            return Ok(());
        }
    }

    if start <= BatchStep::Ci {
        shared::shared_ci_check(
            engine,
            name,
            CiParams {
                guard: WorkflowStatus::EBatchTested,
                checking: WorkflowStatus::ECiChecking,
                fixing: WorkflowStatus::EFixingCi,
                passed: WorkflowStatus::EBatchCiPassed,
                failed: WorkflowStatus::ECiFailed,
                results_file: batch_dir.ci_results(),
                staging_dir: batch_dir.staging(),
                prompt_key: "batch_ci_fix_prompt",
                allowlist: allowlist.clone(),
                grant_id: Some(grant_id.to_string()),
                analysis_of: e_analysis_of,
                store_results: store_batch_ci,
                build_fix_prompt: Box::new(|ctx: FixPromptCtx<'_>| {
                    prompts::fix_ci(
                        ctx.relative_path,
                        ctx.source,
                        ctx.output,
                        ctx.analysis,
                        ctx.staging_dir,
                    )
                }),
            },
        )
        .await?;
        engine.inner.locks.renew(grant_id);
        if engine.workflow_status(name) != Some(WorkflowStatus::EBatchCiPassed) {
            return Ok(());
        }
    }

    shared::shared_verify(
        engine,
        name,
        VerifyParams {
            guard: WorkflowStatus::EBatchCiPassed,
            verifying: WorkflowStatus::EVerifying,
            verified: WorkflowStatus::EBatchComplete,
            results_file: batch_dir.verification(),
            prompt_key: "batch_verify_prompt",
            analysis_of: e_analysis_of,
            store_result: store_batch_verification,
            build_prompt: Box::new(|ctx: VerifyPromptCtx<'_>| {
                prompts::verify(ctx.relative_path, ctx.original, ctx.current, ctx.analysis)
            }),
        },
    )
    .await
}

#[cfg(test)]
#[path = "enhance_tests.rs"]
mod tests;
