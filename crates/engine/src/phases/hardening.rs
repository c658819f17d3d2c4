// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hardening orchestrator
//!
//! discover → h_analyzing → h_awaiting_decisions → (operator decision)
//! → apply → test → ci → verify → h_complete, chained in one task per
//! target. Retry surfaces re-enter the chain at the failed step.

use crate::engine::PipelineEngine;
use crate::phases::shared::{
    self, ApplyParams, ApplyPromptCtx, CiParams, FixPromptCtx, TestParams, VerifyParams,
    VerifyPromptCtx,
};
use crate::prompts;
use crate::state::Guard;
use serde_json::{json, Value};
use temper_adapters::AgentAdapter;
use temper_core::{
    parse_agent_json, prune_queries, Error, Query, QueryStatus, Workflow, WorkflowStatus,
};
use temper_storage::{read_json, write_json, HardenSidecar};

fn sidecar<A: AgentAdapter>(engine: &PipelineEngine<A>, wf: &Workflow) -> HardenSidecar {
    HardenSidecar::new(
        &wf.source_path,
        &engine.inner.config.harden_sidecar,
        &wf.name,
    )
}

fn analysis_of(wf: &Workflow) -> Value {
    wf.analysis.clone().unwrap_or_else(|| json!({}))
}

fn decision_of(wf: &Workflow) -> Value {
    wf.decision.clone().unwrap_or_else(|| json!({}))
}

fn store_apply(wf: &mut Workflow, value: Value) {
    wf.apply_result = Some(value);
}

fn store_tests(wf: &mut Workflow, value: Value) {
    wf.test_results = Some(value);
}

fn store_ci(wf: &mut Workflow, value: Value) {
    wf.ci_results = Some(value);
}

fn store_verification(wf: &mut Workflow, value: Value) {
    wf.verification = Some(value);
}

/// Dispatch the analysis phase. Accepts a workflow already moved to
/// `h_analyzing` by an explicit `try_transition`, or performs the
/// not-active transition itself.
pub(crate) fn run_analysis<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
) -> Result<(), Error> {
    if engine.workflow_status(name) != Some(WorkflowStatus::HAnalyzing) {
        engine.try_transition(name, Guard::NotActive, WorkflowStatus::HAnalyzing)?;
    }

    let engine_task = engine.clone();
    let name_task = name.to_string();
    engine.spawn_phase(name, async move {
        analysis_task(&engine_task, &name_task).await
    });
    Ok(())
}

async fn analysis_task<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
) -> Result<(), Error> {
    let wf = engine.workflow_snapshot(name)?;
    let source = std::fs::read_to_string(&wf.source_path)?;
    let prompt = prompts::analysis(&wf.relative_path, &source);

    let raw = engine
        .inner
        .agent
        .cli_call(&prompt, &engine.inner.cancel)
        .await?;
    let parsed = parse_agent_json(&raw)?;
    write_json(&sidecar(engine, &wf).analysis(), &parsed)?;

    engine.mutate(|state| {
        if let Some(wf) = state.workflows.get_mut(name) {
            wf.analysis = Some(parsed.clone());
            wf.record_prompt("analysis_prompt", &prompt);
            wf.status = WorkflowStatus::HAwaitingDecisions;
        }
    });
    Ok(())
}

/// Load a previous analysis from the sidecar without invoking the agent.
pub(crate) fn load_existing_analysis<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
) -> Result<(), Error> {
    let source_path = engine
        .targets()
        .into_iter()
        .find(|t| t.name == name)
        .map(|t| t.source_path)
        .ok_or_else(|| Error::NotFound(format!("target {name}")))?;

    let sidecar = HardenSidecar::new(&source_path, &engine.inner.config.harden_sidecar, name);
    let analysis = read_json(&sidecar.analysis())
        .ok_or_else(|| Error::NotFound(format!("no analysis sidecar for {name}")))?;

    engine.guarded_update(
        name,
        Guard::NotActive,
        WorkflowStatus::HAwaitingDecisions,
        |wf| {
            wf.analysis = Some(analysis);
        },
    )
}

/// Record the operator decision and launch the apply→test→ci→verify
/// chain.
pub(crate) fn submit_decision<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
    decision: Value,
) -> Result<(), Error> {
    engine.guarded_update(
        name,
        Guard::Status(WorkflowStatus::HAwaitingDecisions),
        WorkflowStatus::HApplying,
        |wf| {
            wf.decision = Some(decision);
        },
    )?;

    spawn_chain(engine, name, ChainStart::Apply);
    Ok(())
}

/// Retry surface: `h_tests_failed → h_hardened`, then re-run from test.
pub(crate) fn run_testing<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
) -> Result<(), Error> {
    match engine.workflow_status(name) {
        Some(WorkflowStatus::HTestsFailed) => engine.try_transition(
            name,
            Guard::Status(WorkflowStatus::HTestsFailed),
            WorkflowStatus::HHardened,
        )?,
        Some(WorkflowStatus::HHardened) => {}
        Some(other) => {
            return Err(Error::StateGuard(format!(
                "{name} is {other}, expected h_hardened or h_tests_failed"
            )))
        }
        None => return Err(Error::NotFound(format!("workflow {name}"))),
    }

    spawn_chain(engine, name, ChainStart::Test);
    Ok(())
}

/// Retry surface: `h_ci_failed → h_tested`, then re-run from ci.
pub(crate) fn run_ci_checks<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
) -> Result<(), Error> {
    match engine.workflow_status(name) {
        Some(WorkflowStatus::HCiFailed) => engine.try_transition(
            name,
            Guard::Status(WorkflowStatus::HCiFailed),
            WorkflowStatus::HTested,
        )?,
        Some(WorkflowStatus::HTested) => {}
        Some(other) => {
            return Err(Error::StateGuard(format!(
                "{name} is {other}, expected h_tested or h_ci_failed"
            )))
        }
        None => return Err(Error::NotFound(format!("workflow {name}"))),
    }

    spawn_chain(engine, name, ChainStart::Ci);
    Ok(())
}

pub(crate) fn run_verification<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
) -> Result<(), Error> {
    match engine.workflow_status(name) {
        Some(WorkflowStatus::HCiPassed) => {}
        Some(other) => {
            return Err(Error::StateGuard(format!(
                "{name} is {other}, expected h_ci_passed"
            )))
        }
        None => return Err(Error::NotFound(format!("workflow {name}"))),
    }

    spawn_chain(engine, name, ChainStart::Verify);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ChainStart {
    Apply,
    Test,
    Ci,
    Verify,
}

fn spawn_chain<A: AgentAdapter>(engine: &PipelineEngine<A>, name: &str, start: ChainStart) {
    let engine_task = engine.clone();
    let name_task = name.to_string();
    engine.spawn_phase(name, async move {
        hardening_chain(&engine_task, &name_task, start).await
    });
}

/// The sequential hardening chain; each step only runs if the previous
/// one advanced the status.
async fn hardening_chain<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
    start: ChainStart,
) -> Result<(), Error> {
    let wf = engine.workflow_snapshot(name)?;
    let sidecar = sidecar(engine, &wf);
    let allowlist = engine.inner.config.harden_allowlist.clone();

    if start == ChainStart::Apply {
        shared::shared_apply(
            engine,
            name,
            ApplyParams {
                applying: WorkflowStatus::HApplying,
                applied: WorkflowStatus::HHardened,
                skipped: Some(WorkflowStatus::HSkipped),
                sidecar_dir: sidecar.dir().to_path_buf(),
                sidecar_file: sidecar.hardened(),
                staging_dir: sidecar.staging(),
                prompt_key: "apply_prompt",
                allowlist: allowlist.clone(),
                grant_id: None,
                analysis_of,
                decision_of,
                store_result: store_apply,
                build_prompt: Box::new(|ctx: ApplyPromptCtx<'_>| {
                    prompts::apply(
                        ctx.relative_path,
                        ctx.source,
                        ctx.analysis,
                        ctx.decision,
                        ctx.staging_dir,
                    )
                }),
            },
        )
        .await?;
        if engine.workflow_status(name) != Some(WorkflowStatus::HHardened) {
            return Ok(());
        }
    }

    if matches!(start, ChainStart::Apply | ChainStart::Test) {
        shared::shared_test(
            engine,
            name,
            TestParams {
                guard: WorkflowStatus::HHardened,
                testing: WorkflowStatus::HTesting,
                fixing: WorkflowStatus::HFixing,
                tested: WorkflowStatus::HTested,
                failed: WorkflowStatus::HTestsFailed,
                results_file: sidecar.test_results(),
                staging_dir: sidecar.staging(),
                prompt_key: "test_fix_prompt",
                allowlist: allowlist.clone(),
                grant_id: None,
                analysis_of,
                store_results: store_tests,
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
        if engine.workflow_status(name) != Some(WorkflowStatus::HTested) {
            return Ok(());
        }
    }

    if matches!(start, ChainStart::Apply | ChainStart::Test | ChainStart::Ci) {
        shared::shared_ci_check(
            engine,
            name,
            CiParams {
                guard: WorkflowStatus::HTested,
                checking: WorkflowStatus::HCiChecking,
                fixing: WorkflowStatus::HFixing,
                passed: WorkflowStatus::HCiPassed,
                failed: WorkflowStatus::HCiFailed,
                results_file: sidecar.ci_results(),
                staging_dir: sidecar.staging(),
                prompt_key: "ci_fix_prompt",
                allowlist: allowlist.clone(),
                grant_id: None,
                analysis_of,
                store_results: store_ci,
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
        if engine.workflow_status(name) != Some(WorkflowStatus::HCiPassed) {
            return Ok(());
        }
    }

    shared::shared_verify(
        engine,
        name,
        VerifyParams {
            guard: WorkflowStatus::HCiPassed,
            verifying: WorkflowStatus::HVerifying,
            verified: WorkflowStatus::HComplete,
            results_file: sidecar.verification(),
            prompt_key: "verify_prompt",
            analysis_of,
            store_result: store_verification,
            build_prompt: Box::new(|ctx: VerifyPromptCtx<'_>| {
                prompts::verify(ctx.relative_path, ctx.original, ctx.current, ctx.analysis)
            }),
        },
    )
    .await
}

// ---- queries -------------------------------------------------------------

/// Ask an ad-hoc question about a target; returns the query id.
pub(crate) fn ask_question<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
    question: &str,
) -> Result<String, Error> {
    let wf = engine.workflow_snapshot(name)?;
    let prompt = prompts::question(&wf.relative_path, question, wf.analysis.as_ref());
    launch_query(engine, name, "question", question, None, prompt)
}

/// Ask the agent to explain one analysis finding; returns the query id.
pub(crate) fn explain_finding<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
    finding_id: &str,
) -> Result<String, Error> {
    let wf = engine.workflow_snapshot(name)?;
    let finding = wf
        .analysis
        .as_ref()
        .and_then(|a| a.get("findings"))
        .and_then(Value::as_array)
        .and_then(|findings| {
            findings
                .iter()
                .find(|f| f.get("id").and_then(Value::as_str) == Some(finding_id))
        })
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("finding {finding_id} on {name}")))?;

    let prompt = prompts::explain_finding(&wf.relative_path, &finding);
    launch_query(
        engine,
        name,
        "explain_finding",
        &format!("explain finding {finding_id}"),
        Some(finding_id.to_string()),
        prompt,
    )
}

fn launch_query<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
    query_type: &str,
    question: &str,
    finding_id: Option<String>,
    prompt: String,
) -> Result<String, Error> {
    let query = Query::new(
        name,
        query_type,
        question,
        finding_id,
        engine.inner.clock.now(),
    );
    let query_id = query.id.clone();
    engine.mutate(|state| {
        state.queries.push(query);
        prune_queries(&mut state.queries);
    });

    let engine_task = engine.clone();
    let task_query_id = query_id.clone();
    engine.spawn_detached(async move {
        let outcome = engine_task
            .inner
            .agent
            .cli_call(&prompt, &engine_task.inner.cancel)
            .await
            .map_err(Error::from)
            .and_then(|raw| parse_agent_json(&raw));

        engine_task.mutate(|state| {
            let Some(query) = state.queries.iter_mut().find(|q| q.id == task_query_id) else {
                return;
            };
            match &outcome {
                Ok(parsed) => {
                    query.result = Some(
                        parsed
                            .get("answer")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| parsed.to_string()),
                    );
                    query.status = QueryStatus::Complete;
                }
                Err(err) => {
                    query.error = Some(err.to_string());
                    query.status = QueryStatus::Error;
                }
            }
        });
    });

    Ok(query_id)
}

#[cfg(test)]
#[path = "hardening_tests.rs"]
mod tests;
