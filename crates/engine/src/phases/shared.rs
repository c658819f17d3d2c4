// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared phase cores
//!
//! Four operations reused by both modes: apply, test-with-fix-loop,
//! ci-with-fix-loop, and verify. Each follows the same discipline:
//! snapshot under the mutex, do agent/subprocess work outside it, commit
//! data then status under the mutex. Callers re-check the workflow
//! status after each phase to decide whether the chain advances.

use crate::engine::PipelineEngine;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use temper_adapters::{run_supervised, AgentAdapter, SubprocessError, SUBPROCESS_TIMEOUT};
use temper_core::{parse_agent_json, truncate_output, Error, Workflow, WorkflowStatus};
use temper_storage::{clean_staging, copy_from_staging, write_json};

/// Fix iterations after the initial test run.
pub(crate) const MAX_FIX_ATTEMPTS: usize = 2;

/// Fix iterations after the initial static-analysis run.
pub(crate) const MAX_CI_FIX_ATTEMPTS: usize = 2;

/// Reads a workflow artifact for prompt building.
pub(crate) type ArtifactFn = fn(&Workflow) -> Value;

/// Stores a phase result on the workflow.
pub(crate) type StoreFn = fn(&mut Workflow, Value);

/// Prompt-building context for apply-shaped phases.
pub(crate) struct ApplyPromptCtx<'a> {
    pub relative_path: &'a Path,
    pub source: &'a str,
    pub analysis: &'a Value,
    pub decision: &'a Value,
    pub staging_dir: &'a Path,
}

/// Prompt-building context for fix loops.
pub(crate) struct FixPromptCtx<'a> {
    pub relative_path: &'a Path,
    pub source: &'a str,
    pub output: &'a str,
    pub analysis: &'a Value,
    pub staging_dir: &'a Path,
}

/// Prompt-building context for verify.
pub(crate) struct VerifyPromptCtx<'a> {
    pub relative_path: &'a Path,
    pub original: &'a str,
    pub current: &'a str,
    pub analysis: &'a Value,
}

pub(crate) type ApplyPromptFn = Box<dyn Fn(ApplyPromptCtx<'_>) -> String + Send + Sync>;
pub(crate) type FixPromptFn = Box<dyn Fn(FixPromptCtx<'_>) -> String + Send + Sync>;
pub(crate) type VerifyPromptFn = Box<dyn Fn(VerifyPromptCtx<'_>) -> String + Send + Sync>;

pub(crate) struct ApplyParams {
    pub applying: WorkflowStatus,
    pub applied: WorkflowStatus,
    /// Terminal status for an operator `skip` decision; `None` disables
    /// the skip check (enhance batches cannot be skipped mid-plan).
    pub skipped: Option<WorkflowStatus>,
    pub sidecar_dir: PathBuf,
    pub sidecar_file: PathBuf,
    pub staging_dir: PathBuf,
    pub prompt_key: &'static str,
    pub allowlist: Vec<PathBuf>,
    pub grant_id: Option<String>,
    pub analysis_of: ArtifactFn,
    pub decision_of: ArtifactFn,
    pub store_result: StoreFn,
    pub build_prompt: ApplyPromptFn,
}

pub(crate) struct TestParams {
    pub guard: WorkflowStatus,
    pub testing: WorkflowStatus,
    pub fixing: WorkflowStatus,
    pub tested: WorkflowStatus,
    pub failed: WorkflowStatus,
    pub results_file: PathBuf,
    pub staging_dir: PathBuf,
    pub prompt_key: &'static str,
    pub allowlist: Vec<PathBuf>,
    pub grant_id: Option<String>,
    pub analysis_of: ArtifactFn,
    pub store_results: StoreFn,
    pub build_fix_prompt: FixPromptFn,
}

pub(crate) struct CiParams {
    pub guard: WorkflowStatus,
    pub checking: WorkflowStatus,
    pub fixing: WorkflowStatus,
    pub passed: WorkflowStatus,
    pub failed: WorkflowStatus,
    pub results_file: PathBuf,
    pub staging_dir: PathBuf,
    pub prompt_key: &'static str,
    pub allowlist: Vec<PathBuf>,
    pub grant_id: Option<String>,
    pub analysis_of: ArtifactFn,
    pub store_results: StoreFn,
    pub build_fix_prompt: FixPromptFn,
}

pub(crate) struct VerifyParams {
    pub guard: WorkflowStatus,
    pub verifying: WorkflowStatus,
    pub verified: WorkflowStatus,
    pub results_file: PathBuf,
    pub prompt_key: &'static str,
    pub analysis_of: ArtifactFn,
    pub store_result: StoreFn,
    pub build_prompt: VerifyPromptFn,
}

/// Apply: prompt the agent to write changes into staging, then copy them
/// into the project through the safe-write gate.
pub(crate) async fn shared_apply<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
    params: ApplyParams,
) -> Result<(), Error> {
    struct Snapshot {
        source_path: PathBuf,
        relative_path: PathBuf,
        analysis: Value,
        decision: Value,
    }

    let now = engine.inner.clock.now();
    let entry = engine.mutate(|state| -> Result<Option<Snapshot>, Error> {
        let wf = state
            .workflows
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("workflow {name}")))?;

        let decision = (params.decision_of)(wf);
        let skip_requested = decision.get("action").and_then(Value::as_str) == Some("skip");
        if skip_requested {
            if let Some(skipped) = params.skipped {
                wf.completed_at = Some(now);
                wf.status = skipped;
                return Ok(None);
            }
        }

        wf.status = params.applying;
        Ok(Some(Snapshot {
            source_path: wf.source_path.clone(),
            relative_path: wf.relative_path.clone(),
            analysis: (params.analysis_of)(wf),
            decision,
        }))
    })?;

    let Some(snapshot) = entry else {
        tracing::info!(workflow = name, "operator skipped, nothing to apply");
        return Ok(());
    };

    let source = std::fs::read_to_string(&snapshot.source_path)?;
    std::fs::create_dir_all(&params.sidecar_dir)?;
    clean_staging(&params.staging_dir)?;

    let prompt = (params.build_prompt)(ApplyPromptCtx {
        relative_path: &snapshot.relative_path,
        source: &source,
        analysis: &snapshot.analysis,
        decision: &snapshot.decision,
        staging_dir: &params.staging_dir,
    });

    let raw = engine
        .inner
        .agent
        .cli_call(&prompt, &engine.inner.cancel)
        .await?;
    let parsed = parse_agent_json(&raw)?;
    write_json(&params.sidecar_file, &parsed)?;

    engine.mutate(|state| {
        if let Some(wf) = state.workflows.get_mut(name) {
            wf.original_source = Some(source.clone());
            (params.store_result)(wf, parsed.clone());
            wf.record_prompt(params.prompt_key, &prompt);
            wf.status = params.applied;
        }
    });

    copy_from_staging(
        &params.staging_dir,
        &engine.inner.config.project_root,
        &params.allowlist,
        grant_pair(engine, &params.grant_id),
    )?;
    Ok(())
}

/// Test with a bounded fix loop.
pub(crate) async fn shared_test<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
    params: TestParams,
) -> Result<(), Error> {
    let snapshot = engine.mutate(|state| {
        let wf = state.workflows.get_mut(name)?;
        if wf.status != params.guard {
            return None;
        }
        wf.status = params.testing;
        Some((wf.source_path.clone(), wf.relative_path.clone()))
    });
    let Some((source_path, relative_path)) = snapshot else {
        return Ok(());
    };

    let command = test_command(engine, &source_path);
    let mut attempts = Vec::new();
    let mut passed = run_attempt(engine, &command, 1, &mut attempts).await?;

    let mut fixes = 0;
    while !passed && fixes < MAX_FIX_ATTEMPTS {
        fixes += 1;
        let analysis = engine.mutate(|state| {
            let wf = state.workflows.get_mut(name)?;
            wf.status = params.fixing;
            Some((params.analysis_of)(wf))
        });
        let Some(analysis) = analysis else {
            return Ok(());
        };

        clean_staging(&params.staging_dir)?;
        let source = std::fs::read_to_string(&source_path)?;
        let last_output = attempts
            .last()
            .and_then(|a: &Value| a.get("output").and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();

        let prompt = (params.build_fix_prompt)(FixPromptCtx {
            relative_path: &relative_path,
            source: &source,
            output: &last_output,
            analysis: &analysis,
            staging_dir: &params.staging_dir,
        });
        let raw = engine
            .inner
            .agent
            .cli_call(&prompt, &engine.inner.cancel)
            .await?;
        let _ = parse_agent_json(&raw)?;
        engine.mutate(|state| {
            if let Some(wf) = state.workflows.get_mut(name) {
                wf.record_prompt(params.prompt_key, &prompt);
            }
        });

        copy_from_staging(
            &params.staging_dir,
            &engine.inner.config.project_root,
            &params.allowlist,
            grant_pair(engine, &params.grant_id),
        )?;

        engine.mutate(|state| {
            if let Some(wf) = state.workflows.get_mut(name) {
                wf.status = params.testing;
            }
        });
        passed = run_attempt(engine, &command, attempts.len() + 1, &mut attempts).await?;
    }

    let results = json!({"passed": passed, "attempts": attempts});
    write_json(&params.results_file, &results)?;

    engine.mutate(|state| {
        if let Some(wf) = state.workflows.get_mut(name) {
            (params.store_results)(wf, results.clone());
            wf.status = if passed { params.tested } else { params.failed };
        }
    });
    if !passed {
        tracing::warn!(workflow = name, "tests still failing after fix attempts");
    }
    Ok(())
}

/// Static analysis with a bounded fix loop. The configured commands run
/// in parallel; the phase fails iff any command exits non-zero.
pub(crate) async fn shared_ci_check<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
    params: CiParams,
) -> Result<(), Error> {
    let snapshot = engine.mutate(|state| {
        let wf = state.workflows.get_mut(name)?;
        if wf.status != params.guard {
            return None;
        }
        wf.status = params.checking;
        Some((wf.source_path.clone(), wf.relative_path.clone()))
    });
    let Some((source_path, relative_path)) = snapshot else {
        return Ok(());
    };

    let mut attempts = Vec::new();
    let mut checks = run_ci_commands(engine).await?;
    let mut passed = all_passed(&checks);
    attempts.push(json!({"attempt": 1, "checks": checks.clone()}));

    let mut fixes = 0;
    while !passed && fixes < MAX_CI_FIX_ATTEMPTS {
        fixes += 1;
        let analysis = engine.mutate(|state| {
            let wf = state.workflows.get_mut(name)?;
            wf.status = params.fixing;
            Some((params.analysis_of)(wf))
        });
        let Some(analysis) = analysis else {
            return Ok(());
        };

        clean_staging(&params.staging_dir)?;
        let source = std::fs::read_to_string(&source_path)?;
        let failing_output = failing_outputs(&checks);

        let prompt = (params.build_fix_prompt)(FixPromptCtx {
            relative_path: &relative_path,
            source: &source,
            output: &failing_output,
            analysis: &analysis,
            staging_dir: &params.staging_dir,
        });
        let raw = engine
            .inner
            .agent
            .cli_call(&prompt, &engine.inner.cancel)
            .await?;
        let _ = parse_agent_json(&raw)?;
        engine.mutate(|state| {
            if let Some(wf) = state.workflows.get_mut(name) {
                wf.record_prompt(params.prompt_key, &prompt);
            }
        });

        copy_from_staging(
            &params.staging_dir,
            &engine.inner.config.project_root,
            &params.allowlist,
            grant_pair(engine, &params.grant_id),
        )?;

        engine.mutate(|state| {
            if let Some(wf) = state.workflows.get_mut(name) {
                wf.status = params.checking;
            }
        });
        checks = run_ci_commands(engine).await?;
        passed = all_passed(&checks);
        attempts.push(json!({"attempt": attempts.len() + 1, "checks": checks.clone()}));
    }

    let results = json!({"passed": passed, "attempts": attempts});
    write_json(&params.results_file, &results)?;

    engine.mutate(|state| {
        if let Some(wf) = state.workflows.get_mut(name) {
            (params.store_results)(wf, results.clone());
            wf.status = if passed { params.passed } else { params.failed };
        }
    });
    if !passed {
        tracing::warn!(workflow = name, "static analysis still failing after fix attempts");
    }
    Ok(())
}

/// Verify: the agent compares the before/after source against the
/// analysis. The current source is always read from disk.
pub(crate) async fn shared_verify<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    name: &str,
    params: VerifyParams,
) -> Result<(), Error> {
    let snapshot = engine.mutate(|state| {
        let wf = state.workflows.get_mut(name)?;
        if wf.status != params.guard {
            return None;
        }
        wf.status = params.verifying;
        Some((
            wf.source_path.clone(),
            wf.relative_path.clone(),
            wf.original_source.clone().unwrap_or_default(),
            (params.analysis_of)(wf),
        ))
    });
    let Some((source_path, relative_path, original, analysis)) = snapshot else {
        return Ok(());
    };

    let current = std::fs::read_to_string(&source_path)?;
    let prompt = (params.build_prompt)(VerifyPromptCtx {
        relative_path: &relative_path,
        original: &original,
        current: &current,
        analysis: &analysis,
    });

    let raw = engine
        .inner
        .agent
        .cli_call(&prompt, &engine.inner.cancel)
        .await?;
    let parsed = parse_agent_json(&raw)?;
    write_json(&params.results_file, &parsed)?;

    let now = engine.inner.clock.now();
    engine.mutate(|state| {
        if let Some(wf) = state.workflows.get_mut(name) {
            (params.store_result)(wf, parsed.clone());
            wf.record_prompt(params.prompt_key, &prompt);
            wf.completed_at = Some(now);
            wf.status = params.verified;
        }
    });
    Ok(())
}

// ---- helpers -------------------------------------------------------------

fn grant_pair<'a, A: AgentAdapter>(
    engine: &'a PipelineEngine<A>,
    grant_id: &'a Option<String>,
) -> Option<(&'a temper_core::LockManager, &'a str)> {
    grant_id
        .as_deref()
        .map(|id| (&engine.inner.locks, id))
}

/// Target-specific test command when the resolver finds a test file,
/// else the full suite.
fn test_command<A: AgentAdapter>(engine: &PipelineEngine<A>, source_path: &Path) -> Vec<String> {
    let mut command = engine.inner.config.test_command.clone();
    if let Some(test_path) = engine.inner.config.resolve_test_path(source_path) {
        command.push(test_path.display().to_string());
    }
    command
}

async fn run_attempt<A: AgentAdapter>(
    engine: &PipelineEngine<A>,
    command: &[String],
    attempt: usize,
    attempts: &mut Vec<Value>,
) -> Result<bool, Error> {
    let (cmd, args) = command
        .split_first()
        .ok_or_else(|| Error::Io("empty test command".to_string()))?;
    let result = run_supervised(
        cmd,
        args,
        SUBPROCESS_TIMEOUT,
        Some(&engine.inner.config.project_root),
        &engine.inner.cancel,
    )
    .await
    .map_err(subprocess_error)?;

    attempts.push(json!({
        "attempt": attempt,
        "command": command.join(" "),
        "success": result.success,
        "output": result.output,
    }));
    Ok(result.success)
}

/// Run every configured CI command concurrently; any transport-level
/// failure (timeout, cancellation) aborts the remaining checks.
async fn run_ci_commands<A: AgentAdapter>(engine: &PipelineEngine<A>) -> Result<Vec<Value>, Error> {
    let commands = engine.inner.config.ci_commands.clone();
    let mut handles = Vec::with_capacity(commands.len());

    for check in commands {
        let project_root = engine.inner.config.project_root.clone();
        let cancel = engine.inner.cancel.clone();
        handles.push(tokio::spawn(async move {
            let (cmd, args) = check
                .command
                .split_first()
                .ok_or_else(|| Error::Io(format!("empty ci command: {}", check.name)))?;
            let result = run_supervised(
                cmd,
                args,
                SUBPROCESS_TIMEOUT,
                Some(&project_root),
                &cancel,
            )
            .await
            .map_err(subprocess_error)?;
            Ok::<Value, Error>(json!({
                "name": check.name,
                "command": check.command.join(" "),
                "success": result.success,
                "output": result.output,
            }))
        }));
    }

    let mut checks = Vec::with_capacity(handles.len());
    let mut first_error: Option<Error> = None;
    for handle in handles {
        if first_error.is_some() {
            handle.abort();
            continue;
        }
        match handle.await {
            Ok(Ok(check)) => checks.push(check),
            Ok(Err(err)) => first_error = Some(err),
            Err(join_err) => first_error = Some(Error::Io(join_err.to_string())),
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(checks),
    }
}

fn all_passed(checks: &[Value]) -> bool {
    checks
        .iter()
        .all(|c| c.get("success").and_then(Value::as_bool).unwrap_or(false))
}

fn failing_outputs(checks: &[Value]) -> String {
    checks
        .iter()
        .filter(|c| !c.get("success").and_then(Value::as_bool).unwrap_or(false))
        .map(|c| {
            format!(
                "== {} ==\n{}",
                c.get("name").and_then(Value::as_str).unwrap_or("check"),
                c.get("output").and_then(Value::as_str).unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn subprocess_error(err: SubprocessError) -> Error {
    match err {
        SubprocessError::TimedOut => Error::Timeout,
        SubprocessError::Cancelled => Error::Cancelled,
        SubprocessError::Spawn(msg) => Error::Subprocess(truncate_output(&msg, 500)),
    }
}

#[cfg(test)]
#[path = "shared_tests.rs"]
mod tests;
