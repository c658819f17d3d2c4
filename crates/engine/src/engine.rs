// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pipeline engine
//!
//! One `PipelineEngine` per process owns the global mutable state, the
//! lock manager, the scheduler, and every spawned phase task. All state
//! mutation goes through [`PipelineEngine::mutate`], which bumps the
//! snapshot version for SSE; `try_transition` is the single atomic
//! check-and-mutate primitive that prevents double-started phases.

use crate::config::EngineConfig;
use crate::discovery;
use crate::phases;
use crate::scheduler::Scheduler;
use crate::snapshot::SnapshotCache;
use crate::state::{EnginePhase, EngineState, ErrorEntry, Guard};
use crate::tasks::TaskTracker;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use temper_adapters::AgentAdapter;
use temper_core::clock::SharedClock;
use temper_core::{
    sanitize_message, CancelFlag, Error, LockManager, Mode, SystemClock, Workflow, WorkflowStatus,
};
use temper_storage::{resume_enhance, resume_hardening, EnhanceSidecar, HardenSidecar};

/// Lock-reaper interval.
const REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// Grace given to in-flight tasks on reset before they are aborted.
const RESET_GRACE: Duration = Duration::from_secs(3);

pub(crate) struct EngineInner<A: AgentAdapter> {
    pub(crate) config: EngineConfig,
    pub(crate) agent: A,
    pub(crate) clock: SharedClock,
    pub(crate) cancel: CancelFlag,
    pub(crate) locks: LockManager,
    pub(crate) scheduler: Scheduler,
    pub(crate) state: Mutex<EngineState>,
    pub(crate) version: AtomicU64,
    pub(crate) snapshot: SnapshotCache,
    pub(crate) tasks: TaskTracker,
    services: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

/// The process-wide pipeline coordinator.
///
/// Cheap to clone; clones share all state. Must be created inside a tokio
/// runtime (the lock reaper and scheduler loop start immediately).
pub struct PipelineEngine<A: AgentAdapter> {
    pub(crate) inner: Arc<EngineInner<A>>,
}

impl<A: AgentAdapter> Clone for PipelineEngine<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: AgentAdapter> PipelineEngine<A> {
    pub fn new(config: EngineConfig, agent: A) -> Self {
        Self::with_clock(config, agent, Arc::new(SystemClock))
    }

    pub fn with_clock(config: EngineConfig, agent: A, clock: SharedClock) -> Self {
        let locks = LockManager::with_clock(Arc::clone(&clock));
        let slot_agent = agent.clone();
        let scheduler = Scheduler::new(
            locks.clone(),
            Arc::clone(&clock),
            Arc::new(move || slot_agent.has_free_cli_slot()),
        );

        let engine = Self {
            inner: Arc::new(EngineInner {
                config,
                agent,
                clock,
                cancel: CancelFlag::new(),
                locks,
                scheduler,
                state: Mutex::new(EngineState::default()),
                version: AtomicU64::new(0),
                snapshot: SnapshotCache::new(),
                tasks: TaskTracker::new(),
                services: Mutex::new(Vec::new()),
            }),
        };

        engine.inner.scheduler.start();
        let reaper_locks = engine.inner.locks.clone();
        let reaper_shutdown = CancelFlag::new();
        let reaper = tokio::spawn({
            let shutdown = reaper_shutdown.clone();
            async move { reaper_locks.run_reaper(REAPER_INTERVAL, shutdown).await }
        });
        engine.inner.services.lock().push(reaper);

        engine
    }

    // ---- snapshot reads -------------------------------------------------

    pub fn phase(&self) -> EnginePhase {
        self.inner.state.lock().phase
    }

    pub fn workflow_status(&self, name: &str) -> Option<WorkflowStatus> {
        self.inner
            .state
            .lock()
            .workflows
            .get(name)
            .map(|wf| wf.status)
    }

    /// One serialized workflow field by its snapshot (camelCase) key.
    pub fn workflow_data(&self, name: &str, key: &str) -> Option<Value> {
        let state = self.inner.state.lock();
        let wf = state.workflows.get(name)?;
        serde_json::to_value(wf).ok()?.get(key).cloned()
    }

    pub fn targets(&self) -> Vec<temper_core::Target> {
        self.inner.state.lock().targets.clone()
    }

    pub(crate) fn workflow_snapshot(&self, name: &str) -> Result<Workflow, Error> {
        self.inner
            .state
            .lock()
            .workflows
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("workflow {name}")))
    }

    // ---- state mutation -------------------------------------------------

    /// Run `f` under the engine mutex, then publish the new state version.
    pub(crate) fn mutate<T>(&self, f: impl FnOnce(&mut EngineState) -> T) -> T {
        let result = {
            let mut state = self.inner.state.lock();
            f(&mut state)
        };
        let version = self.inner.version.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.snapshot.notify(version);
        result
    }

    /// Atomic guard-check + data write + status write on one workflow.
    ///
    /// `f` runs before the status is stored, preserving the
    /// data-before-status ordering for SSE observers.
    pub(crate) fn guarded_update(
        &self,
        name: &str,
        guard: Guard,
        to: WorkflowStatus,
        f: impl FnOnce(&mut Workflow),
    ) -> Result<(), Error> {
        let now = self.inner.clock.now();
        self.mutate(|state| {
            if !state.workflows.contains_key(name) {
                if !matches!(guard, Guard::NotActive) {
                    return Err(Error::NotFound(format!("workflow {name}")));
                }
                let target = state
                    .targets
                    .iter()
                    .find(|t| t.name == name)
                    .ok_or_else(|| Error::NotFound(format!("target {name}")))?;
                let wf = Workflow::new(&target.name, &target.source_path, &target.relative_path);
                state.workflows.insert(name.to_string(), wf);
            }
            let wf = match state.workflows.get_mut(name) {
                Some(wf) => wf,
                None => return Err(Error::NotFound(format!("workflow {name}"))),
            };

            if !guard.admits(wf.status) {
                return Err(Error::StateGuard(guard.mismatch(name, wf.status)));
            }

            match to.as_str().as_bytes().first() {
                Some(b'e') if to != WorkflowStatus::Error => wf.mode = Mode::Enhance,
                Some(b'h') => wf.mode = Mode::Hardening,
                _ => {}
            }
            if wf.started_at.is_none() {
                wf.started_at = Some(now);
            }

            f(wf);
            wf.status = to;
            wf.error = None;
            tracing::debug!(workflow = name, status = %to, "transition");
            Ok(())
        })
    }

    /// The atomic transition gate.
    pub fn try_transition(
        &self,
        name: &str,
        guard: Guard,
        to: WorkflowStatus,
    ) -> Result<(), Error> {
        self.guarded_update(name, guard, to, |_| {})
    }

    /// Append to the global error list.
    pub(crate) fn record_error(&self, workflow: Option<&str>, message: &str) {
        let sanitized = sanitize_message(message, &self.inner.config.project_root);
        let at = self.inner.clock.now();
        self.mutate(|state| {
            state.errors.push(ErrorEntry {
                message: sanitized,
                workflow: workflow.map(str::to_string),
                at,
            });
        });
    }

    /// Route a failed phase task into workflow `error` state.
    pub(crate) fn fail_workflow(&self, name: &str, err: &Error) {
        let message = sanitize_message(&err.to_string(), &self.inner.config.project_root);
        tracing::error!(workflow = name, error = %message, "phase task failed");
        let at = self.inner.clock.now();
        self.mutate(|state| {
            state.errors.push(ErrorEntry {
                message: message.clone(),
                workflow: Some(name.to_string()),
                at,
            });
            if let Some(wf) = state.workflows.get_mut(name) {
                if wf.status != WorkflowStatus::Error {
                    wf.mark_error(message);
                }
            }
        });
    }

    /// Spawn a phase task whose failure marks the workflow as errored.
    pub(crate) fn spawn_phase<F>(&self, workflow: &str, fut: F)
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let engine = self.clone();
        let name = workflow.to_string();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = fut.await {
                engine.fail_workflow(&task_name, &err);
            }
        });
        self.inner.tasks.track(Some(name), handle);
    }

    /// Spawn a background task with no workflow error routing (queries,
    /// per-topic research).
    pub(crate) fn spawn_detached<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        self.inner.tasks.track(None, handle);
    }

    // ---- discovery and resume -------------------------------------------

    /// Scan the project, resume workflows from sidecars, and move the
    /// engine to `ready`.
    pub async fn discover(&self) -> Result<(), Error> {
        self.mutate(|state| state.phase = EnginePhase::Discovering);

        let targets = discovery::discover_targets(&self.inner.config)?;

        let mut resumed_extracting = Vec::new();
        self.mutate(|state| {
            for target in &targets {
                if state.workflows.contains_key(&target.name) {
                    continue;
                }

                let enhance = EnhanceSidecar::new(
                    &target.source_path,
                    &self.inner.config.enhance_sidecar,
                    &target.name,
                );
                let harden = HardenSidecar::new(
                    &target.source_path,
                    &self.inner.config.harden_sidecar,
                    &target.name,
                );

                let resumed = resume_enhance(&enhance).or_else(|| resume_hardening(&harden));
                let Some(resumed) = resumed else { continue };
                let Some(status) = resumed.status else { continue };

                let mut wf =
                    Workflow::new(&target.name, &target.source_path, &target.relative_path);
                wf.mode = resumed.mode;
                wf.analysis = resumed.analysis;
                wf.apply_result = resumed.apply_result;
                wf.test_results = resumed.test_results;
                wf.ci_results = resumed.ci_results;
                wf.verification = resumed.verification;
                wf.e_analysis = resumed.e_analysis;
                wf.research_topics = resumed.research_topics;
                wf.possible_items = resumed.possible_items;
                wf.ready_items = resumed.ready_items;
                wf.audit_result = resumed.audit_result;
                wf.e_decisions = resumed.e_decisions;
                wf.batches = resumed.batches;
                wf.current_batch_id = resumed.current_batch_id;
                wf.e_batch_state = resumed.e_batch_state;
                wf.status = status;

                if status == WorkflowStatus::EExtracting {
                    resumed_extracting.push(target.name.clone());
                }

                tracing::info!(workflow = %target.name, status = %status, "resumed from sidecars");
                state.workflows.insert(target.name.clone(), wf);
            }

            state.targets = targets;
            state.phase = EnginePhase::Ready;
        });

        // A workflow resumed mid-extraction owns an active status with no
        // task behind it; re-enqueue the chain.
        for name in resumed_extracting {
            phases::enhance::enqueue_extract_chain(self, &name);
        }

        Ok(())
    }

    // ---- serialized snapshot --------------------------------------------

    /// Serialized engine state, cached for 100 ms.
    pub fn to_json(&self) -> Arc<String> {
        let version = self.inner.version.load(Ordering::SeqCst);
        self.inner.snapshot.get_or_render(version, || {
            let body = {
                let state = self.inner.state.lock();
                json!({
                    "phase": state.phase,
                    "targets": state.targets,
                    "workflows": state.workflows,
                    "queries": state.queries,
                    "errors": state.errors,
                    "locks": {
                        "activeGrants": self.inner.locks.active_grants(),
                        "queueDepth": self.inner.scheduler.queue_depth(),
                        "activeItems": self.inner.scheduler.active_items(),
                        "cliSlotsInUse": self.inner.agent.cli_slots_in_use(),
                    },
                })
            };
            body.to_string()
        })
    }

    /// Watch channel of state versions; the SSE endpoint pushes
    /// `to_json()` whenever it changes.
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<u64> {
        self.inner.snapshot.subscribe()
    }

    // ---- lifecycle -------------------------------------------------------

    /// Request cooperative cancellation of all in-flight work.
    pub fn cancel(&self) {
        tracing::info!("cancellation requested");
        self.inner.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Cancel everything, clear all state, release all grants, restart
    /// the scheduler. Sidecars stay on disk; `discover` restores from
    /// them.
    pub async fn reset(&self) {
        tracing::info!("engine reset");
        self.inner.cancel.cancel();

        if !self.inner.tasks.wait_idle(RESET_GRACE).await {
            self.inner.tasks.abort_all();
        }
        self.inner.scheduler.stop().await;
        self.inner.scheduler.clear();
        self.inner.locks.release_all();

        self.mutate(|state| {
            state.phase = EnginePhase::Idle;
            state.targets.clear();
            state.workflows.clear();
            state.errors.clear();
            state.queries.clear();
        });

        self.inner.cancel.clear();
        self.inner.scheduler.start();
    }

    /// Cooperative shutdown, then forced, then drain.
    pub async fn shutdown(&self, timeout: Duration) {
        tracing::info!("engine shutdown");
        self.inner.cancel.cancel();
        self.inner.scheduler.stop().await;
        if !self.inner.tasks.wait_idle(timeout).await {
            self.inner.tasks.abort_all();
        }
        let mut services = self.inner.services.lock();
        for handle in services.drain(..) {
            handle.abort();
        }
    }

    // ---- hardening operations -------------------------------------------

    pub fn run_analysis(&self, name: &str) -> Result<(), Error> {
        phases::hardening::run_analysis(self, name)
    }

    pub fn load_existing_analysis(&self, name: &str) -> Result<(), Error> {
        phases::hardening::load_existing_analysis(self, name)
    }

    pub fn submit_decision(&self, name: &str, decision: Value) -> Result<(), Error> {
        phases::hardening::submit_decision(self, name, decision)
    }

    pub fn run_testing(&self, name: &str) -> Result<(), Error> {
        phases::hardening::run_testing(self, name)
    }

    pub fn run_ci_checks(&self, name: &str) -> Result<(), Error> {
        phases::hardening::run_ci_checks(self, name)
    }

    pub fn run_verification(&self, name: &str) -> Result<(), Error> {
        phases::hardening::run_verification(self, name)
    }

    pub fn ask_question(&self, name: &str, question: &str) -> Result<String, Error> {
        phases::hardening::ask_question(self, name, question)
    }

    pub fn explain_finding(&self, name: &str, finding_id: &str) -> Result<String, Error> {
        phases::hardening::explain_finding(self, name, finding_id)
    }

    pub fn queries(&self) -> Vec<temper_core::Query> {
        self.inner.state.lock().queries.clone()
    }

    // ---- enhance operations ---------------------------------------------

    pub fn run_enhance_analysis(&self, name: &str) -> Result<(), Error> {
        phases::enhance::run_enhance_analysis(self, name)
    }

    pub fn submit_research(&self, name: &str, topic: usize, result: &str) -> Result<(), Error> {
        phases::enhance::submit_research(self, name, topic, result)
    }

    pub fn submit_research_api(&self, name: &str, topic: usize) -> Result<(), Error> {
        phases::enhance::submit_research_api(self, name, topic)
    }

    pub fn reject_research_topic(&self, name: &str, topic: usize) -> Result<(), Error> {
        phases::enhance::reject_research_topic(self, name, topic)
    }

    pub fn submit_enhance_decisions(&self, name: &str, decisions: Value) -> Result<(), Error> {
        phases::enhance::submit_enhance_decisions(self, name, decisions)
    }

    pub fn run_batch_planning(&self, name: &str) -> Result<(), Error> {
        phases::enhance::run_batch_planning(self, name)
    }

    pub fn replan_batches(&self, name: &str) -> Result<(), Error> {
        phases::enhance::replan_batches(self, name)
    }

    pub fn run_batch_execution(&self, name: &str) -> Result<(), Error> {
        phases::enhance::run_batch_execution(self, name)
    }

    // ---- diagnostics -----------------------------------------------------

    pub fn active_grants(&self) -> Vec<temper_core::LockGrant> {
        self.inner.locks.active_grants()
    }

    pub fn queue_depth(&self) -> usize {
        self.inner.scheduler.queue_depth()
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
