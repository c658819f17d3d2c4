// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture for the behavioral specs.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use temper_adapters::FakeAgentAdapter;
use temper_core::{FakeClock, WorkflowStatus};
use temper_engine::{EngineConfig, PipelineEngine};

pub struct Project {
    pub dir: tempfile::TempDir,
    pub engine: PipelineEngine<FakeAgentAdapter>,
    pub agent: FakeAgentAdapter,
}

/// A Rails-shaped project with one `user` model and passing stub
/// commands.
pub fn project() -> Project {
    project_with(|_| {})
}

pub fn project_with(customize: impl FnOnce(&mut EngineConfig)) -> Project {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("app/models")).unwrap();
    std::fs::create_dir_all(dir.path().join("test/models")).unwrap();
    std::fs::write(
        dir.path().join("app/models/user.rb"),
        "class User < ApplicationRecord\nend\n",
    )
    .unwrap();

    let mut config = EngineConfig::new(dir.path());
    config.test_command = vec!["true".to_string()];
    customize(&mut config);

    let agent = FakeAgentAdapter::new();
    let engine = PipelineEngine::with_clock(
        config,
        agent.clone(),
        Arc::new(FakeClock::new()),
    );
    Project { dir, engine, agent }
}

pub fn harden_sidecar(project: &Project) -> temper_storage::HardenSidecar {
    temper_storage::HardenSidecar::new(
        &project.dir.path().join("app/models/user.rb"),
        ".harden",
        "user",
    )
}

pub fn enhance_sidecar(project: &Project) -> temper_storage::EnhanceSidecar {
    temper_storage::EnhanceSidecar::new(
        &project.dir.path().join("app/models/user.rb"),
        ".enhance",
        "user",
    )
}

/// Poll until `name` reaches `status` (10 s deadline).
pub async fn wait_for(project: &Project, name: &str, status: WorkflowStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let current = project.engine.workflow_status(name);
        if current == Some(status) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {name} to reach {status}; currently {current:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Script the agent responses for a clean hardening run of `user`.
pub fn script_hardening(project: &Project) {
    project.agent.on_cli(
        "Analyze",
        r#"{"findings": [], "overall_risk": "low"}"#,
    );
    project.agent.on_cli(
        "Apply the approved hardening",
        r#"{"changes": [{"file": "app/models/user.rb", "summary": "validated"}]}"#,
    );
    project.agent.write_file_on_cli(
        "Apply the approved hardening",
        harden_sidecar(project)
            .staging()
            .join("app/models/user.rb"),
        "class User < ApplicationRecord\n  validates :email, presence: true\nend\n",
    );
    project
        .agent
        .on_cli("Verify", r#"{"status": "verified", "notes": []}"#);
}

/// Drive `user` from discovery to `h_complete`.
pub async fn harden_to_complete(project: &Project) {
    script_hardening(project);
    project.engine.discover().await.unwrap();
    project.engine.run_analysis("user").unwrap();
    wait_for(project, "user", WorkflowStatus::HAwaitingDecisions).await;
    project
        .engine
        .submit_decision("user", serde_json::json!({"action": "approve"}))
        .unwrap();
    wait_for(project, "user", WorkflowStatus::HComplete).await;
}

/// True if `path` exists and parses as JSON.
pub fn json_artifact(path: &Path) -> bool {
    temper_storage::read_json(path).is_some()
}
