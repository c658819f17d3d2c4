// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests

use crate::config::EngineConfig;
use crate::engine::PipelineEngine;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use temper_adapters::FakeAgentAdapter;
use temper_core::clock::FakeClock;
use temper_core::WorkflowStatus;

pub(crate) struct TestBed {
    pub dir: tempfile::TempDir,
    pub engine: PipelineEngine<FakeAgentAdapter>,
    pub agent: FakeAgentAdapter,
    pub clock: FakeClock,
}

/// A Rails-shaped project with one `user` model, passing stub test and
/// CI commands, and a fake agent.
pub(crate) fn testbed() -> TestBed {
    testbed_with(|_| {})
}

pub(crate) fn testbed_with(customize: impl FnOnce(&mut EngineConfig)) -> TestBed {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("app/models")).expect("mkdir");
    std::fs::create_dir_all(dir.path().join("app/services")).expect("mkdir");
    std::fs::create_dir_all(dir.path().join("test/models")).expect("mkdir");
    std::fs::write(
        dir.path().join("app/models/user.rb"),
        "class User < ApplicationRecord\nend\n",
    )
    .expect("write");

    let mut config = EngineConfig::new(dir.path());
    config.test_command = vec![script(dir.path(), "run-tests", "exit 0")];
    customize(&mut config);

    let agent = FakeAgentAdapter::new();
    let clock = FakeClock::new();
    let engine = PipelineEngine::with_clock(config, agent.clone(), Arc::new(clock.clone()));
    TestBed {
        dir,
        engine,
        agent,
        clock,
    }
}

/// Write an executable shell script under `<root>/bin`, returning its path.
pub(crate) fn script(root: &Path, name: &str, body: &str) -> String {
    let bin = root.join("bin");
    std::fs::create_dir_all(&bin).expect("mkdir bin");
    let path = bin.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");
    }
    path.display().to_string()
}

/// Poll until the workflow reaches `status` or the deadline passes.
pub(crate) async fn wait_for_status(
    bed: &TestBed,
    name: &str,
    status: WorkflowStatus,
) -> WorkflowStatus {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let current = bed.engine.workflow_status(name);
        if current == Some(status) {
            return status;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "timed out waiting for {name} to reach {status}; currently {current:?}"
            );
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Poll until the workflow reaches one of the given statuses.
pub(crate) async fn wait_for_any(
    bed: &TestBed,
    name: &str,
    statuses: &[WorkflowStatus],
) -> WorkflowStatus {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(current) = bed.engine.workflow_status(name) {
            if statuses.contains(&current) {
                return current;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "timed out waiting for {name} to reach one of {statuses:?}; currently {:?}",
                bed.engine.workflow_status(name)
            );
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
