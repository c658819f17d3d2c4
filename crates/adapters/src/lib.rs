// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! temper-adapters: process and network boundaries for the temper engine

mod agent;
pub mod process_group;
mod slots;
mod subprocess;

pub use agent::{
    AgentAdapter, AgentClient, AgentClientConfig, AgentError, ApiConfig, API_POOL_SIZE,
    CLI_POOL_SIZE,
};
pub use slots::SlotPool;
pub use subprocess::{
    run_supervised, CommandOutput, SubprocessError, AGENT_CLI_TIMEOUT, SUBPROCESS_TIMEOUT,
};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use agent::{FakeAgentAdapter, RecordedCall};
