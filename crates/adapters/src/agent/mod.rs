// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent invocation adapters
//!
//! Two interfaces to the external coding agent: a CLI invocation (one
//! prompt per call) and the HTTPS messages API with a web-search tool,
//! used only for research. Both are bounded by slot pools; the pools are
//! the process-wide concurrency limit on agent work.

mod client;

pub use client::{AgentClient, AgentClientConfig, ApiConfig};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeAgentAdapter, RecordedCall};

use async_trait::async_trait;
use temper_core::CancelFlag;
use thiserror::Error;

/// Concurrent CLI invocations allowed.
pub const CLI_POOL_SIZE: usize = 12;

/// Concurrent API invocations allowed.
pub const API_POOL_SIZE: usize = 20;

/// Errors from agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Agent CLI exited non-zero; carries truncated output.
    #[error("agent cli failed: {0}")]
    Cli(String),
    /// API transport or non-2xx response.
    #[error("agent api failed: {0}")]
    Api(String),
    /// `api_call` invoked with no API key configured.
    #[error("no agent api key configured")]
    NoApiKey,
    #[error("timed out")]
    Timeout,
    #[error("cancelled")]
    Cancelled,
}

impl From<AgentError> for temper_core::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Timeout => temper_core::Error::Timeout,
            AgentError::Cancelled => temper_core::Error::Cancelled,
            other => temper_core::Error::Subprocess(other.to_string()),
        }
    }
}

/// The agent seam.
///
/// The engine is generic over this trait; production uses [`AgentClient`],
/// tests use `FakeAgentAdapter`.
#[async_trait]
pub trait AgentAdapter: Clone + Send + Sync + 'static {
    /// One prompt, one CLI invocation. Returns trimmed stdout.
    async fn cli_call(&self, prompt: &str, cancel: &CancelFlag) -> Result<String, AgentError>;

    /// One prompt through the messages API with the web-search tool.
    /// Returns the concatenated text blocks of the response.
    async fn api_call(
        &self,
        prompt: &str,
        model: &str,
        cancel: &CancelFlag,
    ) -> Result<String, AgentError>;

    /// Whether `api_call` can be used at all (an API key is configured).
    fn api_available(&self) -> bool;

    /// Whether a CLI slot is free right now (scheduler dispatch predicate).
    fn has_free_cli_slot(&self) -> bool;

    /// CLI slots currently in use, for the UI snapshot.
    fn cli_slots_in_use(&self) -> usize;
}
