// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake agent adapter for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{AgentAdapter, AgentError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use temper_core::CancelFlag;

/// Recorded call to the fake adapter.
#[derive(Debug, Clone)]
pub enum RecordedCall {
    Cli { prompt: String },
    Api { prompt: String, model: String },
}

/// Scripted response rule: first matching substring wins, responses are
/// consumed in FIFO order per rule.
struct Rule {
    matcher: String,
    responses: VecDeque<Result<String, String>>,
}

/// File written as a side effect of a matching CLI call, standing in for
/// the real agent writing into a staging tree.
struct WriteEffect {
    matcher: String,
    path: std::path::PathBuf,
    content: String,
}

struct FakeState {
    cli_rules: Vec<Rule>,
    cli_default: String,
    cli_effects: Vec<WriteEffect>,
    api_rules: Vec<Rule>,
    api_default: Result<String, String>,
    api_available: bool,
    calls: Vec<RecordedCall>,
    cli_delay: Option<Duration>,
    free_cli_slot: bool,
    cli_in_flight: usize,
}

/// Fake agent adapter.
///
/// Allows programmatic control over agent responses and records all calls.
#[derive(Clone)]
pub struct FakeAgentAdapter {
    inner: Arc<Mutex<FakeState>>,
}

impl Default for FakeAgentAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeAgentAdapter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                cli_rules: Vec::new(),
                cli_default: "{}".to_string(),
                cli_effects: Vec::new(),
                api_rules: Vec::new(),
                api_default: Ok("researched text".to_string()),
                api_available: true,
                calls: Vec::new(),
                cli_delay: None,
                free_cli_slot: true,
                cli_in_flight: 0,
            })),
        }
    }

    /// Script a CLI response for prompts containing `matcher`.
    /// Multiple calls with the same matcher queue responses in order.
    pub fn on_cli(&self, matcher: &str, response: &str) {
        Self::push_rule(&mut self.inner.lock().cli_rules, matcher, Ok(response.to_string()));
    }

    /// Script a CLI failure for prompts containing `matcher`.
    pub fn fail_cli(&self, matcher: &str, message: &str) {
        Self::push_rule(&mut self.inner.lock().cli_rules, matcher, Err(message.to_string()));
    }

    /// Response for CLI prompts no rule matches (default `{}`).
    pub fn set_cli_default(&self, response: &str) {
        self.inner.lock().cli_default = response.to_string();
    }

    /// Write `path` with `content` whenever a CLI prompt contains
    /// `matcher`, as the real agent would write into staging.
    pub fn write_file_on_cli(
        &self,
        matcher: &str,
        path: impl Into<std::path::PathBuf>,
        content: &str,
    ) {
        self.inner.lock().cli_effects.push(WriteEffect {
            matcher: matcher.to_string(),
            path: path.into(),
            content: content.to_string(),
        });
    }

    /// Script an API response for prompts containing `matcher`.
    pub fn on_api(&self, matcher: &str, response: &str) {
        Self::push_rule(&mut self.inner.lock().api_rules, matcher, Ok(response.to_string()));
    }

    /// Script an API failure for prompts containing `matcher`.
    pub fn fail_api(&self, matcher: &str, message: &str) {
        Self::push_rule(&mut self.inner.lock().api_rules, matcher, Err(message.to_string()));
    }

    /// Toggle the configured-API-key state.
    pub fn set_api_available(&self, available: bool) {
        self.inner.lock().api_available = available;
    }

    /// Delay every CLI call, for scheduling tests.
    pub fn set_cli_delay(&self, delay: Duration) {
        self.inner.lock().cli_delay = Some(delay);
    }

    /// Control the scheduler's slot predicate.
    pub fn set_free_cli_slot(&self, free: bool) {
        self.inner.lock().free_cli_slot = free;
    }

    /// All recorded calls.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().calls.clone()
    }

    /// Prompts of recorded CLI calls, in order.
    pub fn cli_prompts(&self) -> Vec<String> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                RecordedCall::Cli { prompt } => Some(prompt.clone()),
                RecordedCall::Api { .. } => None,
            })
            .collect()
    }

    fn push_rule(rules: &mut Vec<Rule>, matcher: &str, response: Result<String, String>) {
        if let Some(rule) = rules.iter_mut().find(|r| r.matcher == matcher) {
            rule.responses.push_back(response);
        } else {
            rules.push(Rule {
                matcher: matcher.to_string(),
                responses: VecDeque::from([response]),
            });
        }
    }

    fn take_response(rules: &mut [Rule], prompt: &str) -> Option<Result<String, String>> {
        rules
            .iter_mut()
            .filter(|r| prompt.contains(&r.matcher))
            .find_map(|r| r.responses.pop_front())
    }
}

#[async_trait]
impl AgentAdapter for FakeAgentAdapter {
    async fn cli_call(&self, prompt: &str, cancel: &CancelFlag) -> Result<String, AgentError> {
        let (delay, response, writes) = {
            let mut state = self.inner.lock();
            state.calls.push(RecordedCall::Cli {
                prompt: prompt.to_string(),
            });
            state.cli_in_flight += 1;
            let response = Self::take_response(&mut state.cli_rules, prompt)
                .unwrap_or_else(|| Ok(state.cli_default.clone()));
            let writes: Vec<(std::path::PathBuf, String)> = state
                .cli_effects
                .iter()
                .filter(|e| prompt.contains(&e.matcher))
                .map(|e| (e.path.clone(), e.content.clone()))
                .collect();
            (state.cli_delay, response, writes)
        };

        for (path, content) in writes {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let _ = std::fs::write(&path, content);
        }

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.lock().cli_in_flight -= 1;

        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        response.map_err(AgentError::Cli)
    }

    async fn api_call(
        &self,
        prompt: &str,
        model: &str,
        cancel: &CancelFlag,
    ) -> Result<String, AgentError> {
        let response = {
            let mut state = self.inner.lock();
            if !state.api_available {
                return Err(AgentError::NoApiKey);
            }
            state.calls.push(RecordedCall::Api {
                prompt: prompt.to_string(),
                model: model.to_string(),
            });
            Self::take_response(&mut state.api_rules, prompt)
                .unwrap_or_else(|| state.api_default.clone())
        };

        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        response.map_err(AgentError::Api)
    }

    fn api_available(&self) -> bool {
        self.inner.lock().api_available
    }

    fn has_free_cli_slot(&self) -> bool {
        let state = self.inner.lock();
        state.free_cli_slot && state.cli_in_flight < super::CLI_POOL_SIZE
    }

    fn cli_slots_in_use(&self) -> usize {
        self.inner.lock().cli_in_flight
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
