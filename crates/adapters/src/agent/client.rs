// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production agent client: CLI subprocess + messages API

use super::{AgentAdapter, AgentError, API_POOL_SIZE, CLI_POOL_SIZE};
use crate::slots::SlotPool;
use crate::subprocess::{run_supervised, SubprocessError, AGENT_CLI_TIMEOUT};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use temper_core::{truncate_output, CancelFlag, Error};

/// How much captured CLI output to quote in errors.
const CLI_ERROR_OUTPUT_LEN: usize = 500;

/// Messages API version header value.
const API_VERSION: &str = "2023-06-01";

/// Research calls may drive up to ten web searches; give them room.
const API_TIMEOUT: Duration = Duration::from_secs(600);

/// Configuration for the CLI side of the client.
#[derive(Debug, Clone)]
pub struct AgentClientConfig {
    /// Agent binary (e.g. `claude`).
    pub bin: String,
    /// Working directory for CLI invocations; the agent reads project
    /// files relative to this.
    pub project_root: PathBuf,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl AgentClientConfig {
    pub fn new(bin: impl Into<String>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            project_root: project_root.into(),
            timeout: AGENT_CLI_TIMEOUT,
        }
    }
}

/// Configuration for the messages-API side of the client.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_key: String,
    /// Host only; the client appends `/v1/messages`.
    pub host: String,
}

impl ApiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            host: "api.anthropic.com".to_string(),
        }
    }
}

/// Agent client backed by the real CLI binary and messages API.
#[derive(Clone)]
pub struct AgentClient {
    config: AgentClientConfig,
    api: Option<ApiConfig>,
    cli_pool: SlotPool,
    api_pool: SlotPool,
    http: reqwest::Client,
}

impl AgentClient {
    pub fn new(config: AgentClientConfig, api: Option<ApiConfig>) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|e| Error::Io(e.to_string()))?;
        Ok(Self {
            config,
            api,
            cli_pool: SlotPool::new("agent-cli", CLI_POOL_SIZE),
            api_pool: SlotPool::new("agent-api", API_POOL_SIZE),
            http,
        })
    }
}

#[async_trait]
impl AgentAdapter for AgentClient {
    async fn cli_call(&self, prompt: &str, cancel: &CancelFlag) -> Result<String, AgentError> {
        let _slot = self
            .cli_pool
            .acquire(cancel)
            .await
            .map_err(|_| AgentError::Cancelled)?;

        tracing::debug!(prompt_len = prompt.len(), "invoking agent cli");
        let args = vec![
            "-p".to_string(),
            "--skip-permissions".to_string(),
            prompt.to_string(),
        ];
        let result = run_supervised(
            &self.config.bin,
            &args,
            self.config.timeout,
            Some(&self.config.project_root),
            cancel,
        )
        .await;

        match result {
            Ok(out) if out.success => Ok(out.output.trim().to_string()),
            Ok(out) => Err(AgentError::Cli(truncate_output(
                &out.output,
                CLI_ERROR_OUTPUT_LEN,
            ))),
            Err(SubprocessError::TimedOut) => Err(AgentError::Timeout),
            Err(SubprocessError::Cancelled) => Err(AgentError::Cancelled),
            Err(SubprocessError::Spawn(msg)) => Err(AgentError::Cli(msg)),
        }
    }

    async fn api_call(
        &self,
        prompt: &str,
        model: &str,
        cancel: &CancelFlag,
    ) -> Result<String, AgentError> {
        let api = self.api.as_ref().ok_or(AgentError::NoApiKey)?;
        let _slot = self
            .api_pool
            .acquire(cancel)
            .await
            .map_err(|_| AgentError::Cancelled)?;

        let body = json!({
            "model": model,
            "max_tokens": 4096,
            "tools": [{
                "type": "web_search_20250305",
                "name": "web_search",
                "max_uses": 10,
            }],
            "messages": [{"role": "user", "content": prompt}],
        });

        tracing::debug!(model, prompt_len = prompt.len(), "invoking agent api");
        let response = self
            .http
            .post(format!("https://{}/v1/messages", api.host))
            .header("x-api-key", &api.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::Timeout
                } else {
                    AgentError::Api(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AgentError::Api(format!(
                "status {status}: {}",
                truncate_output(&detail, CLI_ERROR_OUTPUT_LEN)
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| AgentError::Api(e.to_string()))?;
        Ok(extract_text_blocks(&payload))
    }

    fn api_available(&self) -> bool {
        self.api.is_some()
    }

    fn has_free_cli_slot(&self) -> bool {
        self.cli_pool.has_free_slot()
    }

    fn cli_slots_in_use(&self) -> usize {
        self.cli_pool.in_use()
    }
}

/// Concatenate `content[].type == "text"` blocks, discarding tool-use and
/// tool-result blocks.
fn extract_text_blocks(payload: &Value) -> String {
    payload
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
