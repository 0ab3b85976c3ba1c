use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::collab::protocol::RunOutput;
use crate::error::{CollabError, Result};

/// Endpoint and deadline for the executor service, validated and loaded by
/// `config::Config::from_env`
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

/// Request body sent to the executor service
#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    code: &'a str,
    extension: &'a str,
}

/// Outcome of one execution round-trip. `started_at`/`ended_at` are epoch
/// milliseconds stamped by the executor; absent when the run never produced
/// timing (transport failure, timeout).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub success: bool,
    pub output: RunOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<u64>,
}

impl ExecutionOutcome {
    /// A failed outcome carrying a transport-level error as stderr, so the
    /// requester always receives a terminal response.
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: RunOutput::Failure {
                stderr: message.into(),
            },
            started_at: None,
            ended_at: None,
        }
    }
}

/// HTTP client for the external executor service that compiles/runs
/// submitted code out of process.
#[derive(Clone)]
pub struct ExecutorClient {
    config: ExecutorConfig,
    client: reqwest::Client,
}

impl ExecutorClient {
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CollabError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Submit code for execution and wait for the outcome. Never errors:
    /// transport problems come back as a failed outcome so the caller can
    /// report them in place of the program's own stderr.
    pub async fn execute(&self, code: &str, extension: &str) -> ExecutionOutcome {
        let url = format!("{}/execute", self.config.base_url);
        let request = ExecuteRequest { code, extension };

        let response = match self.client.post(&url).json(&request).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                tracing::warn!(
                    timeout_secs = self.config.timeout_secs,
                    "Executor request timed out"
                );
                return ExecutionOutcome::transport_failure(
                    CollabError::ExecutionTimeout(self.config.timeout_secs).to_string(),
                );
            }
            Err(e) => {
                tracing::error!(error = %e, url = %url, "Executor request failed");
                return ExecutionOutcome::transport_failure(format!(
                    "Executor unreachable: {}",
                    e
                ));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, "Executor returned error status");
            return ExecutionOutcome::transport_failure(format!(
                "Executor returned {}: {}",
                status, body
            ));
        }

        match response.json::<ExecutionOutcome>().await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Failed to parse executor response");
                ExecutionOutcome::transport_failure(format!(
                    "Invalid executor response: {}",
                    e
                ))
            }
        }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }
}
