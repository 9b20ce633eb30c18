//! HTTP agent client.
//!
//! Posts each [`AgentCall`] as JSON to `<base_url>/agents/<role>` and returns
//! the response body. Non-2xx statuses and transport failures are invocation
//! errors; a 2xx body that is not JSON is a parsing error.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{AgentError, AgentResult};
use super::{AgentCall, AgentClient};

/// HTTP agent endpoint configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpAgentConfig {
    pub base_url: String,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    /// Transport-level request timeout.
    pub request_timeout_ms: u64,
}

impl Default for HttpAgentConfig {
    fn default() -> Self {
        HttpAgentConfig {
            base_url: std::env::var("VERDICT_AGENT_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8700".to_string()),
            token: std::env::var("VERDICT_AGENT_TOKEN").ok(),
            request_timeout_ms: 90_000,
        }
    }
}

impl HttpAgentConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn new(base_url: &str) -> Self {
        HttpAgentConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            request_timeout_ms: 90_000,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

pub struct HttpAgentClient {
    config: HttpAgentConfig,
    http_client: reqwest::Client,
}

impl HttpAgentClient {
    pub fn new(config: HttpAgentConfig) -> AgentResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("verdict-core/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| AgentError::invocation("http-client", e.to_string()))?;
        Ok(HttpAgentClient {
            config,
            http_client,
        })
    }

    fn endpoint(&self, call: &AgentCall) -> String {
        format!(
            "{}/agents/{}",
            self.config.base_url.trim_end_matches('/'),
            call.role
        )
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn call(&self, call: AgentCall) -> AgentResult<serde_json::Value> {
        let target = call.target();
        let url = self.endpoint(&call);
        debug!(target = %target, url = %url, "posting agent call");

        let mut request = self.http_client.post(&url).json(&call);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AgentError::Timeout {
                    target: target.clone(),
                    timeout_ms: self.config.request_timeout_ms,
                }
            } else {
                AgentError::invocation(&target, e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::invocation(
                &target,
                format!("agent service returned HTTP {status}"),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AgentError::invocation(&target, e.to_string()))?;
        serde_json::from_str(&body).or_else(|_| {
            // Plain-text answers are handed to the wire parser as a string.
            if body.trim().is_empty() {
                Err(AgentError::parsing(&target, "empty response body"))
            } else {
                Ok(serde_json::Value::String(body))
            }
        })
    }
}
