//! Agent Invoker.
//!
//! Uniform entry point for every remote agent call the orchestrator makes:
//! competency scoring, evidence mediation, and adversarial validation. The
//! transport lives behind the injectable [`AgentClient`] trait; the invoker
//! builds the request payload, enforces the optional per-call deadline, and
//! classifies the outcome as a typed result or an [`AgentError`].
//!
//! The invoker never retries. Retry policy belongs to the client.
//!
//! # Module layout
//!
//! - [`error`]: `AgentError`, `AgentErrorClass`, `AgentResult`
//! - [`wire`]: response extraction and payload parsing
//! - [`http`]: `HttpAgentClient`, a `reqwest`-backed client

pub mod error;
pub mod http;
pub mod wire;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use crate::config::CompetencyConfig;
use crate::domain::{
    AdversarialResult, Competency, CompetencyResult, ConfidenceIssue, EvidenceConflict,
    JobContext, MediationResult, Transcript,
};
use crate::metrics::METRICS;

pub use error::{AgentError, AgentErrorClass, AgentResult};

/// Which kind of agent a call is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Scorer,
    Mediator,
    Validator,
}

impl AgentRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::Scorer => "scorer",
            AgentRole::Mediator => "mediator",
            AgentRole::Validator => "validator",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request to a remote agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCall {
    pub role: AgentRole,
    /// Competency id for scorer/validator calls, segment id for mediator calls.
    pub subject: String,
    pub payload: serde_json::Value,
}

impl AgentCall {
    /// `"<role>:<subject>"`, used in logs and error messages.
    pub fn target(&self) -> String {
        format!("{}:{}", self.role, self.subject)
    }
}

/// Transport to the external agent service.
///
/// Implementations return the agent's raw answer (a JSON document, or a
/// string containing one) or a classified [`AgentError`] within bounded time.
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn call(&self, call: AgentCall) -> AgentResult<serde_json::Value>;
}

/// Typed, classified access to scoring, mediation, and validation agents.
#[derive(Clone)]
pub struct AgentInvoker {
    client: Arc<dyn AgentClient>,
    call_timeout: Option<Duration>,
}

impl fmt::Debug for AgentInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentInvoker")
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl AgentInvoker {
    pub fn new(client: Arc<dyn AgentClient>) -> Self {
        Self {
            client,
            call_timeout: None,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    async fn dispatch(&self, call: AgentCall) -> AgentResult<serde_json::Value> {
        let target = call.target();
        METRICS.inc_agent_calls();
        let outcome = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.client.call(call)).await {
                Ok(result) => result,
                Err(_) => Err(AgentError::Timeout {
                    target: target.clone(),
                    timeout_ms: limit.as_millis() as u64,
                }),
            },
            None => self.client.call(call).await,
        };
        if outcome.is_err() {
            METRICS.inc_agent_failures();
        }
        outcome
    }

    /// Score one competency against the transcript.
    #[instrument(skip_all, fields(competency = %competency))]
    pub async fn score_competency(
        &self,
        competency: Competency,
        transcript: &Transcript,
        job: &JobContext,
        config: &CompetencyConfig,
    ) -> AgentResult<CompetencyResult> {
        let call = AgentCall {
            role: AgentRole::Scorer,
            subject: competency.as_str().to_string(),
            payload: json!({
                "competency": competency,
                "display_name": competency.display_name(),
                "job": job,
                "config": config,
                "transcript": transcript,
            }),
        };
        let target = call.target();
        let raw = self.dispatch(call).await?;
        let result = wire::parse_competency_result(&target, competency, raw)?;
        debug!(
            score = result.score(),
            confidence = result.confidence().overall,
            "competency scored"
        );
        Ok(result)
    }

    /// Ask the mediator which competency owns a contested segment.
    #[instrument(skip_all, fields(segment = %conflict.segment_id))]
    pub async fn mediate(
        &self,
        conflict: &EvidenceConflict,
        results: &[CompetencyResult],
        transcript: &Transcript,
    ) -> AgentResult<MediationResult> {
        let involved = conflict.competencies();
        let positions: Vec<&CompetencyResult> = results
            .iter()
            .filter(|r| involved.contains(&r.competency()))
            .collect();
        let call = AgentCall {
            role: AgentRole::Mediator,
            subject: conflict.segment_id.to_string(),
            payload: json!({
                "conflict": conflict,
                "segment": transcript.segment(&conflict.segment_id),
                "positions": positions,
            }),
        };
        let target = call.target();
        let raw = self.dispatch(call).await?;
        wire::parse_mediation(&target, conflict, raw)
    }

    /// Independently re-score a low-confidence competency.
    #[instrument(skip_all, fields(competency = %issue.competency))]
    pub async fn validate(
        &self,
        issue: &ConfidenceIssue,
        original: &CompetencyResult,
        results: &[CompetencyResult],
    ) -> AgentResult<AdversarialResult> {
        let peers: Vec<&CompetencyResult> = results
            .iter()
            .filter(|r| r.competency() != issue.competency)
            .collect();
        let call = AgentCall {
            role: AgentRole::Validator,
            subject: issue.competency.as_str().to_string(),
            payload: json!({
                "issue": issue,
                "original": original,
                "peers": peers,
            }),
        };
        let target = call.target();
        let raw = self.dispatch(call).await?;
        wire::parse_adversarial(&target, issue, original, raw)
    }
}
