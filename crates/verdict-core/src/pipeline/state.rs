//! Run record and phase state machine.
//!
//! [`EvaluationRun`] is read-only outside this crate. Phases compute a
//! [`PhasePatch`] from a shared view of the run and the controller applies it,
//! so only one place ever mutates run state.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregation::{FinalVerdict, NormalizedScore};
use crate::collaboration::{CollaborationError, CollaborationReport};
use crate::detection::DetectionReport;
use crate::domain::{Competency, CompetencyResult, JobContext};
use crate::invoker::AgentError;

use super::error::{PipelineError, PipelineResult};
use super::trace::{ExecutionLog, ExecutionLogEntry};

/// Lifecycle of one evaluation run.
///
/// ```text
/// Pending -> Evaluating -> DetectingIssues -> [Collaborating] -> Aggregating -> Completed
///                 any non-terminal state -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Evaluating,
    DetectingIssues,
    Collaborating,
    Aggregating,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Evaluating => "evaluating",
            RunStatus::DetectingIssues => "detecting_issues",
            RunStatus::Collaborating => "collaborating",
            RunStatus::Aggregating => "aggregating",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Pending, Evaluating)
            | (Evaluating, DetectingIssues)
            | (DetectingIssues, Collaborating)
            | (DetectingIssues, Aggregating)
            | (Collaborating, Aggregating)
            | (Aggregating, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recovered failure kept for the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub phase: RunStatus,
    /// `"<role>:<subject>"` for agent calls, procedure name for remediation.
    pub target: String,
    /// `invocation`, `parsing`, `panic`, or `collaboration`.
    pub class: String,
    pub detail: String,
}

impl FailureRecord {
    pub fn from_agent(phase: RunStatus, err: &AgentError) -> Self {
        Self {
            phase,
            target: err.target().to_string(),
            class: err.class().as_str().to_string(),
            detail: err.to_string(),
        }
    }

    pub fn from_collaboration(err: &CollaborationError) -> Self {
        Self {
            phase: RunStatus::Collaborating,
            target: err.procedure().as_str().to_string(),
            class: "collaboration".to_string(),
            detail: err.to_string(),
        }
    }
}

/// A change to the run record, produced by one phase.
#[derive(Debug, Clone)]
pub(crate) enum PhasePatch {
    Transition(RunStatus),
    Scored {
        results: BTreeMap<Competency, CompetencyResult>,
        failures: Vec<FailureRecord>,
    },
    Detected(DetectionReport),
    Collaborated {
        report: CollaborationReport,
        failures: Vec<FailureRecord>,
    },
    Aggregated {
        verdict: FinalVerdict,
        normalized: Option<NormalizedScore>,
    },
    Log(ExecutionLogEntry),
    Fail(String),
}

/// Everything known about one (candidate, job) evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRun {
    run_id: String,
    candidate_id: String,
    job: JobContext,
    status: RunStatus,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    results: BTreeMap<Competency, CompetencyResult>,
    failures: Vec<FailureRecord>,
    detection: Option<DetectionReport>,
    collaboration: Option<CollaborationReport>,
    verdict: Option<FinalVerdict>,
    normalized: Option<NormalizedScore>,
    error: Option<String>,
    log: ExecutionLog,
}

impl EvaluationRun {
    pub fn new(
        run_id: impl Into<String>,
        candidate_id: impl Into<String>,
        job: JobContext,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            candidate_id: candidate_id.into(),
            job,
            status: RunStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            results: BTreeMap::new(),
            failures: Vec::new(),
            detection: None,
            collaboration: None,
            verdict: None,
            normalized: None,
            error: None,
            log: ExecutionLog::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn candidate_id(&self) -> &str {
        &self.candidate_id
    }

    pub fn job(&self) -> &JobContext {
        &self.job
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Results keyed by competency, in declaration order.
    pub fn results(&self) -> &BTreeMap<Competency, CompetencyResult> {
        &self.results
    }

    /// Owned copy of the results in declaration order.
    pub fn result_list(&self) -> Vec<CompetencyResult> {
        self.results.values().cloned().collect()
    }

    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    pub fn detection(&self) -> Option<&DetectionReport> {
        self.detection.as_ref()
    }

    pub fn collaboration(&self) -> Option<&CollaborationReport> {
        self.collaboration.as_ref()
    }

    pub fn verdict(&self) -> Option<&FinalVerdict> {
        self.verdict.as_ref()
    }

    pub fn normalized(&self) -> Option<&NormalizedScore> {
        self.normalized.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    fn transition(&mut self, next: RunStatus) -> PipelineResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Merge one phase's patch into the record.
    pub(crate) fn apply(&mut self, patch: PhasePatch) -> PipelineResult<()> {
        match patch {
            PhasePatch::Transition(next) => self.transition(next)?,
            PhasePatch::Scored { results, failures } => {
                for (competency, result) in results {
                    if self.results.contains_key(&competency) {
                        return Err(PipelineError::DuplicateResult(competency));
                    }
                    self.results.insert(competency, result);
                }
                self.failures.extend(failures);
            }
            PhasePatch::Detected(report) => self.detection = Some(report),
            PhasePatch::Collaborated { report, failures } => {
                self.collaboration = Some(report);
                self.failures.extend(failures);
            }
            PhasePatch::Aggregated {
                verdict,
                normalized,
            } => {
                self.verdict = Some(verdict);
                self.normalized = normalized;
            }
            PhasePatch::Log(entry) => self.log.push(entry),
            PhasePatch::Fail(error) => {
                self.transition(RunStatus::Failed)?;
                self.error = Some(error);
            }
        }
        Ok(())
    }
}
