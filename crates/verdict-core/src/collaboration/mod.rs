//! Collaboration Coordinator.
//!
//! Runs the remediation round: the evidence mediator and the adversarial
//! validator, always as exactly two spawned tasks joined together. Each task
//! reports a three-state [`TaskOutcome`]. A failed or panicked task turns into
//! an empty result list plus a [`CollaborationError`]; its sibling's results
//! are kept in full.
//!
//! # Module layout
//!
//! - [`error`]: `CollaborationError`, `Procedure`
//! - `mediator`: conflict mediation
//! - `validator`: adversarial re-scoring

pub mod error;
mod mediator;
mod validator;

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, instrument, Instrument};

use crate::config::CollaborationConfig;
use crate::detection::DetectionReport;
use crate::domain::{AdversarialResult, CompetencyResult, MediationResult, Transcript};
use crate::invoker::{AgentError, AgentInvoker};
use crate::metrics::METRICS;

pub use error::{CollaborationError, Procedure};

/// Result of one remediation task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<T> {
    /// The task ran and produced at least one result.
    Completed(Vec<T>),
    /// There was nothing to do.
    Skipped,
    Failed(CollaborationError),
}

/// Coarse state of a [`TaskOutcome`], kept in reports and the trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeState {
    Completed,
    #[default]
    Skipped,
    Failed,
}

impl<T> TaskOutcome<T> {
    pub fn state(&self) -> OutcomeState {
        match self {
            TaskOutcome::Completed(_) => OutcomeState::Completed,
            TaskOutcome::Skipped => OutcomeState::Skipped,
            TaskOutcome::Failed(_) => OutcomeState::Failed,
        }
    }

    /// Results, or an empty list for skipped and failed tasks.
    pub fn into_results(self) -> (Vec<T>, Option<CollaborationError>) {
        match self {
            TaskOutcome::Completed(items) => (items, None),
            TaskOutcome::Skipped => (Vec::new(), None),
            TaskOutcome::Failed(err) => (Vec::new(), Some(err)),
        }
    }
}

/// What one procedure task hands back to the coordinator.
#[derive(Debug)]
pub(crate) struct ProcedureRun<T> {
    pub(crate) outcome: TaskOutcome<T>,
    pub(crate) attempted: usize,
    pub(crate) call_failures: Vec<AgentError>,
}

impl<T> ProcedureRun<T> {
    pub(crate) fn skipped() -> Self {
        Self {
            outcome: TaskOutcome::Skipped,
            attempted: 0,
            call_failures: Vec::new(),
        }
    }
}

/// Merged output of the remediation round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollaborationReport {
    /// Priority order.
    pub mediations: Vec<MediationResult>,
    pub validations: Vec<AdversarialResult>,
    /// `mediations.len() + validations.len()`.
    pub collaboration_count: usize,
    pub mediation_state: OutcomeState,
    pub validation_state: OutcomeState,
    /// Conflicts sent to the mediator.
    pub mediations_attempted: usize,
    pub validations_attempted: usize,
    /// Procedures that produced nothing usable.
    #[serde(skip)]
    pub errors: Vec<CollaborationError>,
    /// Individual agent calls that failed inside either procedure.
    #[serde(skip)]
    pub call_failures: Vec<AgentError>,
}

/// Runs the mediator and validator side by side.
#[derive(Debug, Clone)]
pub struct CollaborationCoordinator {
    invoker: AgentInvoker,
    config: CollaborationConfig,
}

/// Aborts the task if the coordinator is dropped before joining it.
struct TaskGuard<T>(JoinHandle<T>);

impl<T> Drop for TaskGuard<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Message carried by a panic payload, if it is a string.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

fn panic_detail(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    panic_message(err.into_panic().as_ref())
}

fn settle<T>(
    procedure: Procedure,
    joined: Result<ProcedureRun<T>, JoinError>,
) -> ProcedureRun<T> {
    match joined {
        Ok(run) => run,
        Err(err) => {
            let failure = if err.is_panic() {
                CollaborationError::Panicked {
                    procedure,
                    detail: panic_detail(err),
                }
            } else {
                CollaborationError::Cancelled { procedure }
            };
            ProcedureRun {
                outcome: TaskOutcome::Failed(failure),
                attempted: 0,
                call_failures: Vec::new(),
            }
        }
    }
}

impl CollaborationCoordinator {
    pub fn new(invoker: AgentInvoker, config: CollaborationConfig) -> Self {
        Self { invoker, config }
    }

    /// Mediate the top conflicts and validate the flagged results.
    ///
    /// Never fails: every procedure failure is folded into the report.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn run(
        &self,
        run_id: &str,
        detection: &DetectionReport,
        results: &[CompetencyResult],
        transcript: &Transcript,
    ) -> CollaborationReport {
        let results = Arc::new(results.to_vec());
        let transcript = Arc::new(transcript.clone());
        let conflicts: Vec<_> = detection
            .conflicts
            .iter()
            .take(self.config.max_mediations)
            .cloned()
            .collect();
        let issues: Vec<_> = detection
            .issues
            .iter()
            .take(self.config.max_validations)
            .cloned()
            .collect();

        let mut mediation = TaskGuard(tokio::spawn(mediator::mediate_conflicts(
            self.invoker.clone(),
            run_id.to_string(),
            conflicts,
            Arc::clone(&results),
            transcript,
        )
        .in_current_span()));
        let mut validation = TaskGuard(tokio::spawn(validator::validate_issues(
            self.invoker.clone(),
            run_id.to_string(),
            issues,
            results,
        )
        .in_current_span()));

        let (mediation, validation) = tokio::join!(&mut mediation.0, &mut validation.0);
        let mediation = settle(Procedure::EvidenceMediation, mediation);
        let validation = settle(Procedure::AdversarialValidation, validation);

        METRICS.add_remediations((mediation.attempted + validation.attempted) as u64);
        info!(
            mediation = ?mediation.outcome.state(),
            validation = ?validation.outcome.state(),
            "remediation round joined"
        );

        let mut report = CollaborationReport {
            mediation_state: mediation.outcome.state(),
            validation_state: validation.outcome.state(),
            mediations_attempted: mediation.attempted,
            validations_attempted: validation.attempted,
            ..CollaborationReport::default()
        };
        report.call_failures.extend(mediation.call_failures);
        report.call_failures.extend(validation.call_failures);

        let (mediations, mediation_error) = mediation.outcome.into_results();
        let (validations, validation_error) = validation.outcome.into_results();
        for err in mediation_error.into_iter().chain(validation_error) {
            crate::obs::emit_collaboration_failed(run_id, err.procedure().as_str(), &err);
            report.errors.push(err);
        }

        report.collaboration_count = mediations.len() + validations.len();
        report.mediations = mediations;
        report.validations = validations;
        report
    }
}
