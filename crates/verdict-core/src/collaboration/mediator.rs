//! Evidence mediation: ask the mediator agent which competency owns each
//! contested segment.

use std::sync::Arc;

use futures::future::join_all;

use crate::domain::{CompetencyResult, EvidenceConflict, MediationResult, Transcript};
use crate::invoker::AgentInvoker;

use super::error::{CollaborationError, Procedure};
use super::{ProcedureRun, TaskOutcome};

/// Mediate `conflicts` (already capped, in priority order) concurrently.
///
/// With no conflicts the task still runs and reports `Skipped`. Failed calls
/// drop only their own entry; the procedure fails when every call does.
pub(crate) async fn mediate_conflicts(
    invoker: AgentInvoker,
    run_id: String,
    conflicts: Vec<EvidenceConflict>,
    results: Arc<Vec<CompetencyResult>>,
    transcript: Arc<Transcript>,
) -> ProcedureRun<MediationResult> {
    if conflicts.is_empty() {
        return ProcedureRun::skipped();
    }

    let attempts = join_all(
        conflicts
            .iter()
            .map(|conflict| invoker.mediate(conflict, &results, &transcript)),
    )
    .await;

    let attempted = attempts.len();
    let mut mediations = Vec::with_capacity(attempted);
    let mut call_failures = Vec::new();
    for attempt in attempts {
        match attempt {
            Ok(mediation) => mediations.push(mediation),
            Err(e) => {
                crate::obs::emit_agent_failed(&run_id, e.target(), e.class().as_str(), &e);
                call_failures.push(e);
            }
        }
    }

    let outcome = if mediations.is_empty() {
        TaskOutcome::Failed(CollaborationError::AllCallsFailed {
            procedure: Procedure::EvidenceMediation,
            attempted,
            last_error: call_failures
                .last()
                .map(|e| e.to_string())
                .unwrap_or_default(),
        })
    } else {
        TaskOutcome::Completed(mediations)
    };
    ProcedureRun {
        outcome,
        attempted,
        call_failures,
    }
}
