//! Adversarial validation: independently re-score low-confidence results.

use std::sync::Arc;

use futures::future::join_all;

use crate::domain::{AdversarialResult, CompetencyResult, ConfidenceIssue};
use crate::invoker::{AgentError, AgentInvoker, AgentRole};

use super::error::{CollaborationError, Procedure};
use super::{ProcedureRun, TaskOutcome};

/// Validate `issues` (already capped, in encounter order) concurrently.
///
/// Same shape as mediation: `Skipped` on no input, per-call failures drop
/// their entry, all calls failing fails the procedure.
pub(crate) async fn validate_issues(
    invoker: AgentInvoker,
    run_id: String,
    issues: Vec<ConfidenceIssue>,
    results: Arc<Vec<CompetencyResult>>,
) -> ProcedureRun<AdversarialResult> {
    if issues.is_empty() {
        return ProcedureRun::skipped();
    }

    let attempts = join_all(issues.iter().map(|issue| {
        let invoker = &invoker;
        let results = &results;
        async move {
            let original = results
                .iter()
                .find(|r| r.competency() == issue.competency)
                .ok_or_else(|| {
                    AgentError::invocation(
                        format!("{}:{}", AgentRole::Validator, issue.competency),
                        "no original result for competency",
                    )
                })?;
            invoker.validate(issue, original, results).await
        }
    }))
    .await;

    let attempted = attempts.len();
    let mut validations = Vec::with_capacity(attempted);
    let mut call_failures = Vec::new();
    for attempt in attempts {
        match attempt {
            Ok(validation) => validations.push(validation),
            Err(e) => {
                crate::obs::emit_agent_failed(&run_id, e.target(), e.class().as_str(), &e);
                call_failures.push(e);
            }
        }
    }

    let outcome = if validations.is_empty() {
        TaskOutcome::Failed(CollaborationError::AllCallsFailed {
            procedure: Procedure::AdversarialValidation,
            attempted,
            last_error: call_failures
                .last()
                .map(|e| e.to_string())
                .unwrap_or_default(),
        })
    } else {
        TaskOutcome::Completed(validations)
    };
    ProcedureRun {
        outcome,
        attempted,
        call_failures,
    }
}
