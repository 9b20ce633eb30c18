//! Structured observability hooks for the evaluation lifecycle.
//!
//! This module provides:
//! - An evaluation-scoped tracing span via [`evaluation_span`]
//! - Emission functions for key lifecycle events: start, phase finished,
//!   agent failure, remediation failure, finish
//!
//! Events are emitted at `info!` level (failures at `warn!`). For JSON output
//! initialise tracing with [`crate::telemetry::init_tracing`] in JSON mode.

use tracing::{info, warn, Span};

/// Evaluation-scoped span; every event logged inside it carries the run,
/// candidate, and job ids.
///
/// The span is attached with `Instrument::instrument` rather than entered, so
/// the evaluation future stays `Send` across await points.
pub fn evaluation_span(run_id: &str, candidate_id: &str, job_id: &str) -> Span {
    tracing::info_span!(
        "verdict.evaluation",
        run_id = %run_id,
        candidate_id = %candidate_id,
        job_id = %job_id,
    )
}

/// Emit event: evaluation started over `competencies` configured dimensions.
pub fn emit_evaluation_started(run_id: &str, competencies: usize) {
    info!(event = "evaluation.started", run_id = %run_id, competencies = competencies);
}

/// Emit event: a phase node finished (successfully or not).
pub fn emit_phase_finished(run_id: &str, phase: &str, node: &str, duration_ms: u64, ok: bool) {
    info!(
        event = "phase.finished",
        run_id = %run_id,
        phase = %phase,
        node = %node,
        duration_ms = duration_ms,
        ok = ok,
    );
}

/// Emit event: an agent call failed and its slot was left absent.
pub fn emit_agent_failed(run_id: &str, target: &str, class: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "agent.failed",
        run_id = %run_id,
        target = %target,
        class = %class,
        error = %error,
    );
}

/// Emit event: a remediation procedure failed; its results are dropped.
pub fn emit_collaboration_failed(run_id: &str, procedure: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "collaboration.failed",
        run_id = %run_id,
        procedure = %procedure,
        error = %error,
    );
}

/// Emit event: evaluation reached a terminal status.
pub fn emit_evaluation_finished(
    run_id: &str,
    status: &str,
    duration_ms: u64,
    weighted_score: Option<f64>,
) {
    info!(
        event = "evaluation.finished",
        run_id = %run_id,
        status = %status,
        duration_ms = duration_ms,
        weighted_score = weighted_score,
    );
}

/// Emit event: storing an audit artifact failed (never fatal).
pub fn emit_artifact_write_error(run_id: &str, key: &str, error: &dyn std::fmt::Display) {
    warn!(event = "artifact.write_error", run_id = %run_id, key = %key, error = %error);
}
