//! Phase pipeline: run record, execution trace, and the controller that
//! sequences the phases.
//!
//! # Module layout
//!
//! - [`state`]: `RunStatus` state machine, `EvaluationRun`, `FailureRecord`
//! - [`trace`]: `ExecutionLogEntry`, append-only `ExecutionLog`
//! - [`controller`]: `PhaseController`, `EvaluationRequest`, `EvaluationOutcome`
//! - [`error`]: `PipelineError`

pub mod controller;
pub mod error;
pub mod state;
pub mod trace;

pub use controller::{EvaluationOutcome, EvaluationRequest, PhaseController};
pub use error::{PipelineError, PipelineResult};
pub use state::{EvaluationRun, FailureRecord, RunStatus};
pub use trace::{ExecutionLog, ExecutionLogEntry};
