//! Error types for the phase controller.

use crate::aggregation::AggregationError;
use crate::config::ConfigError;
use crate::domain::Competency;

use super::state::RunStatus;

/// Errors that end an evaluation run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("illegal phase transition {from} -> {to}")]
    IllegalTransition { from: RunStatus, to: RunStatus },

    #[error("result for {0} was already recorded")]
    DuplicateResult(Competency),

    #[error("no usable competency results ({failed} of {attempted} scoring calls failed)")]
    NoUsableResults { attempted: usize, failed: usize },

    #[error("aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("evaluation cancelled during {phase}")]
    Cancelled { phase: RunStatus },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
