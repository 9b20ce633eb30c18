//! Error types for aggregation and normalization.

use verdict_store::StorageError;

use crate::domain::ValidationError;

/// Errors produced while turning results into a verdict.
///
/// Everything except [`AggregationError::Baseline`] is fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("no competency results to aggregate")]
    NoResults,

    #[error("present competencies carry zero total weight")]
    ZeroWeight,

    /// Present competencies carry too little of the configured weight.
    #[error("weight coverage {coverage:.2} is below required coverage {min_coverage}")]
    InsufficientCoverage { coverage: f64, min_coverage: f64 },

    #[error("adjustment rejected: {0}")]
    InvalidAdjustment(#[from] ValidationError),

    #[error("baseline store error: {0}")]
    Baseline(#[from] StorageError),
}

/// Result type for aggregation.
pub type AggregationResult<T> = std::result::Result<T, AggregationError>;
