//! Validation errors for domain values.

use super::competency::Competency;

/// A value fell outside its declared domain.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("score {value} for {competency} is outside 0..=100")]
    ScoreOutOfRange { competency: Competency, value: f64 },

    #[error("{field} {value} for {competency} is outside 0..=1")]
    ConfidenceOutOfRange {
        competency: Competency,
        field: &'static str,
        value: f64,
    },

    #[error("evidence quality {value} on segment {segment} is outside 0..=1")]
    EvidenceQualityOutOfRange { segment: String, value: f64 },

    #[error("evidence reference has an empty segment id")]
    EmptySegmentId,

    #[error("unknown competency: {0}")]
    UnknownCompetency(String),

    #[error("weight {value} for {competency} must be finite and non-negative")]
    InvalidWeight { competency: Competency, value: f64 },
}
