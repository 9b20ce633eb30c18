//! Domain models for Verdict.
//!
//! Canonical definitions for the core entities:
//! - `Competency`: enumerated scoring dimension with its display/weight tables
//! - `Transcript`: ordered interview segments addressed by `SegmentId`
//! - `CompetencyResult`: one agent's validated verdict on one competency
//! - `EvidenceConflict` / `ConfidenceIssue`: derived detection outputs
//! - `MediationResult` / `AdversarialResult`: remediation outputs

pub mod competency;
pub mod error;
pub mod findings;
pub mod result;
pub mod transcript;

pub use competency::{Competency, CompetencyWeights};
pub use error::ValidationError;
pub use findings::{
    AdversarialResult, Citation, ConfidenceIssue, EvidenceConflict, IssueReason, MediationResult,
};
pub use result::{CompetencyResult, CompetencyResultFields, ConfidenceProfile, EvidenceRef};
pub use transcript::{JobContext, Segment, SegmentId, Transcript};
