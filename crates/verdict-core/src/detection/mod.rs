//! Rule-based issue detection.
//!
//! Runs after the scoring fan-out and decides whether a remediation round is
//! needed. Both detectors are pure functions over the gathered results and
//! never call an agent.
//!
//! - [`conflict`]: segments cited with inconsistent quality ratings
//! - [`confidence`]: results whose self-reported confidence is too low

pub mod confidence;
pub mod conflict;

use serde::{Deserialize, Serialize};

use crate::config::DetectionConfig;
use crate::domain::{CompetencyResult, ConfidenceIssue, EvidenceConflict};

pub use confidence::detect_confidence_issues;
pub use conflict::detect_conflicts;

/// What the detection phase found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Ranked by gap, largest first.
    pub conflicts: Vec<EvidenceConflict>,
    /// Encounter order.
    pub issues: Vec<ConfidenceIssue>,
    pub requires_collaboration: bool,
}

impl DetectionReport {
    fn new(conflicts: Vec<EvidenceConflict>, issues: Vec<ConfidenceIssue>) -> Self {
        let requires_collaboration = !conflicts.is_empty() || !issues.is_empty();
        Self {
            conflicts,
            issues,
            requires_collaboration,
        }
    }
}

/// Run both detectors over `results`.
pub fn detect(results: &[CompetencyResult], config: &DetectionConfig) -> DetectionReport {
    DetectionReport::new(
        detect_conflicts(results, config.conflict_threshold, config.max_conflicts),
        detect_confidence_issues(results, config.confidence_threshold, config.max_issues),
    )
}
