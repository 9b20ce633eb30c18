//! Detection and remediation outputs.

use serde::{Deserialize, Serialize};

use super::competency::Competency;
use super::transcript::SegmentId;

/// One competency's citation of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub competency: Competency,
    pub quality: f64,
}

/// A segment that several competencies rated inconsistently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceConflict {
    pub segment_id: SegmentId,
    /// Every citation of the segment, in result order. A competency citing the
    /// segment twice appears twice.
    pub citations: Vec<Citation>,
    /// `max(quality) - min(quality)` over `citations`.
    pub gap: f64,
    /// 1-based rank, 1 = largest gap.
    pub priority: usize,
}

impl EvidenceConflict {
    /// Distinct citing competencies, in first-citation order.
    pub fn competencies(&self) -> Vec<Competency> {
        let mut out: Vec<Competency> = Vec::new();
        for c in &self.citations {
            if !out.contains(&c.competency) {
                out.push(c.competency);
            }
        }
        out
    }
}

/// Why a result's confidence is low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueReason {
    WeakEvidence,
    LowConsistency,
    Both,
}

/// A competency whose self-reported confidence is below the bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceIssue {
    pub competency: Competency,
    pub confidence: f64,
    pub reason: IssueReason,
}

/// The mediator's ruling on one contested segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediationResult {
    pub segment_id: SegmentId,
    /// Competency whose interpretation of the segment is authoritative.
    pub primary_competency: Competency,
    pub justification: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// An independent re-score of a low-confidence competency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdversarialResult {
    pub competency: Competency,
    pub original_score: f64,
    pub original_confidence: f64,
    pub adjusted_score: f64,
    pub adjusted_confidence: f64,
    #[serde(default)]
    pub rationale: String,
}

impl AdversarialResult {
    pub fn score_delta(&self) -> f64 {
        self.adjusted_score - self.original_score
    }
}
