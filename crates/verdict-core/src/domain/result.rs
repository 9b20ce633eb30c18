//! Validated per-competency agent results.

use serde::{Deserialize, Serialize};

use super::competency::Competency;
use super::error::ValidationError;
use super::transcript::SegmentId;

/// An agent's self-reported certainty in its own score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceProfile {
    /// Overall confidence, 0.0–1.0.
    pub overall: f64,
    /// How strong the cited evidence is, 0.0–1.0.
    #[serde(default)]
    pub evidence_strength: Option<f64>,
    /// How consistent the agent's reasoning is with itself, 0.0–1.0.
    #[serde(default)]
    pub internal_consistency: Option<f64>,
}

impl ConfidenceProfile {
    pub fn overall(overall: f64) -> Self {
        Self {
            overall,
            evidence_strength: None,
            internal_consistency: None,
        }
    }
}

/// A transcript segment cited by an agent, with the agent's quality rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub segment_id: SegmentId,
    /// Per-segment quality score, 0.0–1.0.
    pub quality: f64,
}

impl EvidenceRef {
    pub fn new(segment_id: impl Into<SegmentId>, quality: f64) -> Self {
        Self {
            segment_id: segment_id.into(),
            quality,
        }
    }
}

/// Input fields for constructing a [`CompetencyResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetencyResultFields {
    pub competency: Competency,
    pub score: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    pub confidence: ConfidenceProfile,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
}

/// One agent's verdict on one competency.
///
/// Only constructible through [`CompetencyResult::new`], so every instance
/// satisfies the range invariants: score in 0–100, every confidence value and
/// evidence quality in 0–1. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CompetencyResultFields")]
pub struct CompetencyResult {
    competency: Competency,
    score: f64,
    reasoning: String,
    strengths: Vec<String>,
    weaknesses: Vec<String>,
    confidence: ConfidenceProfile,
    evidence: Vec<EvidenceRef>,
}

fn check_unit(
    competency: Competency,
    field: &'static str,
    value: f64,
) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::ConfidenceOutOfRange {
            competency,
            field,
            value,
        })
    }
}

impl CompetencyResult {
    pub fn new(fields: CompetencyResultFields) -> Result<Self, ValidationError> {
        let CompetencyResultFields {
            competency,
            score,
            reasoning,
            strengths,
            weaknesses,
            confidence,
            evidence,
        } = fields;

        if !(0.0..=100.0).contains(&score) {
            return Err(ValidationError::ScoreOutOfRange {
                competency,
                value: score,
            });
        }
        check_unit(competency, "confidence", confidence.overall)?;
        if let Some(v) = confidence.evidence_strength {
            check_unit(competency, "evidence_strength", v)?;
        }
        if let Some(v) = confidence.internal_consistency {
            check_unit(competency, "internal_consistency", v)?;
        }
        for item in &evidence {
            if item.segment_id.as_str().is_empty() {
                return Err(ValidationError::EmptySegmentId);
            }
            if !(0.0..=1.0).contains(&item.quality) {
                return Err(ValidationError::EvidenceQualityOutOfRange {
                    segment: item.segment_id.to_string(),
                    value: item.quality,
                });
            }
        }

        Ok(Self {
            competency,
            score,
            reasoning,
            strengths,
            weaknesses,
            confidence,
            evidence,
        })
    }

    pub fn competency(&self) -> Competency {
        self.competency
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn strengths(&self) -> &[String] {
        &self.strengths
    }

    pub fn weaknesses(&self) -> &[String] {
        &self.weaknesses
    }

    pub fn confidence(&self) -> &ConfidenceProfile {
        &self.confidence
    }

    pub fn evidence(&self) -> &[EvidenceRef] {
        &self.evidence
    }

    /// A copy of this result with a re-scored score and overall confidence.
    ///
    /// Sub-signals are kept; the original is left untouched.
    pub fn with_adjustment(&self, score: f64, confidence: f64) -> Result<Self, ValidationError> {
        let mut fields = CompetencyResultFields::from(self.clone());
        fields.score = score;
        fields.confidence.overall = confidence;
        Self::new(fields)
    }
}

impl TryFrom<CompetencyResultFields> for CompetencyResult {
    type Error = ValidationError;

    fn try_from(fields: CompetencyResultFields) -> Result<Self, Self::Error> {
        Self::new(fields)
    }
}

impl From<CompetencyResult> for CompetencyResultFields {
    fn from(r: CompetencyResult) -> Self {
        Self {
            competency: r.competency,
            score: r.score,
            reasoning: r.reasoning,
            strengths: r.strengths,
            weaknesses: r.weaknesses,
            confidence: r.confidence,
            evidence: r.evidence,
        }
    }
}
