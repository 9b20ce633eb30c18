//! Consistency checks over an aggregated verdict.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::AggregationConfig;
use crate::domain::{
    Competency, CompetencyResult, CompetencyWeights, EvidenceConflict, MediationResult,
};

/// Something a reviewer should look at before trusting the verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencyFlag {
    /// The weighting moved the score far from the plain mean.
    WeightedDivergence {
        unweighted_mean: f64,
        weighted_score: f64,
        divergence: f64,
    },
    /// Effective confidence still below the actionable bar.
    LowConfidence {
        competency: Competency,
        confidence: f64,
    },
    /// Configured competencies with no result.
    MissingCompetencies { missing: Vec<Competency> },
    /// Detected conflicts that no mediation resolved.
    UnresolvedConflicts { detected: usize, mediated: usize },
}

pub(crate) struct ConsistencyInput<'a> {
    pub effective: &'a [CompetencyResult],
    pub weighted_score: f64,
    pub unweighted_mean: f64,
    pub configured: &'a CompetencyWeights,
    pub conflicts: &'a [EvidenceConflict],
    pub mediations: &'a [MediationResult],
}

pub(crate) fn check(
    input: &ConsistencyInput<'_>,
    config: &AggregationConfig,
) -> Vec<ConsistencyFlag> {
    let mut flags = Vec::new();

    let divergence = (input.unweighted_mean - input.weighted_score).abs();
    if divergence > config.divergence_threshold {
        flags.push(ConsistencyFlag::WeightedDivergence {
            unweighted_mean: input.unweighted_mean,
            weighted_score: input.weighted_score,
            divergence,
        });
    }

    for result in input.effective {
        let confidence = result.confidence().overall;
        if confidence < config.actionable_confidence {
            flags.push(ConsistencyFlag::LowConfidence {
                competency: result.competency(),
                confidence,
            });
        }
    }

    let present: HashSet<Competency> = input.effective.iter().map(|r| r.competency()).collect();
    let missing: Vec<Competency> = input
        .configured
        .competencies()
        .filter(|c| !present.contains(c))
        .collect();
    if !missing.is_empty() {
        flags.push(ConsistencyFlag::MissingCompetencies { missing });
    }

    let mediated_segments: HashSet<&str> = input
        .mediations
        .iter()
        .map(|m| m.segment_id.as_str())
        .collect();
    let mediated = input
        .conflicts
        .iter()
        .filter(|c| mediated_segments.contains(c.segment_id.as_str()))
        .count();
    if mediated < input.conflicts.len() {
        flags.push(ConsistencyFlag::UnresolvedConflicts {
            detected: input.conflicts.len(),
            mediated,
        });
    }

    flags
}
