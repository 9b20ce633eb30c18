//! Aggregator.
//!
//! Folds the (possibly remediated) competency results into one verdict:
//! weighted score over the competencies actually present, consistency flags,
//! a short synthesis, and a recommendation tier. Population normalization is
//! a separate stage in [`normalization`].
//!
//! Weights are renormalized over present competencies, so a failed scorer
//! shrinks the denominator instead of dragging the score down. A configured
//! `min_coverage` turns too many absences into an [`AggregationError`].

pub mod consistency;
pub mod error;
pub mod normalization;
pub mod synthesis;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{AggregationConfig, TierThresholds};
use crate::domain::{
    AdversarialResult, Competency, CompetencyResult, CompetencyWeights, EvidenceConflict,
    MediationResult,
};

pub use consistency::ConsistencyFlag;
pub use error::{AggregationError, AggregationResult};
pub use normalization::{NormalizedScore, Normalizer};
pub use synthesis::Synthesis;

/// Hiring recommendation tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongHire,
    Hire,
    Hold,
    NoHire,
}

impl Recommendation {
    /// Map a 0–100 score onto the configured tier boundaries (inclusive).
    pub fn from_score(score: f64, tiers: &TierThresholds) -> Self {
        if score >= tiers.strong_hire {
            Recommendation::StrongHire
        } else if score >= tiers.hire {
            Recommendation::Hire
        } else if score >= tiers.hold {
            Recommendation::Hold
        } else {
            Recommendation::NoHire
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Recommendation::StrongHire => "strong_hire",
            Recommendation::Hire => "hire",
            Recommendation::Hold => "hold",
            Recommendation::NoHire => "no_hire",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final per-competency numbers after remediation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetencyScore {
    pub score: f64,
    pub confidence: f64,
    /// Replaced by an adversarial validation.
    pub adjusted: bool,
}

/// The aggregated verdict for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalVerdict {
    pub competency_scores: BTreeMap<Competency, CompetencyScore>,
    pub weighted_score: f64,
    pub unweighted_mean: f64,
    /// Renormalized weights actually applied; sums to 1.0.
    pub weights_used: BTreeMap<Competency, f64>,
    /// Share of the configured weight carried by present competencies.
    pub coverage: f64,
    pub recommendation: Recommendation,
    pub synthesis: Synthesis,
    pub flags: Vec<ConsistencyFlag>,
}

/// Apply adversarial adjustments to the competencies they target.
///
/// The last adjustment for a competency wins. Originals are never modified.
pub fn effective_results(
    results: &[CompetencyResult],
    validations: &[AdversarialResult],
) -> AggregationResult<Vec<CompetencyResult>> {
    results
        .iter()
        .map(|r| {
            match validations
                .iter()
                .rev()
                .find(|v| v.competency == r.competency())
            {
                Some(v) => Ok(r.with_adjustment(v.adjusted_score, v.adjusted_confidence)?),
                None => Ok(r.clone()),
            }
        })
        .collect()
}

/// `Σ(score·w) / Σ(w)` over results whose competency carries a weight.
///
/// Returns the score and the renormalized weights that produced it.
pub fn weighted_score(
    results: &[CompetencyResult],
    weights: &CompetencyWeights,
) -> AggregationResult<(f64, BTreeMap<Competency, f64>)> {
    if results.is_empty() {
        return Err(AggregationError::NoResults);
    }
    let weighted: Vec<(Competency, f64, f64)> = results
        .iter()
        .filter_map(|r| {
            let w = weights.get(r.competency())?;
            Some((r.competency(), r.score(), w))
        })
        .collect();
    let total: f64 = weighted.iter().map(|(_, _, w)| w).sum();
    if total <= 0.0 {
        return Err(AggregationError::ZeroWeight);
    }
    let score = weighted.iter().map(|(_, s, w)| s * w).sum::<f64>() / total;
    let used = weighted.iter().map(|(c, _, w)| (*c, w / total)).collect();
    Ok((score, used))
}

/// Everything the aggregator needs from earlier phases.
#[derive(Debug, Clone, Copy)]
pub struct AggregationInput<'a> {
    pub results: &'a [CompetencyResult],
    pub conflicts: &'a [EvidenceConflict],
    pub mediations: &'a [MediationResult],
    pub validations: &'a [AdversarialResult],
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    weights: CompetencyWeights,
    config: AggregationConfig,
}

impl Aggregator {
    pub fn new(weights: CompetencyWeights, config: AggregationConfig) -> Self {
        Self { weights, config }
    }

    pub fn aggregate(&self, input: AggregationInput<'_>) -> AggregationResult<FinalVerdict> {
        let effective = effective_results(input.results, input.validations)?;

        let configured: f64 = self.weights.iter().map(|(_, w)| w).sum();
        let present: f64 = effective
            .iter()
            .filter_map(|r| self.weights.get(r.competency()))
            .sum();
        let coverage = if configured > 0.0 {
            present / configured
        } else {
            0.0
        };
        if coverage < self.config.min_coverage {
            return Err(AggregationError::InsufficientCoverage {
                coverage,
                min_coverage: self.config.min_coverage,
            });
        }

        let (weighted, weights_used) = weighted_score(&effective, &self.weights)?;
        let unweighted_mean =
            effective.iter().map(|r| r.score()).sum::<f64>() / effective.len() as f64;
        let recommendation = Recommendation::from_score(weighted, &self.config.tiers);

        let flags = consistency::check(
            &consistency::ConsistencyInput {
                effective: &effective,
                weighted_score: weighted,
                unweighted_mean,
                configured: &self.weights,
                conflicts: input.conflicts,
                mediations: input.mediations,
            },
            &self.config,
        );
        let synthesis = synthesis::synthesize(
            &effective,
            weighted,
            recommendation,
            self.config.max_highlights,
        );

        let competency_scores = effective
            .iter()
            .map(|r| {
                (
                    r.competency(),
                    CompetencyScore {
                        score: r.score(),
                        confidence: r.confidence().overall,
                        adjusted: input
                            .validations
                            .iter()
                            .any(|v| v.competency == r.competency()),
                    },
                )
            })
            .collect();

        debug!(
            weighted_score = weighted,
            recommendation = %recommendation,
            flags = flags.len(),
            "aggregated"
        );
        Ok(FinalVerdict {
            competency_scores,
            weighted_score: weighted,
            unweighted_mean,
            weights_used,
            coverage,
            recommendation,
            synthesis,
            flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Citation, CompetencyResultFields, ConfidenceProfile};

    fn result(competency: Competency, score: f64, overall: f64) -> CompetencyResult {
        CompetencyResult::new(CompetencyResultFields {
            competency,
            score,
            reasoning: String::new(),
            strengths: vec![format!("{competency} strength")],
            weaknesses: vec![],
            confidence: ConfidenceProfile::overall(overall),
            evidence: vec![],
        })
        .unwrap()
    }

    fn weights() -> CompetencyWeights {
        CompetencyWeights::from_pairs([
            (Competency::ProblemSolving, 0.5),
            (Competency::Communication, 0.3),
            (Competency::Collaboration, 0.2),
        ])
        .unwrap()
    }

    fn input(results: &[CompetencyResult]) -> AggregationInput<'_> {
        AggregationInput {
            results,
            conflicts: &[],
            mediations: &[],
            validations: &[],
        }
    }

    #[test]
    fn test_weighted_score_example() {
        let results = vec![
            result(Competency::ProblemSolving, 80.0, 0.9),
            result(Competency::Communication, 70.0, 0.9),
            result(Competency::Collaboration, 90.0, 0.9),
        ];
        let verdict = Aggregator::new(weights(), AggregationConfig::default())
            .aggregate(input(&results))
            .unwrap();
        assert!((verdict.weighted_score - 79.0).abs() < 1e-6);
        assert_eq!(verdict.recommendation, Recommendation::Hire);
        assert!(verdict.flags.is_empty());
        assert_eq!(verdict.coverage, 1.0);
    }

    #[test]
    fn test_missing_competency_renormalizes_weights() {
        let results = vec![
            result(Competency::ProblemSolving, 80.0, 0.9),
            result(Competency::Collaboration, 90.0, 0.9),
        ];
        let verdict = Aggregator::new(weights(), AggregationConfig::default())
            .aggregate(input(&results))
            .unwrap();
        // (80*0.5 + 90*0.2) / 0.7
        assert!((verdict.weighted_score - 58.0 / 0.7).abs() < 1e-6);
        let total: f64 = verdict.weights_used.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(verdict.flags.contains(&ConsistencyFlag::MissingCompetencies {
            missing: vec![Competency::Communication]
        }));
    }

    #[test]
    fn test_coverage_floor_rejects_sparse_results() {
        let results = vec![result(Competency::Communication, 80.0, 0.9)];
        let config = AggregationConfig {
            min_coverage: 0.5,
            ..AggregationConfig::default()
        };
        let err = Aggregator::new(weights(), config)
            .aggregate(input(&results))
            .unwrap_err();
        match err {
            AggregationError::InsufficientCoverage { coverage, .. } => {
                assert!((coverage - 0.3).abs() < 1e-9);
            }
            other => panic!("expected InsufficientCoverage, got {other:?}"),
        }
    }

    #[test]
    fn test_coverage_counts_weight_not_competencies() {
        let config = AggregationConfig {
            min_coverage: 0.6,
            ..AggregationConfig::default()
        };
        // Two of three competencies, but only half the configured weight.
        let light = vec![
            result(Competency::Communication, 80.0, 0.9),
            result(Competency::Collaboration, 70.0, 0.9),
        ];
        let err = Aggregator::new(weights(), config.clone())
            .aggregate(input(&light))
            .unwrap_err();
        assert!(matches!(err, AggregationError::InsufficientCoverage { .. }));

        // One of three competencies carrying the heaviest weight.
        let config = AggregationConfig {
            min_coverage: 0.4,
            ..config
        };
        let heavy = vec![result(Competency::ProblemSolving, 80.0, 0.9)];
        let verdict = Aggregator::new(weights(), config)
            .aggregate(input(&heavy))
            .unwrap();
        assert!((verdict.coverage - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_no_results_is_fatal() {
        let err = Aggregator::new(weights(), AggregationConfig::default())
            .aggregate(input(&[]))
            .unwrap_err();
        assert!(matches!(err, AggregationError::NoResults));
    }

    #[test]
    fn test_zero_total_weight_is_fatal() {
        let weights = CompetencyWeights::from_pairs([(Competency::Leadership, 0.0)]).unwrap();
        let results = vec![result(Competency::Leadership, 80.0, 0.9)];
        let err = weighted_score(&results, &weights).unwrap_err();
        assert!(matches!(err, AggregationError::ZeroWeight));
    }

    #[test]
    fn test_adversarial_adjustment_replaces_score_and_confidence() {
        let results = vec![
            result(Competency::ProblemSolving, 80.0, 0.9),
            result(Competency::Communication, 70.0, 0.3),
            result(Competency::Collaboration, 90.0, 0.9),
        ];
        let validations = vec![AdversarialResult {
            competency: Competency::Communication,
            original_score: 70.0,
            original_confidence: 0.3,
            adjusted_score: 40.0,
            adjusted_confidence: 0.8,
            rationale: "answers lacked structure".to_string(),
        }];
        let verdict = Aggregator::new(weights(), AggregationConfig::default())
            .aggregate(AggregationInput {
                validations: &validations,
                ..input(&results)
            })
            .unwrap();
        // 80*0.5 + 40*0.3 + 90*0.2
        assert!((verdict.weighted_score - 70.0).abs() < 1e-6);
        let communication = &verdict.competency_scores[&Competency::Communication];
        assert!(communication.adjusted);
        assert_eq!(communication.confidence, 0.8);
        assert!(!verdict
            .flags
            .iter()
            .any(|f| matches!(f, ConsistencyFlag::LowConfidence { .. })));
    }

    #[test]
    fn test_flags_raised_for_divergence_low_confidence_and_unmediated_conflicts() {
        let weights = CompetencyWeights::from_pairs([
            (Competency::ProblemSolving, 0.9),
            (Competency::Communication, 0.1),
        ])
        .unwrap();
        let results = vec![
            result(Competency::ProblemSolving, 95.0, 0.4),
            result(Competency::Communication, 40.0, 0.9),
        ];
        let conflicts = vec![EvidenceConflict {
            segment_id: "S1".into(),
            citations: vec![
                Citation {
                    competency: Competency::ProblemSolving,
                    quality: 0.9,
                },
                Citation {
                    competency: Competency::Communication,
                    quality: 0.2,
                },
            ],
            gap: 0.7,
            priority: 1,
        }];
        let verdict = Aggregator::new(weights, AggregationConfig::default())
            .aggregate(AggregationInput {
                conflicts: &conflicts,
                ..input(&results)
            })
            .unwrap();
        // weighted 89.5, mean 67.5
        assert_eq!(verdict.recommendation, Recommendation::StrongHire);
        assert!(verdict
            .flags
            .iter()
            .any(|f| matches!(f, ConsistencyFlag::WeightedDivergence { .. })));
        assert!(verdict.flags.contains(&ConsistencyFlag::LowConfidence {
            competency: Competency::ProblemSolving,
            confidence: 0.4
        }));
        assert!(verdict.flags.contains(&ConsistencyFlag::UnresolvedConflicts {
            detected: 1,
            mediated: 0
        }));
    }

    #[test]
    fn test_tier_boundaries_are_inclusive() {
        let tiers = TierThresholds::default();
        let tier = |score| Recommendation::from_score(score, &tiers);
        assert_eq!(tier(85.0), Recommendation::StrongHire);
        assert_eq!(tier(84.99), Recommendation::Hire);
        assert_eq!(tier(70.0), Recommendation::Hire);
        assert_eq!(tier(60.0), Recommendation::Hold);
        assert_eq!(tier(59.9), Recommendation::NoHire);
    }
}
