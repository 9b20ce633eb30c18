//! Competency identifiers and the tables keyed by them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ValidationError;

/// One scored dimension of candidate ability.
///
/// Declaration order is the canonical iteration order everywhere a stable
/// order is needed (fan-out slots, issue encounter order, reports).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Competency {
    ProblemSolving,
    TechnicalKnowledge,
    Communication,
    Collaboration,
    Leadership,
    Adaptability,
}

impl Competency {
    pub const ALL: [Competency; 6] = [
        Competency::ProblemSolving,
        Competency::TechnicalKnowledge,
        Competency::Communication,
        Competency::Collaboration,
        Competency::Leadership,
        Competency::Adaptability,
    ];

    /// Stable wire identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Competency::ProblemSolving => "problem_solving",
            Competency::TechnicalKnowledge => "technical_knowledge",
            Competency::Communication => "communication",
            Competency::Collaboration => "collaboration",
            Competency::Leadership => "leadership",
            Competency::Adaptability => "adaptability",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Competency::ProblemSolving => "Problem Solving",
            Competency::TechnicalKnowledge => "Technical Knowledge",
            Competency::Communication => "Communication",
            Competency::Collaboration => "Collaboration",
            Competency::Leadership => "Leadership",
            Competency::Adaptability => "Adaptability",
        }
    }

    /// Weight used when no job-specific weighting is configured.
    pub fn default_weight(self) -> f64 {
        match self {
            Competency::ProblemSolving => 0.25,
            Competency::TechnicalKnowledge => 0.25,
            Competency::Communication => 0.15,
            Competency::Collaboration => 0.15,
            Competency::Leadership => 0.10,
            Competency::Adaptability => 0.10,
        }
    }
}

impl fmt::Display for Competency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Competency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Competency::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownCompetency(s.to_string()))
    }
}

/// Importance weighting per competency.
///
/// The key set is the configured competency set for a run. Weights are
/// non-negative but need not sum to 1.0; the aggregator renormalizes over
/// whichever competencies actually produced a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<Competency, f64>", into = "BTreeMap<Competency, f64>")]
pub struct CompetencyWeights(BTreeMap<Competency, f64>);

impl CompetencyWeights {
    pub fn new(weights: BTreeMap<Competency, f64>) -> Result<Self, ValidationError> {
        for (competency, value) in &weights {
            if !value.is_finite() || *value < 0.0 {
                return Err(ValidationError::InvalidWeight {
                    competency: *competency,
                    value: *value,
                });
            }
        }
        Ok(Self(weights))
    }

    /// Convenience constructor from `(competency, weight)` pairs.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (Competency, f64)>,
    {
        Self::new(pairs.into_iter().collect())
    }

    /// Weight for `competency`, or `None` if it is not configured.
    pub fn get(&self, competency: Competency) -> Option<f64> {
        self.0.get(&competency).copied()
    }

    /// Configured competencies in declaration order.
    pub fn competencies(&self) -> impl Iterator<Item = Competency> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Competency, f64)> + '_ {
        self.0.iter().map(|(c, w)| (*c, *w))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for CompetencyWeights {
    fn default() -> Self {
        Self(
            Competency::ALL
                .into_iter()
                .map(|c| (c, c.default_weight()))
                .collect(),
        )
    }
}

impl TryFrom<BTreeMap<Competency, f64>> for CompetencyWeights {
    type Error = ValidationError;

    fn try_from(map: BTreeMap<Competency, f64>) -> Result<Self, Self::Error> {
        Self::new(map)
    }
}

impl From<CompetencyWeights> for BTreeMap<Competency, f64> {
    fn from(weights: CompetencyWeights) -> Self {
        weights.0
    }
}
