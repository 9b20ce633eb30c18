//! Evaluation configuration.
//!
//! Every section defaults independently, so a TOML file only needs to carry
//! the values it overrides:
//!
//! ```toml
//! [detection]
//! conflict_threshold = 0.35
//!
//! [weights]
//! problem_solving = 0.5
//! communication = 0.3
//! collaboration = 0.2
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{Competency, CompetencyWeights};

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Agent invocation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Per-call deadline enforced by the invoker. `None` leaves timeouts to
    /// the agent client.
    pub call_timeout_ms: Option<u64>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            call_timeout_ms: Some(60_000),
        }
    }
}

impl AgentSettings {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}

/// Rule-based detection thresholds and caps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum quality gap (0–1) between citations of one segment.
    pub conflict_threshold: f64,
    pub max_conflicts: usize,
    /// Overall confidence below this is an issue.
    pub confidence_threshold: f64,
    pub max_issues: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            conflict_threshold: 0.4,
            max_conflicts: 5,
            confidence_threshold: 0.6,
            max_issues: 5,
        }
    }
}

/// Remediation round limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaborationConfig {
    /// When false, detection still runs but remediation never does.
    pub enabled: bool,
    pub max_mediations: usize,
    pub max_validations: usize,
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_mediations: 3,
            max_validations: 5,
        }
    }
}

/// Lower bounds (inclusive, 0–100) of each recommendation tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub strong_hire: f64,
    pub hire: f64,
    pub hold: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            strong_hire: 85.0,
            hire: 70.0,
            hold: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub tiers: TierThresholds,
    /// Points of |unweighted mean - weighted score| that raise a flag.
    pub divergence_threshold: f64,
    /// Post-remediation confidence below this raises a flag.
    pub actionable_confidence: f64,
    /// Minimum share of the configured weight that present competencies
    /// must carry.
    /// `0.0` always renormalizes over whatever is present.
    pub min_coverage: f64,
    /// Cap on synthesized strengths and weaknesses.
    pub max_highlights: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            tiers: TierThresholds::default(),
            divergence_threshold: 10.0,
            actionable_confidence: 0.5,
            min_coverage: 0.0,
            max_highlights: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    pub enabled: bool,
    /// Observations a job baseline needs before z-scores are reported.
    pub min_population: u64,
    /// Fold each completed run's raw score into the job baseline.
    pub record_observations: bool,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_population: 5,
            record_observations: true,
        }
    }
}

/// Competency-specific configuration forwarded to the scoring agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetencyConfig {
    pub rubric: Option<String>,
    pub focus_areas: Vec<String>,
}

/// Top-level configuration for one evaluation pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub agent: AgentSettings,
    pub detection: DetectionConfig,
    pub collaboration: CollaborationConfig,
    pub aggregation: AggregationConfig,
    pub normalization: NormalizationConfig,
    /// Configured competency set and importance weights.
    pub weights: CompetencyWeights,
    pub competencies: BTreeMap<Competency, CompetencyConfig>,
}

fn unit_range(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be within 0..=1, got {value}"
        )))
    }
}

impl EvaluationConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.weights.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one competency must be configured".to_string(),
            ));
        }
        unit_range(
            "detection.conflict_threshold",
            self.detection.conflict_threshold,
        )?;
        unit_range(
            "detection.confidence_threshold",
            self.detection.confidence_threshold,
        )?;
        unit_range(
            "aggregation.actionable_confidence",
            self.aggregation.actionable_confidence,
        )?;
        unit_range("aggregation.min_coverage", self.aggregation.min_coverage)?;

        let t = &self.aggregation.tiers;
        if !(t.hold <= t.hire && t.hire <= t.strong_hire) {
            return Err(ConfigError::Invalid(format!(
                "tier thresholds must satisfy hold <= hire <= strong_hire, got {} / {} / {}",
                t.hold, t.hire, t.strong_hire
            )));
        }
        if !(0.0..=100.0).contains(&t.hold) || !(0.0..=100.0).contains(&t.strong_hire) {
            return Err(ConfigError::Invalid(
                "tier thresholds must lie within 0..=100".to_string(),
            ));
        }
        if self.aggregation.divergence_threshold < 0.0 {
            return Err(ConfigError::Invalid(
                "aggregation.divergence_threshold must be non-negative".to_string(),
            ));
        }
        if self.agent.call_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "agent.call_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Competency-specific configuration, defaulted when absent.
    pub fn competency_config(&self, competency: Competency) -> CompetencyConfig {
        self.competencies
            .get(&competency)
            .cloned()
            .unwrap_or_default()
    }
}
