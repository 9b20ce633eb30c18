//! Population normalization.
//!
//! Maps a raw weighted score onto the job's population baseline:
//! `normalized = clamp(50 + 10 * z, 0, 100)` with `z = (raw - mean) / std`.
//! Reading and recording are separate steps, so normalizing the same score
//! twice gives the same answer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use verdict_store::{BaselineStore, PopulationBaseline};

use crate::config::NormalizationConfig;

use super::error::AggregationResult;

/// Outcome of normalizing one raw score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NormalizedScore {
    Normalized {
        raw: f64,
        z_score: f64,
        /// 0–100.
        normalized: f64,
        population: u64,
        mean: f64,
        std_dev: f64,
    },
    /// Too few observations, or no spread among them.
    InsufficientPopulation { population: u64, required: u64 },
}

impl NormalizedScore {
    pub fn normalized(&self) -> Option<f64> {
        match self {
            NormalizedScore::Normalized { normalized, .. } => Some(*normalized),
            NormalizedScore::InsufficientPopulation { .. } => None,
        }
    }
}

/// Normalizes scores against per-job baselines.
#[derive(Clone)]
pub struct Normalizer {
    store: Arc<dyn BaselineStore>,
    config: NormalizationConfig,
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Normalizer {
    pub fn new(store: Arc<dyn BaselineStore>, config: NormalizationConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &NormalizationConfig {
        &self.config
    }

    /// Normalize `raw` against the current baseline without changing it.
    pub async fn normalize(&self, job_id: &str, raw: f64) -> AggregationResult<NormalizedScore> {
        let baseline = self.store.get(job_id).await?;
        let required = self.config.min_population;
        Ok(score_against(baseline.as_ref(), raw, required))
    }

    /// Fold `raw` into the job's baseline.
    pub async fn record(&self, job_id: &str, raw: f64) -> AggregationResult<PopulationBaseline> {
        let baseline = self.store.observe(job_id, raw).await?;
        debug!(job_id = %job_id, population = baseline.count, "baseline updated");
        Ok(baseline)
    }
}

fn score_against(
    baseline: Option<&PopulationBaseline>,
    raw: f64,
    min_population: u64,
) -> NormalizedScore {
    let population = baseline.map(|b| b.count).unwrap_or(0);
    let std_dev = baseline.map(PopulationBaseline::std_dev).unwrap_or(0.0);
    match baseline {
        Some(b) if population >= min_population && std_dev > 0.0 => {
            let z_score = (raw - b.mean) / std_dev;
            NormalizedScore::Normalized {
                raw,
                z_score,
                normalized: (50.0 + 10.0 * z_score).clamp(0.0, 100.0),
                population,
                mean: b.mean,
                std_dev,
            }
        }
        _ => NormalizedScore::InsufficientPopulation {
            population,
            required: min_population,
        },
    }
}
