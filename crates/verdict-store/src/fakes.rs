//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryArtifactStore` and `MemoryBaselineStore` that satisfy the
//! trait contracts without touching the filesystem.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Backend("memory store lock poisoned".to_string())
}

// ---------------------------------------------------------------------------
// MemoryArtifactStore
// ---------------------------------------------------------------------------

/// In-memory artifact store backed by a `BTreeMap<key, artifact>`.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<BTreeMap<ArtifactKey, StoredArtifact>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of artifacts across all runs.
    pub fn len(&self) -> usize {
        self.artifacts.lock().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(
        &self,
        key: &ArtifactKey,
        blob: &serde_json::Value,
    ) -> StorageResult<ContentDigest> {
        let digest = ContentDigest::from_json(blob)?;
        let mut artifacts = self.artifacts.lock().map_err(poisoned)?;
        artifacts.insert(
            key.clone(),
            StoredArtifact {
                key: key.clone(),
                digest: digest.clone(),
                blob: blob.clone(),
                stored_at: Utc::now(),
            },
        );
        Ok(digest)
    }

    async fn get(&self, key: &ArtifactKey) -> StorageResult<StoredArtifact> {
        let artifacts = self.artifacts.lock().map_err(poisoned)?;
        artifacts
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn list(&self, run_id: &str) -> StorageResult<Vec<ArtifactKey>> {
        let artifacts = self.artifacts.lock().map_err(poisoned)?;
        Ok(artifacts
            .keys()
            .filter(|k| k.run_id() == run_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryBaselineStore
// ---------------------------------------------------------------------------

/// In-memory baseline store backed by a `HashMap<job_id, baseline>`.
#[derive(Debug, Default)]
pub struct MemoryBaselineStore {
    baselines: Mutex<HashMap<String, PopulationBaseline>>,
}

impl MemoryBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a job with pre-existing observations.
    pub fn with_observations(job_id: &str, values: &[f64]) -> Self {
        let mut baseline = PopulationBaseline::empty(job_id);
        for v in values {
            baseline.observe(*v);
        }
        let store = Self::default();
        if let Ok(mut map) = store.baselines.lock() {
            map.insert(job_id.to_string(), baseline);
        }
        store
    }
}

#[async_trait]
impl BaselineStore for MemoryBaselineStore {
    async fn get(&self, job_id: &str) -> StorageResult<Option<PopulationBaseline>> {
        let baselines = self.baselines.lock().map_err(poisoned)?;
        Ok(baselines.get(job_id).cloned())
    }

    async fn observe(&self, job_id: &str, value: f64) -> StorageResult<PopulationBaseline> {
        let mut baselines = self.baselines.lock().map_err(poisoned)?;
        let baseline = baselines
            .entry(job_id.to_string())
            .or_insert_with(|| PopulationBaseline::empty(job_id));
        baseline.observe(value);
        Ok(baseline.clone())
    }
}
