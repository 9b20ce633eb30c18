//! Storage trait definitions for Verdict
//!
//! These traits define the storage collaborators the orchestrator talks to:
//! - `ArtifactStore`: fire-and-forget audit log of intermediate JSON artifacts
//! - `BaselineStore`: per-job population statistics used for score normalization
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Content digests
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Digest of the canonical (compact) JSON encoding of `value`.
    pub fn from_json(value: &serde_json::Value) -> StorageResult<Self> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ArtifactStore: audit artifacts
// ---------------------------------------------------------------------------

/// Identifies one artifact: `<run_id>/<name>`.
///
/// Both parts are restricted to `[A-Za-z0-9._-]` (and may not be `.` or `..`)
/// so every backend can map a key onto a path or table row verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactKey {
    run_id: String,
    name: String,
}

impl ArtifactKey {
    pub fn new(run_id: impl Into<String>, name: impl Into<String>) -> StorageResult<Self> {
        let run_id = run_id.into();
        let name = name.into();
        for part in [&run_id, &name] {
            validate_key_part(part).map_err(|reason| StorageError::InvalidKey {
                key: format!("{run_id}/{name}"),
                reason,
            })?;
        }
        Ok(Self { run_id, name })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.run_id, self.name)
    }
}

pub(crate) fn validate_key_part(part: &str) -> std::result::Result<(), String> {
    if part.is_empty() {
        return Err("empty key component".to_string());
    }
    if part == "." || part == ".." {
        return Err("relative path component".to_string());
    }
    if let Some(bad) = part
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(format!("unsupported character {bad:?}"));
    }
    Ok(())
}

/// An artifact as returned by [`ArtifactStore::get`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub key: ArtifactKey,
    pub digest: ContentDigest,
    pub blob: serde_json::Value,
    pub stored_at: DateTime<Utc>,
}

/// Keyed store for opaque JSON artifacts.
///
/// Guarantees:
/// - `put(key, blob)` returns the SHA-256 digest of the compact JSON encoding.
/// - Writing the same key again replaces the previous artifact.
/// - `get(key)` returns `StorageError::NotFound` for unknown keys.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `blob` under `key` and return its content digest.
    async fn put(&self, key: &ArtifactKey, blob: &serde_json::Value)
        -> StorageResult<ContentDigest>;

    /// Retrieve a previously stored artifact.
    async fn get(&self, key: &ArtifactKey) -> StorageResult<StoredArtifact>;

    /// List the keys stored for one run, sorted by name.
    async fn list(&self, run_id: &str) -> StorageResult<Vec<ArtifactKey>>;
}

// ---------------------------------------------------------------------------
// BaselineStore: population statistics
// ---------------------------------------------------------------------------

/// Running mean / variance of raw weighted scores for one job.
///
/// Updated with Welford's online algorithm so observations never need to be
/// retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationBaseline {
    pub job_id: String,
    pub count: u64,
    pub mean: f64,
    /// Sum of squared deviations from the mean.
    pub m2: f64,
    pub updated_at: DateTime<Utc>,
}

impl PopulationBaseline {
    pub fn empty(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            count: 0,
            mean: 0.0,
            m2: 0.0,
            updated_at: Utc::now(),
        }
    }

    /// Fold one observation into the running statistics.
    pub fn observe(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.updated_at = Utc::now();
    }

    /// Population variance; zero with fewer than two observations.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Per-job population baselines.
#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// Current baseline for `job_id`, or `None` if nothing was observed yet.
    async fn get(&self, job_id: &str) -> StorageResult<Option<PopulationBaseline>>;

    /// Atomically fold `value` into the baseline for `job_id` and return the
    /// updated baseline.
    async fn observe(&self, job_id: &str, value: f64) -> StorageResult<PopulationBaseline>;
}
