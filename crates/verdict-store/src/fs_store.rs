//! Filesystem-backed stores.
//!
//! Artifacts live at `<root>/<run_id>/<name>.json`, with a companion
//! `<root>/<run_id>/<name>.digest` holding the SHA-256 of the compact JSON
//! encoding. Reads re-derive the digest and refuse tampered artifacts.
//!
//! Baselines live at `<root>/<job_id>.json`, one file per job.
//!
//! All filesystem work runs on the blocking thread pool.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::StorageError;
use crate::storage_traits::*;

async fn blocking<T, F>(f: F) -> StorageResult<T>
where
    F: FnOnce() -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// FsArtifactStore
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct Envelope {
    stored_at: DateTime<Utc>,
    blob: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn artifact_path(root: &Path, key: &ArtifactKey, ext: &str) -> PathBuf {
    root.join(key.run_id())
        .join(format!("{}.{}", key.name(), ext))
}

fn put_artifact(
    root: &Path,
    key: &ArtifactKey,
    blob: serde_json::Value,
) -> StorageResult<ContentDigest> {
    let digest = ContentDigest::from_json(&blob)?;
    let run_dir = root.join(key.run_id());
    fs::create_dir_all(&run_dir)?;

    let envelope = Envelope {
        stored_at: Utc::now(),
        blob,
    };
    let json = serde_json::to_vec_pretty(&envelope)?;
    write_atomic(&run_dir, &artifact_path(root, key, "json"), &json)?;
    let digest_path = artifact_path(root, key, "digest");
    write_atomic(&run_dir, &digest_path, digest.as_str().as_bytes())?;

    tracing::debug!(key = %key, digest = %digest.short(), "artifact written");
    Ok(digest)
}

fn get_artifact(root: &Path, key: ArtifactKey) -> StorageResult<StoredArtifact> {
    let json = fs::read(artifact_path(root, &key, "json")).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound {
                key: key.to_string(),
            }
        } else {
            StorageError::Io(e)
        }
    })?;
    let envelope: Envelope = serde_json::from_slice(&json)?;

    let recorded = fs::read_to_string(artifact_path(root, &key, "digest"))?;
    let expected = ContentDigest::try_from(recorded.trim().to_string())?;
    let actual = ContentDigest::from_json(&envelope.blob)?;
    if actual != expected {
        return Err(StorageError::DigestMismatch {
            key: key.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }

    Ok(StoredArtifact {
        key,
        digest: actual,
        blob: envelope.blob,
        stored_at: envelope.stored_at,
    })
}

fn list_artifacts(root: &Path, run_id: &str) -> StorageResult<Vec<ArtifactKey>> {
    let run_dir = root.join(run_id);
    if !run_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut keys = Vec::new();
    for entry in fs::read_dir(&run_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            keys.push(ArtifactKey::new(run_id, stem)?);
        }
    }
    keys.sort();
    Ok(keys)
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(
        &self,
        key: &ArtifactKey,
        blob: &serde_json::Value,
    ) -> StorageResult<ContentDigest> {
        let root = self.root.clone();
        let key = key.clone();
        let blob = blob.clone();
        blocking(move || put_artifact(&root, &key, blob)).await
    }

    async fn get(&self, key: &ArtifactKey) -> StorageResult<StoredArtifact> {
        let root = self.root.clone();
        let key = key.clone();
        blocking(move || get_artifact(&root, key)).await
    }

    async fn list(&self, run_id: &str) -> StorageResult<Vec<ArtifactKey>> {
        let root = self.root.clone();
        let run_id = run_id.to_string();
        blocking(move || list_artifacts(&root, &run_id)).await
    }
}

// ---------------------------------------------------------------------------
// FsBaselineStore
// ---------------------------------------------------------------------------

/// Baselines persisted as one JSON file per job.
///
/// Observations through one store are serialized, so concurrent evaluations in
/// the same process never lose an update. Separate processes sharing a root
/// are not coordinated.
#[derive(Debug, Clone)]
pub struct FsBaselineStore {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FsBaselineStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn baseline_path(root: &Path, job_id: &str) -> StorageResult<PathBuf> {
    validate_key_part(job_id).map_err(|reason| StorageError::InvalidKey {
        key: job_id.to_string(),
        reason,
    })?;
    Ok(root.join(format!("{job_id}.json")))
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Backend("baseline lock poisoned".to_string())
}

fn read_baseline(path: &Path) -> StorageResult<Option<PopulationBaseline>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::Io(e)),
    }
}

#[async_trait]
impl BaselineStore for FsBaselineStore {
    async fn get(&self, job_id: &str) -> StorageResult<Option<PopulationBaseline>> {
        let path = baseline_path(&self.root, job_id)?;
        blocking(move || read_baseline(&path)).await
    }

    async fn observe(&self, job_id: &str, value: f64) -> StorageResult<PopulationBaseline> {
        let path = baseline_path(&self.root, job_id)?;
        let root = self.root.clone();
        let job_id = job_id.to_string();
        let write_lock = Arc::clone(&self.write_lock);
        blocking(move || {
            let _guard = write_lock.lock().map_err(poisoned)?;
            let mut baseline =
                read_baseline(&path)?.unwrap_or_else(|| PopulationBaseline::empty(&job_id));
            baseline.observe(value);
            write_atomic(&root, &path, &serde_json::to_vec_pretty(&baseline)?)?;
            tracing::debug!(job_id = %job_id, count = baseline.count, "baseline updated");
            Ok(baseline)
        })
        .await
    }
}
