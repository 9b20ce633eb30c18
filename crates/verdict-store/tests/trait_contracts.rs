//! Trait contract tests for ArtifactStore and BaselineStore.
//!
//! Every contract runs against both the in-memory fake and the filesystem
//! store; any conforming implementation must pass these.

use std::sync::Arc;

use serde_json::json;
use verdict_store::fakes::{MemoryArtifactStore, MemoryBaselineStore};
use verdict_store::storage_traits::*;
use verdict_store::{FsArtifactStore, FsBaselineStore, StorageError};

fn key(run: &str, name: &str) -> ArtifactKey {
    ArtifactKey::new(run, name).unwrap()
}

async fn assert_put_get_contract(store: &dyn ArtifactStore) {
    let blob = json!({"phase": "evaluating", "results": 3});
    let digest = store.put(&key("run-1", "evaluating"), &blob).await.unwrap();
    assert_eq!(digest, ContentDigest::from_json(&blob).unwrap());

    let stored = store.get(&key("run-1", "evaluating")).await.unwrap();
    assert_eq!(stored.blob, blob);
    assert_eq!(stored.digest, digest);
}

async fn assert_not_found_contract(store: &dyn ArtifactStore) {
    let err = store.get(&key("run-x", "missing")).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
}

async fn assert_overwrite_contract(store: &dyn ArtifactStore) {
    store
        .put(&key("run-2", "trace"), &json!({"v": 1}))
        .await
        .unwrap();
    store
        .put(&key("run-2", "trace"), &json!({"v": 2}))
        .await
        .unwrap();
    let stored = store.get(&key("run-2", "trace")).await.unwrap();
    assert_eq!(stored.blob, json!({"v": 2}));
}

async fn assert_list_contract(store: &dyn ArtifactStore) {
    store.put(&key("run-3", "b"), &json!(1)).await.unwrap();
    store.put(&key("run-3", "a"), &json!(2)).await.unwrap();
    store.put(&key("run-4", "a"), &json!(3)).await.unwrap();

    let keys = store.list("run-3").await.unwrap();
    let names: Vec<&str> = keys.iter().map(|k| k.name()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert!(store.list("run-unknown").await.unwrap().is_empty());
}

// ===========================================================================
// ArtifactStore contract tests
// ===========================================================================

#[tokio::test]
async fn memory_store_satisfies_artifact_contracts() {
    let store = MemoryArtifactStore::new();
    assert_put_get_contract(&store).await;
    assert_not_found_contract(&store).await;
    assert_overwrite_contract(&store).await;
    assert_list_contract(&store).await;
}

#[tokio::test]
async fn fs_store_satisfies_artifact_contracts() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsArtifactStore::new(dir.path()).unwrap();
    assert_put_get_contract(&store).await;
    assert_not_found_contract(&store).await;
    assert_overwrite_contract(&store).await;
    assert_list_contract(&store).await;
}

#[tokio::test]
async fn fs_store_detects_tampered_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsArtifactStore::new(dir.path()).unwrap();
    store
        .put(&key("run-5", "verdict"), &json!({"score": 79.0}))
        .await
        .unwrap();

    let path = dir.path().join("run-5").join("verdict.json");
    let tampered = std::fs::read_to_string(&path)
        .unwrap()
        .replace("79.0", "99.0");
    std::fs::write(&path, tampered).unwrap();

    let err = store.get(&key("run-5", "verdict")).await.unwrap_err();
    assert!(matches!(err, StorageError::DigestMismatch { .. }));
}

// ===========================================================================
// BaselineStore contract tests
// ===========================================================================

async fn assert_unknown_job_contract(store: &dyn BaselineStore) {
    assert!(store.get("job-unknown").await.unwrap().is_none());
}

async fn assert_accumulates_per_job_contract(store: &dyn BaselineStore) {
    store.observe("job-a", 70.0).await.unwrap();
    let updated = store.observe("job-a", 80.0).await.unwrap();
    store.observe("job-b", 10.0).await.unwrap();

    assert_eq!(updated.count, 2);
    assert!((updated.mean - 75.0).abs() < 1e-9);

    let b = store.get("job-b").await.unwrap().unwrap();
    assert_eq!(b.count, 1);
}

async fn assert_concurrent_observations_contract(store: Arc<dyn BaselineStore>) {
    let mut handles = Vec::new();
    for i in 0..20 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.observe("job-c", i as f64).await.unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    let baseline = store.get("job-c").await.unwrap().unwrap();
    assert_eq!(baseline.count, 20);
    assert!((baseline.mean - 9.5).abs() < 1e-9);
}

#[tokio::test]
async fn memory_store_satisfies_baseline_contracts() {
    let store = Arc::new(MemoryBaselineStore::new());
    assert_unknown_job_contract(&*store).await;
    assert_accumulates_per_job_contract(&*store).await;
    assert_concurrent_observations_contract(store).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fs_store_satisfies_baseline_contracts() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsBaselineStore::new(dir.path()).unwrap());
    assert_unknown_job_contract(&*store).await;
    assert_accumulates_per_job_contract(&*store).await;
    assert_concurrent_observations_contract(store).await;
}

#[tokio::test]
async fn fs_baselines_survive_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let first = FsBaselineStore::new(dir.path()).unwrap();
    first.observe("job-e", 60.0).await.unwrap();
    first.observe("job-e", 80.0).await.unwrap();
    drop(first);

    let reopened = FsBaselineStore::new(dir.path()).unwrap();
    let baseline = reopened.get("job-e").await.unwrap().unwrap();
    assert_eq!(baseline.count, 2);
    assert!((baseline.mean - 70.0).abs() < 1e-9);
    assert!(dir.path().join("job-e.json").is_file());
}

#[tokio::test]
async fn fs_baselines_reject_path_like_job_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsBaselineStore::new(dir.path()).unwrap();
    let err = store.observe("../escape", 1.0).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidKey { .. }));
    assert!(store.get("..").await.is_err());
}

#[tokio::test]
async fn baseline_seeded_store_reports_observations() {
    let store = MemoryBaselineStore::with_observations("job-d", &[50.0, 60.0, 70.0]);
    let baseline = store.get("job-d").await.unwrap().unwrap();
    assert_eq!(baseline.count, 3);
    assert!((baseline.mean - 60.0).abs() < 1e-9);
}
