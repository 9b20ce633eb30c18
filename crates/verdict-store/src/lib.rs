//! Verdict-Store: storage collaborators for the evaluation orchestrator
//!
//! The orchestrator never depends on storage for correctness. It hands
//! intermediate artifacts (phase outputs, the execution log) to an
//! [`ArtifactStore`] for auditing, and reads / updates per-job
//! [`PopulationBaseline`]s through a [`BaselineStore`] when normalizing scores.
//!
//! ## Key Components
//!
//! - `ArtifactStore` / `FsArtifactStore`: keyed, digest-verified JSON artifacts
//! - `BaselineStore` / `FsBaselineStore`: running population statistics per job
//! - `fakes`: in-memory implementations for tests and offline runs

mod error;
pub mod fakes;
mod fs_store;
pub mod storage_traits;

pub use error::StorageError;
pub use fs_store::{FsArtifactStore, FsBaselineStore};
pub use storage_traits::{
    ArtifactKey, ArtifactStore, BaselineStore, ContentDigest, PopulationBaseline, StorageResult,
    StoredArtifact,
};
