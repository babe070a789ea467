//! Quorum-State: storage seams for the Quorum quality gate
//!
//! This crate provides the persistence layer for evaluation runs. The
//! aggregation engine only talks to the traits defined here; backends are
//! swappable.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: audit integrity and append-only run records.
//!
//! ## Key Components
//!
//! - `RunArtifactStore`: append-only audit trail for one run
//! - `LearningMemory`: known failure patterns across runs
//! - `FsRunStore`: filesystem backend with digest-verified records
//! - `fakes`: in-memory implementations for tests

mod error;
pub mod fakes;
pub mod fs_store;
pub mod storage_traits;

pub use error::StorageError;
pub use fs_store::FsRunStore;
pub use storage_traits::{
    AuditRecord, ContentDigest, KnownPattern, LearningMemory, PatternObservation, RecordKind,
    RunArtifactStore, RunId, RunManifest, RunRecord, RunStatus, RunSummary, StorageResult,
};
