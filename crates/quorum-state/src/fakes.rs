//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryRunStore` and `MemoryLearningMemory` that satisfy the
//! trait contracts without touching the filesystem.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;

/// Frequency at which an observed pattern becomes mandatory.
pub const MANDATORY_FREQUENCY: u32 = 3;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// MemoryRunStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct RunState {
    record: RunRecord,
    records: Vec<AuditRecord>,
}

/// In-memory run artifact store backed by a `HashMap<RunId, RunState>`.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    runs: Mutex<HashMap<String, RunState>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs created so far.
    pub fn run_count(&self) -> usize {
        lock(&self.runs).len()
    }
}

#[async_trait]
impl RunArtifactStore for MemoryRunStore {
    async fn begin_run(&self, manifest: RunManifest) -> StorageResult<RunId> {
        let run_id = RunId::new();
        let record = RunRecord {
            run_id: run_id.clone(),
            manifest,
            status: RunStatus::Running,
            summary: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        lock(&self.runs).insert(
            run_id.0.clone(),
            RunState {
                record,
                records: Vec::new(),
            },
        );
        Ok(run_id)
    }

    async fn append(
        &self,
        run_id: &RunId,
        kind: RecordKind,
        payload: serde_json::Value,
    ) -> StorageResult<u64> {
        let mut runs = lock(&self.runs);
        let state = runs
            .get_mut(&run_id.0)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })?;
        if state.record.status != RunStatus::Running {
            return Err(StorageError::InvalidRunState {
                run_id: run_id.0.clone(),
                status: format!("{:?}", state.record.status),
                expected: "Running".to_string(),
            });
        }
        let seq = state.records.len() as u64 + 1;
        state.records.push(AuditRecord {
            seq,
            kind,
            payload,
            timestamp: Utc::now(),
        });
        Ok(seq)
    }

    async fn finish_run(&self, run_id: &RunId, summary: RunSummary) -> StorageResult<()> {
        let mut runs = lock(&self.runs);
        let state = runs
            .get_mut(&run_id.0)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })?;
        if state.record.status != RunStatus::Running {
            return Err(StorageError::InvalidRunState {
                run_id: run_id.0.clone(),
                status: format!("{:?}", state.record.status),
                expected: "Running".to_string(),
            });
        }
        state.record.status = RunStatus::Completed;
        state.record.summary = Some(summary);
        state.record.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        lock(&self.runs)
            .get(&run_id.0)
            .map(|s| s.record.clone())
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })
    }

    async fn get_records(&self, run_id: &RunId) -> StorageResult<Vec<AuditRecord>> {
        lock(&self.runs)
            .get(&run_id.0)
            .map(|s| s.records.clone())
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })
    }
}

// ---------------------------------------------------------------------------
// MemoryLearningMemory
// ---------------------------------------------------------------------------

/// In-memory learning memory keyed by `(domain, pattern_id)`.
///
/// Repeated observations of the same pattern id bump its frequency; a
/// pattern becomes mandatory at [`MANDATORY_FREQUENCY`].
#[derive(Debug, Default)]
pub struct MemoryLearningMemory {
    patterns: Mutex<HashMap<String, Vec<KnownPattern>>>,
}

impl MemoryLearningMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a domain with known patterns.
    pub fn with_patterns(self, domain: &str, patterns: Vec<KnownPattern>) -> Self {
        lock(&self.patterns)
            .entry(domain.to_string())
            .or_default()
            .extend(patterns);
        self
    }
}

#[async_trait]
impl LearningMemory for MemoryLearningMemory {
    async fn known_patterns(&self, domain: &str) -> StorageResult<Vec<KnownPattern>> {
        Ok(lock(&self.patterns)
            .get(domain)
            .cloned()
            .unwrap_or_default())
    }

    async fn record_observations(
        &self,
        domain: &str,
        observations: Vec<PatternObservation>,
    ) -> StorageResult<()> {
        let mut patterns = lock(&self.patterns);
        let known = patterns.entry(domain.to_string()).or_default();

        for obs in observations {
            match known.iter_mut().find(|p| p.pattern_id == obs.pattern_id) {
                Some(existing) => {
                    existing.frequency += 1;
                    existing.last_seen = obs.observed_at;
                    existing.mandatory = existing.frequency >= MANDATORY_FREQUENCY;
                }
                None => known.push(KnownPattern {
                    pattern_id: obs.pattern_id,
                    criterion_id: obs.criterion_id,
                    description: obs.description,
                    severity: obs.severity,
                    frequency: 1,
                    first_seen: obs.observed_at,
                    last_seen: obs.observed_at,
                    mandatory: MANDATORY_FREQUENCY <= 1,
                }),
            }
        }
        Ok(())
    }
}
