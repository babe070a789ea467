//! Filesystem-backed run artifact store.
//!
//! Layout per run:
//!
//! ```text
//! <root>/<run_id>/run.json        RunRecord (rewritten atomically on finish)
//! <root>/<run_id>/records.jsonl   one AuditRecord per line
//! <root>/<run_id>/records.digest  SHA-256 of records.jsonl, written on finish
//! ```
//!
//! Completed runs are integrity-checked on read: a digest mismatch between
//! `records.jsonl` and `records.digest` is reported as
//! [`StorageError::DigestMismatch`].

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::*;

const RUN_FILE: &str = "run.json";
const RECORDS_FILE: &str = "records.jsonl";
const DIGEST_FILE: &str = "records.digest";

/// Run artifact store that writes one directory per run under `root`.
pub struct FsRunStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsRunStore {
    /// Create a store rooted at `root`. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding a run's files.
    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(&run_id.0)
    }

    fn read_run(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        let path = self.run_dir(run_id).join(RUN_FILE);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::RunNotFound {
                    run_id: run_id.0.clone(),
                }
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> StorageResult<()> {
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.persist(dir.join(name)).map_err(|e| e.error)?;
        Ok(())
    }

    fn read_records_raw(&self, run_id: &RunId) -> StorageResult<Vec<u8>> {
        let path = self.run_dir(run_id).join(RECORDS_FILE);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn parse_records(bytes: &[u8]) -> StorageResult<Vec<AuditRecord>> {
        let text = String::from_utf8_lossy(bytes);
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(StorageError::from))
            .collect()
    }

    fn ensure_running(record: &RunRecord) -> StorageResult<()> {
        if record.status != RunStatus::Running {
            return Err(StorageError::InvalidRunState {
                run_id: record.run_id.0.clone(),
                status: format!("{:?}", record.status),
                expected: "Running".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RunArtifactStore for FsRunStore {
    async fn begin_run(&self, manifest: RunManifest) -> StorageResult<RunId> {
        let run_id = RunId::new();
        let dir = self.run_dir(&run_id);
        fs::create_dir_all(&dir)?;

        let record = RunRecord {
            run_id: run_id.clone(),
            manifest,
            status: RunStatus::Running,
            summary: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        Self::write_atomic(&dir, RUN_FILE, &serde_json::to_vec_pretty(&record)?)?;
        debug!(run_id = %run_id, dir = %dir.display(), "run directory created");
        Ok(run_id)
    }

    async fn append(
        &self,
        run_id: &RunId,
        kind: RecordKind,
        payload: serde_json::Value,
    ) -> StorageResult<u64> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let run = self.read_run(run_id)?;
        Self::ensure_running(&run)?;

        let existing = Self::parse_records(&self.read_records_raw(run_id)?)?;
        let seq = existing.last().map(|r| r.seq).unwrap_or(0) + 1;
        let record = AuditRecord {
            seq,
            kind,
            payload,
            timestamp: Utc::now(),
        };

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.run_dir(run_id).join(RECORDS_FILE))?;
        file.write_all(&line)?;
        Ok(seq)
    }

    async fn finish_run(&self, run_id: &RunId, summary: RunSummary) -> StorageResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut run = self.read_run(run_id)?;
        Self::ensure_running(&run)?;

        let dir = self.run_dir(run_id);
        let digest = ContentDigest::from_bytes(&self.read_records_raw(run_id)?);
        Self::write_atomic(&dir, DIGEST_FILE, digest.as_str().as_bytes())?;

        run.status = RunStatus::Completed;
        run.summary = Some(summary);
        run.completed_at = Some(Utc::now());
        Self::write_atomic(&dir, RUN_FILE, &serde_json::to_vec_pretty(&run)?)?;
        debug!(run_id = %run_id, digest = %digest.short(), "run finalized");
        Ok(())
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        self.read_run(run_id)
    }

    async fn get_records(&self, run_id: &RunId) -> StorageResult<Vec<AuditRecord>> {
        let run = self.read_run(run_id)?;
        let raw = self.read_records_raw(run_id)?;

        if run.status == RunStatus::Completed {
            let expected = fs::read_to_string(self.run_dir(run_id).join(DIGEST_FILE))?;
            let actual = ContentDigest::from_bytes(&raw);
            if expected.trim() != actual.as_str() {
                return Err(StorageError::DigestMismatch {
                    run_id: run_id.0.clone(),
                    expected: expected.trim().to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        Self::parse_records(&raw)
    }
}
