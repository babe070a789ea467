//! Storage trait definitions for Quorum
//!
//! These traits define the persistence seams of an evaluation run:
//! - `RunArtifactStore`: audit trail of one run (critic results, rejections,
//!   merged findings, escalations, verdict)
//! - `LearningMemory`: known failure patterns read before a run and new
//!   observations written after it
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
// RunArtifactStore: audit trail of one evaluation run
// ---------------------------------------------------------------------------

/// Unique identifier for an evaluation run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random RunId
    pub fn new() -> Self {
        RunId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inputs of a run, written once when the run begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Digest of the artifact content under review
    pub artifact_digest: ContentDigest,
    /// Artifact domain tag (e.g. "config", "code")
    pub domain: String,
    /// Rubric name and version, e.g. "agent-config@1.0"
    pub rubric: String,
    /// Depth profile name
    pub depth: String,
    /// Critic ids dispatched in this run
    pub critics: Vec<String>,
}

/// Kind of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    CriticResult,
    Rejection,
    MergedFinding,
    Escalation,
    TesterSignal,
    FixAttempt,
    Verdict,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordKind::CriticResult => "critic_result",
            RecordKind::Rejection => "rejection",
            RecordKind::MergedFinding => "merged_finding",
            RecordKind::Escalation => "escalation",
            RecordKind::TesterSignal => "tester_signal",
            RecordKind::FixAttempt => "fix_attempt",
            RecordKind::Verdict => "verdict",
        };
        write!(f, "{s}")
    }
}

/// A single audit record appended to a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Monotonic sequence number within the run, starting at 1
    pub seq: u64,
    /// Record kind
    pub kind: RecordKind,
    /// Record payload (a serialized pipeline structure)
    pub payload: serde_json::Value,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

/// Summary produced when a run completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Verdict label, e.g. "REJECT"
    pub verdict: String,
    /// Total records appended
    pub total_records: u64,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

/// Status of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Completed,
}

/// Full run record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub manifest: RunManifest,
    pub status: RunStatus,
    pub summary: Option<RunSummary>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Audit store for evaluation runs.
///
/// Guarantees:
/// - Records are ordered by monotonic `seq` within a run.
/// - A run transitions: Running → Completed (terminal).
/// - Completed runs are immutable.
#[async_trait]
pub trait RunArtifactStore: Send + Sync {
    /// Create a new run, returning its unique ID.
    async fn begin_run(&self, manifest: RunManifest) -> StorageResult<RunId>;

    /// Append a record to an active run, returning its sequence number.
    async fn append(
        &self,
        run_id: &RunId,
        kind: RecordKind,
        payload: serde_json::Value,
    ) -> StorageResult<u64>;

    /// Mark a run as completed with a summary.
    async fn finish_run(&self, run_id: &RunId, summary: RunSummary) -> StorageResult<()>;

    /// Retrieve a run record by ID.
    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord>;

    /// Retrieve all records for a run, ordered by seq.
    async fn get_records(&self, run_id: &RunId) -> StorageResult<Vec<AuditRecord>>;
}

// ---------------------------------------------------------------------------
// LearningMemory: known failure patterns across runs
// ---------------------------------------------------------------------------

/// A failure pattern remembered from earlier runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownPattern {
    pub pattern_id: String,
    pub criterion_id: String,
    pub description: String,
    /// Severity label, e.g. "HIGH"
    pub severity: String,
    /// Number of runs the pattern was observed in
    pub frequency: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Mandatory patterns are handed to critics on every run in the domain.
    pub mandatory: bool,
}

/// A newly observed finding that matched no known pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternObservation {
    pub pattern_id: String,
    pub criterion_id: String,
    pub description: String,
    pub severity: String,
    pub observed_at: DateTime<Utc>,
}

/// Learning-memory store.
///
/// Read before a run (known patterns for the artifact's domain) and written
/// after it (observations). How patterns accumulate, decay, or persist is up
/// to the implementation.
#[async_trait]
pub trait LearningMemory: Send + Sync {
    /// Known patterns for a domain.
    async fn known_patterns(&self, domain: &str) -> StorageResult<Vec<KnownPattern>>;

    /// Record new observations for a domain.
    async fn record_observations(
        &self,
        domain: &str,
        observations: Vec<PatternObservation>,
    ) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_digest_is_stable() {
        let a = ContentDigest::from_bytes(b"artifact");
        let b = ContentDigest::from_bytes(b"artifact");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn test_content_digest_try_from_rejects_non_hex() {
        let result = ContentDigest::try_from("not-a-digest".to_string());
        assert!(matches!(result, Err(StorageError::InvalidDigest { .. })));
    }

    #[test]
    fn test_content_digest_try_from_lowercases() {
        let upper = "A".repeat(64);
        let digest = ContentDigest::try_from(upper).unwrap();
        assert_eq!(digest.as_str(), "a".repeat(64));
    }

    #[test]
    fn test_record_kind_serializes_snake_case() {
        let json = serde_json::to_string(&RecordKind::MergedFinding).unwrap();
        assert_eq!(json, "\"merged_finding\"");
        assert_eq!(RecordKind::TesterSignal.to_string(), "tester_signal");
    }
}
