//! Domain-level error taxonomy for Quorum.
//!
//! Only configuration and wiring problems are fatal. Everything that can go
//! wrong inside a single critic is a value (`CriticError`, `RejectionReason`)
//! recorded on the run, never an `Err` out of the pipeline.

use serde::{Deserialize, Serialize};

/// Why the evidence validator refused a raw finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    #[error("finding carries no evidence")]
    MissingEvidence,

    #[error("evidence payload is empty")]
    EmptyEvidencePayload,

    #[error("evidence kind {actual} does not match required kind {expected}")]
    EvidenceKindMismatch { expected: String, actual: String },

    #[error("severity {value:?} is not one of CRITICAL, HIGH, MEDIUM, LOW")]
    UnknownSeverity { value: String },

    #[error("criterion {criterion_id} is not in the active rubric")]
    UnknownCriterion { criterion_id: String },

    #[error("confidence {value} is outside [0, 1]")]
    InvalidConfidence { value: f64 },

    #[error("finding id {id} was already used by this critic")]
    DuplicateId { id: String },
}

/// A critic's evaluation failed without producing findings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CriticError {
    #[error("critic failed: {0}")]
    Failed(String),

    #[error("critic panicked: {0}")]
    Panicked(String),

    #[error("critic was cancelled")]
    Cancelled,
}

/// Quorum domain errors.
#[derive(Debug, thiserror::Error)]
pub enum QuorumError {
    #[error("invalid rubric: {0}")]
    InvalidRubric(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unknown depth profile: {0}")]
    UnknownDepth(String),

    #[error("unknown criterion: {0}")]
    UnknownCriterion(String),

    #[error("no critics selected for depth {depth}")]
    NoCriticsSelected { depth: String },

    #[error("storage error: {0}")]
    Storage(#[from] quorum_state::StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Quorum domain operations.
pub type Result<T> = std::result::Result<T, QuorumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_reason_display() {
        let err = RejectionReason::EvidenceKindMismatch {
            expected: "tool_output".to_string(),
            actual: "quote".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "evidence kind quote does not match required kind tool_output"
        );

        let err = RejectionReason::UnknownSeverity {
            value: "INFO".to_string(),
        };
        assert!(err.to_string().contains("\"INFO\""));
    }

    #[test]
    fn test_rejection_reason_serializes_tagged() {
        let json = serde_json::to_value(RejectionReason::UnknownCriterion {
            criterion_id: "X-9".to_string(),
        })
        .unwrap();
        assert_eq!(json["reason"], "unknown_criterion");
        assert_eq!(json["criterion_id"], "X-9");
    }

    #[test]
    fn test_storage_error_converts() {
        let err: QuorumError = quorum_state::StorageError::RunNotFound {
            run_id: "r1".to_string(),
        }
        .into();
        assert!(matches!(err, QuorumError::Storage(_)));
        assert!(err.to_string().contains("r1"));
    }

    #[test]
    fn test_no_critics_selected_display() {
        let err = QuorumError::NoCriticsSelected {
            depth: "quick".to_string(),
        };
        assert_eq!(err.to_string(), "no critics selected for depth quick");
    }
}
