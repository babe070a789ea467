//! External collaborators the engine consumes or feeds.
//!
//! Each seam is a trait so the pipeline can run with real services, test
//! doubles from [`crate::fakes`], or nothing at all (every service except the
//! critics is optional).

use async_trait::async_trait;
use quorum_state::RunId;
use serde::{Deserialize, Serialize};

use crate::domain::{Conflict, Finding, FixProposal, MergedFinding};

/// Tester's answer for one finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TesterVerdict {
    Confirmed,
    Unconfirmed,
    CouldNotRun,
}

/// Re-checks a finding independently, e.g. by executing a reproduction.
#[async_trait]
pub trait TesterService: Send + Sync {
    async fn confirm(&self, finding: &Finding) -> TesterVerdict;
}

/// Proposes remediations for merged findings.
///
/// Only used to let an otherwise rejecting run land on REVISE; the pipeline
/// calls it at most twice per finding per run.
#[async_trait]
pub trait FixerService: Send + Sync {
    async fn propose_fix(&self, finding: &MergedFinding) -> Option<FixProposal>;
}

/// One call to the fixer, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixAttempt {
    pub finding_id: String,
    /// 1-based attempt number for this finding.
    pub attempt: u32,
    /// `None` when the fixer had nothing to offer.
    pub proposal: Option<FixProposal>,
}

/// Everything the engine could not settle on its own in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationBatch {
    pub run_id: RunId,
    pub escalations: Vec<Conflict>,
    /// Merged findings still marked `CONTESTED`.
    pub unresolved: Vec<MergedFinding>,
}

/// Receives escalations for external adjudication.
///
/// Fire-and-forget: the pipeline does not wait for an answer and the verdict
/// never depends on one.
pub trait EscalationSink: Send + Sync {
    fn submit(&self, batch: EscalationBatch);
}
