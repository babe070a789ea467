//! Disagreements between critics about the same location and criterion.

use serde::{Deserialize, Serialize};

use super::rubric::{EvidenceRank, Severity};

/// What the critics disagree about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// A critic that evaluated the criterion raised nothing where another
    /// critic raised a finding.
    ImpliedPass,
    /// Findings at the same region carry different severities on evidence
    /// that does not overlap.
    SeverityDisagreement,
}

/// One side of a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub critic_ids: Vec<String>,
    pub finding_ids: Vec<String>,
    /// `None` for an implied PASS.
    pub severity: Option<Severity>,
    pub evidence_rank: EvidenceRank,
}

/// A disagreement between two claims at one `(location, criterion_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub criterion_id: String,
    pub location: String,
    pub kind: ConflictKind,
    pub claims: [Claim; 2],
    /// A claimed severity or the criterion's own severity is CRITICAL.
    pub touches_critical: bool,
}

impl Conflict {
    pub fn summary(&self) -> String {
        let side = |c: &Claim| {
            format!(
                "{} ({})",
                c.critic_ids.join("+"),
                c.severity.map(|s| s.as_str()).unwrap_or("PASS")
            )
        };
        format!(
            "{} at {}: {} vs {}",
            self.criterion_id,
            self.location,
            side(&self.claims[0]),
            side(&self.claims[1])
        )
    }
}

/// A conflict settled locally by evidence rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConflict {
    pub conflict: Conflict,
    /// Index into `conflict.claims` of the side that won.
    pub winner: usize,
    /// Merged finding id whose severity was lowered one level, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downgraded: Option<String>,
}
