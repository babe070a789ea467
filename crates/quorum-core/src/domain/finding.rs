//! Findings: raw critic claims, validated findings, and merged findings.
//!
//! Ownership flows one way. A critic emits [`RawFinding`]s, the evidence
//! validator turns each into a [`Finding`] or a [`Rejection`], and the
//! deduplicator folds findings into [`MergedFinding`]s. Later stages build
//! new values instead of mutating earlier ones.

use serde::{Deserialize, Serialize};

use super::error::RejectionReason;
use super::rubric::{EvidenceKind, EvidenceRank, Severity};

/// Machine-checkable proof attached to a finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub kind: EvidenceKind,
    pub payload: String,
    /// Where the evidence came from: a command line, a file:line, a URL.
    pub source_locator: String,
}

impl Evidence {
    pub fn new(kind: EvidenceKind, payload: impl Into<String>, source_locator: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
            source_locator: source_locator.into(),
        }
    }

    pub fn tool_output(payload: impl Into<String>, source_locator: impl Into<String>) -> Self {
        Self::new(EvidenceKind::ToolOutput, payload, source_locator)
    }

    pub fn quote(payload: impl Into<String>, source_locator: impl Into<String>) -> Self {
        Self::new(EvidenceKind::Quote, payload, source_locator)
    }

    /// Two pieces of evidence overlap when they cite the same source or one
    /// payload contains the other.
    pub fn overlaps(&self, other: &Evidence) -> bool {
        let loc_a = self.source_locator.trim();
        let loc_b = other.source_locator.trim();
        if !loc_a.is_empty() && loc_a.eq_ignore_ascii_case(loc_b) {
            return true;
        }

        let a = self.payload.trim();
        let b = other.payload.trim();
        !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a))
    }
}

/// A claim exactly as a critic returned it, before validation.
///
/// Severity is kept as text so that non-canonical levels can be rejected
/// with a reason instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFinding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub criterion_id: String,
    pub severity: String,
    pub location: String,
    pub description: String,
    #[serde(default)]
    pub evidence: Option<Evidence>,
    pub confidence: f64,
}

impl RawFinding {
    pub fn new(
        criterion_id: impl Into<String>,
        severity: impl Into<String>,
        location: impl Into<String>,
        description: impl Into<String>,
        evidence: Option<Evidence>,
        confidence: f64,
    ) -> Self {
        Self {
            id: None,
            criterion_id: criterion_id.into(),
            severity: severity.into(),
            location: location.into(),
            description: description.into(),
            evidence,
            confidence,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A validated, evidence-backed finding. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Unique within a run: `<critic_id>#<raw id or 1-based index>`.
    pub id: String,
    pub critic_id: String,
    pub criterion_id: String,
    pub severity: Severity,
    pub location: String,
    pub description: String,
    pub evidence: Evidence,
    pub confidence: f64,
}

impl Finding {
    pub fn evidence_rank(&self) -> EvidenceRank {
        self.evidence.kind.rank()
    }
}

/// A raw finding the validator refused, kept for the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub critic_id: String,
    /// 0-based position in the critic's output.
    pub index: usize,
    pub reason: RejectionReason,
    pub raw: RawFinding,
}

// ---------------------------------------------------------------------------
// Merged findings
// ---------------------------------------------------------------------------

/// Settlement state of a merged finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingStatus {
    Settled,
    /// Critics of equal evidence rank disagree; awaiting external adjudication.
    Contested,
}

/// Audit summary of one finding folded into a merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub finding_id: String,
    pub critic_id: String,
    pub severity: Severity,
    pub evidence: Evidence,
    pub confidence: f64,
}

impl From<&Finding> for Contribution {
    fn from(f: &Finding) -> Self {
        Self {
            finding_id: f.id.clone(),
            critic_id: f.critic_id.clone(),
            severity: f.severity,
            evidence: f.evidence.clone(),
            confidence: f.confidence,
        }
    }
}

/// A remediation offered by the fixer for one merged finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixProposal {
    pub finding_id: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    /// Whether the proposal was accepted as remediating the finding.
    pub accepted: bool,
}

/// One or more corroborating findings collapsed into a single claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedFinding {
    pub representative: Finding,
    /// Ids of every other finding folded into this one.
    pub contributing_ids: Vec<String>,
    /// All findings in the merge, representative first.
    pub contributors: Vec<Contribution>,
    /// Number of distinct critics in the merge.
    pub corroboration_count: usize,
    pub resolved_severity: Severity,
    pub resolved_confidence: f64,
    pub status: FindingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<FixProposal>,
}

impl MergedFinding {
    /// A merge of one finding.
    pub fn single(finding: Finding) -> Self {
        let contribution = Contribution::from(&finding);
        Self {
            resolved_severity: finding.severity,
            resolved_confidence: finding.confidence,
            representative: finding,
            contributing_ids: Vec::new(),
            contributors: vec![contribution],
            corroboration_count: 1,
            status: FindingStatus::Settled,
            remediation: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.representative.id
    }

    pub fn criterion_id(&self) -> &str {
        &self.representative.criterion_id
    }

    pub fn location(&self) -> &str {
        &self.representative.location
    }

    pub fn description(&self) -> &str {
        &self.representative.description
    }

    /// Strongest evidence rank among all contributors.
    pub fn evidence_rank(&self) -> EvidenceRank {
        self.contributors
            .iter()
            .map(|c| c.evidence.kind.rank())
            .max()
            .unwrap_or(EvidenceRank::Assertion)
    }

    pub fn has_critic(&self, critic_id: &str) -> bool {
        self.contributors.iter().any(|c| c.critic_id == critic_id)
    }

    pub fn is_contested(&self) -> bool {
        self.status == FindingStatus::Contested
    }

    /// A remediation was proposed and accepted.
    pub fn is_fixed(&self) -> bool {
        self.remediation.as_ref().is_some_and(|r| r.accepted)
    }

    /// Whether any contributor's evidence overlaps any of `other`'s.
    pub fn evidence_overlaps(&self, other: &MergedFinding) -> bool {
        self.contributors.iter().any(|a| {
            other
                .contributors
                .iter()
                .any(|b| a.evidence.overlaps(&b.evidence))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(id: &str, critic: &str, kind: EvidenceKind, payload: &str) -> Finding {
        Finding {
            id: id.to_string(),
            critic_id: critic.to_string(),
            criterion_id: "C1".to_string(),
            severity: Severity::High,
            location: "loc-1".to_string(),
            description: "missing timeout".to_string(),
            evidence: Evidence::new(kind, payload, ""),
            confidence: 0.8,
        }
    }

    #[test]
    fn test_evidence_overlap_by_locator_or_payload() {
        let a = Evidence::quote("timeout = none", "config.yaml:12");
        let b = Evidence::tool_output("lint: missing", "CONFIG.yaml:12");
        assert!(a.overlaps(&b));

        let c = Evidence::quote("the value timeout = none is set", "");
        assert!(a.overlaps(&c));

        let d = Evidence::quote("retries = 0", "other.yaml:3");
        assert!(!a.overlaps(&d));
    }

    #[test]
    fn test_empty_payloads_never_overlap() {
        let a = Evidence::quote("", "");
        let b = Evidence::quote("anything", "");
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn test_single_merge_defaults() {
        let m = MergedFinding::single(finding("a#1", "a", EvidenceKind::Quote, "x"));
        assert_eq!(m.corroboration_count, 1);
        assert!(m.contributing_ids.is_empty());
        assert_eq!(m.contributors.len(), 1);
        assert_eq!(m.resolved_severity, Severity::High);
        assert_eq!(m.status, FindingStatus::Settled);
        assert!(!m.is_fixed());
        assert!(m.has_critic("a"));
        assert_eq!(m.evidence_rank(), EvidenceRank::Quoted);
    }

    #[test]
    fn test_raw_finding_without_evidence_deserializes() {
        let raw: RawFinding = serde_json::from_value(serde_json::json!({
            "criterion_id": "C1",
            "severity": "INFO",
            "location": "loc",
            "description": "d",
            "confidence": 0.5
        }))
        .unwrap();
        assert!(raw.evidence.is_none());
        assert!(raw.id.is_none());
    }
}
