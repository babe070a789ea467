//! Evidence validator.
//!
//! The single choke point between critics and aggregation: a raw finding
//! either becomes a [`Finding`] carrying well-formed evidence that meets its
//! criterion's required kind, or it is refused with a [`RejectionReason`].
//! Evidence meets a requirement when it is of the required kind or of a kind
//! that ranks strictly higher (tool output meets a quote requirement). Nothing
//! downstream ever sees an unvalidated claim.

use crate::domain::{Finding, RawFinding, RejectionReason, Rubric, Severity};

/// Validate one raw finding against the active rubric.
///
/// `index` is the finding's 0-based position in the critic's output; it is
/// used to derive a run-unique id when the critic supplied none.
pub fn validate(
    raw: &RawFinding,
    rubric: &Rubric,
    critic_id: &str,
    index: usize,
) -> Result<Finding, RejectionReason> {
    let evidence = raw.evidence.as_ref().ok_or(RejectionReason::MissingEvidence)?;
    if evidence.payload.trim().is_empty() {
        return Err(RejectionReason::EmptyEvidencePayload);
    }

    let severity: Severity = raw
        .severity
        .parse()
        .map_err(|value| RejectionReason::UnknownSeverity { value })?;

    let criterion =
        rubric
            .criterion(&raw.criterion_id)
            .ok_or_else(|| RejectionReason::UnknownCriterion {
                criterion_id: raw.criterion_id.clone(),
            })?;

    if !evidence.kind.satisfies(criterion.required_evidence_kind) {
        return Err(RejectionReason::EvidenceKindMismatch {
            expected: criterion.required_evidence_kind.to_string(),
            actual: evidence.kind.to_string(),
        });
    }

    if !(0.0..=1.0).contains(&raw.confidence) {
        return Err(RejectionReason::InvalidConfidence {
            value: raw.confidence,
        });
    }

    let local_id = raw
        .id
        .clone()
        .unwrap_or_else(|| (index + 1).to_string());

    Ok(Finding {
        id: format!("{critic_id}#{local_id}"),
        critic_id: critic_id.to_string(),
        criterion_id: criterion.id.clone(),
        severity,
        location: raw.location.clone(),
        description: raw.description.clone(),
        evidence: evidence.clone(),
        confidence: raw.confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Criterion, Evidence, EvidenceKind};

    fn rubric() -> Rubric {
        Rubric::new(
            "agent-config",
            "config",
            vec![
                Criterion::new("SEC-1", "no secrets", 0.5, Severity::Critical, EvidenceKind::ToolOutput),
                Criterion::new("DOC-1", "documented", 0.5, Severity::Medium, EvidenceKind::Quote),
            ],
        )
    }

    fn raw(criterion: &str, severity: &str, evidence: Option<Evidence>) -> RawFinding {
        RawFinding::new(criterion, severity, "loc-1", "hardcoded token", evidence, 0.9)
    }

    #[test]
    fn test_valid_finding_gets_critic_scoped_id() {
        let r = raw("SEC-1", "critical", Some(Evidence::tool_output("grep: token=abc", "grep -n token")));
        let f = validate(&r, &rubric(), "security", 2).unwrap();
        assert_eq!(f.id, "security#3");
        assert_eq!(f.severity, Severity::Critical);
        assert_eq!(f.critic_id, "security");

        let f = validate(&r.clone().with_id("F-7"), &rubric(), "security", 0).unwrap();
        assert_eq!(f.id, "security#F-7");
    }

    #[test]
    fn test_missing_or_empty_evidence_is_rejected() {
        let err = validate(&raw("SEC-1", "HIGH", None), &rubric(), "c", 0).unwrap_err();
        assert_eq!(err, RejectionReason::MissingEvidence);

        let r = raw("SEC-1", "HIGH", Some(Evidence::tool_output("   ", "cmd")));
        let err = validate(&r, &rubric(), "c", 0).unwrap_err();
        assert_eq!(err, RejectionReason::EmptyEvidencePayload);
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let r = raw("SEC-1", "HIGH", Some(Evidence::quote("token=abc", "cfg:3")));
        let err = validate(&r, &rubric(), "c", 0).unwrap_err();
        assert!(matches!(err, RejectionReason::EvidenceKindMismatch { .. }));
    }

    #[test]
    fn test_stronger_evidence_meets_quote_requirement() {
        let r = raw("DOC-1", "LOW", Some(Evidence::tool_output("doc-lint: no README", "doc-lint .")));
        assert!(validate(&r, &rubric(), "c", 0).is_ok());
    }

    #[test]
    fn test_unknown_severity_and_criterion_are_rejected() {
        let r = raw("DOC-1", "INFO", Some(Evidence::quote("x", "y")));
        let err = validate(&r, &rubric(), "c", 0).unwrap_err();
        assert_eq!(
            err,
            RejectionReason::UnknownSeverity {
                value: "INFO".to_string()
            }
        );

        let r = raw("NOPE-1", "LOW", Some(Evidence::quote("x", "y")));
        let err = validate(&r, &rubric(), "c", 0).unwrap_err();
        assert!(matches!(err, RejectionReason::UnknownCriterion { .. }));
    }

    #[test]
    fn test_out_of_range_confidence_is_rejected() {
        let mut r = raw("DOC-1", "LOW", Some(Evidence::quote("x", "y")));
        r.confidence = 1.5;
        assert!(matches!(
            validate(&r, &rubric(), "c", 0),
            Err(RejectionReason::InvalidConfidence { .. })
        ));

        r.confidence = f64::NAN;
        assert!(validate(&r, &rubric(), "c", 0).is_err());
    }
}
