//! Conflict resolver: settles disagreements between critics by evidence rank.
//!
//! Three kinds of disagreement are detected, all keyed by
//! `(location, criterion_id)`:
//!
//! 1. Inside one merge, contributors claim different severities on evidence
//!    that does not overlap the representative's.
//! 2. Two merged findings from disjoint critic sets describe the same defect
//!    in the same region with different severities and non-overlapping
//!    evidence. Merges with dissimilar descriptions are distinct issues and
//!    never conflict.
//! 3. A critic evaluated the criterion, raised nothing in the region, while
//!    another critic raised a finding there (an implied PASS).
//!
//! The side with strictly stronger evidence wins and the losing finding is
//! lowered one severity level. Equal ranks are never settled here: the
//! finding is marked `CONTESTED` and the conflict is escalated.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::domain::{
    Claim, Conflict, ConflictKind, Contribution, CriticResult, EvidenceRank, FindingStatus,
    MergedFinding, ResolvedConflict, Rubric, Severity,
};
use crate::similarity::{same_region, sequence_ratio, DEDUP_THRESHOLD};

/// Output of conflict resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub findings: Vec<MergedFinding>,
    /// Conflicts left for external adjudication.
    pub escalations: Vec<Conflict>,
    /// Conflicts settled locally, kept for audit.
    pub resolved: Vec<ResolvedConflict>,
}

/// Resolve with the default similarity threshold.
pub fn resolve(
    findings: Vec<MergedFinding>,
    critic_results: &[CriticResult],
    rubric: &Rubric,
) -> Resolution {
    resolve_with_threshold(findings, critic_results, rubric, DEDUP_THRESHOLD)
}

/// Detect and settle conflicts among merged findings.
///
/// `critic_results` supplies the implied PASS claims: only valid results
/// that list the criterion in `evaluated_criteria` take part. `threshold`
/// is the description similarity two merges need to count as claims about
/// the same defect.
pub fn resolve_with_threshold(
    mut findings: Vec<MergedFinding>,
    critic_results: &[CriticResult],
    rubric: &Rubric,
    threshold: f64,
) -> Resolution {
    findings.sort_by(|a, b| {
        (a.criterion_id(), a.location(), a.id()).cmp(&(b.criterion_id(), b.location(), b.id()))
    });

    let mut resolution = Resolution::default();
    resolve_within_merges(&mut findings, rubric, &mut resolution);
    resolve_between_merges(&mut findings, rubric, threshold, &mut resolution);
    resolve_implied_passes(&findings, critic_results, rubric, &mut resolution);

    debug!(
        findings = findings.len(),
        escalations = resolution.escalations.len(),
        resolved = resolution.resolved.len(),
        "conflicts resolved"
    );
    resolution.findings = findings;
    resolution
}

fn touches_critical(rubric: &Rubric, criterion_id: &str, claims: &[Claim; 2]) -> bool {
    claims.iter().any(|c| c.severity == Some(Severity::Critical))
        || rubric
            .criterion(criterion_id)
            .is_some_and(|c| c.severity == Severity::Critical)
}

fn claim_of_contributions(group: &[&Contribution], severity: Severity) -> Claim {
    let critic_ids: BTreeSet<&str> = group.iter().map(|c| c.critic_id.as_str()).collect();
    Claim {
        critic_ids: critic_ids.into_iter().map(str::to_string).collect(),
        finding_ids: group.iter().map(|c| c.finding_id.clone()).collect(),
        severity: Some(severity),
        evidence_rank: group
            .iter()
            .map(|c| c.evidence.kind.rank())
            .max()
            .unwrap_or(EvidenceRank::Assertion),
    }
}

fn claim_of_merge(m: &MergedFinding, severity: Severity) -> Claim {
    let group: Vec<&Contribution> = m.contributors.iter().collect();
    claim_of_contributions(&group, severity)
}

fn critics_of(m: &MergedFinding) -> BTreeSet<&str> {
    m.contributors.iter().map(|c| c.critic_id.as_str()).collect()
}

/// Severity disagreements between contributors of one merge.
fn resolve_within_merges(findings: &mut [MergedFinding], rubric: &Rubric, out: &mut Resolution) {
    for m in findings.iter_mut() {
        let rep_severity = m.representative.severity;
        let rep_evidence = m.representative.evidence.clone();

        let agreeing: Vec<&Contribution> = m
            .contributors
            .iter()
            .filter(|c| c.severity == rep_severity)
            .collect();
        let mut dissent: BTreeMap<Severity, Vec<&Contribution>> = BTreeMap::new();
        for c in m.contributors.iter().skip(1) {
            if c.severity != rep_severity && !c.evidence.overlaps(&rep_evidence) {
                dissent.entry(c.severity).or_default().push(c);
            }
        }
        if dissent.is_empty() {
            continue;
        }

        let rep_claim = claim_of_contributions(&agreeing, rep_severity);
        let mut severity = m.resolved_severity;
        let mut contested = false;

        for (dissent_severity, group) in dissent.iter().rev() {
            let claims = [rep_claim.clone(), claim_of_contributions(group, *dissent_severity)];
            let conflict = Conflict {
                criterion_id: m.representative.criterion_id.clone(),
                location: m.representative.location.clone(),
                kind: ConflictKind::SeverityDisagreement,
                touches_critical: touches_critical(rubric, &m.representative.criterion_id, &claims),
                claims,
            };

            // The representative holds the strongest evidence of its merge,
            // so a dissenting group can tie it but never outrank it.
            if conflict.claims[0].evidence_rank > conflict.claims[1].evidence_rank {
                out.resolved.push(ResolvedConflict {
                    conflict,
                    winner: 0,
                    downgraded: None,
                });
            } else {
                contested = true;
                severity = severity.max(*dissent_severity);
                out.escalations.push(conflict);
            }
        }

        m.resolved_severity = severity;
        if contested {
            m.status = FindingStatus::Contested;
        }
    }
}

/// Severity disagreements between separate merges that describe the same
/// defect in one region.
fn resolve_between_merges(
    findings: &mut [MergedFinding],
    rubric: &Rubric,
    threshold: f64,
    out: &mut Resolution,
) {
    let severities: Vec<Severity> = findings.iter().map(|m| m.resolved_severity).collect();
    let mut downgraded = vec![false; findings.len()];
    let mut contested = vec![false; findings.len()];

    for i in 0..findings.len() {
        for j in (i + 1)..findings.len() {
            let (a, b) = (&findings[i], &findings[j]);
            if a.criterion_id() != b.criterion_id()
                || !same_region(a.location(), b.location())
                || severities[i] == severities[j]
                || sequence_ratio(a.description(), b.description()) < threshold
                || !critics_of(a).is_disjoint(&critics_of(b))
                || a.evidence_overlaps(b)
            {
                continue;
            }

            let claims = [claim_of_merge(a, severities[i]), claim_of_merge(b, severities[j])];
            let conflict = Conflict {
                criterion_id: a.criterion_id().to_string(),
                location: a.location().to_string(),
                kind: ConflictKind::SeverityDisagreement,
                touches_critical: touches_critical(rubric, a.criterion_id(), &claims),
                claims,
            };

            let loser = match a.evidence_rank().cmp(&b.evidence_rank()) {
                Ordering::Greater => Some((0, j)),
                Ordering::Less => Some((1, i)),
                Ordering::Equal => None,
            };
            match loser {
                Some((winner, loser)) => {
                    let demote = !downgraded[loser];
                    downgraded[loser] = true;
                    out.resolved.push(ResolvedConflict {
                        conflict,
                        winner,
                        downgraded: demote.then(|| findings[loser].id().to_string()),
                    });
                }
                None => {
                    contested[i] = true;
                    contested[j] = true;
                    out.escalations.push(conflict);
                }
            }
        }
    }

    for (idx, m) in findings.iter_mut().enumerate() {
        if downgraded[idx] {
            m.resolved_severity = m.resolved_severity.demote();
        }
        if contested[idx] {
            m.status = FindingStatus::Contested;
        }
    }
}

/// Critics that evaluated a criterion and stayed silent in a region where
/// another critic raised a finding.
fn resolve_implied_passes(
    findings: &[MergedFinding],
    critic_results: &[CriticResult],
    rubric: &Rubric,
    out: &mut Resolution,
) {
    let mut voters: Vec<&CriticResult> = critic_results.iter().filter(|r| r.is_valid()).collect();
    voters.sort_by(|a, b| a.critic_id.cmp(&b.critic_id));

    for m in findings {
        let silent: Vec<String> = voters
            .iter()
            .filter(|r| r.evaluated(m.criterion_id()) && !m.has_critic(&r.critic_id))
            .filter(|r| {
                !findings.iter().any(|n| {
                    n.has_critic(&r.critic_id)
                        && n.criterion_id() == m.criterion_id()
                        && same_region(n.location(), m.location())
                })
            })
            .map(|r| r.critic_id.clone())
            .collect();
        if silent.is_empty() {
            continue;
        }

        let claims = [
            claim_of_merge(m, m.resolved_severity),
            Claim {
                critic_ids: silent,
                finding_ids: Vec::new(),
                severity: None,
                evidence_rank: EvidenceRank::Assertion,
            },
        ];
        let conflict = Conflict {
            criterion_id: m.criterion_id().to_string(),
            location: m.location().to_string(),
            kind: ConflictKind::ImpliedPass,
            touches_critical: touches_critical(rubric, m.criterion_id(), &claims),
            claims,
        };

        // A raised finding always carries evidence, so it outranks silence.
        if conflict.claims[0].evidence_rank > conflict.claims[1].evidence_rank {
            out.resolved.push(ResolvedConflict {
                conflict,
                winner: 0,
                downgraded: None,
            });
        } else {
            out.escalations.push(conflict);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::deduplicate;
    use crate::domain::{
        CriticKind, CriticStatus, Criterion, Evidence, EvidenceKind, Finding,
    };

    fn rubric() -> Rubric {
        Rubric::new(
            "r",
            "code",
            vec![
                Criterion::new("C1", "d", 0.5, Severity::High, EvidenceKind::Quote),
                Criterion::new("C2", "d", 0.5, Severity::Critical, EvidenceKind::Quote),
            ],
        )
    }

    fn finding(
        critic: &str,
        criterion: &str,
        location: &str,
        description: &str,
        severity: Severity,
        evidence: Evidence,
    ) -> Finding {
        Finding {
            id: format!("{critic}#1"),
            critic_id: critic.to_string(),
            criterion_id: criterion.to_string(),
            severity,
            location: location.to_string(),
            description: description.to_string(),
            evidence,
            confidence: 0.8,
        }
    }

    fn result(critic: &str, criteria: &[&str], findings: Vec<Finding>) -> CriticResult {
        CriticResult {
            critic_id: critic.to_string(),
            kind: CriticKind::Custom(critic.to_string()),
            status: if findings.is_empty() {
                CriticStatus::NoFindings
            } else {
                CriticStatus::Ok
            },
            findings,
            elapsed_ms: 1,
            error: None,
            evaluated_criteria: criteria.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_intra_merge_higher_rank_wins() {
        let a = finding("a", "C1", "loc-1", "retry loop is unbounded", Severity::High,
            Evidence::tool_output("loop ran 10000 times", "run.sh"));
        let b = finding("b", "C1", "loc-1", "retry loop is unbounded", Severity::Low,
            Evidence::quote("while true {", "main.rs:4"));
        let results = vec![result("a", &["C1"], vec![a.clone()]), result("b", &["C1"], vec![b.clone()])];

        let res = resolve(deduplicate(vec![a, b]), &results, &rubric());
        assert_eq!(res.findings.len(), 1);
        assert_eq!(res.findings[0].resolved_severity, Severity::High);
        assert_eq!(res.findings[0].status, FindingStatus::Settled);
        assert!(res.escalations.is_empty());
        assert_eq!(res.resolved.len(), 1);
        assert_eq!(res.resolved[0].winner, 0);
    }

    #[test]
    fn test_intra_merge_equal_rank_is_contested() {
        let a = finding("a", "C1", "loc-1", "retry loop is unbounded", Severity::High,
            Evidence::quote("while true {", "main.rs:4"));
        let b = finding("b", "C1", "loc-1", "retry loop is unbounded", Severity::Medium,
            Evidence::quote("no max_retries set", "config.toml:9"));
        let results = vec![result("a", &["C1"], vec![a.clone()]), result("b", &["C1"], vec![b.clone()])];

        let res = resolve(deduplicate(vec![a, b]), &results, &rubric());
        assert_eq!(res.findings[0].status, FindingStatus::Contested);
        assert_eq!(res.findings[0].resolved_severity, Severity::High);
        assert_eq!(res.escalations.len(), 1);
        assert!(!res.escalations[0].touches_critical);
    }

    #[test]
    fn test_overlapping_evidence_is_not_a_conflict() {
        let a = finding("a", "C1", "loc-1", "retry loop is unbounded", Severity::High,
            Evidence::quote("while true {", "main.rs:4"));
        let b = finding("b", "C1", "loc-1", "retry loop is unbounded", Severity::Medium,
            Evidence::quote("while true {", "main.rs:4"));
        let results = vec![result("a", &["C1"], vec![a.clone()]), result("b", &["C1"], vec![b.clone()])];

        let res = resolve(deduplicate(vec![a, b]), &results, &rubric());
        assert!(res.escalations.is_empty());
        assert!(res.resolved.is_empty());
    }

    /// Two merges the deduplicator kept apart, as happens when a finding
    /// joins the first of two clusters it resembles.
    fn separate_merges(a: Finding, b: Finding) -> Vec<MergedFinding> {
        let mut merged = deduplicate(vec![a]);
        merged.extend(deduplicate(vec![b]));
        merged
    }

    #[test]
    fn test_inter_merge_loser_is_downgraded() {
        let a = finding("a", "C1", "loc-1", "secret committed to repository", Severity::High,
            Evidence::tool_output("gitleaks: 1 leak", "gitleaks detect"));
        let b = finding("b", "C1", "loc-1", "secret committed to the repository", Severity::Medium,
            Evidence::quote("AWS_KEY=...", "env:1"));
        let results = vec![result("a", &["C1"], vec![a.clone()]), result("b", &["C1"], vec![b.clone()])];

        let res = resolve(separate_merges(a, b), &results, &rubric());
        assert_eq!(res.findings.len(), 2);
        let b = res.findings.iter().find(|m| m.id() == "b#1").unwrap();
        assert_eq!(b.resolved_severity, Severity::Low);
        let a = res.findings.iter().find(|m| m.id() == "a#1").unwrap();
        assert_eq!(a.resolved_severity, Severity::High);
        assert!(res.resolved.iter().any(|r| r.downgraded.as_deref() == Some("b#1")));
    }

    #[test]
    fn test_inter_merge_equal_rank_on_critical_criterion_escalates() {
        let a = finding("a", "C2", "loc-1", "secret committed to repository", Severity::Critical,
            Evidence::quote("AWS_KEY=...", "env:1"));
        let b = finding("b", "C2", "loc-1", "secret committed to the repository", Severity::Low,
            Evidence::quote("password = hunter2", "env:2"));
        let results = vec![result("a", &["C2"], vec![a.clone()]), result("b", &["C2"], vec![b.clone()])];

        let res = resolve(separate_merges(a, b), &results, &rubric());
        assert_eq!(res.escalations.len(), 1);
        assert!(res.escalations[0].touches_critical);
        assert!(res.findings.iter().all(|m| m.is_contested()));
    }

    #[test]
    fn test_distinct_issues_in_one_region_do_not_conflict() {
        let a = finding("a", "C2", "svc.rs:10", "log line prints the request id", Severity::Medium,
            Evidence::quote("info!(\"{req_id}\")", "svc.rs:10"));
        let b = finding("b", "C2", "svc.rs:10", "magic number 42 should be a constant", Severity::Low,
            Evidence::quote("let n = 42;", "svc.rs:10:17"));
        let results = vec![result("a", &["C2"], vec![a.clone()]), result("b", &["C2"], vec![b.clone()])];

        let res = resolve(deduplicate(vec![a, b]), &results, &rubric());
        assert_eq!(res.findings.len(), 2);
        assert!(res.escalations.is_empty());
        assert!(res.resolved.is_empty());
        assert!(res.findings.iter().all(|m| m.status == FindingStatus::Settled));
        let a = res.findings.iter().find(|m| m.id() == "a#1").unwrap();
        assert_eq!(a.resolved_severity, Severity::Medium);
    }

    #[test]
    fn test_silent_critic_implies_pass_and_loses() {
        let a = finding("a", "C1", "loc-1", "retry loop is unbounded", Severity::High,
            Evidence::quote("while true {", "main.rs:4"));
        let results = vec![
            result("a", &["C1"], vec![a.clone()]),
            result("b", &["C1", "C2"], vec![]),
            result("c", &["C2"], vec![]),
        ];

        let res = resolve(deduplicate(vec![a]), &results, &rubric());
        assert!(res.escalations.is_empty());
        assert_eq!(res.resolved.len(), 1);
        let conflict = &res.resolved[0].conflict;
        assert_eq!(conflict.kind, ConflictKind::ImpliedPass);
        assert_eq!(conflict.claims[1].critic_ids, vec!["b"]);
        assert_eq!(res.findings[0].resolved_severity, Severity::High);
    }

    #[test]
    fn test_timed_out_critic_implies_nothing() {
        let a = finding("a", "C1", "loc-1", "retry loop is unbounded", Severity::High,
            Evidence::quote("while true {", "main.rs:4"));
        let mut silent = result("b", &["C1"], vec![]);
        silent.status = CriticStatus::Timeout;

        let res = resolve(deduplicate(vec![a.clone()]), &[result("a", &["C1"], vec![a]), silent], &rubric());
        assert!(res.resolved.is_empty());
    }
}
