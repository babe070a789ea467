//! Deduplicator: folds findings that describe the same defect.
//!
//! Findings are bucketed by criterion and sorted by a stable key before any
//! comparison, so the output depends only on the set of findings and never
//! on the order critics finished in.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{Contribution, Finding, FindingStatus, MergedFinding};
use crate::similarity::{same_region, sequence_ratio, DEDUP_THRESHOLD};

/// Deduplicate with the default threshold.
pub fn deduplicate(findings: Vec<Finding>) -> Vec<MergedFinding> {
    deduplicate_with_threshold(findings, DEDUP_THRESHOLD)
}

/// Deduplicate findings across critics.
///
/// Two findings merge when their locations are the same region and their
/// descriptions have a similarity ratio of at least `threshold`. Each
/// finding joins the first existing cluster containing a matching member.
/// Findings from the same critic go through the same test; a critic can
/// raise two distinct issues at one location.
pub fn deduplicate_with_threshold(mut findings: Vec<Finding>, threshold: f64) -> Vec<MergedFinding> {
    findings.sort_by(|a, b| {
        (&a.criterion_id, &a.critic_id, &a.id).cmp(&(&b.criterion_id, &b.critic_id, &b.id))
    });

    let mut buckets: BTreeMap<String, Vec<Finding>> = BTreeMap::new();
    for f in findings {
        buckets.entry(f.criterion_id.clone()).or_default().push(f);
    }

    let mut merged = Vec::new();
    for (_criterion, bucket) in buckets {
        let mut clusters: Vec<Vec<Finding>> = Vec::new();
        for f in bucket {
            let home = clusters.iter().position(|cluster| {
                cluster.iter().any(|m| {
                    same_region(&m.location, &f.location)
                        && sequence_ratio(&m.description, &f.description) >= threshold
                })
            });
            match home {
                Some(i) => clusters[i].push(f),
                None => clusters.push(vec![f]),
            }
        }
        merged.extend(clusters.into_iter().filter_map(merge_cluster));
    }
    merged
}

/// Stronger evidence first, then higher confidence, then smaller id.
fn representative_order(a: &Finding, b: &Finding) -> Ordering {
    b.evidence_rank()
        .cmp(&a.evidence_rank())
        .then_with(|| b.confidence.total_cmp(&a.confidence))
        .then_with(|| a.id.cmp(&b.id))
}

fn merge_cluster(mut cluster: Vec<Finding>) -> Option<MergedFinding> {
    cluster.sort_by(representative_order);
    let mut members = cluster.into_iter();
    let representative = members.next()?;
    let others: Vec<Finding> = members.collect();

    let critics: BTreeSet<&str> = std::iter::once(representative.critic_id.as_str())
        .chain(others.iter().map(|f| f.critic_id.as_str()))
        .collect();
    let corroboration_count = critics.len();

    let contributors: Vec<Contribution> = std::iter::once(&representative)
        .chain(others.iter())
        .map(Contribution::from)
        .collect();

    Some(MergedFinding {
        resolved_severity: representative.severity,
        resolved_confidence: representative.confidence,
        contributing_ids: others.iter().map(|f| f.id.clone()).collect(),
        contributors,
        corroboration_count,
        status: FindingStatus::Settled,
        remediation: None,
        representative,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Evidence, EvidenceKind, Severity};

    fn finding(
        critic: &str,
        n: u32,
        criterion: &str,
        location: &str,
        description: &str,
        kind: EvidenceKind,
        confidence: f64,
    ) -> Finding {
        Finding {
            id: format!("{critic}#{n}"),
            critic_id: critic.to_string(),
            criterion_id: criterion.to_string(),
            severity: Severity::High,
            location: location.to_string(),
            description: description.to_string(),
            evidence: Evidence::new(kind, format!("{critic} evidence {n}"), ""),
            confidence,
        }
    }

    #[test]
    fn test_similar_findings_merge_and_prefer_tool_evidence() {
        let merged = deduplicate(vec![
            finding("b", 1, "C1", "loc-1", "API key hardcoded in config", EvidenceKind::Quote, 0.95),
            finding("a", 1, "C1", "loc-1", "API key is hardcoded in the config", EvidenceKind::ToolOutput, 0.6),
        ]);
        assert_eq!(merged.len(), 1);
        let m = &merged[0];
        assert_eq!(m.representative.id, "a#1");
        assert_eq!(m.contributing_ids, vec!["b#1"]);
        assert_eq!(m.corroboration_count, 2);
        assert_eq!(m.contributors[0].finding_id, "a#1");
    }

    #[test]
    fn test_confidence_breaks_rank_ties() {
        let merged = deduplicate(vec![
            finding("a", 1, "C1", "loc-1", "missing retry limit", EvidenceKind::Quote, 0.6),
            finding("b", 1, "C1", "loc-1", "missing retry limit", EvidenceKind::Quote, 0.8),
        ]);
        assert_eq!(merged[0].representative.id, "b#1");
    }

    #[test]
    fn test_different_region_or_criterion_stays_distinct() {
        let merged = deduplicate(vec![
            finding("a", 1, "C1", "loc-1", "missing retry limit", EvidenceKind::Quote, 0.6),
            finding("b", 1, "C1", "loc-2", "missing retry limit", EvidenceKind::Quote, 0.6),
            finding("c", 1, "C2", "loc-1", "missing retry limit", EvidenceKind::Quote, 0.6),
        ]);
        assert_eq!(merged.len(), 3);
        assert!(merged.iter().all(|m| m.corroboration_count == 1));
    }

    #[test]
    fn test_same_critic_distinct_issues_not_merged() {
        let merged = deduplicate(vec![
            finding("a", 1, "C1", "loc-1", "timeout is unbounded", EvidenceKind::Quote, 0.6),
            finding("a", 2, "C1", "loc-1", "credentials logged in plain text", EvidenceKind::Quote, 0.6),
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_same_critic_duplicates_count_one_critic() {
        let merged = deduplicate(vec![
            finding("a", 1, "C1", "loc-1", "timeout is unbounded", EvidenceKind::Quote, 0.6),
            finding("a", 2, "C1", "loc-1", "timeout is unbounded!", EvidenceKind::Quote, 0.5),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].corroboration_count, 1);
        assert_eq!(merged[0].contributing_ids, vec!["a#2"]);
    }

    #[test]
    fn test_output_is_independent_of_input_order() {
        let input = vec![
            finding("c", 1, "C2", "f.rs:10-12", "unchecked unwrap on input", EvidenceKind::Quote, 0.7),
            finding("a", 1, "C1", "loc-1", "missing retry limit", EvidenceKind::Quote, 0.6),
            finding("b", 1, "C2", "f.rs:11", "unchecked unwrap on user input", EvidenceKind::ToolOutput, 0.5),
            finding("b", 2, "C1", "loc-1", "missing retry limits", EvidenceKind::Quote, 0.9),
        ];
        let mut reversed = input.clone();
        reversed.reverse();

        let forward = deduplicate(input);
        assert_eq!(forward, deduplicate(reversed));
        assert_eq!(forward.len(), 2);
        assert_eq!(forward[1].representative.id, "b#1");
    }
}
