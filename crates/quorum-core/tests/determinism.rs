//! Verdicts depend on the set of critic results, never on completion order.

use std::sync::Arc;
use std::time::Duration;

use quorum_core::fakes::ScriptedCritic;
use quorum_core::{
    deduplicate, recalibrate, resolve, synthesize, Artifact, ArtifactDomain, Coverage, CriticKind,
    CriticRegistry, CriticResult, CriticStatus, Criterion, DepthProfile, Evidence, EvidenceKind,
    Finding, QualityGate, RawFinding, Rubric, Severity, Verdict,
};

fn rubric() -> Rubric {
    Rubric::new(
        "service",
        "code",
        vec![
            Criterion::new("C1", "correctness", 0.6, Severity::Critical, EvidenceKind::Quote),
            Criterion::new("C2", "style", 0.4, Severity::Medium, EvidenceKind::Quote),
        ],
    )
}

fn findings_a() -> Vec<RawFinding> {
    vec![
        RawFinding::new("C1", "HIGH", "svc.rs:10-14", "unchecked unwrap on network read", Some(Evidence::quote(".unwrap()", "svc.rs:12")), 0.8),
        RawFinding::new("C2", "LOW", "svc.rs:30", "long function", Some(Evidence::quote("fn handle", "svc.rs:30")), 0.5),
    ]
}

fn findings_b() -> Vec<RawFinding> {
    vec![
        RawFinding::new("C1", "HIGH", "svc.rs:12", "unchecked unwrap on the network read", Some(Evidence::tool_output("clippy: unwrap_used", "cargo clippy")), 0.7),
        RawFinding::new("C2", "MEDIUM", "svc.rs:30", "function mixes parsing and io", Some(Evidence::quote("read_to_end", "svc.rs:33")), 0.6),
    ]
}

async fn verdict_with_delays(delay_a: u64, delay_b: u64) -> Verdict {
    let a = ScriptedCritic::new("a", CriticKind::Correctness)
        .with_findings(findings_a())
        .with_delay(Duration::from_secs(delay_a));
    let b = ScriptedCritic::new("b", CriticKind::Security)
        .with_findings(findings_b())
        .with_delay(Duration::from_secs(delay_b));
    let gate = QualityGate::new(
        CriticRegistry::new()
            .register(Arc::new(a))
            .register(Arc::new(b)),
    );

    let mut profile = DepthProfile::quick();
    profile.critics = vec![CriticKind::Correctness, CriticKind::Security];

    gate.evaluate(
        Artifact::new("svc.rs", "fn handle() {}", ArtifactDomain::Code),
        &rubric(),
        &profile,
    )
    .await
    .unwrap()
    .verdict
}

#[tokio::test(start_paused = true)]
async fn reversed_completion_order_yields_same_verdict() {
    let a_first = verdict_with_delays(1, 2).await;
    let b_first = verdict_with_delays(2, 1).await;
    assert_eq!(a_first, b_first);
    assert_eq!(a_first.findings[0].corroboration_count, 2);
}

fn finding(id: &str, critic: &str, severity: Severity, location: &str, description: &str) -> Finding {
    Finding {
        id: id.to_string(),
        critic_id: critic.to_string(),
        criterion_id: "C1".to_string(),
        severity,
        location: location.to_string(),
        description: description.to_string(),
        evidence: Evidence::quote(format!("payload of {id}"), format!("{id}.rs:1")),
        confidence: 0.7,
    }
}

fn result(critic: &str, findings: Vec<Finding>) -> CriticResult {
    CriticResult {
        critic_id: critic.to_string(),
        kind: CriticKind::Custom(critic.to_string()),
        status: if findings.is_empty() {
            CriticStatus::NoFindings
        } else {
            CriticStatus::Ok
        },
        findings,
        elapsed_ms: 5,
        error: None,
        evaluated_criteria: vec!["C1".to_string(), "C2".to_string()],
    }
}

fn aggregate(results: &[CriticResult]) -> Verdict {
    let rubric = rubric();
    let findings: Vec<Finding> = results.iter().flat_map(|r| r.findings.clone()).collect();
    let resolution = resolve(deduplicate(findings), results, &rubric);
    let recalibrated = resolution
        .findings
        .into_iter()
        .map(|f| {
            let r = recalibrate(&f, None);
            quorum_core::recalibrate::apply(f, &r)
        })
        .collect();
    let coverage = Coverage::from_results(results, false);
    synthesize(recalibrated, &resolution.escalations, &rubric, &coverage)
}

#[test]
fn aggregation_is_order_independent_and_repeatable() {
    let results = vec![
        result("x", vec![finding("x#1", "x", Severity::High, "loc-1", "race on shared counter")]),
        result("y", vec![finding("y#1", "y", Severity::Low, "loc-1", "race on the shared counter")]),
        result("z", vec![finding("z#1", "z", Severity::Medium, "loc-2", "missing retry")]),
        result("w", Vec::new()),
    ];
    let mut reversed = results.clone();
    reversed.reverse();

    let first = aggregate(&results);
    assert_eq!(first, aggregate(&results));
    assert_eq!(first, aggregate(&reversed));
}
