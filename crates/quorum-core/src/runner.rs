//! Critic runner: one critic, one invocation, one result.
//!
//! The runner enforces the earlier of the critic's own timeout and the run
//! deadline, turns failures and panics into `ERROR` results, and passes every
//! raw finding through the evidence validator before it is placed on the
//! [`CriticResult`].

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::critic::{Critic, CriticBudget};
use crate::domain::{
    ArtifactSlice, CriticError, CriticResult, CriticStatus, Criterion, Rejection,
    RejectionReason, Rubric,
};
use crate::evidence;
use crate::metrics::METRICS;
use crate::obs;

/// A critic's result plus everything the validator refused.
#[derive(Debug, Clone)]
pub struct RunnerOutput {
    pub result: CriticResult,
    pub rejections: Vec<Rejection>,
    /// The critic was cut off by the run deadline rather than its own timeout.
    pub hit_run_deadline: bool,
}

pub struct CriticRunner;

impl CriticRunner {
    /// Run one critic against its slice and criteria.
    ///
    /// Never fails: timeouts, errors and panics are reported through
    /// `result.status`.
    pub async fn run(
        critic: &dyn Critic,
        slice: &ArtifactSlice,
        criteria: &[Criterion],
        rubric: &Rubric,
        budget: &CriticBudget,
        run_deadline: Instant,
    ) -> RunnerOutput {
        let started = Instant::now();
        let critic_deadline = started + budget.timeout;
        let deadline = critic_deadline.min(run_deadline);
        let critic_id = critic.id().to_string();
        let evaluated_criteria: Vec<String> = criteria.iter().map(|c| c.id.clone()).collect();

        let call = AssertUnwindSafe(critic.evaluate(slice, criteria, budget)).catch_unwind();
        let outcome = timeout_at(deadline, call).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut result = CriticResult {
            critic_id: critic_id.clone(),
            kind: critic.kind(),
            findings: Vec::new(),
            status: CriticStatus::NoFindings,
            elapsed_ms,
            error: None,
            evaluated_criteria,
        };
        let mut rejections = Vec::new();
        let mut hit_run_deadline = false;

        match outcome {
            Err(_elapsed) => {
                hit_run_deadline = run_deadline <= critic_deadline;
                let reason = if hit_run_deadline {
                    "run deadline exceeded".to_string()
                } else {
                    format!("critic timed out after {}s", budget.timeout.as_secs())
                };
                warn!(critic_id = %critic_id, elapsed_ms, %reason, "critic timed out");
                METRICS.inc_critic_timeouts();
                result.status = CriticStatus::Timeout;
                result.error = Some(reason);
            }
            Ok(Err(panic)) => {
                let err = CriticError::Panicked(panic_message(panic.as_ref()));
                warn!(critic_id = %critic_id, error = %err, "critic panicked");
                METRICS.inc_critic_errors();
                result.status = CriticStatus::Error;
                result.error = Some(err.to_string());
            }
            Ok(Ok(Err(err))) => {
                warn!(critic_id = %critic_id, error = %err, "critic failed");
                METRICS.inc_critic_errors();
                result.status = CriticStatus::Error;
                result.error = Some(err.to_string());
            }
            Ok(Ok(Ok(raw_findings))) => {
                if !raw_findings.is_empty() {
                    result.status = CriticStatus::Ok;
                }
                let mut seen_ids = BTreeSet::new();
                for (index, raw) in raw_findings.into_iter().enumerate() {
                    let validated = evidence::validate(&raw, rubric, &critic_id, index)
                        .and_then(|finding| {
                            if seen_ids.insert(finding.id.clone()) {
                                Ok(finding)
                            } else {
                                Err(RejectionReason::DuplicateId { id: finding.id })
                            }
                        });
                    match validated {
                        Ok(finding) => result.findings.push(finding),
                        Err(reason) => {
                            obs::emit_finding_rejected(&critic_id, index, &reason);
                            METRICS.inc_findings_rejected();
                            rejections.push(Rejection {
                                critic_id: critic_id.clone(),
                                index,
                                reason,
                                raw,
                            });
                        }
                    }
                }
                debug!(
                    critic_id = %critic_id,
                    accepted = result.findings.len(),
                    rejected = rejections.len(),
                    "critic findings validated"
                );
            }
        }

        obs::emit_critic_finished(&result);
        RunnerOutput {
            result,
            rejections,
            hit_run_deadline,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::config::ModelTier;
    use crate::domain::{Artifact, ArtifactDomain, CriticKind, Evidence, EvidenceKind, RawFinding, Severity};
    use crate::fakes::ScriptedCritic;

    fn rubric() -> Rubric {
        Rubric::new(
            "r",
            "code",
            vec![Criterion::new("C1", "d", 1.0, Severity::High, EvidenceKind::Quote)],
        )
    }

    fn slice() -> ArtifactSlice {
        ArtifactSlice::whole(
            Arc::new(Artifact::new("a.rs", "fn main() {}", ArtifactDomain::Code)),
            Arc::new(Vec::new()),
        )
    }

    fn budget(secs: u64) -> CriticBudget {
        CriticBudget {
            timeout: Duration::from_secs(secs),
            tier: ModelTier::Tier2,
            max_tokens: 1024,
        }
    }

    async fn run(critic: &ScriptedCritic, timeout_secs: u64, deadline_secs: u64) -> RunnerOutput {
        let rubric = rubric();
        CriticRunner::run(
            critic,
            &slice(),
            &rubric.criteria,
            &rubric,
            &budget(timeout_secs),
            Instant::now() + Duration::from_secs(deadline_secs),
        )
        .await
    }

    #[tokio::test]
    async fn test_valid_and_invalid_findings_are_split() {
        let critic = ScriptedCritic::new("a", CriticKind::Correctness).with_findings(vec![
            RawFinding::new("C1", "HIGH", "l1", "bad", Some(Evidence::quote("x", "a.rs:1")), 0.8),
            RawFinding::new("C1", "HIGH", "l2", "no proof", None, 0.8),
        ]);
        let out = run(&critic, 10, 60).await;
        assert_eq!(out.result.status, CriticStatus::Ok);
        assert_eq!(out.result.findings.len(), 1);
        assert_eq!(out.result.findings[0].id, "a#1");
        assert_eq!(out.rejections.len(), 1);
        assert_eq!(out.rejections[0].index, 1);
        assert_eq!(out.result.evaluated_criteria, vec!["C1"]);
    }

    #[tokio::test]
    async fn test_colliding_finding_id_is_rejected() {
        let critic = ScriptedCritic::new("a", CriticKind::Correctness).with_findings(vec![
            RawFinding::new("C1", "HIGH", "l1", "bad", Some(Evidence::quote("x", "a.rs:1")), 0.8),
            RawFinding::new("C1", "LOW", "l2", "worse", Some(Evidence::quote("y", "a.rs:2")), 0.6)
                .with_id("1"),
        ]);
        let out = run(&critic, 10, 60).await;
        assert_eq!(out.result.findings.len(), 1);
        assert_eq!(out.result.findings[0].description, "bad");
        assert_eq!(out.rejections.len(), 1);
        assert_eq!(out.rejections[0].index, 1);
        assert_eq!(
            out.rejections[0].reason,
            RejectionReason::DuplicateId { id: "a#1".to_string() }
        );
    }

    #[tokio::test]
    async fn test_empty_output_is_no_findings() {
        let critic = ScriptedCritic::new("a", CriticKind::Correctness);
        let out = run(&critic, 10, 60).await;
        assert_eq!(out.result.status, CriticStatus::NoFindings);
        assert!(out.result.is_valid());
    }

    #[tokio::test]
    async fn test_failure_and_panic_become_error() {
        let failing = ScriptedCritic::new("f", CriticKind::Style).failing("provider unavailable");
        let out = run(&failing, 10, 60).await;
        assert_eq!(out.result.status, CriticStatus::Error);
        assert!(out.result.error.unwrap().contains("provider unavailable"));

        let panicking = ScriptedCritic::new("p", CriticKind::Style).panicking("index out of bounds");
        let out = run(&panicking, 10, 60).await;
        assert_eq!(out.result.status, CriticStatus::Error);
        assert!(out.result.error.unwrap().contains("index out of bounds"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_timeout_vs_run_deadline() {
        let slow = ScriptedCritic::new("s", CriticKind::Security).with_delay(Duration::from_secs(100));

        let out = run(&slow, 5, 60).await;
        assert_eq!(out.result.status, CriticStatus::Timeout);
        assert!(!out.hit_run_deadline);
        assert!(out.result.findings.is_empty());

        let out = run(&slow, 50, 20).await;
        assert_eq!(out.result.status, CriticStatus::Timeout);
        assert!(out.hit_run_deadline);
        assert_eq!(out.result.error.as_deref(), Some("run deadline exceeded"));
    }
}
