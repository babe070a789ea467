//! Concurrent critic dispatch under a run-level deadline.
//!
//! Each critic runs in its own task with its own slice and criteria; tasks
//! share only the read-only artifact and rubric. Results flow back through
//! the [`JoinSet`] and are collected by the dispatcher alone, so no task ever
//! writes into a shared collection or sees another critic's output.
//!
//! The run deadline is a hard cancellation point: when it passes, every task
//! still in flight is aborted and recorded as `TIMEOUT`.

use std::sync::Arc;

use quorum_state::KnownPattern;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{info, instrument, warn};

use crate::config::DepthProfile;
use crate::critic::Critic;
use crate::domain::{
    Artifact, CriticError, CriticKind, CriticResult, CriticStatus, Criterion, Rejection, Rubric,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::runner::{CriticRunner, RunnerOutput};

/// Everything the dispatcher collected for one run.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    /// One result per dispatched critic, in completion order.
    pub results: Vec<CriticResult>,
    pub rejections: Vec<Rejection>,
    /// The run deadline cut off at least one critic.
    pub deadline_exceeded: bool,
}

/// A dispatched critic that has not reported yet.
struct Pending {
    critic_id: String,
    kind: CriticKind,
    criteria: Vec<String>,
}

/// Run `critics` concurrently against `artifact` and collect their results.
///
/// At most `profile.max_concurrent` critics evaluate at once. Returns once
/// every critic has reported or the run deadline has passed, whichever comes
/// first; in the latter case the missing critics are marked `TIMEOUT`.
#[instrument(
    skip_all,
    fields(depth = %profile.name, critics = critics.len(), artifact = %artifact.name)
)]
pub async fn dispatch(
    critics: &[Arc<dyn Critic>],
    artifact: Arc<Artifact>,
    rubric: Arc<Rubric>,
    profile: &DepthProfile,
    known_patterns: Arc<Vec<KnownPattern>>,
) -> DispatchOutcome {
    let started = Instant::now();
    let deadline = started + profile.run_deadline();
    let budget = profile.critic_budget();
    let sem = Arc::new(Semaphore::new(profile.max_concurrent.max(1)));

    let mut pending: Vec<Option<Pending>> = Vec::with_capacity(critics.len());
    let mut tasks: JoinSet<(usize, RunnerOutput)> = JoinSet::new();

    for (index, critic) in critics.iter().enumerate() {
        let criteria: Vec<Criterion> = rubric
            .criteria
            .iter()
            .filter(|c| critic.accepts(c))
            .cloned()
            .collect();
        let slice = critic.slice(&artifact, &known_patterns);

        pending.push(Some(Pending {
            critic_id: critic.id().to_string(),
            kind: critic.kind(),
            criteria: criteria.iter().map(|c| c.id.clone()).collect(),
        }));
        METRICS.inc_critics_dispatched();

        let critic = Arc::clone(critic);
        let rubric = Arc::clone(&rubric);
        let budget = budget.clone();
        let sem = Arc::clone(&sem);

        tasks.spawn(async move {
            let _permit = sem.acquire_owned().await.ok();
            let output =
                CriticRunner::run(critic.as_ref(), &slice, &criteria, &rubric, &budget, deadline)
                    .await;
            (index, output)
        });
    }

    let mut outcome = DispatchOutcome::default();
    let mut cut_off = false;

    loop {
        match timeout_at(deadline, tasks.join_next()).await {
            Ok(Some(Ok((index, output)))) => {
                if let Some(slot) = pending.get_mut(index) {
                    *slot = None;
                }
                outcome.deadline_exceeded |= output.hit_run_deadline;
                outcome.rejections.extend(output.rejections);
                outcome.results.push(output.result);
            }
            Ok(Some(Err(join_err))) => {
                warn!(error = %join_err, "critic task did not complete");
            }
            Ok(None) => break,
            Err(_elapsed) => {
                cut_off = true;
                tasks.abort_all();
                break;
            }
        }
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    for missing in pending.into_iter().flatten() {
        let result = if cut_off {
            METRICS.inc_critic_timeouts();
            CriticResult::timed_out(
                missing.critic_id,
                missing.kind,
                missing.criteria,
                elapsed_ms,
                "run deadline exceeded",
            )
        } else {
            METRICS.inc_critic_errors();
            CriticResult {
                critic_id: missing.critic_id,
                kind: missing.kind,
                findings: Vec::new(),
                status: CriticStatus::Error,
                elapsed_ms,
                error: Some(CriticError::Cancelled.to_string()),
                evaluated_criteria: missing.criteria,
            }
        };
        obs::emit_critic_finished(&result);
        outcome.results.push(result);
    }
    outcome.deadline_exceeded |= cut_off;

    info!(
        results = outcome.results.len(),
        rejections = outcome.rejections.len(),
        deadline_exceeded = outcome.deadline_exceeded,
        elapsed_ms,
        "dispatch complete"
    );
    outcome
}
