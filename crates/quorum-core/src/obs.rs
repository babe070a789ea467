//! Structured observability hooks for Quorum run lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span, attached to the pipeline future with
//!   [`tracing::Instrument`]
//! - Emission functions for lifecycle events: run start, critic finish,
//!   finding rejection, conflict escalation, verdict

use tracing::{info, warn};

use crate::domain::{Conflict, CriticResult, RejectionReason, Verdict};

/// Span tagged with the run id. Everything logged inside it carries `run_id`.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("quorum.run", run_id = %run_id)
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, artifact: &str, depth: &str, critics: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        artifact = %artifact,
        depth = %depth,
        critics = critics,
    );
}

/// Emit event: one critic finished (in any status).
pub fn emit_critic_finished(result: &CriticResult) {
    info!(
        event = "critic.finished",
        critic_id = %result.critic_id,
        status = %result.status,
        findings = result.findings.len(),
        elapsed_ms = result.elapsed_ms,
    );
}

/// Emit event: the evidence validator refused a raw finding (warning level).
pub fn emit_finding_rejected(critic_id: &str, index: usize, reason: &RejectionReason) {
    warn!(
        event = "finding.rejected",
        critic_id = %critic_id,
        index = index,
        reason = %reason,
    );
}

/// Emit event: a conflict could not be settled locally.
pub fn emit_conflict_escalated(conflict: &Conflict) {
    warn!(
        event = "conflict.escalated",
        criterion_id = %conflict.criterion_id,
        location = %conflict.location,
        touches_critical = conflict.touches_critical,
    );
}

/// Emit event: verdict emitted.
pub fn emit_verdict_emitted(run_id: &str, verdict: &Verdict, duration_ms: u64) {
    info!(
        event = "verdict.emitted",
        run_id = %run_id,
        label = %verdict.label,
        confidence = verdict.confidence,
        findings = verdict.findings.len(),
        duration_ms = duration_ms,
    );
}

/// Emit event: an audit write failed; the run continues (warning level).
pub fn emit_audit_error(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.audit_error", run_id = %run_id, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let span = run_span("test-run-id");
        let _entered = span.enter();
    }
}
