//! Global atomic counters for Quorum runs.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (the pipeline does this once per run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free counters, no allocations.
pub struct Metrics {
    critics_dispatched: AtomicU64,
    critic_timeouts: AtomicU64,
    critic_errors: AtomicU64,
    findings_rejected: AtomicU64,
    findings_merged: AtomicU64,
    escalations: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            critics_dispatched: AtomicU64::new(0),
            critic_timeouts: AtomicU64::new(0),
            critic_errors: AtomicU64::new(0),
            findings_rejected: AtomicU64::new(0),
            findings_merged: AtomicU64::new(0),
            escalations: AtomicU64::new(0),
        }
    }

    pub fn inc_critics_dispatched(&self) {
        self.critics_dispatched.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "critics_dispatched", "counter incremented");
    }

    pub fn inc_critic_timeouts(&self) {
        self.critic_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "critic_timeouts", "counter incremented");
    }

    pub fn inc_critic_errors(&self) {
        self.critic_errors.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "critic_errors", "counter incremented");
    }

    pub fn inc_findings_rejected(&self) {
        self.findings_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "findings_rejected", "counter incremented");
    }

    /// Count findings folded into another finding by deduplication.
    pub fn add_findings_merged(&self, n: u64) {
        self.findings_merged.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "findings_merged", n, "counter incremented");
    }

    pub fn add_escalations(&self, n: u64) {
        self.escalations.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "escalations", n, "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            critics_dispatched = self.critics_dispatched(),
            critic_timeouts = self.critic_timeouts(),
            critic_errors = self.critic_errors(),
            findings_rejected = self.findings_rejected(),
            findings_merged = self.findings_merged(),
            escalations = self.escalations(),
        );
    }

    pub fn critics_dispatched(&self) -> u64 {
        self.critics_dispatched.load(Ordering::Relaxed)
    }

    pub fn critic_timeouts(&self) -> u64 {
        self.critic_timeouts.load(Ordering::Relaxed)
    }

    pub fn critic_errors(&self) -> u64 {
        self.critic_errors.load(Ordering::Relaxed)
    }

    pub fn findings_rejected(&self) -> u64 {
        self.findings_rejected.load(Ordering::Relaxed)
    }

    pub fn findings_merged(&self) -> u64 {
        self.findings_merged.load(Ordering::Relaxed)
    }

    pub fn escalations(&self) -> u64 {
        self.escalations.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.critics_dispatched.store(0, Ordering::Relaxed);
        self.critic_timeouts.store(0, Ordering::Relaxed);
        self.critic_errors.store(0, Ordering::Relaxed);
        self.findings_rejected.store(0, Ordering::Relaxed);
        self.findings_merged.store(0, Ordering::Relaxed);
        self.escalations.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_critics_dispatched();
        m.inc_critics_dispatched();
        m.inc_critic_timeouts();
        m.add_findings_merged(3);
        assert_eq!(m.critics_dispatched(), 2);
        assert_eq!(m.critic_timeouts(), 1);
        assert_eq!(m.findings_merged(), 3);
        assert_eq!(m.escalations(), 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_critic_errors();
        m.inc_findings_rejected();
        m.add_escalations(2);
        m.reset();
        assert_eq!(m.critic_errors(), 0);
        assert_eq!(m.findings_rejected(), 0);
        assert_eq!(m.escalations(), 0);
    }
}
