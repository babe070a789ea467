//! Scripted test doubles for critics and external services.
//!
//! Provides `ScriptedCritic`, `StaticTester`, `ScriptedFixer` and
//! `MemoryEscalationSink`. Everything here is deterministic: behavior is
//! fixed at construction, and delays go through `tokio::time` so paused-clock
//! tests stay exact.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::critic::{Critic, CriticBudget};
use crate::domain::{
    ArtifactSlice, CriticError, CriticKind, Criterion, Finding, FixProposal, MergedFinding,
    RawFinding,
};
use crate::services::{EscalationBatch, EscalationSink, FixerService, TesterService, TesterVerdict};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// ScriptedCritic
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Script {
    Findings(Vec<RawFinding>),
    Fail(String),
    Panic(String),
    Hang,
}

/// A critic that returns a fixed answer after an optional delay.
#[derive(Debug)]
pub struct ScriptedCritic {
    id: String,
    kind: CriticKind,
    script: Script,
    delay: Option<Duration>,
    accepted: Option<Vec<String>>,
    seen_patterns: Mutex<Vec<String>>,
}

impl ScriptedCritic {
    /// A critic that finds nothing.
    pub fn new(id: impl Into<String>, kind: CriticKind) -> Self {
        Self {
            id: id.into(),
            kind,
            script: Script::Findings(Vec::new()),
            delay: None,
            accepted: None,
            seen_patterns: Mutex::new(Vec::new()),
        }
    }

    pub fn with_findings(mut self, findings: Vec<RawFinding>) -> Self {
        self.script = Script::Findings(findings);
        self
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.script = Script::Fail(message.to_string());
        self
    }

    pub fn panicking(mut self, message: &str) -> Self {
        self.script = Script::Panic(message.to_string());
        self
    }

    /// Never answer.
    pub fn hanging(mut self) -> Self {
        self.script = Script::Hang;
        self
    }

    /// Only evaluate the listed criterion ids.
    pub fn accepting(mut self, criteria: &[&str]) -> Self {
        self.accepted = Some(criteria.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Pattern ids handed to the most recent evaluation.
    pub fn seen_patterns(&self) -> Vec<String> {
        lock(&self.seen_patterns).clone()
    }
}

#[async_trait]
impl Critic for ScriptedCritic {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> CriticKind {
        self.kind.clone()
    }

    fn accepts(&self, criterion: &Criterion) -> bool {
        self.accepted
            .as_ref()
            .map_or(true, |ids| ids.iter().any(|id| *id == criterion.id))
    }

    async fn evaluate(
        &self,
        slice: &ArtifactSlice,
        _criteria: &[Criterion],
        _budget: &CriticBudget,
    ) -> Result<Vec<RawFinding>, CriticError> {
        *lock(&self.seen_patterns) = slice
            .known_patterns
            .iter()
            .map(|p| p.pattern_id.clone())
            .collect();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.script {
            Script::Findings(findings) => Ok(findings.clone()),
            Script::Fail(message) => Err(CriticError::Failed(message.clone())),
            Script::Panic(message) => panic!("{message}"),
            Script::Hang => {
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// StaticTester
// ---------------------------------------------------------------------------

/// Tester answering from a fixed table keyed by finding id.
#[derive(Debug)]
pub struct StaticTester {
    verdicts: HashMap<String, TesterVerdict>,
    default: TesterVerdict,
    hang: bool,
    calls: Mutex<Vec<String>>,
}

impl StaticTester {
    /// Answers `default` for every finding not listed.
    pub fn new(default: TesterVerdict) -> Self {
        Self {
            verdicts: HashMap::new(),
            default,
            hang: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Record the call, then never answer.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn with_verdict(mut self, finding_id: &str, verdict: TesterVerdict) -> Self {
        self.verdicts.insert(finding_id.to_string(), verdict);
        self
    }

    /// Finding ids confirmed so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl TesterService for StaticTester {
    async fn confirm(&self, finding: &Finding) -> TesterVerdict {
        lock(&self.calls).push(finding.id.clone());
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.verdicts
            .get(&finding.id)
            .copied()
            .unwrap_or(self.default)
    }
}

// ---------------------------------------------------------------------------
// ScriptedFixer
// ---------------------------------------------------------------------------

/// Fixer whose proposal is accepted from a given attempt onward.
#[derive(Debug)]
pub struct ScriptedFixer {
    accept_on: Option<usize>,
    hang: bool,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedFixer {
    /// Proposals are accepted starting with the `attempt`-th call (1-based)
    /// for a finding.
    pub fn accepting_on(attempt: usize) -> Self {
        Self {
            accept_on: Some(attempt),
            hang: false,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Never proposes anything.
    pub fn declining() -> Self {
        Self {
            accept_on: None,
            hang: false,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Count the call, then never answer.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Number of times `propose_fix` was called for a finding.
    pub fn calls_for(&self, finding_id: &str) -> usize {
        lock(&self.calls).get(finding_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl FixerService for ScriptedFixer {
    async fn propose_fix(&self, finding: &MergedFinding) -> Option<FixProposal> {
        let attempt = {
            let mut calls = lock(&self.calls);
            let n = calls.entry(finding.id().to_string()).or_insert(0);
            *n += 1;
            *n
        };
        if self.hang {
            std::future::pending::<()>().await;
        }
        let accept_on = self.accept_on?;
        Some(FixProposal {
            finding_id: finding.id().to_string(),
            summary: format!("remediate {} (attempt {attempt})", finding.criterion_id()),
            patch: None,
            accepted: attempt >= accept_on,
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryEscalationSink
// ---------------------------------------------------------------------------

/// Escalation sink that keeps every submitted batch.
#[derive(Debug, Default)]
pub struct MemoryEscalationSink {
    batches: Mutex<Vec<EscalationBatch>>,
}

impl MemoryEscalationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<EscalationBatch> {
        lock(&self.batches).clone()
    }
}

impl EscalationSink for MemoryEscalationSink {
    fn submit(&self, batch: EscalationBatch) {
        lock(&self.batches).push(batch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Evidence, Severity};

    fn merged(id: &str) -> MergedFinding {
        MergedFinding::single(Finding {
            id: id.to_string(),
            critic_id: "a".to_string(),
            criterion_id: "C1".to_string(),
            severity: Severity::Critical,
            location: "loc-1".to_string(),
            description: "d".to_string(),
            evidence: Evidence::quote("x", "y"),
            confidence: 0.9,
        })
    }

    #[tokio::test]
    async fn test_fixer_accepts_from_configured_attempt() {
        let fixer = ScriptedFixer::accepting_on(2);
        let f = merged("a#1");
        assert!(!fixer.propose_fix(&f).await.unwrap().accepted);
        assert!(fixer.propose_fix(&f).await.unwrap().accepted);
        assert_eq!(fixer.calls_for("a#1"), 2);
        assert_eq!(fixer.calls_for("a#2"), 0);
    }

    #[tokio::test]
    async fn test_declining_fixer_counts_calls() {
        let fixer = ScriptedFixer::declining();
        assert!(fixer.propose_fix(&merged("a#1")).await.is_none());
        assert_eq!(fixer.calls_for("a#1"), 1);
    }

    #[tokio::test]
    async fn test_static_tester_uses_table_then_default() {
        let tester = StaticTester::new(TesterVerdict::Confirmed)
            .with_verdict("a#2", TesterVerdict::Unconfirmed);
        let f1 = merged("a#1").representative;
        let f2 = merged("a#2").representative;
        assert_eq!(tester.confirm(&f1).await, TesterVerdict::Confirmed);
        assert_eq!(tester.confirm(&f2).await, TesterVerdict::Unconfirmed);
        assert_eq!(tester.calls(), vec!["a#1", "a#2"]);
    }
}
