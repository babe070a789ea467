//! Verdict: the terminal artifact of a run.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::critic_result::{CriticResult, CriticStatus};
use super::finding::MergedFinding;
use super::rubric::Severity;

/// Categorical outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictLabel {
    Pass,
    PassWithNotes,
    Revise,
    Reject,
    /// No critic returned a valid result; nothing can be concluded.
    Inconclusive,
}

impl VerdictLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            VerdictLabel::Pass => "PASS",
            VerdictLabel::PassWithNotes => "PASS_WITH_NOTES",
            VerdictLabel::Revise => "REVISE",
            VerdictLabel::Reject => "REJECT",
            VerdictLabel::Inconclusive => "INCONCLUSIVE",
        }
    }
}

impl fmt::Display for VerdictLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of the dispatched critic set actually reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub dispatched: usize,
    pub valid: usize,
    /// Critic ids with status TIMEOUT, sorted.
    pub timed_out: Vec<String>,
    /// Critic ids with status ERROR, sorted.
    pub errored: Vec<String>,
    pub deadline_exceeded: bool,
}

impl Coverage {
    pub fn from_results(results: &[CriticResult], deadline_exceeded: bool) -> Self {
        let mut timed_out = Vec::new();
        let mut errored = Vec::new();
        let mut valid = 0;
        for r in results {
            match r.status {
                CriticStatus::Timeout => timed_out.push(r.critic_id.clone()),
                CriticStatus::Error => errored.push(r.critic_id.clone()),
                CriticStatus::Ok | CriticStatus::NoFindings => valid += 1,
            }
        }
        timed_out.sort();
        errored.sort();
        Self {
            dispatched: results.len(),
            valid,
            timed_out,
            errored,
            deadline_exceeded,
        }
    }

    /// Fraction of dispatched critics that returned a valid result.
    pub fn ratio(&self) -> f64 {
        if self.dispatched == 0 {
            0.0
        } else {
            self.valid as f64 / self.dispatched as f64
        }
    }

    pub fn is_reduced(&self) -> bool {
        self.valid < self.dispatched || self.deadline_exceeded
    }
}

/// Number of merged findings at each severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    pub fn of(findings: &[MergedFinding]) -> Self {
        let mut counts = Self::default();
        for f in findings {
            match f.resolved_severity {
                Severity::Critical => counts.critical += 1,
                Severity::High => counts.high += 1,
                Severity::Medium => counts.medium += 1,
                Severity::Low => counts.low += 1,
            }
        }
        counts
    }
}

/// The adjudicated outcome of a run. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub label: VerdictLabel,
    /// Overall confidence in [0, 1].
    pub confidence: f64,
    /// Final merged findings, most severe first.
    pub findings: Vec<MergedFinding>,
    pub rationale: String,
}

impl Verdict {
    pub fn counts(&self) -> SeverityCounts {
        SeverityCounts::of(&self.findings)
    }
}
