//! Confidence recalibration from corroboration and tester signals.

use serde::{Deserialize, Serialize};

use crate::domain::{MergedFinding, Severity};
use crate::services::TesterVerdict;

/// Bonus per additional independent corroborating critic.
pub const CORROBORATION_STEP: f64 = 0.1;
/// Ceiling on the total corroboration bonus.
pub const CORROBORATION_CAP: f64 = 0.3;
/// Multiplier applied when the tester could not confirm a finding.
pub const UNCONFIRMED_FACTOR: f64 = 0.5;

/// Tester outcome for one finding, as recorded in the audit trail.
///
/// `NotRun` (no tester, or tester disabled by the depth profile) is kept
/// distinct from an explicit `Unconfirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TesterSignal {
    Confirmed,
    Unconfirmed,
    CouldNotRun,
    NotRun,
}

impl From<Option<TesterVerdict>> for TesterSignal {
    fn from(v: Option<TesterVerdict>) -> Self {
        match v {
            Some(TesterVerdict::Confirmed) => TesterSignal::Confirmed,
            Some(TesterVerdict::Unconfirmed) => TesterSignal::Unconfirmed,
            Some(TesterVerdict::CouldNotRun) => TesterSignal::CouldNotRun,
            None => TesterSignal::NotRun,
        }
    }
}

/// Adjusted confidence and severity for one merged finding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Recalibration {
    pub confidence: f64,
    pub severity: Severity,
    pub signal: TesterSignal,
}

/// Recalibrate one merged finding.
///
/// Starts from the representative's own confidence, adds the corroboration
/// bonus, then applies the tester signal. The result is clamped to [0, 1].
pub fn recalibrate(finding: &MergedFinding, tester: Option<TesterVerdict>) -> Recalibration {
    let extra_critics = finding.corroboration_count.saturating_sub(1) as f64;
    let bonus = (extra_critics * CORROBORATION_STEP).min(CORROBORATION_CAP);
    let mut confidence = finding.representative.confidence + bonus;
    let mut severity = finding.resolved_severity;

    let signal = TesterSignal::from(tester);
    if signal == TesterSignal::Unconfirmed {
        confidence *= UNCONFIRMED_FACTOR;
        severity = severity.demote();
    }

    Recalibration {
        confidence: confidence.clamp(0.0, 1.0),
        severity,
        signal,
    }
}

/// Apply a recalibration, producing the adjusted merged finding.
pub fn apply(mut finding: MergedFinding, recalibration: &Recalibration) -> MergedFinding {
    finding.resolved_confidence = recalibration.confidence;
    finding.resolved_severity = recalibration.severity;
    finding
}
