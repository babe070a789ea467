//! Verdict synthesizer.
//!
//! A deterministic state machine over the final merged findings. No model
//! call happens here: the label follows from severities, fixes, escalations,
//! coverage and the weighted confidence alone.

use std::cmp::Ordering;

use crate::domain::{
    Conflict, Coverage, MergedFinding, Rubric, Severity, SeverityCounts, Verdict, VerdictLabel,
};

/// Overall confidence required for PASS.
pub const PASS_CONFIDENCE: f64 = 0.8;
/// Overall and per-HIGH confidence floor for PASS_WITH_NOTES.
pub const NOTES_CONFIDENCE: f64 = 0.6;
/// HIGH findings tolerated before the verdict drops to REVISE.
pub const MAX_HIGH_FOR_NOTES: usize = 2;

/// Produce the verdict for one run.
///
/// `findings` must already be deduplicated, resolved and recalibrated.
pub fn synthesize(
    mut findings: Vec<MergedFinding>,
    escalations: &[Conflict],
    rubric: &Rubric,
    coverage: &Coverage,
) -> Verdict {
    findings.sort_by(most_severe_first);
    let counts = SeverityCounts::of(&findings);

    if coverage.valid == 0 {
        let rationale = Rationale::new(&counts, coverage, escalations, &findings)
            .headline("no critic returned a valid result")
            .finish(0.0);
        return Verdict {
            label: VerdictLabel::Inconclusive,
            confidence: 0.0,
            findings,
            rationale,
        };
    }

    let confidence = overall_confidence(&findings, rubric, coverage);
    let (label, headline) = decide(&findings, escalations, coverage, &counts, confidence);
    let rationale = Rationale::new(&counts, coverage, escalations, &findings)
        .headline(headline)
        .finish(confidence);

    Verdict {
        label,
        confidence,
        findings,
        rationale,
    }
}

/// Weighted mean of resolved confidences, weighted by criterion weight.
///
/// With no findings there is nothing to weigh; the run is then only as
/// trustworthy as the share of critics that reported.
pub fn overall_confidence(findings: &[MergedFinding], rubric: &Rubric, coverage: &Coverage) -> f64 {
    if findings.is_empty() {
        return coverage.ratio();
    }

    let (weighted, total) = findings.iter().fold((0.0, 0.0), |(sum, total), f| {
        let w = rubric.weight_of(f.criterion_id());
        (sum + w * f.resolved_confidence, total + w)
    });

    let mean = if total > 0.0 {
        weighted / total
    } else {
        findings.iter().map(|f| f.resolved_confidence).sum::<f64>() / findings.len() as f64
    };
    mean.clamp(0.0, 1.0)
}

fn decide(
    findings: &[MergedFinding],
    escalations: &[Conflict],
    coverage: &Coverage,
    counts: &SeverityCounts,
    confidence: f64,
) -> (VerdictLabel, &'static str) {
    let unfixed_critical = findings
        .iter()
        .any(|f| f.resolved_severity == Severity::Critical && !f.is_fixed());
    if unfixed_critical {
        return (VerdictLabel::Reject, "unresolved CRITICAL finding");
    }
    if escalations.iter().any(|c| c.touches_critical) {
        return (VerdictLabel::Reject, "unresolved conflict on a CRITICAL criterion");
    }

    if counts.critical > 0 {
        return (VerdictLabel::Revise, "every CRITICAL finding has an accepted fix");
    }
    if counts.high > MAX_HIGH_FOR_NOTES {
        return (VerdictLabel::Revise, "too many HIGH findings");
    }

    let capped = !escalations.is_empty() || coverage.is_reduced();
    if counts.high == 0 && confidence >= PASS_CONFIDENCE && !capped {
        return (VerdictLabel::Pass, "no CRITICAL or HIGH findings");
    }

    let highs_confident = findings
        .iter()
        .filter(|f| f.resolved_severity == Severity::High)
        .all(|f| f.resolved_confidence >= NOTES_CONFIDENCE);
    if highs_confident && confidence >= NOTES_CONFIDENCE {
        let headline = if capped {
            "verdict capped by escalations or reduced coverage"
        } else {
            "minor findings only"
        };
        return (VerdictLabel::PassWithNotes, headline);
    }

    (VerdictLabel::Revise, "confidence below the notes floor")
}

fn most_severe_first(a: &MergedFinding, b: &MergedFinding) -> Ordering {
    b.resolved_severity
        .cmp(&a.resolved_severity)
        .then_with(|| b.resolved_confidence.total_cmp(&a.resolved_confidence))
        .then_with(|| a.id().cmp(b.id()))
}

// ---------------------------------------------------------------------------
// Rationale
// ---------------------------------------------------------------------------

struct Rationale {
    lines: Vec<String>,
}

impl Rationale {
    fn new(
        counts: &SeverityCounts,
        coverage: &Coverage,
        escalations: &[Conflict],
        findings: &[MergedFinding],
    ) -> Self {
        let mut lines = vec![format!(
            "findings: {} critical, {} high, {} medium, {} low",
            counts.critical, counts.high, counts.medium, counts.low
        )];

        lines.push(format!(
            "coverage: {}/{} critics reported",
            coverage.valid, coverage.dispatched
        ));
        if !coverage.timed_out.is_empty() {
            lines.push(format!("timed out: {}", coverage.timed_out.join(", ")));
        }
        if !coverage.errored.is_empty() {
            lines.push(format!("errored: {}", coverage.errored.join(", ")));
        }
        if coverage.deadline_exceeded {
            lines.push("run deadline exceeded; results are partial".to_string());
        }

        for c in escalations {
            lines.push(format!("escalated: {}", c.summary()));
        }

        for f in findings.iter().filter(|f| f.is_fixed()) {
            if let Some(fix) = &f.remediation {
                lines.push(format!("fix accepted for {}: {}", f.id(), fix.summary));
            }
        }

        Self { lines }
    }

    fn headline(mut self, headline: &str) -> Self {
        self.lines.insert(0, headline.to_string());
        self
    }

    fn finish(mut self, confidence: f64) -> String {
        self.lines
            .push(format!("overall confidence: {confidence:.2}"));
        self.lines.join("\n")
    }
}
