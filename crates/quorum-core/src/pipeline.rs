//! The quality gate: one artifact in, one verdict out.
//!
//! [`QualityGate::evaluate`] runs the stages strictly in order:
//! dispatch (evidence validation happens inside each runner), deduplicate,
//! resolve, tester confirmations, recalibrate, fixer, synthesize. Every stage
//! takes the previous stage's output by value and returns a new value.
//!
//! Audit writes, learning-memory updates and escalation submissions are side
//! channels. Their failures are logged and never change the verdict.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::Utc;
use futures::future::join_all;
use quorum_state::{
    ContentDigest, FsRunStore, KnownPattern, LearningMemory, PatternObservation, RecordKind,
    RunArtifactStore, RunId, RunManifest, RunSummary,
};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn, Instrument};

use crate::config::{DepthProfile, QuorumConfig};
use crate::critic::{Critic, CriticRegistry};
use crate::dedup::deduplicate_with_threshold;
use crate::dispatch::dispatch;
use crate::domain::{
    Artifact, Conflict, Coverage, CriticResult, MergedFinding, Rejection, ResolvedConflict, Result,
    Rubric, Severity, Verdict,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::recalibrate::{self, TesterSignal};
use crate::resolver::resolve_with_threshold;
use crate::services::{
    EscalationBatch, EscalationSink, FixAttempt, FixerService, TesterService, TesterVerdict,
};
use crate::similarity::{sequence_ratio, DEDUP_THRESHOLD};
use crate::synthesize::synthesize;

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub verdict: Verdict,
    pub critic_results: Vec<CriticResult>,
    pub rejections: Vec<Rejection>,
    pub escalations: Vec<Conflict>,
    pub resolved_conflicts: Vec<ResolvedConflict>,
    /// Tester outcome per merged finding id.
    pub tester_signals: BTreeMap<String, TesterSignal>,
    pub fix_attempts: Vec<FixAttempt>,
    pub coverage: Coverage,
    pub duration_ms: u64,
}

/// Aggregation engine with its optional collaborators.
pub struct QualityGate {
    registry: CriticRegistry,
    tester: Option<Arc<dyn TesterService>>,
    fixer: Option<Arc<dyn FixerService>>,
    learning_memory: Option<Arc<dyn LearningMemory>>,
    run_store: Option<Arc<dyn RunArtifactStore>>,
    escalation_sink: Option<Arc<dyn EscalationSink>>,
    dedup_threshold: f64,
}

impl QualityGate {
    pub fn new(registry: CriticRegistry) -> Self {
        Self {
            registry,
            tester: None,
            fixer: None,
            learning_memory: None,
            run_store: None,
            escalation_sink: None,
            dedup_threshold: DEDUP_THRESHOLD,
        }
    }

    /// Build a gate from config: dedup threshold and, when `runs_dir` is
    /// set, a filesystem run store.
    pub fn from_config(registry: CriticRegistry, config: &QuorumConfig) -> Result<Self> {
        config.validate()?;
        let mut gate = Self::new(registry).with_dedup_threshold(config.dedup_threshold);
        if let Some(dir) = &config.runs_dir {
            gate = gate.with_run_store(Arc::new(FsRunStore::new(dir)?));
        }
        Ok(gate)
    }

    pub fn with_tester(mut self, tester: Arc<dyn TesterService>) -> Self {
        self.tester = Some(tester);
        self
    }

    pub fn with_fixer(mut self, fixer: Arc<dyn FixerService>) -> Self {
        self.fixer = Some(fixer);
        self
    }

    pub fn with_learning_memory(mut self, memory: Arc<dyn LearningMemory>) -> Self {
        self.learning_memory = Some(memory);
        self
    }

    pub fn with_run_store(mut self, store: Arc<dyn RunArtifactStore>) -> Self {
        self.run_store = Some(store);
        self
    }

    pub fn with_escalation_sink(mut self, sink: Arc<dyn EscalationSink>) -> Self {
        self.escalation_sink = Some(sink);
        self
    }

    pub fn with_dedup_threshold(mut self, threshold: f64) -> Self {
        self.dedup_threshold = threshold;
        self
    }

    /// Evaluate one artifact against a rubric at the given depth.
    ///
    /// Fails only on invalid input (rubric or profile) or when no registered
    /// critic matches the profile. Critic failures, timeouts and store
    /// failures are recorded and the run still produces a verdict.
    #[instrument(skip_all, fields(artifact = %artifact.name, depth = %profile.name))]
    pub async fn evaluate(
        &self,
        artifact: Artifact,
        rubric: &Rubric,
        profile: &DepthProfile,
    ) -> Result<RunReport> {
        rubric.validate()?;
        profile.validate()?;
        let critics = self.registry.select(profile)?;

        let artifact = Arc::new(artifact);
        let domain = artifact.domain.as_str().to_string();
        let known = self.load_known_patterns(&domain).await;

        let manifest = RunManifest {
            artifact_digest: artifact.digest(),
            domain,
            rubric: rubric.reference(),
            depth: profile.name.clone(),
            critics: critics.iter().map(|c| c.id().to_string()).collect(),
        };
        let audit = Audit::begin(self.run_store.as_deref(), manifest).await;
        let span = obs::run_span(&audit.run_id.0);

        self.run(critics, artifact, rubric, profile, known, audit)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        critics: Vec<Arc<dyn Critic>>,
        artifact: Arc<Artifact>,
        rubric: &Rubric,
        profile: &DepthProfile,
        known: Vec<KnownPattern>,
        mut audit: Audit<'_>,
    ) -> Result<RunReport> {
        let started = Instant::now();
        let run_id = audit.run_id.clone();
        obs::emit_run_started(&run_id.0, &artifact.name, &profile.name, critics.len());

        let mandatory: Vec<KnownPattern> = known.iter().filter(|p| p.mandatory).cloned().collect();
        let outcome = dispatch(
            &critics,
            Arc::clone(&artifact),
            Arc::new(rubric.clone()),
            profile,
            Arc::new(mandatory),
        )
        .await;

        let mut critic_results = outcome.results;
        critic_results.sort_by(|a, b| a.critic_id.cmp(&b.critic_id));
        let coverage = Coverage::from_results(&critic_results, outcome.deadline_exceeded);
        for result in &critic_results {
            audit.record(RecordKind::CriticResult, result).await;
        }
        for rejection in &outcome.rejections {
            audit.record(RecordKind::Rejection, rejection).await;
        }

        // Deduplicate
        let findings: Vec<_> = critic_results
            .iter()
            .filter(|r| r.is_valid())
            .flat_map(|r| r.findings.iter().cloned())
            .collect();
        let total_findings = findings.len();
        let merged = deduplicate_with_threshold(findings, self.dedup_threshold);
        METRICS.add_findings_merged(total_findings.saturating_sub(merged.len()) as u64);

        // Resolve
        let resolution =
            resolve_with_threshold(merged, &critic_results, rubric, self.dedup_threshold);
        METRICS.add_escalations(resolution.escalations.len() as u64);
        for conflict in &resolution.escalations {
            obs::emit_conflict_escalated(conflict);
            audit.record(RecordKind::Escalation, conflict).await;
        }

        // Tester, then recalibrate
        let verdicts = self.confirm(&resolution.findings, profile).await;
        let mut tester_signals = BTreeMap::new();
        let mut recalibrated = Vec::with_capacity(resolution.findings.len());
        for (finding, verdict) in resolution.findings.into_iter().zip(verdicts) {
            let r = recalibrate::recalibrate(&finding, verdict);
            tester_signals.insert(finding.id().to_string(), r.signal);
            audit
                .record(
                    RecordKind::TesterSignal,
                    &serde_json::json!({ "finding_id": finding.id(), "signal": r.signal }),
                )
                .await;
            recalibrated.push(recalibrate::apply(finding, &r));
        }

        // Fixer
        let (final_findings, fix_attempts) = self.fix(recalibrated, profile).await;
        for attempt in &fix_attempts {
            audit.record(RecordKind::FixAttempt, attempt).await;
        }

        // Synthesize
        let verdict = synthesize(final_findings, &resolution.escalations, rubric, &coverage);
        for finding in &verdict.findings {
            audit.record(RecordKind::MergedFinding, finding).await;
        }
        audit.record(RecordKind::Verdict, &verdict).await;

        self.submit_escalations(&run_id, &resolution.escalations, &verdict.findings);
        self.record_observations(&artifact, &known, &verdict.findings)
            .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        audit.finish(&verdict, duration_ms).await;
        obs::emit_verdict_emitted(&run_id.0, &verdict, duration_ms);
        METRICS.flush();

        Ok(RunReport {
            run_id,
            verdict,
            critic_results,
            rejections: outcome.rejections,
            escalations: resolution.escalations,
            resolved_conflicts: resolution.resolved,
            tester_signals,
            fix_attempts,
            coverage,
            duration_ms,
        })
    }

    async fn load_known_patterns(&self, domain: &str) -> Vec<KnownPattern> {
        let Some(memory) = &self.learning_memory else {
            return Vec::new();
        };
        match memory.known_patterns(domain).await {
            Ok(patterns) => patterns,
            Err(e) => {
                warn!(domain = %domain, error = %e, "known patterns unavailable");
                Vec::new()
            }
        }
    }

    /// One tester verdict per finding, in order; all `None` when the tester
    /// is absent or disabled by the profile. A call that outlives the
    /// profile's critic timeout counts as `COULD_NOT_RUN`.
    async fn confirm(
        &self,
        findings: &[MergedFinding],
        profile: &DepthProfile,
    ) -> Vec<Option<TesterVerdict>> {
        match &self.tester {
            Some(tester) if profile.run_tester => {
                let limit = profile.critic_timeout();
                let calls = findings.iter().map(|f| async move {
                    match timeout(limit, tester.confirm(&f.representative)).await {
                        Ok(verdict) => Some(verdict),
                        Err(_elapsed) => {
                            warn!(
                                finding_id = %f.id(),
                                timeout_secs = limit.as_secs(),
                                "tester did not answer in time"
                            );
                            Some(TesterVerdict::CouldNotRun)
                        }
                    }
                });
                join_all(calls).await
            }
            _ => vec![None; findings.len()],
        }
    }

    /// Offer each uncontested CRITICAL finding to the fixer, stopping at the
    /// first accepted proposal or after the profile's attempt budget.
    async fn fix(
        &self,
        mut findings: Vec<MergedFinding>,
        profile: &DepthProfile,
    ) -> (Vec<MergedFinding>, Vec<FixAttempt>) {
        let mut attempts = Vec::new();
        let Some(fixer) = &self.fixer else {
            return (findings, attempts);
        };
        let budget = profile.effective_fix_loops();
        let limit = profile.critic_timeout();

        for finding in findings.iter_mut() {
            if finding.resolved_severity != Severity::Critical || finding.is_contested() {
                continue;
            }
            for attempt in 1..=budget {
                let proposal = match timeout(limit, fixer.propose_fix(finding)).await {
                    Ok(proposal) => proposal,
                    Err(_elapsed) => {
                        warn!(
                            finding_id = %finding.id(),
                            attempt,
                            timeout_secs = limit.as_secs(),
                            "fixer did not answer in time"
                        );
                        None
                    }
                };
                let accepted = proposal.as_ref().is_some_and(|p| p.accepted);
                attempts.push(FixAttempt {
                    finding_id: finding.id().to_string(),
                    attempt,
                    proposal: proposal.clone(),
                });
                if accepted {
                    debug!(finding_id = %finding.id(), attempt, "fix accepted");
                    finding.remediation = proposal;
                    break;
                }
            }
        }
        (findings, attempts)
    }

    fn submit_escalations(&self, run_id: &RunId, escalations: &[Conflict], findings: &[MergedFinding]) {
        let Some(sink) = &self.escalation_sink else {
            return;
        };
        let unresolved: Vec<MergedFinding> =
            findings.iter().filter(|f| f.is_contested()).cloned().collect();
        if escalations.is_empty() && unresolved.is_empty() {
            return;
        }
        sink.submit(EscalationBatch {
            run_id: run_id.clone(),
            escalations: escalations.to_vec(),
            unresolved,
        });
    }

    /// Write findings that match no known pattern back to learning memory.
    async fn record_observations(
        &self,
        artifact: &Artifact,
        known: &[KnownPattern],
        findings: &[MergedFinding],
    ) {
        let Some(memory) = &self.learning_memory else {
            return;
        };
        let now = Utc::now();
        let observations: Vec<PatternObservation> = findings
            .iter()
            .filter(|f| !matches_known(f, known, self.dedup_threshold))
            .map(|f| PatternObservation {
                pattern_id: pattern_id(f),
                criterion_id: f.criterion_id().to_string(),
                description: f.representative.description.clone(),
                severity: f.resolved_severity.to_string(),
                observed_at: now,
            })
            .collect();
        if observations.is_empty() {
            return;
        }

        let domain = artifact.domain.as_str();
        let count = observations.len();
        match memory.record_observations(domain, observations).await {
            Ok(()) => debug!(domain = %domain, count, "observations recorded"),
            Err(e) => warn!(domain = %domain, error = %e, "failed to record observations"),
        }
    }
}

fn matches_known(finding: &MergedFinding, known: &[KnownPattern], threshold: f64) -> bool {
    known.iter().any(|p| {
        p.criterion_id == finding.criterion_id()
            && sequence_ratio(&p.description, &finding.representative.description) >= threshold
    })
}

/// Stable id for a pattern: criterion plus whitespace-normalized, lowercased
/// description.
pub fn pattern_id(finding: &MergedFinding) -> String {
    let normalized = finding
        .representative
        .description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let digest = ContentDigest::from_bytes(format!("{}\n{normalized}", finding.criterion_id()).as_bytes());
    format!("pat-{}", digest.short())
}

// ---------------------------------------------------------------------------
// Audit trail
// ---------------------------------------------------------------------------

/// Best-effort writer for one run's audit records.
struct Audit<'a> {
    store: Option<&'a dyn RunArtifactStore>,
    run_id: RunId,
    written: u64,
}

impl<'a> Audit<'a> {
    async fn begin(store: Option<&'a dyn RunArtifactStore>, manifest: RunManifest) -> Audit<'a> {
        let Some(s) = store else {
            return Audit {
                store: None,
                run_id: RunId::new(),
                written: 0,
            };
        };
        match s.begin_run(manifest).await {
            Ok(run_id) => Audit {
                store,
                run_id,
                written: 0,
            },
            Err(e) => {
                let run_id = RunId::new();
                obs::emit_audit_error(&run_id.0, &e);
                Audit {
                    store: None,
                    run_id,
                    written: 0,
                }
            }
        }
    }

    async fn record<T: Serialize + Sync + ?Sized>(&mut self, kind: RecordKind, value: &T) {
        let Some(store) = self.store else {
            return;
        };
        match append(store, &self.run_id, kind, value).await {
            Ok(_) => self.written += 1,
            Err(e) => obs::emit_audit_error(&self.run_id.0, &format!("{e:#}")),
        }
    }

    async fn finish(self, verdict: &Verdict, duration_ms: u64) {
        let Some(store) = self.store else {
            return;
        };
        let summary = RunSummary {
            verdict: verdict.label.to_string(),
            total_records: self.written,
            duration_ms,
        };
        match store.finish_run(&self.run_id, summary).await {
            Ok(()) => info!(run_id = %self.run_id, records = self.written, "run recorded"),
            Err(e) => obs::emit_audit_error(&self.run_id.0, &e),
        }
    }
}

async fn append<T: Serialize + Sync + ?Sized>(
    store: &dyn RunArtifactStore,
    run_id: &RunId,
    kind: RecordKind,
    value: &T,
) -> anyhow::Result<u64> {
    let payload =
        serde_json::to_value(value).with_context(|| format!("failed to serialize {kind} record"))?;
    let seq = store
        .append(run_id, kind, payload)
        .await
        .with_context(|| format!("failed to append {kind} record"))?;
    Ok(seq)
}
