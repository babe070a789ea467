//! Quorum Core: evaluation aggregation and verdict engine
//!
//! Fans an artifact out to independent critics, keeps only evidence-backed
//! findings, folds duplicates, settles or escalates disagreements,
//! recalibrates confidence and emits one verdict per run.
//!
//! ## Pipeline
//!
//! dispatch → validate → deduplicate → resolve → recalibrate → synthesize
//!
//! ## Key Components
//!
//! - `QualityGate`: entry point, owns the optional external services
//! - `Critic` / `CriticRegistry`: the critic capability and per-depth selection
//! - `dispatch`: concurrent critics under a hard run deadline
//! - `synthesize`: deterministic verdict state machine
//! - `fakes`: scripted critics and service doubles for tests

pub mod config;
pub mod critic;
pub mod dedup;
pub mod dispatch;
pub mod domain;
pub mod evidence;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod recalibrate;
pub mod resolver;
pub mod runner;
pub mod services;
pub mod similarity;
pub mod synthesize;
pub mod telemetry;

pub use config::{DepthProfile, ModelTier, QuorumConfig, MAX_FIX_ATTEMPTS};
pub use critic::{Critic, CriticBudget, CriticRegistry};
pub use dedup::{deduplicate, deduplicate_with_threshold};
pub use dispatch::{dispatch, DispatchOutcome};
pub use domain::{
    Artifact, ArtifactDomain, ArtifactSlice, Claim, Conflict, ConflictKind, Contribution,
    Coverage, CriticError, CriticKind, CriticResult, CriticStatus, Criterion, Evidence,
    EvidenceKind, EvidenceRank, Finding, FindingStatus, FixProposal, MergedFinding, QuorumError,
    RawFinding, Rejection, RejectionReason, ResolvedConflict, Result, Rubric, Severity,
    SeverityCounts, Verdict, VerdictLabel,
};
pub use pipeline::{QualityGate, RunReport};
pub use recalibrate::{recalibrate, Recalibration, TesterSignal};
pub use resolver::{resolve, resolve_with_threshold, Resolution};
pub use runner::{CriticRunner, RunnerOutput};
pub use services::{
    EscalationBatch, EscalationSink, FixAttempt, FixerService, TesterService, TesterVerdict,
};
pub use similarity::{same_region, sequence_ratio, DEDUP_THRESHOLD};
pub use synthesize::synthesize;
