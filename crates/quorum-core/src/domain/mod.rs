//! Quorum domain model.
//!
//! Plain data types shared by every pipeline stage. Stages consume one of
//! these values and produce a new one; nothing here holds shared mutable
//! state.

pub mod artifact;
pub mod conflict;
pub mod critic_result;
pub mod error;
pub mod finding;
pub mod rubric;
pub mod verdict;

pub use artifact::{Artifact, ArtifactDomain, ArtifactSlice};
pub use conflict::{Claim, Conflict, ConflictKind, ResolvedConflict};
pub use critic_result::{CriticKind, CriticResult, CriticStatus};
pub use error::{CriticError, QuorumError, RejectionReason, Result};
pub use finding::{
    Contribution, Evidence, Finding, FindingStatus, FixProposal, MergedFinding, RawFinding,
    Rejection,
};
pub use rubric::{Criterion, EvidenceKind, EvidenceRank, Rubric, Severity};
pub use verdict::{Coverage, SeverityCounts, Verdict, VerdictLabel};
