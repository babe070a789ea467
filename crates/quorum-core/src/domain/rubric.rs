//! Rubric model: weighted criteria, severity levels and evidence kinds.
//!
//! A [`Rubric`] is an ordered set of [`Criterion`] values whose weights sum
//! to 1.0. Loading a rubric from disk is the caller's job; [`Rubric::validate`]
//! is offered so loaders can enforce the weight invariant at load time.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{QuorumError, Result};

/// Tolerance for the weight-sum check.
pub const WEIGHT_SUM_EPSILON: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// The four canonical severity levels. Ordered `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    /// One level lower. `Low` stays `Low`.
    pub fn demote(self) -> Self {
        match self {
            Severity::Critical => Severity::High,
            Severity::High => Severity::Medium,
            Severity::Medium | Severity::Low => Severity::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    /// Case-insensitive; surrounding whitespace is ignored. Anything outside
    /// the four canonical levels (e.g. `INFO`) is an error.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(Severity::Critical),
            "HIGH" => Ok(Severity::High),
            "MEDIUM" => Ok(Severity::Medium),
            "LOW" => Ok(Severity::Low),
            _ => Err(s.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Evidence kinds
// ---------------------------------------------------------------------------

/// What kind of machine-checkable proof a finding carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    ToolOutput,
    Quote,
    SchemaDiff,
    SearchResult,
}

impl EvidenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EvidenceKind::ToolOutput => "tool_output",
            EvidenceKind::Quote => "quote",
            EvidenceKind::SchemaDiff => "schema_diff",
            EvidenceKind::SearchResult => "search_result",
        }
    }

    /// Whether evidence of this kind meets a criterion requiring `required`:
    /// the same kind, or a kind that ranks strictly higher.
    pub fn satisfies(self, required: EvidenceKind) -> bool {
        self == required || self.rank() > required.rank()
    }

    /// Verifiability rank of this kind of evidence.
    pub fn rank(self) -> EvidenceRank {
        match self {
            EvidenceKind::ToolOutput | EvidenceKind::SchemaDiff => EvidenceRank::Executed,
            EvidenceKind::SearchResult => EvidenceRank::Retrieved,
            EvidenceKind::Quote => EvidenceRank::Quoted,
        }
    }
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verifiability ordering used by deduplication and conflict resolution.
///
/// `Assertion` is the rank of a claim with no evidence at all, which is what
/// a critic implicitly makes when it evaluates a criterion and raises nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceRank {
    Assertion,
    Quoted,
    Retrieved,
    Executed,
}

// ---------------------------------------------------------------------------
// Criterion / Rubric
// ---------------------------------------------------------------------------

/// One weighted rubric criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: String,
    pub description: String,
    /// Weight in (0, 1]; all weights of a rubric sum to 1.0.
    pub weight: f64,
    /// Default severity of a violation of this criterion. A conflict on a
    /// criterion whose severity is `Critical` touches a CRITICAL criterion.
    pub severity: Severity,
    /// Human-readable meaning of each severity level for this criterion.
    #[serde(default)]
    pub severity_definitions: BTreeMap<Severity, String>,
    pub required_evidence_kind: EvidenceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Criterion {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        weight: f64,
        severity: Severity,
        required_evidence_kind: EvidenceKind,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            weight,
            severity,
            severity_definitions: BTreeMap::new(),
            required_evidence_kind,
            category: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_severity_definition(mut self, severity: Severity, meaning: impl Into<String>) -> Self {
        self.severity_definitions.insert(severity, meaning.into());
        self
    }
}

/// An ordered set of criteria for one artifact domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub name: String,
    pub domain: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub criteria: Vec<Criterion>,
}

impl Rubric {
    pub fn new(name: impl Into<String>, domain: impl Into<String>, criteria: Vec<Criterion>) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            version: "1.0".to_string(),
            description: String::new(),
            criteria,
        }
    }

    /// `name@version`, used as the rubric reference in run manifests.
    pub fn reference(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    pub fn criterion(&self, id: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.id == id)
    }

    /// Weight of a criterion, 0.0 when the id is unknown.
    pub fn weight_of(&self, id: &str) -> f64 {
        self.criterion(id).map(|c| c.weight).unwrap_or(0.0)
    }

    /// Check the structural invariants of the rubric.
    pub fn validate(&self) -> Result<()> {
        if self.criteria.is_empty() {
            return Err(QuorumError::InvalidRubric(format!(
                "rubric {} has no criteria",
                self.reference()
            )));
        }

        let mut seen = HashSet::new();
        for c in &self.criteria {
            if !seen.insert(c.id.as_str()) {
                return Err(QuorumError::InvalidRubric(format!(
                    "duplicate criterion id {}",
                    c.id
                )));
            }
            if !(c.weight > 0.0 && c.weight <= 1.0) {
                return Err(QuorumError::InvalidRubric(format!(
                    "criterion {} has weight {} outside (0, 1]",
                    c.id, c.weight
                )));
            }
        }

        let sum: f64 = self.criteria.iter().map(|c| c.weight).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(QuorumError::InvalidRubric(format!(
                "criterion weights sum to {sum}, expected 1.0"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criterion(id: &str, weight: f64) -> Criterion {
        Criterion::new(id, "desc", weight, Severity::High, EvidenceKind::Quote)
    }

    #[test]
    fn test_severity_order_and_demote() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::Critical.demote(), Severity::High);
        assert_eq!(Severity::Low.demote(), Severity::Low);
    }

    #[test]
    fn test_severity_parse_rejects_non_canonical() {
        assert_eq!(" high ".parse::<Severity>(), Ok(Severity::High));
        assert_eq!("CRITICAL".parse::<Severity>(), Ok(Severity::Critical));
        assert!("INFO".parse::<Severity>().is_err());
        assert!("".parse::<Severity>().is_err());
    }

    #[test]
    fn test_evidence_rank_order() {
        assert_eq!(EvidenceKind::ToolOutput.rank(), EvidenceKind::SchemaDiff.rank());
        assert!(EvidenceKind::ToolOutput.rank() > EvidenceKind::SearchResult.rank());
        assert!(EvidenceKind::SearchResult.rank() > EvidenceKind::Quote.rank());
        assert!(EvidenceKind::Quote.rank() > EvidenceRank::Assertion);
    }

    #[test]
    fn test_stronger_evidence_satisfies_weaker_requirement() {
        assert!(EvidenceKind::ToolOutput.satisfies(EvidenceKind::Quote));
        assert!(EvidenceKind::Quote.satisfies(EvidenceKind::Quote));
        assert!(!EvidenceKind::Quote.satisfies(EvidenceKind::ToolOutput));
        assert!(!EvidenceKind::ToolOutput.satisfies(EvidenceKind::SchemaDiff));
    }

    #[test]
    fn test_validate_accepts_balanced_rubric() {
        let rubric = Rubric::new("r", "code", vec![criterion("A", 0.5), criterion("B", 0.5)]);
        assert!(rubric.validate().is_ok());
        assert_eq!(rubric.reference(), "r@1.0");
        assert_eq!(rubric.weight_of("B"), 0.5);
        assert_eq!(rubric.weight_of("Z"), 0.0);
    }

    #[test]
    fn test_validate_rejects_bad_weights() {
        let rubric = Rubric::new("r", "code", vec![criterion("A", 0.5), criterion("B", 0.4)]);
        assert!(matches!(rubric.validate(), Err(QuorumError::InvalidRubric(_))));

        let rubric = Rubric::new("r", "code", vec![criterion("A", 0.0), criterion("B", 1.0)]);
        assert!(rubric.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicates_and_empty() {
        let rubric = Rubric::new("r", "code", vec![criterion("A", 0.5), criterion("A", 0.5)]);
        let err = rubric.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));

        let rubric = Rubric::new("r", "code", vec![]);
        assert!(rubric.validate().is_err());
    }

    #[test]
    fn test_criterion_deserializes_from_json() {
        let c: Criterion = serde_json::from_value(serde_json::json!({
            "id": "SEC-001",
            "description": "no secrets in config",
            "weight": 0.25,
            "severity": "CRITICAL",
            "severity_definitions": { "CRITICAL": "live credential" },
            "required_evidence_kind": "tool_output"
        }))
        .unwrap();
        assert_eq!(c.severity, Severity::Critical);
        assert_eq!(c.required_evidence_kind, EvidenceKind::ToolOutput);
        assert_eq!(c.severity_definitions[&Severity::Critical], "live credential");
        assert!(c.category.is_none());
    }
}
