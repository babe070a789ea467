//! Critic identity and per-critic results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::finding::Finding;

/// The evaluator variant a critic implements.
///
/// Serialized as a plain lowercase string; names outside the built-in set
/// become [`CriticKind::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CriticKind {
    Correctness,
    Security,
    Completeness,
    Architecture,
    Delegation,
    Style,
    Tester,
    Custom(String),
}

impl CriticKind {
    pub fn as_str(&self) -> &str {
        match self {
            CriticKind::Correctness => "correctness",
            CriticKind::Security => "security",
            CriticKind::Completeness => "completeness",
            CriticKind::Architecture => "architecture",
            CriticKind::Delegation => "delegation",
            CriticKind::Style => "style",
            CriticKind::Tester => "tester",
            CriticKind::Custom(name) => name,
        }
    }
}

impl From<String> for CriticKind {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "correctness" => CriticKind::Correctness,
            "security" => CriticKind::Security,
            "completeness" => CriticKind::Completeness,
            "architecture" => CriticKind::Architecture,
            "delegation" => CriticKind::Delegation,
            "style" => CriticKind::Style,
            "tester" => CriticKind::Tester,
            _ => CriticKind::Custom(s),
        }
    }
}

impl From<CriticKind> for String {
    fn from(kind: CriticKind) -> Self {
        kind.as_str().to_string()
    }
}

impl FromStr for CriticKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CriticKind::from(s.to_string()))
    }
}

impl fmt::Display for CriticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a critic invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CriticStatus {
    /// Returned at least one raw finding.
    Ok,
    /// Did not return before its own timeout or the run deadline.
    Timeout,
    /// Failed or panicked.
    Error,
    /// Returned an empty finding list.
    NoFindings,
}

impl CriticStatus {
    /// Valid results count toward coverage; timeouts and errors do not.
    pub fn is_valid(self) -> bool {
        matches!(self, CriticStatus::Ok | CriticStatus::NoFindings)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CriticStatus::Ok => "OK",
            CriticStatus::Timeout => "TIMEOUT",
            CriticStatus::Error => "ERROR",
            CriticStatus::NoFindings => "NO_FINDINGS",
        }
    }
}

impl fmt::Display for CriticStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one critic invocation within one run.
///
/// `findings` only ever holds validated findings; anything the validator
/// refused is reported separately as a rejection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticResult {
    pub critic_id: String,
    pub kind: CriticKind,
    pub findings: Vec<Finding>,
    pub status: CriticStatus,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Criterion ids this critic was asked to evaluate.
    #[serde(default)]
    pub evaluated_criteria: Vec<String>,
}

impl CriticResult {
    /// Result for a critic that was abandoned at the run deadline.
    pub fn timed_out(
        critic_id: impl Into<String>,
        kind: CriticKind,
        evaluated_criteria: Vec<String>,
        elapsed_ms: u64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            critic_id: critic_id.into(),
            kind,
            findings: Vec::new(),
            status: CriticStatus::Timeout,
            elapsed_ms,
            error: Some(reason.into()),
            evaluated_criteria,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status.is_valid()
    }

    /// Whether this critic was asked to evaluate the criterion.
    pub fn evaluated(&self, criterion_id: &str) -> bool {
        self.evaluated_criteria.iter().any(|c| c == criterion_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critic_kind_string_roundtrip() {
        let kinds: Vec<CriticKind> =
            serde_json::from_str(r#"["security", "Style", "license-audit"]"#).unwrap();
        assert_eq!(kinds[0], CriticKind::Security);
        assert_eq!(kinds[1], CriticKind::Style);
        assert_eq!(kinds[2], CriticKind::Custom("license-audit".to_string()));

        let json = serde_json::to_string(&kinds).unwrap();
        assert_eq!(json, r#"["security","style","license-audit"]"#);
    }

    #[test]
    fn test_status_validity() {
        assert!(CriticStatus::Ok.is_valid());
        assert!(CriticStatus::NoFindings.is_valid());
        assert!(!CriticStatus::Timeout.is_valid());
        assert!(!CriticStatus::Error.is_valid());
        assert_eq!(
            serde_json::to_string(&CriticStatus::NoFindings).unwrap(),
            "\"NO_FINDINGS\""
        );
    }

    #[test]
    fn test_timed_out_result_has_no_findings() {
        let r = CriticResult::timed_out(
            "security",
            CriticKind::Security,
            vec!["C1".to_string()],
            30_000,
            "run deadline exceeded",
        );
        assert_eq!(r.status, CriticStatus::Timeout);
        assert!(r.findings.is_empty());
        assert!(!r.is_valid());
        assert!(r.evaluated("C1"));
        assert!(!r.evaluated("C2"));
    }
}
