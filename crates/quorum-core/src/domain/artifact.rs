//! Artifacts under review and the read-only slices critics see.

use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use quorum_state::{ContentDigest, KnownPattern};
use serde::{Deserialize, Serialize};

/// Keywords that mark a text document as research rather than plain docs.
const RESEARCH_SIGNALS: &[&str] = &[
    "abstract",
    "methodology",
    "findings",
    "hypothesis",
    "literature",
    "citation",
    "et al.",
    "study",
    "results",
];

/// Research signals needed before a text document is classified as research.
const RESEARCH_SIGNAL_THRESHOLD: usize = 3;

/// Coarse artifact domain, used to pick rubrics and learning-memory scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactDomain {
    Code,
    Config,
    Research,
    Docs,
    Ops,
    Unknown,
}

impl ArtifactDomain {
    /// Classify from the path first, falling back to content signals for
    /// plain-text documents.
    pub fn classify(path: &str, text: &str) -> Self {
        let path = Path::new(path);
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if matches!(file_name.as_str(), "dockerfile" | "makefile" | "justfile") {
            return ArtifactDomain::Ops;
        }

        match ext.as_str() {
            "py" | "js" | "ts" | "java" | "go" | "rs" | "cpp" | "c" => ArtifactDomain::Code,
            "yaml" | "yml" | "json" | "toml" | "ini" | "env" => ArtifactDomain::Config,
            "sh" | "tf" | "nix" => ArtifactDomain::Ops,
            "md" | "rst" | "txt" => {
                let lower = text.to_lowercase();
                let signals = RESEARCH_SIGNALS
                    .iter()
                    .filter(|s| lower.contains(*s))
                    .count();
                if signals >= RESEARCH_SIGNAL_THRESHOLD {
                    ArtifactDomain::Research
                } else {
                    ArtifactDomain::Docs
                }
            }
            _ => ArtifactDomain::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactDomain::Code => "code",
            ArtifactDomain::Config => "config",
            ArtifactDomain::Research => "research",
            ArtifactDomain::Docs => "docs",
            ArtifactDomain::Ops => "ops",
            ArtifactDomain::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ArtifactDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The content under review. Read-only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Path or logical name of the artifact.
    pub name: String,
    pub content: String,
    pub domain: ArtifactDomain,
}

impl Artifact {
    pub fn new(name: impl Into<String>, content: impl Into<String>, domain: ArtifactDomain) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            domain,
        }
    }

    /// Build an artifact whose domain is classified from its path and text.
    pub fn classified(path: impl Into<String>, content: impl Into<String>) -> Self {
        let name = path.into();
        let content = content.into();
        let domain = ArtifactDomain::classify(&name, &content);
        Self {
            name,
            content,
            domain,
        }
    }

    pub fn digest(&self) -> ContentDigest {
        ContentDigest::from_bytes(self.content.as_bytes())
    }
}

/// The portion of an artifact assigned to one critic.
///
/// Slices share the artifact through an `Arc`; no critic can mutate it.
#[derive(Debug, Clone)]
pub struct ArtifactSlice {
    pub artifact: Arc<Artifact>,
    /// Byte range into `artifact.content`; `None` means the whole artifact.
    pub range: Option<Range<usize>>,
    /// Mandatory known patterns for the artifact's domain, used to pre-seed
    /// what a critic looks for.
    pub known_patterns: Arc<Vec<KnownPattern>>,
}

impl ArtifactSlice {
    pub fn whole(artifact: Arc<Artifact>, known_patterns: Arc<Vec<KnownPattern>>) -> Self {
        Self {
            artifact,
            range: None,
            known_patterns,
        }
    }

    pub fn with_range(mut self, range: Range<usize>) -> Self {
        self.range = Some(range);
        self
    }

    /// Text of the slice. A range that is out of bounds or splits a UTF-8
    /// character yields the empty string.
    pub fn text(&self) -> &str {
        match &self.range {
            None => &self.artifact.content,
            Some(r) => self.artifact.content.get(r.clone()).unwrap_or_default(),
        }
    }
}
