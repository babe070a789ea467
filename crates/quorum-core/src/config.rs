//! Run configuration: depth profiles and the top-level Quorum config.
//!
//! A depth profile decides which critics run, how long they may take, and how
//! much fix-loop budget a run gets. Three profiles are built in (`quick`,
//! `standard`, `thorough`); a TOML config may override any of them or add new
//! ones, and a few environment variables override the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::critic::CriticBudget;
use crate::domain::{CriticKind, QuorumError, Result};
use crate::similarity::DEDUP_THRESHOLD;

/// Hard ceiling on fixer invocations per finding per run.
pub const MAX_FIX_ATTEMPTS: u32 = 2;

pub const ENV_DEPTH: &str = "QUORUM_DEPTH";
pub const ENV_RUN_DEADLINE_SECS: &str = "QUORUM_RUN_DEADLINE_SECS";
pub const ENV_RUNS_DIR: &str = "QUORUM_RUNS_DIR";

const DEFAULT_DEPTH: &str = "standard";
const DEFAULT_MAX_TOKENS: u32 = 4096;

fn default_max_concurrent() -> usize {
    4
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

/// Model tier a critic is budgeted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Strongest model, for judgment-heavy roles.
    Tier1,
    /// Cost-efficient model, for execution-heavy roles.
    #[default]
    Tier2,
}

// ---------------------------------------------------------------------------
// Depth profiles
// ---------------------------------------------------------------------------

/// Preset selecting the critic set and budgets for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthProfile {
    /// Filled from the table key when omitted in a config file.
    #[serde(default)]
    pub name: String,
    pub critics: Vec<CriticKind>,
    pub run_deadline_secs: u64,
    pub critic_timeout_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Fixer invocations allowed per finding; capped at [`MAX_FIX_ATTEMPTS`].
    #[serde(default)]
    pub max_fix_loops: u32,
    #[serde(default)]
    pub run_tester: bool,
    #[serde(default)]
    pub tier: ModelTier,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl DepthProfile {
    /// Two critics, no tester, no fix loop.
    pub fn quick() -> Self {
        Self {
            name: "quick".to_string(),
            critics: vec![CriticKind::Correctness, CriticKind::Completeness],
            run_deadline_secs: 120,
            critic_timeout_secs: 60,
            max_concurrent: 2,
            max_fix_loops: 0,
            run_tester: false,
            tier: ModelTier::Tier2,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn standard() -> Self {
        Self {
            name: "standard".to_string(),
            critics: vec![
                CriticKind::Correctness,
                CriticKind::Completeness,
                CriticKind::Security,
                CriticKind::Architecture,
            ],
            run_deadline_secs: 300,
            critic_timeout_secs: 120,
            max_concurrent: 4,
            max_fix_loops: 1,
            run_tester: true,
            tier: ModelTier::Tier2,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn thorough() -> Self {
        Self {
            name: "thorough".to_string(),
            critics: vec![
                CriticKind::Correctness,
                CriticKind::Completeness,
                CriticKind::Security,
                CriticKind::Architecture,
                CriticKind::Delegation,
                CriticKind::Style,
            ],
            run_deadline_secs: 600,
            critic_timeout_secs: 240,
            max_concurrent: 6,
            max_fix_loops: MAX_FIX_ATTEMPTS,
            run_tester: true,
            tier: ModelTier::Tier1,
            max_tokens: 8192,
        }
    }

    /// Built-in profile by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "quick" => Some(Self::quick()),
            "standard" => Some(Self::standard()),
            "thorough" => Some(Self::thorough()),
            _ => None,
        }
    }

    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.run_deadline_secs)
    }

    pub fn critic_timeout(&self) -> Duration {
        Duration::from_secs(self.critic_timeout_secs)
    }

    /// Fixer invocations per finding after applying the hard ceiling.
    pub fn effective_fix_loops(&self) -> u32 {
        self.max_fix_loops.min(MAX_FIX_ATTEMPTS)
    }

    pub fn critic_budget(&self) -> CriticBudget {
        CriticBudget {
            timeout: self.critic_timeout(),
            tier: self.tier,
            max_tokens: self.max_tokens,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.critics.is_empty() {
            return Err(QuorumError::InvalidConfig(format!(
                "depth profile {} lists no critics",
                self.name
            )));
        }
        if self.run_deadline_secs == 0 || self.critic_timeout_secs == 0 {
            return Err(QuorumError::InvalidConfig(format!(
                "depth profile {} has a zero deadline",
                self.name
            )));
        }
        if self.max_concurrent == 0 {
            return Err(QuorumError::InvalidConfig(format!(
                "depth profile {} has max_concurrent = 0",
                self.name
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// QuorumConfig
// ---------------------------------------------------------------------------

/// Top-level configuration, usually loaded from `quorum.toml`.
///
/// ```toml
/// depth = "thorough"
/// runs_dir = "quorum-runs"
/// dedup_threshold = 0.7
///
/// [profiles.quick]
/// critics = ["correctness", "security"]
/// run_deadline_secs = 60
/// critic_timeout_secs = 30
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuorumConfig {
    pub depth: String,
    /// Profile overrides and additions, keyed by profile name.
    pub profiles: BTreeMap<String, DepthProfile>,
    /// Directory for the filesystem run store; `None` disables it.
    pub runs_dir: Option<PathBuf>,
    /// Override of the active profile's run deadline.
    pub run_deadline_secs: Option<u64>,
    pub dedup_threshold: f64,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH.to_string(),
            profiles: BTreeMap::new(),
            runs_dir: None,
            run_deadline_secs: None,
            dedup_threshold: DEDUP_THRESHOLD,
        }
    }
}

impl QuorumConfig {
    /// Parse and validate a TOML config.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(s)?;
        for (key, profile) in config.profiles.iter_mut() {
            if profile.name.is_empty() {
                profile.name = key.clone();
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Apply `QUORUM_DEPTH`, `QUORUM_RUN_DEADLINE_SECS` and `QUORUM_RUNS_DIR`
    /// from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(depth) = lookup(ENV_DEPTH) {
            self.depth = depth.trim().to_string();
        }
        if let Some(secs) = lookup(ENV_RUN_DEADLINE_SECS) {
            let secs = secs.trim().parse::<u64>().map_err(|_| {
                QuorumError::InvalidConfig(format!("{ENV_RUN_DEADLINE_SECS} is not a number: {secs}"))
            })?;
            self.run_deadline_secs = Some(secs);
        }
        if let Some(dir) = lookup(ENV_RUNS_DIR) {
            self.runs_dir = Some(PathBuf::from(dir));
        }
        self.validate()?;
        Ok(self)
    }

    /// Resolve a profile by name: config overrides first, then built-ins.
    pub fn profile(&self, name: &str) -> Result<DepthProfile> {
        let mut profile = self
            .profiles
            .get(name)
            .cloned()
            .or_else(|| DepthProfile::builtin(name))
            .ok_or_else(|| QuorumError::UnknownDepth(name.to_string()))?;
        if let Some(secs) = self.run_deadline_secs {
            profile.run_deadline_secs = secs;
        }
        Ok(profile)
    }

    /// The profile selected by `depth`.
    pub fn active_profile(&self) -> Result<DepthProfile> {
        self.profile(&self.depth)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.dedup_threshold > 0.0 && self.dedup_threshold <= 1.0) {
            return Err(QuorumError::InvalidConfig(format!(
                "dedup_threshold {} outside (0, 1]",
                self.dedup_threshold
            )));
        }
        if self.run_deadline_secs == Some(0) {
            return Err(QuorumError::InvalidConfig(
                "run_deadline_secs must be positive".to_string(),
            ));
        }
        for profile in self.profiles.values() {
            profile.validate()?;
        }
        self.active_profile()?.validate()
    }
}
