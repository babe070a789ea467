//! The critic capability and the registry that selects critics per run.
//!
//! A critic is an opaque evaluation function. The engine never looks inside
//! it: it hands over a read-only slice and the criteria, and gets raw claims
//! back. Critics hold no state shared with other critics.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quorum_state::KnownPattern;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{DepthProfile, ModelTier};
use crate::domain::{
    Artifact, ArtifactSlice, CriticError, CriticKind, Criterion, QuorumError, RawFinding, Result,
};

/// Resources granted to one critic invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticBudget {
    pub timeout: Duration,
    pub tier: ModelTier,
    pub max_tokens: u32,
}

/// An independent evaluator of rubric criteria.
#[async_trait]
pub trait Critic: Send + Sync {
    /// Unique id of this critic within a run.
    fn id(&self) -> &str;

    fn kind(&self) -> CriticKind;

    /// Whether this critic evaluates the given criterion. Defaults to all.
    fn accepts(&self, _criterion: &Criterion) -> bool {
        true
    }

    /// The slice of the artifact this critic is assigned. Defaults to the
    /// whole artifact.
    fn slice(&self, artifact: &Arc<Artifact>, known_patterns: &Arc<Vec<KnownPattern>>) -> ArtifactSlice {
        ArtifactSlice::whole(Arc::clone(artifact), Arc::clone(known_patterns))
    }

    /// Evaluate the slice against the criteria and return raw claims.
    async fn evaluate(
        &self,
        slice: &ArtifactSlice,
        criteria: &[Criterion],
        budget: &CriticBudget,
    ) -> std::result::Result<Vec<RawFinding>, CriticError>;
}

/// Registered critic implementations, keyed by kind.
#[derive(Default, Clone)]
pub struct CriticRegistry {
    critics: BTreeMap<CriticKind, Arc<dyn Critic>>,
}

impl CriticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a critic under its own kind, replacing any previous one.
    pub fn register(mut self, critic: Arc<dyn Critic>) -> Self {
        self.critics.insert(critic.kind(), critic);
        self
    }

    pub fn get(&self, kind: &CriticKind) -> Option<&Arc<dyn Critic>> {
        self.critics.get(kind)
    }

    pub fn kinds(&self) -> Vec<CriticKind> {
        self.critics.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.critics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.critics.is_empty()
    }

    /// Critics the profile asks for, in profile order. Kinds with no
    /// registered implementation are skipped with a warning.
    pub fn select(&self, profile: &DepthProfile) -> Result<Vec<Arc<dyn Critic>>> {
        let mut selected: Vec<Arc<dyn Critic>> = Vec::new();
        for kind in &profile.critics {
            match self.critics.get(kind) {
                Some(critic) => {
                    if selected.iter().any(|c| c.id() == critic.id()) {
                        warn!(
                            critic = %kind,
                            critic_id = %critic.id(),
                            depth = %profile.name,
                            "critic id already selected under another kind, skipping"
                        );
                    } else {
                        selected.push(Arc::clone(critic));
                    }
                }
                None => warn!(
                    critic = %kind,
                    depth = %profile.name,
                    available = ?self.kinds().iter().map(|k| k.to_string()).collect::<Vec<_>>(),
                    "critic not registered, skipping"
                ),
            }
        }

        if selected.is_empty() {
            return Err(QuorumError::NoCriticsSelected {
                depth: profile.name.clone(),
            });
        }
        Ok(selected)
    }
}

impl std::fmt::Debug for CriticRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CriticRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
