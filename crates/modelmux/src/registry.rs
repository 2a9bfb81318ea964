//! Model Registry: static-at-runtime catalog of backend model profiles.
//!
//! Profiles are created once at startup from configuration and never
//! mutated. `candidates()` returns a deterministic ordering so that the
//! dispatcher's "first remaining candidate" rule is reproducible.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::error::OrchestratorError;
use crate::task::TaskKind;

/// Immutable-per-process descriptor of one backend model.
#[derive(Debug, Clone)]
pub struct ModelProfile {
    /// Stable model identifier, unique within the catalog.
    pub id: String,
    /// Task kinds this model can serve.
    pub capabilities: BTreeSet<TaskKind>,
    /// Per-task output token overrides; kinds absent here fall back to
    /// the global budget table.
    pub max_output_tokens: BTreeMap<TaskKind, u32>,
    /// Per-call timeout for this model.
    pub timeout: Duration,
    /// Tie-break ordering within a capability (lower wins).
    pub priority: u8,
}

impl ModelProfile {
    pub fn new(id: impl Into<String>, capabilities: impl IntoIterator<Item = TaskKind>) -> Self {
        Self {
            id: id.into(),
            capabilities: capabilities.into_iter().collect(),
            max_output_tokens: BTreeMap::new(),
            timeout: Duration::from_secs(60),
            priority: 10,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the output token budget for one task kind.
    pub fn with_max_output_tokens(mut self, kind: TaskKind, tokens: u32) -> Self {
        self.max_output_tokens.insert(kind, tokens);
        self
    }

    /// Whether this model declares the given capability.
    pub fn serves(&self, kind: TaskKind) -> bool {
        self.capabilities.contains(&kind)
    }
}

/// The catalog of model profiles.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    profiles: Vec<ModelProfile>,
}

impl ModelRegistry {
    pub fn new(profiles: Vec<ModelProfile>) -> Self {
        Self { profiles }
    }

    /// Candidates for a task kind, ordered by `(priority, id)`.
    pub fn candidates(&self, kind: TaskKind) -> Vec<&ModelProfile> {
        let mut out: Vec<&ModelProfile> =
            self.profiles.iter().filter(|p| p.serves(kind)).collect();
        out.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        out
    }

    /// Look up a profile by id.
    pub fn profile(&self, id: &str) -> Option<&ModelProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    /// All profiles in catalog order.
    pub fn profiles(&self) -> &[ModelProfile] {
        &self.profiles
    }

    /// Configuration-time invariant: every task kind has at least one
    /// capable model, and ids are unique. Called at startup so a
    /// misconfigured catalog fails fast instead of at request time.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        let mut seen = BTreeSet::new();
        for profile in &self.profiles {
            if !seen.insert(profile.id.as_str()) {
                return Err(OrchestratorError::Config(format!(
                    "duplicate model id '{}'",
                    profile.id
                )));
            }
            if profile.capabilities.is_empty() {
                return Err(OrchestratorError::Config(format!(
                    "model '{}' declares no capabilities",
                    profile.id
                )));
            }
        }
        for &kind in TaskKind::all() {
            if self.candidates(kind).is_empty() {
                return Err(OrchestratorError::Config(format!(
                    "no model serves task kind '{kind}'"
                )));
            }
        }
        Ok(())
    }
}
