use serde::{Deserialize, Serialize};

/// Embedding-capability level, in demotion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierLevel {
    /// Remote-hosted semantic embeddings.
    Advanced,
    /// Local semantic embeddings (adjacent process).
    Smart,
    /// Deterministic lexical hashing.
    Basic,
    /// Deterministic test vectors.
    Mock,
}

impl TierLevel {
    /// Stable string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            TierLevel::Advanced => "advanced",
            TierLevel::Smart => "smart",
            TierLevel::Basic => "basic",
            TierLevel::Mock => "mock",
        }
    }

    /// The next level down the fallback chain.
    pub fn next_down(&self) -> Option<TierLevel> {
        match self {
            TierLevel::Advanced => Some(TierLevel::Smart),
            TierLevel::Smart => Some(TierLevel::Basic),
            TierLevel::Basic => Some(TierLevel::Mock),
            TierLevel::Mock => None,
        }
    }

    /// All levels in priority order.
    pub fn chain() -> [TierLevel; 4] {
        [
            TierLevel::Advanced,
            TierLevel::Smart,
            TierLevel::Basic,
            TierLevel::Mock,
        ]
    }
}

impl std::fmt::Display for TierLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse grading used in capability reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    /// Best available.
    High,
    /// Usable middle ground.
    Medium,
    /// Degraded but functional.
    Low,
}

/// Boolean feature set plus coarse grades for a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCapabilities {
    /// Meaning-aware retrieval.
    pub semantic_search: bool,
    /// Real embedding vectors (vs. hashed surrogates).
    pub embeddings: bool,
    /// Content classification support.
    pub classification: bool,
    /// Vector-similarity ranking.
    pub vector_similarity: bool,
    /// Works with no network or external process.
    pub offline: bool,
    /// Throughput/latency grade.
    pub performance: Grade,
    /// Retrieval-quality grade.
    pub accuracy: Grade,
}

impl TierCapabilities {
    /// The capability set a given level provides.
    pub fn for_level(level: TierLevel) -> Self {
        match level {
            TierLevel::Advanced => Self {
                semantic_search: true,
                embeddings: true,
                classification: true,
                vector_similarity: true,
                offline: false,
                performance: Grade::Medium,
                accuracy: Grade::High,
            },
            TierLevel::Smart => Self {
                semantic_search: true,
                embeddings: true,
                classification: true,
                vector_similarity: true,
                offline: true,
                performance: Grade::Medium,
                accuracy: Grade::Medium,
            },
            TierLevel::Basic => Self {
                semantic_search: false,
                embeddings: false,
                classification: false,
                vector_similarity: true,
                offline: true,
                performance: Grade::High,
                accuracy: Grade::Low,
            },
            TierLevel::Mock => Self {
                semantic_search: false,
                embeddings: false,
                classification: false,
                vector_similarity: true,
                offline: true,
                performance: Grade::High,
                accuracy: Grade::Low,
            },
        }
    }
}

/// Snapshot of the active tier, reported to callers.
#[derive(Debug, Clone, Serialize)]
pub struct TierDescriptor {
    /// Active level.
    pub level: TierLevel,
    /// What the active level can do.
    pub capabilities: TierCapabilities,
    /// Levels still available below the active one, in demotion order.
    pub fallback_chain: Vec<TierLevel>,
    /// Human-readable selection/demotion summary.
    pub message: String,
}

/// Tier state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierState {
    /// Startup selection in progress; operations fail fast with `NotReady`.
    Probing,
    /// Serving at the given level.
    Active(TierLevel),
    /// Even the mock provider failed to initialize.
    Error,
}

impl TierState {
    /// Stable string form for health reporting.
    pub fn as_str(&self) -> &'static str {
        match self {
            TierState::Probing => "probing",
            TierState::Active(level) => level.as_str(),
            TierState::Error => "error",
        }
    }

    /// Returns `true` if operations are admitted in this state.
    pub fn is_serving(&self) -> bool {
        matches!(self, TierState::Active(_))
    }
}
