//! Tier selection and runtime fallback.
//!
//! The [`TierController`] owns the provider chain in priority order
//! `advanced → smart → basic → mock`, probes it at startup, proxies `embed`
//! calls to the active provider, and demotes one level when the active
//! provider fails repeatedly. Promotion is never automatic: it happens only
//! at process restart or via [`TierController::re_probe`].

mod error;
mod types;

#[cfg(test)]
mod tests;

pub use error::TierError;
pub use types::{Grade, TierCapabilities, TierDescriptor, TierLevel, TierState};

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::constants::{
    EMBED_BUDGET_MS, LOCAL_PROBE_BUDGET_SECS, TIER_FAILURE_THRESHOLD, TIER_FAILURE_WINDOW_SECS,
};
use crate::embedding::{
    Embedder, Embedding, EmbeddingError, LexicalEmbedder, LocalConfig, LocalEmbedder, MockEmbedder,
    RemoteConfig, RemoteEmbedder,
};

/// What goes into the provider chain.
#[derive(Debug, Clone, Default)]
pub struct TierChainSpec {
    /// Remote provider config; enables the `advanced` tier.
    pub remote: Option<RemoteConfig>,
    /// Local sidecar config; enables the `smart` tier.
    pub local: Option<LocalConfig>,
    /// Collection dimension every tier must serve.
    pub dimension: usize,
    /// Highest tier to consider; higher tiers are skipped.
    pub preferred: Option<TierLevel>,
    /// Test environments select `mock` directly.
    pub test_mode: bool,
}

/// Builds the provider chain for a spec, in priority order.
pub fn build_chain(spec: &TierChainSpec) -> Result<Vec<(TierLevel, Box<dyn Embedder>)>, TierError> {
    let mut chain: Vec<(TierLevel, Box<dyn Embedder>)> = Vec::new();

    if spec.test_mode {
        chain.push((
            TierLevel::Mock,
            Box::new(MockEmbedder::new(spec.dimension)),
        ));
        return Ok(chain);
    }

    let floor = spec.preferred.unwrap_or(TierLevel::Advanced);

    if floor <= TierLevel::Advanced
        && let Some(remote) = &spec.remote
    {
        chain.push((
            TierLevel::Advanced,
            Box::new(RemoteEmbedder::new(remote.clone())?),
        ));
    }
    if floor <= TierLevel::Smart
        && let Some(local) = &spec.local
    {
        chain.push((
            TierLevel::Smart,
            Box::new(LocalEmbedder::new(local.clone())?),
        ));
    }
    chain.push((
        TierLevel::Basic,
        Box::new(LexicalEmbedder::new(spec.dimension)),
    ));
    chain.push((
        TierLevel::Mock,
        Box::new(MockEmbedder::new(spec.dimension)),
    ));

    Ok(chain)
}

struct ControllerState {
    phase: TierState,
    active_idx: usize,
    failures: VecDeque<Instant>,
    demoted_until: Option<Instant>,
    message: String,
    last_error: Option<String>,
}

/// Owns the provider chain and the active-tier state machine.
pub struct TierController {
    providers: Vec<(TierLevel, Box<dyn Embedder>)>,
    dimension: usize,
    embed_budget: Duration,
    probe_budget: Duration,
    failure_window: Duration,
    failure_threshold: usize,
    demotion_hold: Duration,
    state: RwLock<ControllerState>,
}

impl std::fmt::Debug for TierController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierController")
            .field(
                "providers",
                &self.providers.iter().map(|(l, _)| *l).collect::<Vec<_>>(),
            )
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl TierController {
    /// Creates a controller over `providers` (priority order, highest first).
    ///
    /// Every provider must serve `dimension`; the collection's dimension is
    /// fixed for its lifetime and is never silently truncated.
    pub fn new(
        providers: Vec<(TierLevel, Box<dyn Embedder>)>,
        dimension: usize,
    ) -> Result<Self, TierError> {
        for (level, provider) in &providers {
            if provider.dimension() != dimension {
                return Err(TierError::DimensionMismatch {
                    level: level.as_str(),
                    expected: dimension,
                    actual: provider.dimension(),
                });
            }
        }

        Ok(Self {
            providers,
            dimension,
            embed_budget: Duration::from_millis(EMBED_BUDGET_MS),
            probe_budget: Duration::from_secs(LOCAL_PROBE_BUDGET_SECS),
            failure_window: Duration::from_secs(TIER_FAILURE_WINDOW_SECS),
            failure_threshold: TIER_FAILURE_THRESHOLD,
            demotion_hold: Duration::from_secs(TIER_FAILURE_WINDOW_SECS),
            state: RwLock::new(ControllerState {
                phase: TierState::Probing,
                active_idx: 0,
                failures: VecDeque::new(),
                demoted_until: None,
                message: "probing".to_string(),
                last_error: None,
            }),
        })
    }

    /// Builds the chain from a spec and creates the controller.
    pub fn from_spec(spec: &TierChainSpec) -> Result<Self, TierError> {
        Self::new(build_chain(spec)?, spec.dimension)
    }

    /// Overrides the per-call embedding budget.
    pub fn with_embed_budget(mut self, budget: Duration) -> Self {
        self.embed_budget = budget;
        self
    }

    /// Overrides the per-provider probe budget.
    pub fn with_probe_budget(mut self, budget: Duration) -> Self {
        self.probe_budget = budget;
        self
    }

    /// The collection dimension every tier serves.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Current state-machine phase.
    pub async fn state(&self) -> TierState {
        self.state.read().await.phase
    }

    /// Most recent provider failure, for health reporting.
    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    /// Returns `true` while the latest demotion's sticky hold is in effect.
    ///
    /// Nothing promotes automatically, so the hold is informational: it
    /// tells operators how fresh a demotion is before they reach for
    /// [`re_probe`](Self::re_probe).
    pub async fn demotion_held(&self) -> bool {
        self.state
            .read()
            .await
            .demoted_until
            .is_some_and(|until| Instant::now() < until)
    }

    /// Startup selection: probes providers in priority order and activates
    /// the first one that answers within the probe budget.
    pub async fn probe(&self) -> Result<TierDescriptor, TierError> {
        {
            let mut st = self.state.write().await;
            st.phase = TierState::Probing;
            st.failures.clear();
            st.demoted_until = None;
        }

        let mut probe_errors = Vec::new();
        for (idx, (level, provider)) in self.providers.iter().enumerate() {
            debug!(tier = %level, "Probing embedding provider");
            match tokio::time::timeout(self.probe_budget, provider.probe()).await {
                Ok(Ok(report)) => {
                    if report.dimension != self.dimension {
                        warn!(
                            tier = %level,
                            expected = self.dimension,
                            actual = report.dimension,
                            "Provider probe reported wrong dimension, skipping"
                        );
                        probe_errors.push(format!(
                            "{}: dimension {} != {}",
                            level, report.dimension, self.dimension
                        ));
                        continue;
                    }

                    let mut st = self.state.write().await;
                    st.active_idx = idx;
                    st.phase = TierState::Active(*level);
                    st.message = format!("selected '{}' ({})", level, report.model_tag);
                    info!(tier = %level, model = %report.model_tag, "Embedding tier selected");
                    drop(st);
                    return self.descriptor().await;
                }
                Ok(Err(e)) => {
                    debug!(tier = %level, error = %e, "Provider probe failed");
                    probe_errors.push(format!("{}: {}", level, e));
                }
                Err(_) => {
                    debug!(tier = %level, "Provider probe timed out");
                    probe_errors.push(format!("{}: probe timed out", level));
                }
            }
        }

        let message = probe_errors.join("; ");
        let mut st = self.state.write().await;
        st.phase = TierState::Error;
        st.last_error = Some(message.clone());
        warn!(%message, "No embedding tier available");
        Err(TierError::Exhausted { message })
    }

    /// Discards the sticky demotion and re-runs startup selection.
    pub async fn re_probe(&self) -> Result<TierDescriptor, TierError> {
        info!("Explicit tier re-probe requested");
        self.probe().await
    }

    /// Describes the active tier.
    pub async fn descriptor(&self) -> Result<TierDescriptor, TierError> {
        let st = self.state.read().await;
        match st.phase {
            TierState::Probing => Err(TierError::NotReady),
            TierState::Error => Err(TierError::Exhausted {
                message: st.last_error.clone().unwrap_or_default(),
            }),
            TierState::Active(level) => Ok(TierDescriptor {
                level,
                capabilities: TierCapabilities::for_level(level),
                fallback_chain: self.providers[st.active_idx + 1..]
                    .iter()
                    .map(|(l, _)| *l)
                    .collect(),
                message: st.message.clone(),
            }),
        }
    }

    /// Demotes one level down the chain, returning the new level.
    ///
    /// Used internally at the failure threshold and by the engine after its
    /// retry budget is exhausted. Demotion is sticky for the hold duration.
    pub async fn demote(&self) -> Option<TierLevel> {
        let mut st = self.state.write().await;
        let TierState::Active(from) = st.phase else {
            return None;
        };
        if st.active_idx + 1 >= self.providers.len() {
            return None;
        }

        st.active_idx += 1;
        let to = self.providers[st.active_idx].0;
        st.phase = TierState::Active(to);
        st.failures.clear();
        st.demoted_until = Some(Instant::now() + self.demotion_hold);
        st.message = format!("demoted from '{}' to '{}' after repeated failures", from, to);
        warn!(from = %from, to = %to, "Embedding tier demoted");
        Some(to)
    }

    /// Embeds through the active provider, demoting and retrying once at the
    /// next level when the active one keeps failing.
    pub async fn embed(&self, text: &str) -> Result<Embedding, TierError> {
        let idx = self.active_index().await?;

        match self.attempt(idx, text).await {
            Ok(embedding) => {
                self.clear_failures().await;
                Ok(embedding)
            }
            Err(err @ EmbeddingError::InvalidInput { .. }) => Err(err.into()),
            Err(err @ EmbeddingError::MalformedResponse { .. }) => Err(err.into()),
            Err(err) => {
                let at_threshold = self.record_failure(&err).await;
                if !at_threshold {
                    return Err(err.into());
                }
                match self.demote().await {
                    Some(level) => {
                        info!(tier = %level, "Retrying embed at demoted tier");
                        let idx = self.active_index().await?;
                        match self.attempt(idx, text).await {
                            Ok(embedding) => {
                                self.clear_failures().await;
                                Ok(embedding)
                            }
                            Err(e) => {
                                self.record_failure(&e).await;
                                Err(e.into())
                            }
                        }
                    }
                    None => Err(err.into()),
                }
            }
        }
    }

    async fn active_index(&self) -> Result<usize, TierError> {
        let st = self.state.read().await;
        match st.phase {
            TierState::Probing => Err(TierError::NotReady),
            TierState::Error => Err(TierError::Exhausted {
                message: st.last_error.clone().unwrap_or_default(),
            }),
            TierState::Active(_) => Ok(st.active_idx),
        }
    }

    async fn attempt(&self, idx: usize, text: &str) -> Result<Embedding, EmbeddingError> {
        let (_, provider) = &self.providers[idx];
        match tokio::time::timeout(self.embed_budget, provider.embed(text)).await {
            Ok(result) => result,
            Err(_) => Err(EmbeddingError::Timeout {
                provider: provider.name(),
                budget_ms: self.embed_budget.as_millis() as u64,
            }),
        }
    }

    /// Records a failure of the active provider; returns `true` when the
    /// sliding-window threshold is reached. A success resets the window.
    async fn record_failure(&self, err: &EmbeddingError) -> bool {
        let mut st = self.state.write().await;
        let now = Instant::now();
        st.failures.push_back(now);
        while let Some(front) = st.failures.front() {
            if now.duration_since(*front) > self.failure_window {
                st.failures.pop_front();
            } else {
                break;
            }
        }
        st.last_error = Some(err.to_string());
        st.failures.len() >= self.failure_threshold
    }

    async fn clear_failures(&self) {
        let mut st = self.state.write().await;
        st.failures.clear();
    }
}
