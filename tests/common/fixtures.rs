//! Shared fixtures for the integration suites.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use memorai::embedding::{Embedder, Embedding, EmbeddingError, MockEmbedder, ProbeReport};
use memorai::engine::{EngineConfig, MemoryEngine};
use memorai::index::InMemoryIndex;
use memorai::ratelimit::{RateLimiter, RateLimiterConfig};
use memorai::tier::{TierController, TierLevel};

/// Dimension used by every fixture engine.
pub const DIM: usize = 64;

/// Engine config with test-friendly backoff.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        retry_base_delay: Duration::from_millis(2),
        ..EngineConfig::default()
    }
}

/// Wraps the mock embedder and counts embed calls.
pub struct CountingEmbedder {
    inner: MockEmbedder,
    pub calls: Arc<AtomicUsize>,
}

impl CountingEmbedder {
    pub fn new(dimension: usize) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner: MockEmbedder::new(dimension),
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait::async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &'static str {
        "counting"
    }

    async fn probe(&self) -> Result<ProbeReport, EmbeddingError> {
        self.inner.probe().await
    }
}

/// An embedder that always fails to embed but probes as available.
pub struct OutageEmbedder {
    dimension: usize,
    pub calls: Arc<AtomicUsize>,
}

impl OutageEmbedder {
    pub fn new(dimension: usize) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                dimension,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait::async_trait]
impl Embedder for OutageEmbedder {
    async fn embed(&self, _text: &str) -> Result<Embedding, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(EmbeddingError::Unavailable {
            provider: "outage",
            reason: "configured outage".to_string(),
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "outage"
    }

    async fn probe(&self) -> Result<ProbeReport, EmbeddingError> {
        Ok(ProbeReport {
            model_tag: "outage".to_string(),
            dimension: self.dimension,
        })
    }
}

/// An engine whose single tier is a counting mock embedder at `Basic`.
pub async fn counting_engine(
    limiter: RateLimiterConfig,
) -> (MemoryEngine<InMemoryIndex>, Arc<AtomicUsize>) {
    let (embedder, calls) = CountingEmbedder::new(DIM);
    let providers: Vec<(TierLevel, Box<dyn Embedder>)> =
        vec![(TierLevel::Basic, Box::new(embedder))];
    let tiers = TierController::new(providers, DIM).unwrap();

    let engine = MemoryEngine::init(
        InMemoryIndex::new(),
        tiers,
        RateLimiter::new(limiter),
        fast_config(),
        8 * 1024 * 1024,
    )
    .await
    .unwrap();

    (engine, calls)
}

/// An engine whose advanced tier is a permanent outage over a healthy
/// fallback chain.
pub async fn outage_engine() -> (MemoryEngine<InMemoryIndex>, Arc<AtomicUsize>) {
    let (outage, calls) = OutageEmbedder::new(DIM);
    let providers: Vec<(TierLevel, Box<dyn Embedder>)> = vec![
        (TierLevel::Advanced, Box::new(outage)),
        (TierLevel::Smart, Box::new(MockEmbedder::new(DIM))),
        (TierLevel::Basic, Box::new(MockEmbedder::new(DIM))),
    ];
    let tiers = TierController::new(providers, DIM).unwrap();

    let engine = MemoryEngine::init(
        InMemoryIndex::new(),
        tiers,
        RateLimiter::new(RateLimiterConfig::unlimited()),
        fast_config(),
        8 * 1024 * 1024,
    )
    .await
    .unwrap();

    (engine, calls)
}
