//! # Memorai
//!
//! Agent-native long-term memory: programs acting for AI agents issue
//! semantic `remember`, `recall`, `forget`, and `context` requests and get
//! back ranked, tenant-isolated memories with temporal and importance
//! awareness.
//!
//! ```text
//! Request → Rate limiter → Hot cache → Tier controller → Vector index
//!                                      (advanced → smart → basic → mock)
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use memorai::Config;
//!
//! # fn run() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! config.validate()?;
//! println!("Listening on {}", config.socket_addr());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Purpose |
//! |---------|---------|
//! | `mock`  | Mock engine/index constructors for tests and examples |
//!
//! ## Modules
//!
//! - [`engine`] - The memory engine (remember/recall/forget/context)
//! - [`tier`] - Embedding tier selection and runtime fallback
//! - [`embedding`] - Embedding providers (remote, local, lexical, mock)
//! - [`index`] - Vector index backends (Qdrant + in-memory reference)
//! - [`cache`] - Short-TTL hot cache
//! - [`ratelimit`] - Multi-scope admission control
//! - [`scoring`] - Composite semantic/recency/importance ranking
//! - [`record`] - The memory record model and validation
//! - [`config`] - Environment-backed configuration
//! - [`gateway`] - Axum transport adapter
//!
//! Links: repo/issues at the crate `repository` URL.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod cache;
pub mod config;
pub mod constants;
pub mod embedding;
pub mod engine;
pub mod gateway;
pub mod hashing;
pub mod index;
pub mod ratelimit;
pub mod record;
pub mod scoring;
pub mod tier;

pub use cache::{CacheEntry, CacheStats, CacheWeight, HotCache, TtlClass};
pub use config::{Config, ConfigError};
pub use constants::{DEFAULT_EMBEDDING_DIM, DimConfig, DimValidationError, validate_embedding_dim};
pub use embedding::{
    Embedder, Embedding, EmbeddingError, LexicalEmbedder, LocalConfig, LocalEmbedder,
    MockEmbedder, ProbeReport, RemoteConfig, RemoteDialect, RemoteEmbedder,
};
pub use engine::{
    CachedValue, ContextBundle, ContextRequest, EngineConfig, EngineError, ErrorCode,
    ForgetOutcome, ForgetSelector, HealthReport, MemoryEngine, MemoryQuery, OpContext,
    RememberRequest, StatsReport, SummaryKind, TimeWindow,
};
pub use gateway::{AppState, GatewayError, MEMORAI_STATUS_HEADER, create_router_with_state};
pub use hashing::{hash_content, hash_to_u64, hash_token32};
pub use index::{
    AccessPatch, DEFAULT_COLLECTION_NAME, DEFAULT_VECTOR_SIZE, InMemoryIndex, IndexError,
    IndexPoint, ListPage, MemoryFilter, QdrantIndex, SearchHit, VectorIndex, WriteConsistency,
    cosine_similarity, normalize_cosine,
};
pub use ratelimit::{
    Decision, LimitAction, RateLimiter, RateLimiterConfig, RateRule, RateScope, Violation,
};
pub use record::{
    AttrValue, AttributeBag, MemoryKind, MemoryRecord, RecordError, RecordPayload,
};
pub use scoring::{CompositeScorer, RankerConfig, ScoreReason, ScoredMemory};
pub use tier::{
    Grade, TierCapabilities, TierChainSpec, TierController, TierDescriptor, TierError, TierLevel,
    TierState, build_chain,
};
