use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::CacheWeight;
use crate::constants::{
    DEFAULT_FORGET_K, INDEX_QUERY_BUDGET_MS, MAX_RECALL_K, STATS_SAMPLE_BOUND,
};
use crate::index::{ListPage, WriteConsistency};
use crate::record::{AttributeBag, MemoryKind};
use crate::scoring::{RankerConfig, ScoredMemory};
use crate::tier::TierLevel;

/// Per-request context threaded through every engine operation.
///
/// The request id is opaque: it is echoed into traces and never
/// interpreted. Cancellation is cooperative and honored at suspension
/// points.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    /// Opaque caller-supplied request identifier.
    pub request_id: Option<String>,
    /// Source address for source-scoped admission.
    pub source_addr: Option<String>,
    /// Cooperative cancellation token.
    pub cancel: CancellationToken,
}

impl OpContext {
    /// A fresh context with no request id or source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a request id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Attaches a source address.
    pub fn with_source_addr(mut self, source_addr: impl Into<String>) -> Self {
        self.source_addr = Some(source_addr.into());
        self
    }

    /// Attaches a cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Input to [`remember`](crate::engine::MemoryEngine::remember).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RememberRequest {
    /// Text to remember.
    pub content: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Owning agent.
    pub agent_id: String,
    /// Classification; defaults to `other`.
    #[serde(default)]
    pub kind: Option<MemoryKind>,
    /// Importance in `[0, 1]`; defaults to 0.5.
    #[serde(default)]
    pub importance: Option<f64>,
    /// Confidence in `[0, 1]`; defaults to 1.0.
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Tags (folded and sorted on write).
    #[serde(default)]
    pub tags: Vec<String>,
    /// Bounded free-form attributes.
    #[serde(default)]
    pub context: AttributeBag,
    /// Absolute expiry; must be in the future.
    #[serde(default)]
    pub ttl: Option<DateTime<Utc>>,
}

impl RememberRequest {
    /// A minimal request with defaults for everything optional.
    pub fn new(
        content: impl Into<String>,
        tenant_id: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            tenant_id: tenant_id.into(),
            agent_id: agent_id.into(),
            kind: None,
            importance: None,
            confidence: None,
            tags: Vec::new(),
            context: AttributeBag::new(),
            ttl: None,
        }
    }

    /// Sets the kind.
    pub fn kind(mut self, kind: MemoryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Sets the importance.
    pub fn importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance);
        self
    }

    /// Sets the tags.
    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Sets the expiry.
    pub fn ttl(mut self, ttl: DateTime<Utc>) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// A half-open creation-time window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Records created at or after this instant.
    #[serde(default)]
    pub after: Option<DateTime<Utc>>,
    /// Records created strictly before this instant.
    #[serde(default)]
    pub before: Option<DateTime<Utc>>,
}

/// Input to [`recall`](crate::engine::MemoryEngine::recall).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQuery {
    /// Query text.
    pub text: String,
    /// Tenant whose memories are searched. Required.
    pub tenant_id: String,
    /// Restrict to one agent.
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Result count, at most [`MAX_RECALL_K`].
    #[serde(default = "default_k")]
    pub k: usize,
    /// Drop results scoring below this.
    #[serde(default)]
    pub min_score: f64,
    /// Restrict to these kinds; empty means all.
    #[serde(default)]
    pub kinds: Vec<MemoryKind>,
    /// Records must carry every one of these tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Restrict by creation time.
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
}

fn default_k() -> usize {
    10
}

impl MemoryQuery {
    /// A query with default `k` and no filters.
    pub fn new(text: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tenant_id: tenant_id.into(),
            agent_id: None,
            k: default_k(),
            min_score: 0.0,
            kinds: Vec::new(),
            tags: Vec::new(),
            time_window: None,
        }
    }

    /// Restricts to one agent.
    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Sets the result count.
    pub fn k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Sets the score threshold.
    pub fn min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    /// Restricts to the given kinds.
    pub fn kinds(mut self, kinds: Vec<MemoryKind>) -> Self {
        self.kinds = kinds;
        self
    }

    /// Requires all of the given tags.
    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// What to forget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForgetSelector {
    /// Forget one record by id, tenant-checked.
    ById {
        /// Owning tenant.
        tenant_id: String,
        /// Restrict to one agent.
        #[serde(default)]
        agent_id: Option<String>,
        /// The record to delete.
        id: Uuid,
    },
    /// Forget everything a query returns. Requires explicit confirmation.
    ByQuery {
        /// The query; its threshold is forced to zero.
        query: MemoryQuery,
        /// Must be `true`; bulk deletion is never implicit.
        confirm: bool,
    },
}

/// Result of a forget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgetOutcome {
    /// Records actually deleted.
    pub deleted_count: u64,
    /// Ids whose deletion failed; successes are not undone.
    pub failed_ids: Vec<Uuid>,
}

/// Requested summary depth for context bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryKind {
    /// Per-kind grouping with counts and top record ids.
    Detailed,
    /// A count and the top three tags.
    Brief,
    /// The three highest-scoring items.
    Highlights,
}

impl Default for SummaryKind {
    fn default() -> Self {
        SummaryKind::Brief
    }
}

/// Input to [`context`](crate::engine::MemoryEngine::context).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRequest {
    /// Owning tenant.
    pub tenant_id: String,
    /// Owning agent.
    pub agent_id: String,
    /// Optional topic; when present the bundle is a topical recall.
    #[serde(default)]
    pub topic: Option<String>,
    /// Restrict by creation time.
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
    /// Bundle size, at most [`MAX_RECALL_K`].
    #[serde(default = "default_max_memories")]
    pub max_memories: usize,
    /// Summary depth.
    #[serde(default)]
    pub summary_kind: SummaryKind,
}

fn default_max_memories() -> usize {
    20
}

impl ContextRequest {
    /// A request with defaults for everything optional.
    pub fn new(tenant_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            agent_id: agent_id.into(),
            topic: None,
            time_window: None,
            max_memories: default_max_memories(),
            summary_kind: SummaryKind::default(),
        }
    }

    /// Sets the topic.
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Sets the summary depth.
    pub fn summary_kind(mut self, summary_kind: SummaryKind) -> Self {
        self.summary_kind = summary_kind;
        self
    }

    /// Sets the bundle size.
    pub fn max_memories(mut self, max_memories: usize) -> Self {
        self.max_memories = max_memories;
        self
    }
}

/// Output of [`context`](crate::engine::MemoryEngine::context).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBundle {
    /// Ranked memories.
    pub memories: Vec<ScoredMemory>,
    /// Textual rollup in the requested depth.
    pub summary: String,
}

/// Output of [`stats`](crate::engine::MemoryEngine::stats).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsReport {
    /// Total records in the collection.
    pub total_records: u64,
    /// Record counts per kind.
    pub per_kind: BTreeMap<String, u64>,
    /// Mean importance over the (sampled) records.
    pub mean_importance: f64,
    /// Distinct tenants observed.
    pub distinct_tenants: u64,
    /// Distinct `(tenant, agent)` pairs observed.
    pub distinct_agents: u64,
    /// Approximate storage footprint in bytes.
    pub approx_bytes: u64,
    /// Most recent `updated_at` observed.
    pub last_updated_at: Option<DateTime<Utc>>,
    /// `true` when derived from a bounded sample instead of a full pass.
    pub sampled: bool,
}

/// Output of [`health`](crate::engine::MemoryEngine::health).
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Tier state-machine state (`probing`, a tier name, or `error`).
    pub state: String,
    /// Active tier, when serving.
    pub active_tier: Option<TierLevel>,
    /// Most recent provider/index failure.
    pub last_error: Option<String>,
    /// Milliseconds since engine construction.
    pub uptime_ms: u64,
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ranker weights and decay.
    pub ranker: RankerConfig,
    /// Retry budget for transient failures.
    pub max_retries: u32,
    /// Base backoff delay; doubles per attempt.
    pub retry_base_delay: Duration,
    /// Per-call budget for index queries.
    pub index_query_budget: Duration,
    /// Same-content deduplication window; zero disables deduplication.
    pub dedup_window: Duration,
    /// `k` for forget-by-query when the query leaves it defaulted.
    pub forget_k: usize,
    /// Record count above which stats sample instead of scanning.
    pub stats_sample_bound: usize,
    /// Write visibility. `Strong` keeps same-process read-after-write.
    pub write_consistency: WriteConsistency,
    /// Upper bound accepted for `k` and `max_memories`.
    pub max_k: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ranker: RankerConfig::default(),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            index_query_budget: Duration::from_millis(INDEX_QUERY_BUDGET_MS),
            dedup_window: Duration::from_secs(10),
            forget_k: DEFAULT_FORGET_K,
            stats_sample_bound: STATS_SAMPLE_BOUND,
            write_consistency: WriteConsistency::Strong,
            max_k: MAX_RECALL_K,
        }
    }
}

/// What the hot cache memoizes.
#[derive(Debug, Clone, Serialize)]
pub enum CachedValue {
    /// A recall result list.
    Recall(Vec<ScoredMemory>),
    /// A context bundle.
    Context(ContextBundle),
    /// A stats report.
    Stats(StatsReport),
    /// A listing page.
    List(ListPage),
}

impl CacheWeight for CachedValue {
    fn weight(&self) -> u32 {
        serde_json::to_vec(self)
            .map(|v| v.len().min(u32::MAX as usize) as u32)
            .unwrap_or(1)
    }
}
