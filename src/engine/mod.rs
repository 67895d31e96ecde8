//! The Memory Engine: the single public surface for memory operations.
//!
//! Orchestrates validation, admission, embedding (through the tier
//! controller), index reads/writes, composite ranking, hot-cache
//! memoization, and tenant isolation. Each engine instance owns its
//! collaborators; nothing here is process-global.
//!
//! Concurrency contract: `remember` and `forget` serialize on a
//! per-`(tenant, agent)` mutex so a write's upsert and cache invalidation
//! are atomic from the point of view of same-process recalls. `recall`
//! never takes that lock; it may observe the pre- or post-state of a
//! concurrent writer, never a partial one. Cancellation is cooperative and
//! honored at every suspension point; an operation cancelled after its
//! index write committed reports `Cancelled` and leaves the write intact.

mod error;
mod types;


pub use error::{EngineError, ErrorCode};
pub use types::{
    CachedValue, ContextBundle, ContextRequest, EngineConfig, ForgetOutcome, ForgetSelector,
    HealthReport, MemoryQuery, OpContext, RememberRequest, StatsReport, SummaryKind, TimeWindow,
};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cache::{CacheStats, HotCache, TtlClass};
use crate::constants::CANDIDATE_FLOOR;
use crate::embedding::Embedding;
use crate::hashing::{hash_dedup_key, hash_params};
use crate::index::{
    AccessPatch, IndexPoint, ListPage, MemoryFilter, SearchHit, VectorIndex,
};
use crate::ratelimit::RateLimiter;
use crate::record::{
    MemoryRecord, normalize_tags, validate_content, validate_expiry, validate_scope_id,
    validate_unit_interval,
};
use crate::scoring::{CompositeScorer, ScoredMemory};
use crate::tier::{TierController, TierDescriptor, TierLevel, TierState};

/// Upper bound on records scanned for a topic-less context merge.
const CONTEXT_SCAN_CAP: usize = 2_048;

/// Page size used for internal listing scans.
const SCAN_PAGE: usize = 512;

struct DedupEntry {
    id: Uuid,
    tenant: String,
    at: Instant,
}

/// Orchestrates memory operations over a vector index and a tier
/// controller.
pub struct MemoryEngine<I: VectorIndex + 'static> {
    index: Arc<I>,
    tiers: Arc<TierController>,
    limiter: Arc<RateLimiter>,
    cache: HotCache<CachedValue>,
    scorer: CompositeScorer,
    config: EngineConfig,
    scope_locks: Mutex<HashMap<(String, String), Arc<tokio::sync::Mutex<()>>>>,
    access_ceiling: AtomicU64,
    dedup: Mutex<HashMap<u64, DedupEntry>>,
    write_behind: Mutex<Vec<JoinHandle<()>>>,
    last_error: Mutex<Option<String>>,
    started_at: Instant,
}

impl<I: VectorIndex + 'static> std::fmt::Debug for MemoryEngine<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("dimension", &self.tiers.dimension())
            .field("cache", &self.cache)
            .finish()
    }
}

impl<I: VectorIndex + 'static> MemoryEngine<I> {
    /// Builds an engine, probes the tier chain, and ensures the collection.
    ///
    /// Fails with `Unavailable` if no tier (including mock) can serve, and
    /// with `SchemaMismatch` if the collection exists with a different
    /// dimension.
    pub async fn init(
        index: I,
        tiers: TierController,
        limiter: RateLimiter,
        config: EngineConfig,
        cache_capacity: u64,
    ) -> Result<Self, EngineError> {
        let engine = Self {
            index: Arc::new(index),
            tiers: Arc::new(tiers),
            limiter: Arc::new(limiter),
            cache: HotCache::with_capacity(cache_capacity),
            scorer: CompositeScorer::new(config.ranker),
            config,
            scope_locks: Mutex::new(HashMap::new()),
            access_ceiling: AtomicU64::new(0),
            dedup: Mutex::new(HashMap::new()),
            write_behind: Mutex::new(Vec::new()),
            last_error: Mutex::new(None),
            started_at: Instant::now(),
        };

        let descriptor = engine.tiers.probe().await?;
        info!(tier = %descriptor.level, "Memory engine serving");

        engine
            .index
            .ensure_collection(engine.tiers.dimension())
            .await?;

        Ok(engine)
    }

    /// The rate limiter, for adaptive updates and rule administration.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// The underlying index backend.
    pub fn index(&self) -> &I {
        &self.index
    }

    /// Hot-cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The active engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── remember ──────────────────────────────────────────────────────────

    /// Persists a memory and returns its id.
    #[instrument(
        skip(self, req, ctx),
        fields(
            tenant = %req.tenant_id,
            agent = %req.agent_id,
            request_id = ctx.request_id.as_deref().unwrap_or("-"),
        )
    )]
    pub async fn remember(
        &self,
        req: RememberRequest,
        ctx: &OpContext,
    ) -> Result<Uuid, EngineError> {
        self.ensure_serving().await?;

        validate_content(&req.content)?;
        validate_scope_id("tenant_id", &req.tenant_id)?;
        validate_scope_id("agent_id", &req.agent_id)?;
        if let Some(importance) = req.importance {
            validate_unit_interval("importance", importance)?;
        }
        if let Some(confidence) = req.confidence {
            validate_unit_interval("confidence", confidence)?;
        }
        req.context.validate()?;

        let now = Utc::now();
        if let Some(ttl) = req.ttl {
            validate_expiry(ttl, now)?;
        }

        self.admit(&req.tenant_id, Some(&req.agent_id), ctx)?;

        let kind = req.kind.unwrap_or_default();
        let tags = normalize_tags(req.tags);
        let dedup_key = hash_dedup_key(
            &req.tenant_id,
            &req.agent_id,
            &req.content,
            kind.as_str(),
            &tags,
        );
        if let Some(existing) = self.check_dedup(dedup_key) {
            debug!(id = %existing, "Duplicate remember within window, reusing id");
            return Ok(existing);
        }

        self.ensure_live(ctx)?;
        let embedding = self.embed_text(&req.content, ctx).await?;

        let lock = self.scope_lock(&req.tenant_id, &req.agent_id);
        let _guard = lock.lock().await;

        let record = MemoryRecord {
            id: Uuid::new_v4(),
            tenant_id: req.tenant_id.clone(),
            agent_id: req.agent_id.clone(),
            content: req.content,
            kind,
            importance: req.importance.unwrap_or(0.5),
            confidence: req.confidence.unwrap_or(1.0),
            tags,
            created_at: now,
            updated_at: now,
            last_accessed_at: now,
            access_count: 0,
            expires_at: req.ttl,
            context: req.context,
        };
        let id = record.id;

        let point = IndexPoint::new(id, embedding.vector, record.to_payload())?;
        self.upsert_point(point, ctx).await?;
        self.cache.invalidate_tenant(&req.tenant_id);
        self.record_dedup(dedup_key, &req.tenant_id, id);

        info!(id = %id, kind = %kind, model = %embedding.model_tag, "Memory stored");

        // Post-commit cancellation: the write stays, the caller is told.
        self.ensure_live(ctx)?;
        Ok(id)
    }

    // ── recall ────────────────────────────────────────────────────────────

    /// Semantic retrieval with composite ranking, always tenant-scoped.
    #[instrument(
        skip(self, query, ctx),
        fields(
            tenant = %query.tenant_id,
            k = query.k,
            request_id = ctx.request_id.as_deref().unwrap_or("-"),
        )
    )]
    pub async fn recall(
        &self,
        query: MemoryQuery,
        ctx: &OpContext,
    ) -> Result<Vec<ScoredMemory>, EngineError> {
        self.ensure_serving().await?;
        self.validate_query(&query)?;
        if query.k == 0 {
            return Ok(Vec::new());
        }

        self.admit(&query.tenant_id, query.agent_id.as_deref(), ctx)?;

        let key = self.cache_key(&query.tenant_id, query.agent_id.as_deref(), "recall", &query)?;
        if let Some(CachedValue::Recall(results)) = self.cache.get(&key) {
            debug!("Recall served from hot cache");
            return Ok(results);
        }

        let scored = self.recall_inner(&query, ctx).await?;
        self.cache
            .put(key, CachedValue::Recall(scored.clone()), TtlClass::Recall);

        self.ensure_live(ctx)?;
        Ok(scored)
    }

    /// The authoritative recall path: embed, search, rescore, bump.
    async fn recall_inner(
        &self,
        query: &MemoryQuery,
        ctx: &OpContext,
    ) -> Result<Vec<ScoredMemory>, EngineError> {
        let embedding = self.embed_text(&query.text, ctx).await?;
        let now = Utc::now();
        let filter = self.query_filter(query, now);
        let fetch = query.k.max(CANDIDATE_FLOOR);

        let hits = self.search_candidates(embedding.vector, fetch, &filter, ctx).await?;
        debug!(candidates = hits.len(), "Index candidates fetched");

        for hit in &hits {
            self.access_ceiling
                .fetch_max(hit.payload.access_count, Ordering::Relaxed);
        }
        let ceiling = self.access_ceiling.load(Ordering::Relaxed);
        let lexical = matches!(
            self.tiers.state().await,
            TierState::Active(TierLevel::Basic)
        );

        let mut scored = self.scorer.rescore(hits, now, ceiling, lexical);
        scored.retain(|s| s.score >= query.min_score);
        scored.truncate(query.k);

        if !scored.is_empty() {
            let mut patches = Vec::with_capacity(scored.len());
            for s in &mut scored {
                s.record.touch(now);
                patches.push(AccessPatch {
                    id: s.record.id,
                    last_accessed_at: s.record.last_accessed_at,
                    access_count: s.record.access_count,
                });
            }
            self.spawn_write_behind(patches);
        }

        Ok(scored)
    }

    // ── forget ────────────────────────────────────────────────────────────

    /// Deletes memories by id or by query; returns what was deleted.
    #[instrument(skip(self, selector, ctx), fields(request_id = ctx.request_id.as_deref().unwrap_or("-")))]
    pub async fn forget(
        &self,
        selector: ForgetSelector,
        ctx: &OpContext,
    ) -> Result<ForgetOutcome, EngineError> {
        self.ensure_serving().await?;

        match selector {
            ForgetSelector::ById {
                tenant_id,
                agent_id,
                id,
            } => {
                validate_scope_id("tenant_id", &tenant_id)?;
                self.admit(&tenant_id, agent_id.as_deref(), ctx)?;

                let lock = self.scope_lock(&tenant_id, agent_id.as_deref().unwrap_or(""));
                let _guard = lock.lock().await;

                let mut filter = MemoryFilter::tenant(tenant_id.clone()).ids(vec![id]);
                if let Some(agent) = &agent_id {
                    filter = filter.agent(agent.clone());
                }

                // The tenant-scoped filter makes the delete an ownership
                // check at the same time: a foreign id matches nothing.
                let filter_ref = &filter;
                let existing = self
                    .with_retry(ctx, || async move {
                        self.index.count(Some(filter_ref)).await.map_err(Into::into)
                    })
                    .await?;
                if existing > 0 {
                    self.with_retry(ctx, || async move {
                        self.index
                            .delete_by_filter(filter_ref)
                            .await
                            .map_err(Into::into)
                    })
                    .await?;
                }

                self.cache.invalidate_tenant(&tenant_id);
                self.drop_dedup_for(&tenant_id);
                info!(%id, deleted = existing, "Forget by id");

                Ok(ForgetOutcome {
                    deleted_count: existing,
                    failed_ids: Vec::new(),
                })
            }
            ForgetSelector::ByQuery { mut query, confirm } => {
                if !confirm {
                    return Err(EngineError::InvalidInput {
                        message: "forget-by-query requires the confirmation flag".to_string(),
                    });
                }
                if query.k == 0 {
                    query.k = self.config.forget_k;
                }
                self.validate_query(&query)?;
                query.min_score = 0.0;

                self.admit(&query.tenant_id, query.agent_id.as_deref(), ctx)?;

                let embedding = self.embed_text(&query.text, ctx).await?;
                let now = Utc::now();
                let filter = self.query_filter(&query, now);
                let hits = self
                    .search_candidates(embedding.vector, query.k, &filter, ctx)
                    .await?;

                let lock = self.scope_lock(
                    &query.tenant_id,
                    query.agent_id.as_deref().unwrap_or(""),
                );
                let _guard = lock.lock().await;

                let mut deleted_count = 0u64;
                let mut failed_ids = Vec::new();
                for hit in hits.iter().take(query.k) {
                    match self.index.delete_by_ids(vec![hit.id]).await {
                        Ok(()) => deleted_count += 1,
                        Err(e) => {
                            warn!(id = %hit.id, error = %e, "Forget-by-query deletion failed");
                            failed_ids.push(hit.id);
                        }
                    }
                }

                self.cache.invalidate_tenant(&query.tenant_id);
                self.drop_dedup_for(&query.tenant_id);
                info!(deleted_count, failed = failed_ids.len(), "Forget by query");

                Ok(ForgetOutcome {
                    deleted_count,
                    failed_ids,
                })
            }
        }
    }

    // ── context ───────────────────────────────────────────────────────────

    /// Assembles a ranked context bundle with a textual summary.
    #[instrument(
        skip(self, req, ctx),
        fields(
            tenant = %req.tenant_id,
            agent = %req.agent_id,
            request_id = ctx.request_id.as_deref().unwrap_or("-"),
        )
    )]
    pub async fn context(
        &self,
        req: ContextRequest,
        ctx: &OpContext,
    ) -> Result<ContextBundle, EngineError> {
        self.ensure_serving().await?;
        validate_scope_id("tenant_id", &req.tenant_id)?;
        validate_scope_id("agent_id", &req.agent_id)?;
        if req.max_memories > self.config.max_k {
            return Err(EngineError::InvalidInput {
                message: format!(
                    "max_memories {} exceeds the limit of {}",
                    req.max_memories, self.config.max_k
                ),
            });
        }

        self.admit(&req.tenant_id, Some(&req.agent_id), ctx)?;

        let key = self.cache_key(&req.tenant_id, Some(&req.agent_id), "context", &req)?;
        if let Some(CachedValue::Context(bundle)) = self.cache.get(&key) {
            debug!("Context served from hot cache");
            return Ok(bundle);
        }

        let memories = match &req.topic {
            Some(topic) => {
                let query = MemoryQuery {
                    text: topic.clone(),
                    tenant_id: req.tenant_id.clone(),
                    agent_id: Some(req.agent_id.clone()),
                    k: req.max_memories,
                    min_score: 0.0,
                    kinds: Vec::new(),
                    tags: Vec::new(),
                    time_window: req.time_window,
                };
                if query.k == 0 {
                    Vec::new()
                } else {
                    self.recall_inner(&query, ctx).await?
                }
            }
            None => self.recent_and_important(&req, ctx).await?,
        };

        let summary = summarize(&memories, req.summary_kind);
        let bundle = ContextBundle { memories, summary };
        self.cache
            .put(key, CachedValue::Context(bundle.clone()), TtlClass::Context);

        self.ensure_live(ctx)?;
        Ok(bundle)
    }

    /// Topic-less context: scan the window and rank by recency + importance
    /// only (the composite with its semantic and frequency terms at zero).
    async fn recent_and_important(
        &self,
        req: &ContextRequest,
        ctx: &OpContext,
    ) -> Result<Vec<ScoredMemory>, EngineError> {
        let now = Utc::now();
        let window = req.time_window.unwrap_or_default();
        let filter = MemoryFilter::tenant(req.tenant_id.clone())
            .agent(req.agent_id.clone())
            .created_between(window.after, window.before)
            .visible_at(now);

        let filter_ref = &filter;
        let mut candidates: Vec<SearchHit> = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            self.ensure_live(ctx)?;
            let page = self
                .with_retry(ctx, || {
                    let cursor = cursor.clone();
                    async move {
                        self.index
                            .list(filter_ref, cursor.as_deref(), SCAN_PAGE)
                            .await
                            .map_err(Into::into)
                    }
                })
                .await?;

            if page.records.is_empty() && page.next_cursor.is_none() {
                break;
            }
            for payload in page.records {
                candidates.push(SearchHit {
                    id: payload.id,
                    score: 0.0,
                    payload,
                });
            }
            cursor = page.next_cursor;
            if cursor.is_none() || candidates.len() >= CONTEXT_SCAN_CAP {
                break;
            }
        }

        let mut scored = self.scorer.rescore(candidates, now, 0, false);
        scored.truncate(req.max_memories);
        Ok(scored)
    }

    // ── stats / list ──────────────────────────────────────────────────────

    /// Collection-wide statistics; exact below the sample bound, derived
    /// from a bounded single pass above it.
    #[instrument(skip(self, ctx))]
    pub async fn stats(&self, ctx: &OpContext) -> Result<StatsReport, EngineError> {
        self.ensure_serving().await?;

        let key = HotCache::<CachedValue>::key("global", None, "stats", 0);
        if let Some(CachedValue::Stats(report)) = self.cache.get(&key) {
            return Ok(report);
        }

        let total = self
            .with_retry(ctx, || async move {
                self.index.count(None).await.map_err(Into::into)
            })
            .await?;

        let bound = self.config.stats_sample_bound as u64;
        let mut scanned = 0u64;
        let mut per_kind: BTreeMap<String, u64> = BTreeMap::new();
        let mut importance_sum = 0.0f64;
        let mut tenants: HashSet<String> = HashSet::new();
        let mut agents: HashSet<(String, String)> = HashSet::new();
        let mut bytes = 0u64;
        let mut last_updated_at: Option<DateTime<Utc>> = None;

        let mut cursor: Option<String> = None;
        while scanned < bound {
            self.ensure_live(ctx)?;
            let page = self
                .with_retry(ctx, || {
                    let cursor = cursor.clone();
                    async move {
                        self.index
                            .list_all(cursor.as_deref(), SCAN_PAGE)
                            .await
                            .map_err(Into::into)
                    }
                })
                .await?;

            if page.records.is_empty() && page.next_cursor.is_none() {
                break;
            }
            for payload in &page.records {
                scanned += 1;
                *per_kind.entry(payload.kind.as_str().to_string()).or_insert(0) += 1;
                importance_sum += payload.importance;
                tenants.insert(payload.tenant_id.clone());
                agents.insert((payload.tenant_id.clone(), payload.agent_id.clone()));
                bytes += payload.content.len() as u64
                    + payload.context.serialized_len() as u64
                    + 128;
                last_updated_at = match last_updated_at {
                    Some(existing) => Some(existing.max(payload.updated_at)),
                    None => Some(payload.updated_at),
                };
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        let sampled = total > scanned;
        let scale = if sampled && scanned > 0 {
            total as f64 / scanned as f64
        } else {
            1.0
        };

        let report = StatsReport {
            total_records: total,
            per_kind: per_kind
                .into_iter()
                .map(|(k, v)| (k, (v as f64 * scale) as u64))
                .collect(),
            mean_importance: if scanned > 0 {
                importance_sum / scanned as f64
            } else {
                0.0
            },
            distinct_tenants: tenants.len() as u64,
            distinct_agents: agents.len() as u64,
            approx_bytes: (bytes as f64 * scale) as u64,
            last_updated_at,
            sampled,
        };

        self.cache
            .put(key, CachedValue::Stats(report.clone()), TtlClass::Lookup);
        Ok(report)
    }

    /// Paginated tenant-scoped listing with opaque cursors.
    pub async fn list(
        &self,
        tenant_id: &str,
        agent_id: Option<&str>,
        cursor: Option<&str>,
        limit: usize,
        ctx: &OpContext,
    ) -> Result<ListPage, EngineError> {
        self.ensure_serving().await?;
        validate_scope_id("tenant_id", tenant_id)?;
        if limit > self.config.max_k {
            return Err(EngineError::InvalidInput {
                message: format!("limit {} exceeds the limit of {}", limit, self.config.max_k),
            });
        }

        self.admit(tenant_id, agent_id, ctx)?;

        let params = (cursor.unwrap_or(""), limit);
        let key = self.cache_key(tenant_id, agent_id, "list", &params)?;
        if let Some(CachedValue::List(page)) = self.cache.get(&key) {
            return Ok(page);
        }

        let mut filter = MemoryFilter::tenant(tenant_id.to_string()).visible_at(Utc::now());
        if let Some(agent) = agent_id {
            filter = filter.agent(agent.to_string());
        }

        let filter_ref = &filter;
        let page = self
            .with_retry(ctx, || async move {
                self.index
                    .list(filter_ref, cursor, limit)
                    .await
                    .map_err(Into::into)
            })
            .await?;

        self.cache
            .put(key, CachedValue::List(page.clone()), TtlClass::Lookup);
        Ok(page)
    }

    // ── tier / health ─────────────────────────────────────────────────────

    /// Describes the active embedding tier.
    pub async fn tier_info(&self) -> Result<TierDescriptor, EngineError> {
        self.tiers.descriptor().await.map_err(Into::into)
    }

    /// Re-runs startup tier selection; the only promotion path.
    pub async fn re_probe(&self) -> Result<TierDescriptor, EngineError> {
        *self.last_error.lock() = None;
        self.tiers.re_probe().await.map_err(Into::into)
    }

    /// Liveness and tier-state report.
    pub async fn health(&self) -> HealthReport {
        let state = self.tiers.state().await;
        let own_last_error = self.last_error.lock().clone();
        let last_error = own_last_error.or(self.tiers.last_error().await);

        HealthReport {
            state: state.as_str().to_string(),
            active_tier: match state {
                TierState::Active(level) => Some(level),
                _ => None,
            },
            last_error,
            uptime_ms: self.started_at.elapsed().as_millis() as u64,
        }
    }

    /// Starts the periodic rate-limit bucket sweeper.
    pub fn start_limit_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        self.limiter.start_sweeper(interval)
    }

    /// Awaits every in-flight write-behind access update.
    pub async fn flush_write_behind(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.write_behind.lock());
        let _ = join_all(handles).await;
    }

    // ── internals ─────────────────────────────────────────────────────────

    fn validate_query(&self, query: &MemoryQuery) -> Result<(), EngineError> {
        validate_scope_id("tenant_id", &query.tenant_id)?;
        if let Some(agent) = &query.agent_id {
            validate_scope_id("agent_id", agent)?;
        }
        if query.text.trim().is_empty() {
            return Err(EngineError::InvalidInput {
                message: "query text is empty or whitespace-only".to_string(),
            });
        }
        if query.k > self.config.max_k {
            return Err(EngineError::InvalidInput {
                message: format!("k {} exceeds the limit of {}", query.k, self.config.max_k),
            });
        }
        if !query.min_score.is_finite() || !(0.0..=1.0).contains(&query.min_score) {
            return Err(EngineError::InvalidInput {
                message: format!("min_score must be within [0, 1], got {}", query.min_score),
            });
        }
        Ok(())
    }

    fn query_filter(&self, query: &MemoryQuery, now: DateTime<Utc>) -> MemoryFilter {
        let window = query.time_window.unwrap_or_default();
        let mut filter = MemoryFilter::tenant(query.tenant_id.clone())
            .kinds(query.kinds.clone())
            .tags(query.tags.clone())
            .created_between(window.after, window.before)
            .visible_at(now);
        if let Some(agent) = &query.agent_id {
            filter = filter.agent(agent.clone());
        }
        filter
    }

    fn cache_key<P: serde::Serialize>(
        &self,
        tenant: &str,
        agent: Option<&str>,
        op: &str,
        params: &P,
    ) -> Result<String, EngineError> {
        let bytes = serde_json::to_vec(params)
            .map_err(|e| EngineError::internal(format!("cache key serialization: {}", e)))?;
        Ok(HotCache::<CachedValue>::key(
            tenant,
            agent,
            op,
            hash_params(&bytes),
        ))
    }

    /// Admission: check then commit, before any embedding or index call.
    fn admit(&self, tenant: &str, agent: Option<&str>, ctx: &OpContext) -> Result<(), EngineError> {
        let decision = self
            .limiter
            .check(tenant, agent, ctx.source_addr.as_deref());
        if !decision.allowed {
            debug!(tenant, reset_at = %decision.reset_at, scope = decision.limit_type, "Admission denied");
            return Err(EngineError::RateLimited { decision });
        }
        self.limiter.commit(tenant, agent, ctx.source_addr.as_deref());
        Ok(())
    }

    async fn ensure_serving(&self) -> Result<(), EngineError> {
        match self.tiers.state().await {
            TierState::Active(_) => Ok(()),
            TierState::Probing => Err(EngineError::NotReady),
            TierState::Error => Err(EngineError::Unavailable {
                message: "no embedding tier available".to_string(),
            }),
        }
    }

    fn ensure_live(&self, ctx: &OpContext) -> Result<(), EngineError> {
        if ctx.cancel.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn cancellable<T, F>(&self, ctx: &OpContext, fut: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(EngineError::Cancelled),
            result = fut => result,
        }
    }

    async fn sleep_cancellable(&self, delay: Duration, ctx: &OpContext) -> Result<(), EngineError> {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(EngineError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Retries retryable failures with exponential backoff.
    async fn with_retry<T, F, Fut>(&self, ctx: &OpContext, mut op: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let mut delay = self.config.retry_base_delay;
        let mut attempt = 0u32;
        loop {
            match self.cancellable(ctx, op()).await {
                Ok(value) => return Ok(value),
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        error = %e,
                        "Transient failure, backing off"
                    );
                    self.sleep_cancellable(delay, ctx).await?;
                    delay *= 2;
                }
                Err(e) => {
                    self.note_error(&e);
                    return Err(e);
                }
            }
        }
    }

    /// Embeds text with the engine retry budget; after exhaustion, attempts
    /// one tier fallback before surfacing `Unavailable`.
    async fn embed_text(&self, text: &str, ctx: &OpContext) -> Result<Embedding, EngineError> {
        let result = self
            .with_retry(ctx, || async move {
                self.tiers.embed(text).await.map_err(EngineError::from)
            })
            .await;

        match result {
            Err(e) if e.is_retryable() => match self.tiers.demote().await {
                Some(level) => {
                    info!(tier = %level, "Embed retry budget exhausted, trying demoted tier");
                    self.cancellable(ctx, async {
                        self.tiers.embed(text).await.map_err(EngineError::from)
                    })
                    .await
                }
                None => Err(e),
            },
            other => other,
        }
    }

    async fn search_candidates(
        &self,
        vector: Vec<f32>,
        limit: usize,
        filter: &MemoryFilter,
        ctx: &OpContext,
    ) -> Result<Vec<SearchHit>, EngineError> {
        let budget = self.config.index_query_budget;
        self.with_retry(ctx, || {
            let vector = vector.clone();
            async move {
                match tokio::time::timeout(budget, self.index.search(vector, limit, filter)).await
                {
                    Ok(result) => result.map_err(EngineError::from),
                    Err(_) => Err(EngineError::Timeout {
                        message: format!("index query exceeded {}ms", budget.as_millis()),
                    }),
                }
            }
        })
        .await
    }

    async fn upsert_point(&self, point: IndexPoint, ctx: &OpContext) -> Result<(), EngineError> {
        let consistency = self.config.write_consistency;
        self.with_retry(ctx, || {
            let point = point.clone();
            async move {
                self.index
                    .upsert(vec![point], consistency)
                    .await
                    .map_err(Into::into)
            }
        })
        .await
    }

    fn scope_lock(&self, tenant: &str, agent: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.scope_locks.lock();
        locks
            .entry((tenant.to_string(), agent.to_string()))
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Best-effort access-metadata bump; never blocks recall, failures are
    /// logged and swallowed.
    fn spawn_write_behind(&self, patches: Vec<AccessPatch>) {
        let index = Arc::clone(&self.index);
        let handle = tokio::spawn(async move {
            if let Err(e) = index.patch_access(patches).await {
                warn!(error = %e, "Write-behind access update failed");
            }
        });

        let mut handles = self.write_behind.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    fn check_dedup(&self, key: u64) -> Option<Uuid> {
        if self.config.dedup_window.is_zero() {
            return None;
        }
        let now = Instant::now();
        let mut map = self.dedup.lock();
        map.retain(|_, entry| now.duration_since(entry.at) < self.config.dedup_window);
        map.get(&key).map(|entry| entry.id)
    }

    fn record_dedup(&self, key: u64, tenant: &str, id: Uuid) {
        if self.config.dedup_window.is_zero() {
            return;
        }
        self.dedup.lock().insert(
            key,
            DedupEntry {
                id,
                tenant: tenant.to_string(),
                at: Instant::now(),
            },
        );
    }

    fn drop_dedup_for(&self, tenant: &str) {
        self.dedup.lock().retain(|_, entry| entry.tenant != tenant);
    }

    fn note_error(&self, error: &EngineError) {
        *self.last_error.lock() = Some(error.to_string());
    }
}

fn summarize(memories: &[ScoredMemory], kind: SummaryKind) -> String {
    if memories.is_empty() {
        return "no memories in scope".to_string();
    }

    match kind {
        SummaryKind::Brief => {
            let mut tag_counts: HashMap<&str, usize> = HashMap::new();
            for m in memories {
                for tag in &m.record.tags {
                    *tag_counts.entry(tag.as_str()).or_insert(0) += 1;
                }
            }
            let mut tags: Vec<(&str, usize)> = tag_counts.into_iter().collect();
            tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            tags.truncate(3);

            if tags.is_empty() {
                format!("{} memories", memories.len())
            } else {
                format!(
                    "{} memories; top tags: {}",
                    memories.len(),
                    tags.iter()
                        .map(|(t, _)| *t)
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
        }
        SummaryKind::Detailed => {
            // Memories arrive rank-ordered, so the first per kind is its top.
            let mut groups: BTreeMap<&str, (usize, Uuid)> = BTreeMap::new();
            for m in memories {
                let entry = groups
                    .entry(m.record.kind.as_str())
                    .or_insert((0, m.record.id));
                entry.0 += 1;
            }
            let parts: Vec<String> = groups
                .into_iter()
                .map(|(kind, (count, top))| format!("{}: {} (top {})", kind, count, top))
                .collect();
            format!("{} memories: {}", memories.len(), parts.join("; "))
        }
        SummaryKind::Highlights => {
            let parts: Vec<String> = memories
                .iter()
                .take(3)
                .enumerate()
                .map(|(i, m)| {
                    let mut content = m.record.content.clone();
                    if content.chars().count() > 80 {
                        content = content.chars().take(77).collect::<String>() + "...";
                    }
                    format!("{}. {} ({:.2})", i + 1, content, m.score)
                })
                .collect();
            parts.join("; ")
        }
    }
}

#[cfg(any(test, feature = "mock"))]
mod mock_support {
    use super::*;
    use crate::index::InMemoryIndex;
    use crate::ratelimit::RateLimiterConfig;
    use crate::tier::TierChainSpec;

    /// Dimension used by mock engines.
    pub const MOCK_DIM: usize = 64;

    impl MemoryEngine<InMemoryIndex> {
        /// A mock-tier engine over the in-memory index, unlimited admission.
        pub async fn new_mock() -> Self {
            Self::new_mock_with(
                RateLimiterConfig::unlimited(),
                EngineConfig {
                    retry_base_delay: Duration::from_millis(5),
                    ..EngineConfig::default()
                },
            )
            .await
        }

        /// A mock-tier engine with explicit limiter and engine configs.
        pub async fn new_mock_with(
            limiter: RateLimiterConfig,
            config: EngineConfig,
        ) -> Self {
            let spec = TierChainSpec {
                remote: None,
                local: None,
                dimension: MOCK_DIM,
                preferred: None,
                test_mode: true,
            };
            let tiers = TierController::from_spec(&spec).expect("mock chain always builds");
            MemoryEngine::init(
                InMemoryIndex::new(),
                tiers,
                RateLimiter::new(limiter),
                config,
                HotCache::<CachedValue>::DEFAULT_CAPACITY,
            )
            .await
            .expect("mock engine init never fails")
        }
    }
}

#[cfg(any(test, feature = "mock"))]
pub use mock_support::MOCK_DIM;
