//! Hot cache: short-TTL memoization for recall, context, and stats.
//!
//! Keys are `tenant|agent|op|hash_of_params`. Entries carry their own TTL
//! class and per-entry hit counters; the cache is purely advisory: on a
//! miss the engine always recomputes authoritatively, and writes go through
//! the index first. Size is bounded by a weigher with the underlying
//! TinyLFU policy evicting the least-frequently-used entries.

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::sync::Cache;
use tracing::warn;

/// TTL class, by query shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    /// Simple lookups (≈ 30 s).
    Lookup,
    /// Typical recalls (≈ 2 min).
    Recall,
    /// Context bundles (≤ 5 s).
    Context,
}

impl TtlClass {
    /// The time-to-live for this class.
    pub fn ttl(&self) -> Duration {
        match self {
            TtlClass::Lookup => Duration::from_secs(30),
            TtlClass::Recall => Duration::from_secs(120),
            TtlClass::Context => Duration::from_secs(5),
        }
    }
}

/// Values give the cache a rough size so the weigher can bound memory.
pub trait CacheWeight {
    /// Approximate weight in cache units (bytes-ish).
    fn weight(&self) -> u32 {
        1
    }
}

/// A cached value with its TTL and hit counter.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The memoized value.
    pub value: V,
    /// When the entry was inserted.
    pub inserted_at: Instant,
    ttl: Duration,
    weight: u32,
    hits: Arc<AtomicU64>,
}

impl<V> CacheEntry<V> {
    /// Times this entry answered a lookup.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

struct EntryExpiry;

impl<V> Expiry<String, CacheEntry<V>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Aggregate counters, for stats reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that fell through.
    pub misses: u64,
    /// Live entry count (approximate until gc runs).
    pub entries: u64,
}

/// Short-TTL in-process memoization keyed by scope-qualified strings.
pub struct HotCache<V: Clone + Send + Sync + 'static> {
    entries: Cache<String, CacheEntry<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone + Send + Sync + 'static> std::fmt::Debug for HotCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl<V: Clone + Send + Sync + 'static> HotCache<V> {
    /// Default weight capacity (cache units).
    pub const DEFAULT_CAPACITY: u64 = 64 * 1024 * 1024;

    /// Creates a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Creates a cache bounded at `capacity` weight units.
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(capacity)
                .weigher(|_key: &String, entry: &CacheEntry<V>| entry.weight.max(1))
                .expire_after(EntryExpiry)
                .support_invalidation_closures()
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Builds the canonical `tenant|agent|op|hash` key.
    pub fn key(tenant: &str, agent: Option<&str>, op: &str, params_hash: u64) -> String {
        format!(
            "{}|{}|{}|{:016x}",
            tenant,
            agent.unwrap_or("*"),
            op,
            params_hash
        )
    }

    /// Looks up a key, bumping hit counters on success.
    pub fn get(&self, key: &str) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) => {
                entry.hits.fetch_add(1, Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Looks up the full entry (hit counters included).
    pub fn get_entry(&self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.get(key)
    }

    /// Inserts a value under the TTL of its class.
    pub fn put(&self, key: String, value: V, class: TtlClass)
    where
        V: CacheWeight,
    {
        let weight = value.weight();
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl: class.ttl(),
                weight,
                hits: Arc::new(AtomicU64::new(0)),
            },
        );
    }

    /// Drops every entry belonging to a tenant.
    ///
    /// Used on writes; invalidating the whole tenant is a deliberate
    /// superset of the written `(tenant, agent)` scope, since recalls that
    /// omit the agent are cached under the tenant too.
    pub fn invalidate_tenant(&self, tenant: &str) {
        let prefix = format!("{}|", tenant);
        if let Err(e) = self
            .entries
            .invalidate_entries_if(move |key, _| key.starts_with(&prefix))
        {
            warn!(error = %e, "Cache invalidation predicate rejected");
        }
    }

    /// Drops everything.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Runs pending maintenance (expiry + eviction bookkeeping).
    pub fn gc(&self) {
        self.entries.run_pending_tasks();
    }

    /// Live entry count.
    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.entry_count() == 0
    }

    /// Aggregate counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.entry_count(),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> Default for HotCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
