use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::IndexError;
use crate::record::{MemoryKind, RecordPayload};

/// A point to be stored: id, vector, and the vector-free payload.
#[derive(Debug, Clone)]
pub struct IndexPoint {
    /// Point id (the record id).
    pub id: Uuid,
    /// Embedding vector; its length must equal the collection dimension.
    pub vector: Vec<f32>,
    /// Record payload. Never contains the vector.
    pub payload: RecordPayload,
}

impl IndexPoint {
    /// Creates a point, enforcing the payload-integrity rule.
    pub fn new(id: Uuid, vector: Vec<f32>, payload: RecordPayload) -> Result<Self, IndexError> {
        ensure_payload_integrity(&payload)?;
        Ok(Self { id, vector, payload })
    }
}

/// A nearest-neighbour hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Point id.
    pub id: Uuid,
    /// Similarity in `[0, 1]` (cosine, renormalized).
    pub score: f32,
    /// Stored payload.
    pub payload: RecordPayload,
}

/// One page of a listing plus the cursor for the next page.
#[derive(Debug, Clone, Serialize)]
pub struct ListPage {
    /// Records on this page.
    pub records: Vec<RecordPayload>,
    /// Opaque cursor for the next page; `None` when exhausted.
    pub next_cursor: Option<String>,
}

/// A best-effort access-metadata update applied by recall's write-behind.
#[derive(Debug, Clone)]
pub struct AccessPatch {
    /// Point to patch.
    pub id: Uuid,
    /// New last-access timestamp.
    pub last_accessed_at: DateTime<Utc>,
    /// New absolute access count.
    pub access_count: u64,
}

/// Conjunctive filter over payload attributes.
///
/// Tenant scoping is mandatory: there is no way to build a filter without a
/// tenant, which is how the index enforces isolation structurally.
#[derive(Debug, Clone)]
pub struct MemoryFilter {
    /// Tenant whose records are visible. Required.
    pub tenant_id: String,
    /// Restrict to one agent within the tenant.
    pub agent_id: Option<String>,
    /// Restrict to these kinds; empty means all kinds.
    pub kinds: Vec<MemoryKind>,
    /// Records must carry every one of these tags.
    pub tags: Vec<String>,
    /// Records created at or after this instant.
    pub created_after: Option<DateTime<Utc>>,
    /// Records created strictly before this instant.
    pub created_before: Option<DateTime<Utc>>,
    /// TTL visibility: records whose `expires_at` is at or before this
    /// instant are filtered out. `None` disables the TTL clause.
    pub visible_at: Option<DateTime<Utc>>,
    /// Restrict to these ids; empty means any id. Combined with the tenant
    /// clause this makes tenant-checked deletes by id a single filter.
    pub ids: Vec<Uuid>,
}

impl MemoryFilter {
    /// Creates a tenant-scoped filter with no further clauses.
    pub fn tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            agent_id: None,
            kinds: Vec::new(),
            tags: Vec::new(),
            created_after: None,
            created_before: None,
            visible_at: None,
            ids: Vec::new(),
        }
    }

    /// Restricts to one agent.
    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
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

    /// Restricts creation time to `[after, before)` (either side optional).
    pub fn created_between(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_after = after;
        self.created_before = before;
        self
    }

    /// Enables the TTL clause at `now`.
    pub fn visible_at(mut self, now: DateTime<Utc>) -> Self {
        self.visible_at = Some(now);
        self
    }

    /// Restricts to the given ids.
    pub fn ids(mut self, ids: Vec<Uuid>) -> Self {
        self.ids = ids;
        self
    }

    /// Evaluates the filter against a payload. Reference semantics for the
    /// in-memory backend; remote backends compile this to native clauses.
    pub fn matches(&self, payload: &RecordPayload) -> bool {
        if payload.tenant_id != self.tenant_id {
            return false;
        }
        if !self.ids.is_empty() && !self.ids.contains(&payload.id) {
            return false;
        }
        if let Some(agent) = &self.agent_id
            && payload.agent_id != *agent
        {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&payload.kind) {
            return false;
        }
        if !self.tags.iter().all(|t| payload.tags.contains(t)) {
            return false;
        }
        if let Some(after) = self.created_after
            && payload.created_at < after
        {
            return false;
        }
        if let Some(before) = self.created_before
            && payload.created_at >= before
        {
            return false;
        }
        if let Some(now) = self.visible_at
            && payload.expires_at.is_some_and(|at| at <= now)
        {
            return false;
        }
        true
    }
}

/// Maps raw cosine similarity from `[-1, 1]` into `[0, 1]`.
#[inline]
pub fn normalize_cosine(score: f32) -> f32 {
    ((score + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Rejects payloads that would duplicate the vector into the payload.
pub fn ensure_payload_integrity(payload: &RecordPayload) -> Result<(), IndexError> {
    for key in crate::record::RESERVED_CONTEXT_KEYS {
        if payload.context.0.contains_key(key) {
            return Err(IndexError::VectorInPayload {
                key: key.to_string(),
            });
        }
    }
    Ok(())
}
