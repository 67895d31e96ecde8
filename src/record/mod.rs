//! Memory record model and write-time validation.
//!
//! A [`MemoryRecord`] is the unit of storage. Its embedding is never part of
//! the record payload; the vector index owns the vector, keyed by record id,
//! and [`RecordPayload`] is the projection that travels as index payload.

mod error;


pub use error::RecordError;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{MAX_CONTENT_CHARS, MAX_CONTEXT_BYTES};

/// Payload keys that would duplicate the vector into the payload.
///
/// The index stores the vector once, keyed by id; a payload carrying one of
/// these keys is an integrity error and is rejected at write time.
pub const RESERVED_CONTEXT_KEYS: [&str; 2] = ["embedding", "vector"];

/// Classification of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// A stable fact about the world or the user.
    Fact,
    /// A user or agent preference.
    Preference,
    /// A how-to or repeatable procedure.
    Procedure,
    /// A task or action item.
    Task,
    /// Conversation-thread context.
    Thread,
    /// Persona and tone information.
    Personality,
    /// Anything else.
    Other,
}

impl MemoryKind {
    /// Stable string form, used in payloads and filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Fact => "fact",
            MemoryKind::Preference => "preference",
            MemoryKind::Procedure => "procedure",
            MemoryKind::Task => "task",
            MemoryKind::Thread => "thread",
            MemoryKind::Personality => "personality",
            MemoryKind::Other => "other",
        }
    }

    /// All kinds, in stable order.
    pub fn all() -> [MemoryKind; 7] {
        [
            MemoryKind::Fact,
            MemoryKind::Preference,
            MemoryKind::Procedure,
            MemoryKind::Task,
            MemoryKind::Thread,
            MemoryKind::Personality,
            MemoryKind::Other,
        ]
    }
}

impl Default for MemoryKind {
    fn default() -> Self {
        MemoryKind::Other
    }
}

impl std::str::FromStr for MemoryKind {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fact" => Ok(MemoryKind::Fact),
            "preference" => Ok(MemoryKind::Preference),
            "procedure" => Ok(MemoryKind::Procedure),
            "task" => Ok(MemoryKind::Task),
            "thread" => Ok(MemoryKind::Thread),
            "personality" => Ok(MemoryKind::Personality),
            "other" => Ok(MemoryKind::Other),
            _ => Err(RecordError::UnknownKind { value: s.to_string() }),
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar or list-of-scalars attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Text value.
    Text(String),
    /// Integer value.
    Integer(i64),
    /// Floating-point value.
    Real(f64),
    /// Boolean value.
    Flag(bool),
    /// Homogeneous or mixed list of scalars.
    List(Vec<AttrValue>),
}

/// Bounded free-form attribute bag attached to a record.
///
/// Serialized size is capped at [`MAX_CONTEXT_BYTES`]; overflow and reserved
/// keys are rejected at write time rather than truncated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeBag(pub BTreeMap<String, AttrValue>);

impl AttributeBag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the bag holds no attributes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Inserts an attribute.
    pub fn insert(&mut self, key: impl Into<String>, value: AttrValue) {
        self.0.insert(key.into(), value);
    }

    /// Looks up an attribute.
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.get(key)
    }

    /// Serialized size in bytes.
    pub fn serialized_len(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(usize::MAX)
    }

    /// Validates the size bound and reserved keys.
    pub fn validate(&self) -> Result<(), RecordError> {
        for key in RESERVED_CONTEXT_KEYS {
            if self.0.contains_key(key) {
                return Err(RecordError::ReservedContextKey {
                    key: key.to_string(),
                });
            }
        }
        let bytes = self.serialized_len();
        if bytes > MAX_CONTEXT_BYTES {
            return Err(RecordError::ContextTooLarge {
                bytes,
                max: MAX_CONTEXT_BYTES,
            });
        }
        Ok(())
    }
}

/// A single long-term memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Opaque unique identifier, assigned at creation, immutable.
    pub id: Uuid,
    /// Owning tenant; scopes all visibility.
    pub tenant_id: String,
    /// Owning agent within the tenant.
    pub agent_id: String,
    /// The remembered text.
    pub content: String,
    /// Classification.
    pub kind: MemoryKind,
    /// Importance in `[0, 1]`.
    pub importance: f64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Sorted, deduplicated tags.
    pub tags: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp. Never before `created_at`.
    pub updated_at: DateTime<Utc>,
    /// Last recall access timestamp. Never before `created_at`.
    pub last_accessed_at: DateTime<Utc>,
    /// Number of recalls that returned this record.
    pub access_count: u64,
    /// Optional absolute expiry. Expired records are invisible to recall.
    pub expires_at: Option<DateTime<Utc>>,
    /// Free-form bounded attributes.
    pub context: AttributeBag,
}

impl MemoryRecord {
    /// Returns `true` if the record is past its TTL at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Records a recall access, keeping timestamps monotone.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_accessed_at {
            self.last_accessed_at = now;
        }
        self.access_count = self.access_count.saturating_add(1);
    }

    /// Projects the record into its index payload (vector excluded).
    pub fn to_payload(&self) -> RecordPayload {
        RecordPayload {
            id: self.id,
            tenant_id: self.tenant_id.clone(),
            agent_id: self.agent_id.clone(),
            content: self.content.clone(),
            kind: self.kind,
            importance: self.importance,
            confidence: self.confidence,
            tags: self.tags.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_accessed_at: self.last_accessed_at,
            access_count: self.access_count,
            expires_at: self.expires_at,
            context: self.context.clone(),
        }
    }
}

/// The serializable projection of a record stored as index payload.
///
/// Datetimes serialize as epoch milliseconds so the index can range-filter
/// them. The embedding is deliberately absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPayload {
    /// Record id (also the index point id).
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: String,
    /// Owning agent.
    pub agent_id: String,
    /// The remembered text.
    pub content: String,
    /// Classification.
    pub kind: MemoryKind,
    /// Importance in `[0, 1]`.
    pub importance: f64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Sorted, deduplicated tags.
    pub tags: Vec<String>,
    /// Creation timestamp (epoch ms on the wire).
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp (epoch ms on the wire).
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    /// Last access timestamp (epoch ms on the wire).
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_accessed_at: DateTime<Utc>,
    /// Number of recall accesses.
    pub access_count: u64,
    /// Optional absolute expiry (epoch ms on the wire).
    #[serde(with = "chrono::serde::ts_milliseconds_option", default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Free-form bounded attributes.
    #[serde(default)]
    pub context: AttributeBag,
}

impl RecordPayload {
    /// Reconstructs the owned record from the payload.
    pub fn into_record(self) -> MemoryRecord {
        MemoryRecord {
            id: self.id,
            tenant_id: self.tenant_id,
            agent_id: self.agent_id,
            content: self.content,
            kind: self.kind,
            importance: self.importance,
            confidence: self.confidence,
            tags: self.tags,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_accessed_at: self.last_accessed_at,
            access_count: self.access_count,
            expires_at: self.expires_at,
            context: self.context,
        }
    }
}

/// Validates memory content: non-empty, not whitespace-only, within bounds.
pub fn validate_content(content: &str) -> Result<(), RecordError> {
    if content.trim().is_empty() {
        return Err(RecordError::EmptyContent);
    }
    let chars = content.chars().count();
    if chars > MAX_CONTENT_CHARS {
        return Err(RecordError::ContentTooLong {
            chars,
            max: MAX_CONTENT_CHARS,
        });
    }
    Ok(())
}

/// Validates a tenant or agent identifier: non-empty after trimming.
pub fn validate_scope_id(field: &'static str, value: &str) -> Result<(), RecordError> {
    if value.trim().is_empty() {
        return Err(RecordError::EmptyScopeId { field });
    }
    Ok(())
}

/// Validates a unit-interval field such as importance or confidence.
pub fn validate_unit_interval(field: &'static str, value: f64) -> Result<(), RecordError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(RecordError::OutOfUnitInterval { field, value });
    }
    Ok(())
}

/// Validates a TTL expiry: must be strictly in the future.
pub fn validate_expiry(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), RecordError> {
    if expires_at <= now {
        return Err(RecordError::ExpiryInPast { expires_at });
    }
    Ok(())
}

/// Normalizes tags: trims, drops empties, deduplicates, sorts.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}
