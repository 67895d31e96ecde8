use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
/// Validation failures for memory records and their fields.
pub enum RecordError {
    /// Content was empty or whitespace-only.
    #[error("memory content is empty or whitespace-only")]
    EmptyContent,

    /// Content exceeded the character bound.
    #[error("memory content too long: {chars} chars (max {max})")]
    ContentTooLong {
        /// Observed length in characters.
        chars: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// A tenant or agent id was empty.
    #[error("{field} must be non-empty")]
    EmptyScopeId {
        /// Field name (`tenant_id` or `agent_id`).
        field: &'static str,
    },

    /// Importance or confidence outside `[0, 1]`.
    #[error("{field} must be within [0, 1], got {value}")]
    OutOfUnitInterval {
        /// Field name.
        field: &'static str,
        /// Rejected value.
        value: f64,
    },

    /// TTL expiry was not in the future.
    #[error("expiry {expires_at} is not in the future")]
    ExpiryInPast {
        /// Rejected expiry.
        expires_at: DateTime<Utc>,
    },

    /// Context attribute bag exceeded the serialized size bound.
    #[error("context attributes too large: {bytes} bytes (max {max})")]
    ContextTooLarge {
        /// Serialized size in bytes.
        bytes: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Context attribute bag used a reserved key.
    #[error("context key '{key}' is reserved (vectors live in the index, not the payload)")]
    ReservedContextKey {
        /// The reserved key.
        key: String,
    },

    /// Unknown memory kind string.
    #[error("unknown memory kind: '{value}'")]
    UnknownKind {
        /// Rejected value.
        value: String,
    },
}
