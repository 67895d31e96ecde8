use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::embedding::EmbeddingError;
use crate::index::IndexError;
use crate::ratelimit::Decision;
use crate::record::RecordError;
use crate::tier::TierError;

/// Stable error codes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    /// Validation failure; never retried.
    InvalidInput,
    /// Engine pre-initialization or mid-probe.
    NotReady,
    /// Provider credential rejected.
    AuthFailed,
    /// Provider or index unreachable.
    Unavailable,
    /// Per-call budget exceeded.
    Timeout,
    /// Admission denied.
    RateLimited,
    /// Index dimension or collection mismatch.
    SchemaMismatch,
    /// Write collision beyond per-scope serialization.
    Conflict,
    /// Caller cancelled.
    Cancelled,
    /// Unexpected; details only in logs.
    Internal,
}

impl ErrorCode {
    /// Stable string form, used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "invalid_input",
            ErrorCode::NotReady => "not_ready",
            ErrorCode::AuthFailed => "auth_failed",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::Timeout => "timeout",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::SchemaMismatch => "schema_mismatch",
            ErrorCode::Conflict => "conflict",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
/// The engine's public failure surface.
///
/// Provider- and backend-specific diagnostics are reduced to this taxonomy
/// before they reach a caller; the full causes go to structured logs keyed
/// by correlation id.
pub enum EngineError {
    /// Validation failure.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// What was rejected.
        message: String,
    },

    /// The engine has not finished startup probing.
    #[error("engine not ready, retry shortly")]
    NotReady,

    /// The embedding provider rejected its credentials.
    #[error("embedding provider credentials rejected")]
    AuthFailed,

    /// A collaborator is unreachable after retries.
    #[error("backend unavailable: {message}")]
    Unavailable {
        /// Short cause.
        message: String,
    },

    /// A per-call budget was exceeded.
    #[error("operation timed out: {message}")]
    Timeout {
        /// Which budget.
        message: String,
    },

    /// Admission denied by the rate limiter.
    #[error("admission denied by {} limit, retry at {}", .decision.limit_type, .decision.reset_at)]
    RateLimited {
        /// The governing decision, including `reset_at`.
        decision: Decision,
    },

    /// Index dimension/collection disagreement; fatal, never retried.
    #[error("schema mismatch: {message}")]
    SchemaMismatch {
        /// Short cause.
        message: String,
    },

    /// A write collided beyond what per-scope serialization absorbs.
    #[error("write conflict: {message}")]
    Conflict {
        /// Short cause.
        message: String,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Unexpected failure; surfaced opaque.
    #[error("internal error (correlation {correlation_id})")]
    Internal {
        /// Key into the structured logs.
        correlation_id: Uuid,
        /// Cause, logged but never displayed to callers.
        message: String,
    },
}

impl EngineError {
    /// Creates an opaque internal error, logging the cause under a fresh
    /// correlation id.
    pub fn internal(message: impl Into<String>) -> Self {
        let correlation_id = Uuid::new_v4();
        let message = message.into();
        tracing::error!(%correlation_id, %message, "Internal engine error");
        EngineError::Internal {
            correlation_id,
            message,
        }
    }

    /// The taxonomy code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::InvalidInput { .. } => ErrorCode::InvalidInput,
            EngineError::NotReady => ErrorCode::NotReady,
            EngineError::AuthFailed => ErrorCode::AuthFailed,
            EngineError::Unavailable { .. } => ErrorCode::Unavailable,
            EngineError::Timeout { .. } => ErrorCode::Timeout,
            EngineError::RateLimited { .. } => ErrorCode::RateLimited,
            EngineError::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
            EngineError::Conflict { .. } => ErrorCode::Conflict,
            EngineError::Cancelled => ErrorCode::Cancelled,
            EngineError::Internal { .. } => ErrorCode::Internal,
        }
    }

    /// Returns `true` for failures retried with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Unavailable { .. }
                | EngineError::Timeout { .. }
                | EngineError::Conflict { .. }
        )
    }
}

impl From<RecordError> for EngineError {
    fn from(err: RecordError) -> Self {
        EngineError::InvalidInput {
            message: err.to_string(),
        }
    }
}

impl From<EmbeddingError> for EngineError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::InvalidInput { reason } => EngineError::InvalidInput {
                message: reason,
            },
            EmbeddingError::AuthFailed { .. } => EngineError::AuthFailed,
            EmbeddingError::Unavailable { .. } | EmbeddingError::Transient { .. } => {
                EngineError::Unavailable {
                    message: err.to_string(),
                }
            }
            EmbeddingError::Timeout { .. } => EngineError::Timeout {
                message: err.to_string(),
            },
            EmbeddingError::MalformedResponse { .. } => EngineError::internal(err.to_string()),
        }
    }
}

impl From<IndexError> for EngineError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::SchemaMismatch { .. } => EngineError::SchemaMismatch {
                message: err.to_string(),
            },
            IndexError::BadCursor { .. } => EngineError::InvalidInput {
                message: err.to_string(),
            },
            IndexError::VectorInPayload { .. } | IndexError::MalformedPayload { .. } => {
                EngineError::internal(err.to_string())
            }
            IndexError::Unavailable { .. }
            | IndexError::CreateCollectionFailed { .. }
            | IndexError::CollectionNotFound { .. }
            | IndexError::UpsertFailed { .. }
            | IndexError::SearchFailed { .. }
            | IndexError::DeleteFailed { .. }
            | IndexError::ListFailed { .. } => EngineError::Unavailable {
                message: err.to_string(),
            },
        }
    }
}

impl From<TierError> for EngineError {
    fn from(err: TierError) -> Self {
        match err {
            TierError::NotReady => EngineError::NotReady,
            TierError::Exhausted { message } => EngineError::Unavailable { message },
            TierError::DimensionMismatch { .. } => EngineError::SchemaMismatch {
                message: err.to_string(),
            },
            TierError::Provider(e) => e.into(),
        }
    }
}
