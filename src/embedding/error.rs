use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned by embedding providers.
pub enum EmbeddingError {
    /// Input failed validation; never retried.
    #[error("invalid embedding input: {reason}")]
    InvalidInput {
        /// What was wrong with the input.
        reason: String,
    },

    /// Provider unreachable or returned a server fault.
    #[error("embedding provider '{provider}' unavailable: {reason}")]
    Unavailable {
        /// Provider name.
        provider: &'static str,
        /// Error message.
        reason: String,
    },

    /// Credentials rejected by the provider.
    #[error("embedding provider '{provider}' rejected credentials")]
    AuthFailed {
        /// Provider name.
        provider: &'static str,
    },

    /// Rate/quota pressure; retryable with backoff.
    #[error("embedding provider '{provider}' transient failure: {reason}")]
    Transient {
        /// Provider name.
        provider: &'static str,
        /// Error message.
        reason: String,
    },

    /// A per-call budget was exceeded.
    #[error("embedding provider '{provider}' timed out after {budget_ms}ms")]
    Timeout {
        /// Provider name.
        provider: &'static str,
        /// Budget that was exceeded, in milliseconds.
        budget_ms: u64,
    },

    /// The provider answered with a body the client could not use.
    #[error("embedding provider '{provider}' returned a malformed response: {reason}")]
    MalformedResponse {
        /// Provider name.
        provider: &'static str,
        /// Error message.
        reason: String,
    },
}

impl EmbeddingError {
    /// Returns `true` for failures the caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbeddingError::Unavailable { .. }
                | EmbeddingError::Transient { .. }
                | EmbeddingError::Timeout { .. }
        )
    }
}
