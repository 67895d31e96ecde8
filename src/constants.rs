//! Cross-cutting, shared constants.
//!
//! Prefer deriving secondary constants from primary ones to avoid drift.
//!
//! # Dimension Invariants
//!
//! The embedding dimension is fixed for the lifetime of a collection and is
//! treated as an invariant across modules (embedding, tier, index, engine).
//! Runtime-configurable dimensions flow through [`DimConfig`]; use
//! [`validate_embedding_dim`] at module boundaries to catch mismatches early
//! instead of silently truncating vectors.

/// Default embedding vector dimension.
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

/// Default vector size as `u64` for index collection creation.
pub const DEFAULT_VECTOR_SIZE_U64: u64 = DEFAULT_EMBEDDING_DIM as u64;

/// Maximum memory content length in characters.
pub const MAX_CONTENT_CHARS: usize = 1_000_000;

/// Maximum serialized size of a record's context attribute bag, in bytes.
pub const MAX_CONTEXT_BYTES: usize = 16 * 1024;

/// Maximum `k` accepted by recall and context queries.
pub const MAX_RECALL_K: usize = 200;

/// Minimum candidate count requested from the index before rescoring.
pub const CANDIDATE_FLOOR: usize = 50;

/// Default `k` for forget-by-query deletions.
pub const DEFAULT_FORGET_K: usize = 100;

/// Per-call budget for index queries, in milliseconds.
pub const INDEX_QUERY_BUDGET_MS: u64 = 250;

/// Per-call budget for embedding generation, in milliseconds.
pub const EMBED_BUDGET_MS: u64 = 2_000;

/// Per-call budget for cache hits, in milliseconds.
pub const CACHE_BUDGET_MS: u64 = 25;

/// Probe budget for the local embedding sidecar handshake, in seconds.
pub const LOCAL_PROBE_BUDGET_SECS: u64 = 5;

/// Sliding failure window and demotion stickiness for tier fallback, in seconds.
pub const TIER_FAILURE_WINDOW_SECS: u64 = 60;

/// Consecutive `Unavailable` failures within the window that trigger demotion.
pub const TIER_FAILURE_THRESHOLD: usize = 2;

/// Record count above which stats are derived from a bounded sample.
pub const STATS_SAMPLE_BOUND: usize = 100_000;

/// Maximum retained rate-limit violations (FIFO beyond this).
pub const MAX_VIOLATION_LOG: usize = 1_000;

/// Runtime dimension configuration for modules that agree on vector sizes at
/// initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimConfig {
    /// The embedding vector dimension (number of floats).
    pub embedding_dim: usize,
}

impl Default for DimConfig {
    fn default() -> Self {
        Self {
            embedding_dim: DEFAULT_EMBEDDING_DIM,
        }
    }
}

impl DimConfig {
    /// Creates a new dimension configuration.
    pub fn new(embedding_dim: usize) -> Self {
        Self { embedding_dim }
    }

    /// Validates that this configuration is usable.
    pub fn validate(&self) -> Result<(), DimValidationError> {
        if self.embedding_dim == 0 {
            return Err(DimValidationError::ZeroDimension);
        }
        Ok(())
    }

    /// Returns the number of bytes of an f32 representation of one vector.
    pub fn f32_bytes(&self) -> usize {
        self.embedding_dim * 4
    }
}

/// Error returned when dimension validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimValidationError {
    /// Embedding dimension cannot be zero.
    ZeroDimension,
    /// Runtime dimension does not match the expected dimension.
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },
}

impl std::fmt::Display for DimValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroDimension => write!(f, "embedding dimension cannot be zero"),
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "dimension mismatch: expected {}, got {}", expected, actual)
            }
        }
    }
}

impl std::error::Error for DimValidationError {}

/// Validates that a runtime embedding dimension matches the expected dimension.
///
/// Use this at module boundaries so mismatches surface as errors rather than
/// as silently truncated vectors deep in the pipeline.
pub fn validate_embedding_dim(actual: usize, expected: usize) -> Result<(), DimValidationError> {
    if actual != expected {
        return Err(DimValidationError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dim_config_default() {
        assert_eq!(DimConfig::default().embedding_dim, DEFAULT_EMBEDDING_DIM);
    }

    #[test]
    fn test_dim_config_validate_zero() {
        assert_eq!(
            DimConfig::new(0).validate(),
            Err(DimValidationError::ZeroDimension)
        );
    }

    #[test]
    fn test_validate_embedding_dim_match() {
        assert!(validate_embedding_dim(1536, 1536).is_ok());
    }

    #[test]
    fn test_validate_embedding_dim_mismatch() {
        assert_eq!(
            validate_embedding_dim(768, 1536),
            Err(DimValidationError::DimensionMismatch {
                expected: 1536,
                actual: 768
            })
        );
    }

    #[test]
    fn test_byte_calculation() {
        assert_eq!(DimConfig::new(1536).f32_bytes(), 6144);
    }
}
