use thiserror::Error;

use crate::embedding::EmbeddingError;

#[derive(Debug, Error)]
/// Errors returned by the tier controller.
pub enum TierError {
    /// Startup selection has not completed.
    #[error("tier controller is still probing")]
    NotReady,

    /// Every configured provider failed, including mock.
    #[error("no embedding tier could be initialized: {message}")]
    Exhausted {
        /// Summary of the probe failures.
        message: String,
    },

    /// A provider was configured with a dimension the collection cannot use.
    #[error("tier '{level}' serves dimension {actual}, collection requires {expected}")]
    DimensionMismatch {
        /// Offending tier name.
        level: &'static str,
        /// Dimension the collection requires.
        expected: usize,
        /// Dimension the provider serves.
        actual: usize,
    },

    /// The active provider failed and no further fallback succeeded.
    #[error(transparent)]
    Provider(#[from] EmbeddingError),
}
