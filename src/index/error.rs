use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned by vector index operations.
pub enum IndexError {
    /// Backend unreachable.
    #[error("vector index unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
    },

    /// Collection creation failed.
    #[error("failed to create collection '{collection}': {message}")]
    CreateCollectionFailed {
        /// Collection name.
        collection: String,
        /// Error message.
        message: String,
    },

    /// Collection does not exist.
    #[error("collection not found: {collection}")]
    CollectionNotFound {
        /// Collection name.
        collection: String,
    },

    /// Collection dimension disagrees with the configured dimension.
    /// Fatal for the operation; vectors are never silently truncated.
    #[error("schema mismatch in '{collection}': collection dimension {actual}, expected {expected}")]
    SchemaMismatch {
        /// Collection name.
        collection: String,
        /// Configured dimension.
        expected: usize,
        /// Collection's actual dimension.
        actual: usize,
    },

    /// The payload carried a vector-like field; the vector lives only as
    /// the index key and duplicating it is an integrity error.
    #[error("payload contains reserved vector field '{key}'")]
    VectorInPayload {
        /// Offending key.
        key: String,
    },

    /// Upsert failed.
    #[error("failed to upsert points to '{collection}': {message}")]
    UpsertFailed {
        /// Collection name.
        collection: String,
        /// Error message.
        message: String,
    },

    /// Search failed.
    #[error("failed to search in '{collection}': {message}")]
    SearchFailed {
        /// Collection name.
        collection: String,
        /// Error message.
        message: String,
    },

    /// Delete failed.
    #[error("failed to delete points from '{collection}': {message}")]
    DeleteFailed {
        /// Collection name.
        collection: String,
        /// Error message.
        message: String,
    },

    /// List/scroll failed.
    #[error("failed to list points in '{collection}': {message}")]
    ListFailed {
        /// Collection name.
        collection: String,
        /// Error message.
        message: String,
    },

    /// An opaque cursor could not be resolved.
    #[error("invalid pagination cursor: '{cursor}'")]
    BadCursor {
        /// Rejected cursor.
        cursor: String,
    },

    /// A stored payload failed to decode into a record.
    #[error("malformed payload for point {id}: {message}")]
    MalformedPayload {
        /// Point id as stored.
        id: String,
        /// Error message.
        message: String,
    },
}

impl IndexError {
    /// Returns `true` for failures the engine may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IndexError::Unavailable { .. }
                | IndexError::UpsertFailed { .. }
                | IndexError::SearchFailed { .. }
                | IndexError::DeleteFailed { .. }
                | IndexError::ListFailed { .. }
        )
    }
}
