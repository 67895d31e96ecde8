use uuid::Uuid;

use super::WriteConsistency;
use super::error::IndexError;
use super::model::{AccessPatch, IndexPoint, ListPage, MemoryFilter, SearchHit};

/// Minimal async interface the engine uses against a vector store.
///
/// Every query-shaped operation takes an explicit [`MemoryFilter`], which
/// carries a mandatory tenant; cross-tenant reads are unrepresentable.
pub trait VectorIndex: Send + Sync {
    /// Ensures the collection exists with the given dimension, failing with
    /// `SchemaMismatch` if it exists with a different one.
    fn ensure_collection(
        &self,
        dimension: usize,
    ) -> impl std::future::Future<Output = Result<(), IndexError>> + Send;

    /// Upserts points, atomic per point.
    fn upsert(
        &self,
        points: Vec<IndexPoint>,
        consistency: WriteConsistency,
    ) -> impl std::future::Future<Output = Result<(), IndexError>> + Send;

    /// k-nearest search under a filter, sorted by similarity descending with
    /// scores renormalized into `[0, 1]`.
    fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        filter: &MemoryFilter,
    ) -> impl std::future::Future<Output = Result<Vec<SearchHit>, IndexError>> + Send;

    /// Filtered listing with opaque cursors.
    fn list(
        &self,
        filter: &MemoryFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<ListPage, IndexError>> + Send;

    /// Unfiltered listing across tenants, for stats derivation only.
    fn list_all(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<ListPage, IndexError>> + Send;

    /// Deletes points by id.
    fn delete_by_ids(
        &self,
        ids: Vec<Uuid>,
    ) -> impl std::future::Future<Output = Result<(), IndexError>> + Send;

    /// Deletes every point matching the filter.
    fn delete_by_filter(
        &self,
        filter: &MemoryFilter,
    ) -> impl std::future::Future<Output = Result<(), IndexError>> + Send;

    /// Best-effort access-metadata patches (recall write-behind).
    fn patch_access(
        &self,
        patches: Vec<AccessPatch>,
    ) -> impl std::future::Future<Output = Result<(), IndexError>> + Send;

    /// Counts points, optionally under a filter.
    fn count(
        &self,
        filter: Option<&MemoryFilter>,
    ) -> impl std::future::Future<Output = Result<u64, IndexError>> + Send;

    /// Cheap reachability check.
    fn health_check(&self) -> impl std::future::Future<Output = Result<(), IndexError>> + Send;
}
