//! In-memory reference backend.
//!
//! Keeps every point in a `RwLock`'d map and evaluates filters and cosine
//! similarity exactly. Listing order is stable (ascending id) so cursors
//! stay valid across pages as long as the process lives.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use super::WriteConsistency;
use super::client::VectorIndex;
use super::error::IndexError;
use super::model::{
    AccessPatch, IndexPoint, ListPage, MemoryFilter, SearchHit, ensure_payload_integrity,
    normalize_cosine,
};
use crate::record::RecordPayload;

#[derive(Clone)]
struct StoredPoint {
    vector: Vec<f32>,
    payload: RecordPayload,
}

/// In-process vector index.
#[derive(Default)]
pub struct InMemoryIndex {
    dimension: RwLock<Option<usize>>,
    points: RwLock<HashMap<Uuid, StoredPoint>>,
}

impl InMemoryIndex {
    /// Creates an empty index; the dimension is fixed by the first
    /// `ensure_collection` call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored points.
    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    /// Returns `true` if no points are stored.
    pub fn is_empty(&self) -> bool {
        self.points.read().is_empty()
    }

    /// Fetches a stored payload by id (test and diagnostics helper).
    pub fn get(&self, id: &Uuid) -> Option<RecordPayload> {
        self.points.read().get(id).map(|p| p.payload.clone())
    }

    fn require_dimension(&self) -> Result<usize, IndexError> {
        self.dimension
            .read()
            .ok_or_else(|| IndexError::CollectionNotFound {
                collection: "in-memory".to_string(),
            })
    }

    fn page(
        &self,
        filter: Option<&MemoryFilter>,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ListPage, IndexError> {
        let start: Option<Uuid> = match cursor {
            Some(c) => Some(Uuid::parse_str(c).map_err(|_| IndexError::BadCursor {
                cursor: c.to_string(),
            })?),
            None => None,
        };

        let points = self.points.read();
        let mut ids: Vec<Uuid> = points
            .iter()
            .filter(|(_, p)| filter.is_none_or(|f| f.matches(&p.payload)))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();

        let from = match start {
            Some(cursor_id) => ids.partition_point(|id| *id < cursor_id),
            None => 0,
        };

        let page_ids = &ids[from..(from + limit).min(ids.len())];
        let next_cursor = ids.get(from + limit).map(|id| id.to_string());

        Ok(ListPage {
            records: page_ids
                .iter()
                .map(|id| points[id].payload.clone())
                .collect(),
            next_cursor,
        })
    }
}

impl VectorIndex for InMemoryIndex {
    async fn ensure_collection(&self, dimension: usize) -> Result<(), IndexError> {
        let mut dim = self.dimension.write();
        match *dim {
            Some(existing) if existing != dimension => Err(IndexError::SchemaMismatch {
                collection: "in-memory".to_string(),
                expected: dimension,
                actual: existing,
            }),
            _ => {
                *dim = Some(dimension);
                Ok(())
            }
        }
    }

    async fn upsert(
        &self,
        points: Vec<IndexPoint>,
        _consistency: WriteConsistency,
    ) -> Result<(), IndexError> {
        let dimension = self.require_dimension()?;

        for point in &points {
            ensure_payload_integrity(&point.payload)?;
            if point.vector.len() != dimension {
                return Err(IndexError::SchemaMismatch {
                    collection: "in-memory".to_string(),
                    expected: dimension,
                    actual: point.vector.len(),
                });
            }
        }

        let mut map = self.points.write();
        for point in points {
            map.insert(
                point.id,
                StoredPoint {
                    vector: point.vector,
                    payload: point.payload,
                },
            );
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let dimension = self.require_dimension()?;
        if vector.len() != dimension {
            return Err(IndexError::SchemaMismatch {
                collection: "in-memory".to_string(),
                expected: dimension,
                actual: vector.len(),
            });
        }

        let points = self.points.read();
        let mut hits: Vec<SearchHit> = points
            .iter()
            .filter(|(_, p)| filter.matches(&p.payload))
            .map(|(&id, p)| SearchHit {
                id,
                score: normalize_cosine(cosine_similarity(&vector, &p.vector)),
                payload: p.payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn list(
        &self,
        filter: &MemoryFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ListPage, IndexError> {
        self.page(Some(filter), cursor, limit)
    }

    async fn list_all(&self, cursor: Option<&str>, limit: usize) -> Result<ListPage, IndexError> {
        self.page(None, cursor, limit)
    }

    async fn delete_by_ids(&self, ids: Vec<Uuid>) -> Result<(), IndexError> {
        let mut map = self.points.write();
        for id in ids {
            map.remove(&id);
        }
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &MemoryFilter) -> Result<(), IndexError> {
        let mut map = self.points.write();
        map.retain(|_, p| !filter.matches(&p.payload));
        Ok(())
    }

    async fn patch_access(&self, patches: Vec<AccessPatch>) -> Result<(), IndexError> {
        let mut map = self.points.write();
        for patch in patches {
            if let Some(stored) = map.get_mut(&patch.id) {
                if patch.last_accessed_at > stored.payload.last_accessed_at {
                    stored.payload.last_accessed_at = patch.last_accessed_at;
                }
                stored.payload.access_count = stored.payload.access_count.max(patch.access_count);
            }
        }
        Ok(())
    }

    async fn count(&self, filter: Option<&MemoryFilter>) -> Result<u64, IndexError> {
        let points = self.points.read();
        Ok(points
            .values()
            .filter(|p| filter.is_none_or(|f| f.matches(&p.payload)))
            .count() as u64)
    }

    async fn health_check(&self) -> Result<(), IndexError> {
        Ok(())
    }
}

/// Raw cosine similarity in `[-1, 1]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
