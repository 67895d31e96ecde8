//! Qdrant-backed vector index.
//!
//! Stores one named collection with cosine distance and on-disk payloads.
//! Record payloads travel as JSON-shaped qdrant payload maps; timestamps are
//! epoch milliseconds so time windows and TTL visibility compile to native
//! range clauses.

use std::collections::HashMap;

use qdrant_client::Payload;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::condition::ConditionOneOf;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    HasIdCondition, IsEmptyCondition, PointId, PointStruct, PointsIdsList, Range,
    ScrollPointsBuilder, SearchPointsBuilder, SetPayloadPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder, vectors_config,
};
use tracing::debug;
use uuid::Uuid;

use super::WriteConsistency;
use super::client::VectorIndex;
use super::error::IndexError;
use super::model::{
    AccessPatch, IndexPoint, ListPage, MemoryFilter, SearchHit, ensure_payload_integrity,
    normalize_cosine,
};
use crate::record::RecordPayload;

/// Qdrant client wrapper bound to one collection.
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    url: String,
}

impl std::fmt::Debug for QdrantIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantIndex")
            .field("url", &self.url)
            .field("collection", &self.collection)
            .finish()
    }
}

impl QdrantIndex {
    /// Connects to `url`, optionally authenticating with an API key.
    pub async fn new(
        url: &str,
        api_key: Option<&str>,
        collection: impl Into<String>,
    ) -> Result<Self, IndexError> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key.to_string());
        }
        let client = builder.build().map_err(|e| IndexError::Unavailable {
            message: format!("failed to connect to '{}': {}", url, e),
        })?;

        Ok(Self {
            client,
            collection: collection.into(),
            url: url.to_string(),
        })
    }

    /// The collection this index serves.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The configured endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn to_qdrant_filter(filter: &MemoryFilter) -> Filter {
        let mut must: Vec<Condition> = vec![Condition::matches(
            "tenant_id",
            filter.tenant_id.clone(),
        )];

        if let Some(agent) = &filter.agent_id {
            must.push(Condition::matches("agent_id", agent.clone()));
        }

        if !filter.ids.is_empty() {
            must.push(Condition {
                condition_one_of: Some(ConditionOneOf::HasId(HasIdCondition {
                    has_id: filter.ids.iter().map(|id| id.to_string().into()).collect(),
                })),
            });
        }

        if !filter.kinds.is_empty() {
            let kind_matches: Vec<Condition> = filter
                .kinds
                .iter()
                .map(|k| Condition::matches("kind", k.as_str().to_string()))
                .collect();
            must.push(nested(Filter::should(kind_matches)));
        }

        // Matching a keyword array field means "contains", so one condition
        // per required tag yields the superset semantics.
        for tag in &filter.tags {
            must.push(Condition::matches("tags", tag.clone()));
        }

        if let Some(after) = filter.created_after {
            must.push(Condition::range(
                "created_at",
                Range {
                    gte: Some(after.timestamp_millis() as f64),
                    ..Default::default()
                },
            ));
        }
        if let Some(before) = filter.created_before {
            must.push(Condition::range(
                "created_at",
                Range {
                    lt: Some(before.timestamp_millis() as f64),
                    ..Default::default()
                },
            ));
        }

        if let Some(now) = filter.visible_at {
            // expires_at IS NULL OR expires_at > now
            must.push(nested(Filter::should([
                Condition {
                    condition_one_of: Some(ConditionOneOf::IsEmpty(IsEmptyCondition {
                        key: "expires_at".to_string(),
                    })),
                },
                Condition::range(
                    "expires_at",
                    Range {
                        gt: Some(now.timestamp_millis() as f64),
                        ..Default::default()
                    },
                ),
            ])));
        }

        Filter::must(must)
    }

    fn to_qdrant_payload(&self, payload: &RecordPayload) -> Result<Payload, IndexError> {
        let value = serde_json::to_value(payload).map_err(|e| IndexError::UpsertFailed {
            collection: self.collection.clone(),
            message: format!("payload serialization failed: {}", e),
        })?;
        Payload::try_from(value).map_err(|e| IndexError::UpsertFailed {
            collection: self.collection.clone(),
            message: format!("payload is not an object: {}", e),
        })
    }

    fn decode_point(
        id: Option<PointId>,
        payload: HashMap<String, qdrant_client::qdrant::Value>,
    ) -> Result<(Uuid, RecordPayload), IndexError> {
        let id_str = match id.and_then(|pid| pid.point_id_options) {
            Some(PointIdOptions::Uuid(s)) => s,
            Some(PointIdOptions::Num(n)) => n.to_string(),
            None => String::new(),
        };
        let uuid = Uuid::parse_str(&id_str).map_err(|e| IndexError::MalformedPayload {
            id: id_str.clone(),
            message: format!("point id is not a uuid: {}", e),
        })?;

        let json = serde_json::Value::Object(
            payload
                .into_iter()
                .map(|(k, v)| (k, qdrant_value_to_json(v)))
                .collect(),
        );
        let record: RecordPayload =
            serde_json::from_value(json).map_err(|e| IndexError::MalformedPayload {
                id: id_str,
                message: e.to_string(),
            })?;
        Ok((uuid, record))
    }
}

fn nested(filter: Filter) -> Condition {
    Condition {
        condition_one_of: Some(ConditionOneOf::Filter(filter)),
    }
}

fn qdrant_value_to_json(value: qdrant_client::qdrant::Value) -> serde_json::Value {
    use qdrant_client::qdrant::value::Kind;

    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => serde_json::Value::Array(
            list.values.into_iter().map(qdrant_value_to_json).collect(),
        ),
        Some(Kind::StructValue(s)) => serde_json::Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_value_to_json(v)))
                .collect(),
        ),
    }
}

impl VectorIndex for QdrantIndex {
    async fn ensure_collection(&self, dimension: usize) -> Result<(), IndexError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| IndexError::Unavailable {
                message: e.to_string(),
            })?;

        if !exists {
            let vectors_config = VectorParamsBuilder::new(dimension as u64, Distance::Cosine);
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection)
                        .vectors_config(vectors_config)
                        .on_disk_payload(true),
                )
                .await
                .map_err(|e| IndexError::CreateCollectionFailed {
                    collection: self.collection.clone(),
                    message: e.to_string(),
                })?;
            debug!(collection = %self.collection, dimension, "Collection created");
            return Ok(());
        }

        // Existing collection: the dimension must agree exactly.
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| IndexError::Unavailable {
                message: e.to_string(),
            })?;

        let actual = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|cfg| match cfg {
                vectors_config::Config::Params(params) => Some(params.size as usize),
                vectors_config::Config::ParamsMap(_) => None,
            });

        match actual {
            Some(actual) if actual == dimension => Ok(()),
            Some(actual) => Err(IndexError::SchemaMismatch {
                collection: self.collection.clone(),
                expected: dimension,
                actual,
            }),
            None => Err(IndexError::CreateCollectionFailed {
                collection: self.collection.clone(),
                message: "could not read collection vector params".to_string(),
            }),
        }
    }

    async fn upsert(
        &self,
        points: Vec<IndexPoint>,
        consistency: WriteConsistency,
    ) -> Result<(), IndexError> {
        if points.is_empty() {
            return Ok(());
        }

        let mut qdrant_points = Vec::with_capacity(points.len());
        for point in points {
            ensure_payload_integrity(&point.payload)?;
            let payload = self.to_qdrant_payload(&point.payload)?;
            qdrant_points.push(PointStruct::new(
                point.id.to_string(),
                point.vector,
                payload,
            ));
        }

        self.client
            .upsert_points(
                UpsertPointsBuilder::new(&self.collection, qdrant_points)
                    .wait(consistency.into()),
            )
            .await
            .map_err(|e| IndexError::UpsertFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        Ok(())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let search_builder =
            SearchPointsBuilder::new(&self.collection, vector, limit as u64)
                .with_payload(true)
                .filter(Self::to_qdrant_filter(filter));

        let response = self
            .client
            .search_points(search_builder)
            .await
            .map_err(|e| IndexError::SearchFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        let mut hits = Vec::with_capacity(response.result.len());
        for point in response.result {
            let score = point.score;
            match Self::decode_point(point.id, point.payload) {
                Ok((id, payload)) => hits.push(SearchHit {
                    id,
                    score: normalize_cosine(score),
                    payload,
                }),
                Err(e) => {
                    // A point that fails to decode is dropped from results,
                    // not fatal to the whole query.
                    debug!(error = %e, "Dropping undecodable search hit");
                }
            }
        }
        Ok(hits)
    }

    async fn list(
        &self,
        filter: &MemoryFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ListPage, IndexError> {
        self.scroll(Some(Self::to_qdrant_filter(filter)), cursor, limit)
            .await
    }

    async fn list_all(&self, cursor: Option<&str>, limit: usize) -> Result<ListPage, IndexError> {
        self.scroll(None, cursor, limit).await
    }

    async fn delete_by_ids(&self, ids: Vec<Uuid>) -> Result<(), IndexError> {
        if ids.is_empty() {
            return Ok(());
        }

        let points_selector = PointsIdsList {
            ids: ids.into_iter().map(|id| id.to_string().into()).collect(),
        };

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(points_selector)
                    .wait(true),
            )
            .await
            .map_err(|e| IndexError::DeleteFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        Ok(())
    }

    async fn delete_by_filter(&self, filter: &MemoryFilter) -> Result<(), IndexError> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(Self::to_qdrant_filter(filter))
                    .wait(true),
            )
            .await
            .map_err(|e| IndexError::DeleteFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        Ok(())
    }

    async fn patch_access(&self, patches: Vec<AccessPatch>) -> Result<(), IndexError> {
        for patch in patches {
            let payload = Payload::try_from(serde_json::json!({
                "last_accessed_at": patch.last_accessed_at.timestamp_millis(),
                "access_count": patch.access_count,
            }))
            .map_err(|e| IndexError::UpsertFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

            let selector = PointsIdsList {
                ids: vec![patch.id.to_string().into()],
            };

            self.client
                .set_payload(
                    SetPayloadPointsBuilder::new(&self.collection, payload)
                        .points_selector(selector)
                        .wait(false),
                )
                .await
                .map_err(|e| IndexError::UpsertFailed {
                    collection: self.collection.clone(),
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }

    async fn count(&self, filter: Option<&MemoryFilter>) -> Result<u64, IndexError> {
        let mut builder = CountPointsBuilder::new(&self.collection).exact(true);
        if let Some(filter) = filter {
            builder = builder.filter(Self::to_qdrant_filter(filter));
        }

        let response = self
            .client
            .count(builder)
            .await
            .map_err(|e| IndexError::SearchFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn health_check(&self) -> Result<(), IndexError> {
        self.client
            .health_check()
            .await
            .map_err(|e| IndexError::Unavailable {
                message: format!("'{}': {}", self.url, e),
            })?;
        Ok(())
    }
}

impl QdrantIndex {
    async fn scroll(
        &self,
        filter: Option<Filter>,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ListPage, IndexError> {
        let mut builder = ScrollPointsBuilder::new(&self.collection)
            .limit(limit as u32)
            .with_payload(true)
            .with_vectors(false);

        if let Some(filter) = filter {
            builder = builder.filter(filter);
        }
        if let Some(cursor) = cursor {
            // Cursors are point ids; reject anything that does not parse so a
            // corrupted cursor fails loudly instead of restarting the scan.
            Uuid::parse_str(cursor).map_err(|_| IndexError::BadCursor {
                cursor: cursor.to_string(),
            })?;
            builder = builder.offset(PointId::from(cursor.to_string()));
        }

        let response = self
            .client
            .scroll(builder)
            .await
            .map_err(|e| IndexError::ListFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        let mut records = Vec::with_capacity(response.result.len());
        for point in response.result {
            if let Ok((_, payload)) = Self::decode_point(point.id, point.payload) {
                records.push(payload);
            }
        }

        let next_cursor = response
            .next_page_offset
            .and_then(|pid| pid.point_id_options)
            .map(|options| match options {
                PointIdOptions::Uuid(s) => s,
                PointIdOptions::Num(n) => n.to_string(),
            });

        Ok(ListPage {
            records,
            next_cursor,
        })
    }
}
