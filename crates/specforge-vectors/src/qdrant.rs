//! Qdrant-backed vector index.
//!
//! All sessions share one collection, `{prefix}interactions`. Session
//! isolation is enforced with a payload filter on `session_id` that every
//! query, lookup, and delete carries.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use qdrant_client::qdrant::{
    condition::ConditionOneOf, r#match::MatchValue, value::Kind,
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance,
    FieldCondition, Filter, Match, PointId, PointStruct, ScrollPointsBuilder, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{ChunkMetadata, Error, Result, SessionFilter, VectorEntry, VectorIndex, VectorMatch};

/// Point payload key names
const KEY_CHUNK_ID: &str = "chunk_id";
const KEY_SESSION_ID: &str = "session_id";
const KEY_TEXT: &str = "text";
const KEY_TIMESTAMP: &str = "timestamp";
const KEY_QUESTION: &str = "question";
const KEY_CATEGORY: &str = "category";

/// Page size when scrolling a session for deletion.
const SCROLL_PAGE: u32 = 256;

/// Configuration for the Qdrant backend.
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub collection_prefix: String,
}

impl QdrantConfig {
    pub fn new(url: impl Into<String>, collection_prefix: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            collection_prefix: collection_prefix.into(),
        }
    }
}

/// Vector index stored in Qdrant.
pub struct QdrantVectorIndex {
    client: Qdrant,
    collection: String,
}

impl QdrantVectorIndex {
    /// Connect and make sure the collection exists with the right dimension.
    pub async fn connect(config: &QdrantConfig, dimension: usize) -> Result<Self> {
        let client = Qdrant::from_url(&config.url)
            .build()
            .map_err(|e| Error::VectorStore(format!("Failed to connect to Qdrant: {}", e)))?;

        let index = Self {
            client,
            collection: format!("{}interactions", config.collection_prefix),
        };
        index.ensure_collection(dimension).await?;

        info!(url = %config.url, collection = %index.collection, "Qdrant index connected");

        Ok(index)
    }

    /// Create the collection if missing. A dimension mismatch is an error
    /// rather than a silent recreate, since it would drop stored sessions.
    async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to check collection: {}", e)))?;

        if exists {
            let info = self
                .client
                .collection_info(&self.collection)
                .await
                .map_err(|e| Error::VectorStore(format!("Failed to get collection info: {}", e)))?;

            let existing_dim = info
                .result
                .as_ref()
                .and_then(|r| r.config.as_ref())
                .and_then(|c| c.params.as_ref())
                .and_then(|p| p.vectors_config.as_ref())
                .and_then(|vc| match vc.config.as_ref() {
                    Some(qdrant_client::qdrant::vectors_config::Config::Params(params)) => {
                        Some(params.size as usize)
                    }
                    _ => None,
                })
                .unwrap_or(0);

            if existing_dim != dimension {
                return Err(Error::DimensionMismatch {
                    expected: existing_dim,
                    actual: dimension,
                });
            }

            debug!(collection = %self.collection, dimension, "Collection already exists");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to create collection: {}", e)))?;

        info!(collection = %self.collection, dimension, "Created Qdrant collection");

        Ok(())
    }

    /// Qdrant ids must be UUIDs or integers; chunk ids are neither.
    fn point_id(chunk_id: &str) -> PointId {
        PointId::from(Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string())
    }

    async fn scroll_ids(&self, filter: Filter) -> Result<Vec<PointId>> {
        let mut ids = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(&self.collection)
                .limit(SCROLL_PAGE)
                .with_payload(false)
                .filter(filter.clone());
            if let Some(off) = offset.take() {
                builder = builder.offset(off);
            }

            let response = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| Error::VectorStore(format!("Scroll failed: {}", e)))?;

            ids.extend(response.result.into_iter().filter_map(|p| p.id));

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(ids)
    }
}

#[async_trait::async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn upsert(&self, entry: VectorEntry) -> Result<()> {
        let mut payload: HashMap<String, QdrantValue> = HashMap::new();
        payload.insert(KEY_CHUNK_ID.into(), QdrantValue::from(entry.id.clone()));
        payload.insert(
            KEY_SESSION_ID.into(),
            QdrantValue::from(entry.metadata.session_id.clone()),
        );
        payload.insert(KEY_TEXT.into(), QdrantValue::from(entry.text));
        payload.insert(
            KEY_TIMESTAMP.into(),
            QdrantValue::from(entry.metadata.timestamp.to_rfc3339()),
        );
        payload.insert(KEY_QUESTION.into(), QdrantValue::from(entry.metadata.question));
        payload.insert(
            KEY_CATEGORY.into(),
            QdrantValue::from(entry.metadata.category.as_str().to_string()),
        );

        let point = PointStruct::new(Self::point_id(&entry.id), entry.vector, payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to upsert point: {}", e)))?;

        debug!(collection = %self.collection, chunk_id = %entry.id, "Upserted point");

        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &SessionFilter,
    ) -> Result<Vec<VectorMatch>> {
        let builder = SearchPointsBuilder::new(&self.collection, vector.to_vec(), k as u64)
            .with_payload(true)
            .filter(session_filter(filter));

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| Error::VectorStore(format!("Search failed: {}", e)))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| payload_to_match(point.payload, 1.0 - point.score))
            .collect())
    }

    async fn get(&self, filter: &SessionFilter, id: &str) -> Result<Option<VectorMatch>> {
        let mut qfilter = session_filter(filter);
        qfilter.must.push(make_match_condition(KEY_CHUNK_ID, id));

        let response = self
            .client
            .scroll(
                ScrollPointsBuilder::new(&self.collection)
                    .limit(1)
                    .with_payload(true)
                    .filter(qfilter),
            )
            .await
            .map_err(|e| Error::VectorStore(format!("Lookup failed: {}", e)))?;

        Ok(response
            .result
            .into_iter()
            .next()
            .and_then(|p| payload_to_match(p.payload, 0.0)))
    }

    async fn delete(&self, filter: &SessionFilter, id: &str) -> Result<bool> {
        if self.get(filter, id).await?.is_none() {
            return Ok(false);
        }

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(vec![Self::point_id(id)])
                    .wait(true),
            )
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to delete point: {}", e)))?;

        Ok(true)
    }

    async fn delete_session(&self, filter: &SessionFilter) -> Result<usize> {
        let ids = self.scroll_ids(session_filter(filter)).await?;
        if ids.is_empty() {
            return Ok(0);
        }

        let count = ids.len();
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(ids)
                    .wait(true),
            )
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to delete points: {}", e)))?;

        info!(session_id = %filter.session_id(), count, "Deleted session vectors");

        Ok(count)
    }

    async fn count(&self, filter: &SessionFilter) -> Result<usize> {
        let response = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection)
                    .filter(session_filter(filter))
                    .exact(true),
            )
            .await
            .map_err(|e| Error::VectorStore(format!("Count failed: {}", e)))?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }
}

fn session_filter(filter: &SessionFilter) -> Filter {
    Filter {
        must: vec![make_match_condition(KEY_SESSION_ID, filter.session_id())],
        ..Default::default()
    }
}

/// Create a match condition for a field
fn make_match_condition(key: &str, value: &str) -> Condition {
    Condition {
        condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
            key: key.to_string(),
            r#match: Some(Match {
                match_value: Some(MatchValue::Keyword(value.to_string())),
            }),
            ..Default::default()
        })),
    }
}

/// Convert Qdrant value to JSON value
fn qdrant_value_to_json(value: QdrantValue) -> Option<Value> {
    match value.kind {
        Some(Kind::NullValue(_)) => Some(Value::Null),
        Some(Kind::BoolValue(b)) => Some(Value::Bool(b)),
        Some(Kind::IntegerValue(i)) => Some(Value::Number(i.into())),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d).map(Value::Number),
        Some(Kind::StringValue(s)) => Some(Value::String(s)),
        Some(Kind::ListValue(list)) => Some(Value::Array(
            list.values
                .into_iter()
                .filter_map(qdrant_value_to_json)
                .collect(),
        )),
        Some(Kind::StructValue(obj)) => Some(Value::Object(
            obj.fields
                .into_iter()
                .filter_map(|(k, v)| qdrant_value_to_json(v).map(|jv| (k, jv)))
                .collect(),
        )),
        None => None,
    }
}

/// Rebuild a match from a point payload; points missing required keys are skipped.
fn payload_to_match(payload: HashMap<String, QdrantValue>, distance: f32) -> Option<VectorMatch> {
    let payload: HashMap<String, Value> = payload
        .into_iter()
        .filter_map(|(k, v)| qdrant_value_to_json(v).map(|jv| (k, jv)))
        .collect();

    let text_of = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_string);

    let timestamp = text_of(KEY_TIMESTAMP)
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))?;
    let category = text_of(KEY_CATEGORY)?.parse().ok()?;

    Some(VectorMatch {
        id: text_of(KEY_CHUNK_ID)?,
        text: text_of(KEY_TEXT)?,
        distance,
        metadata: ChunkMetadata {
            session_id: text_of(KEY_SESSION_ID)?,
            timestamp,
            question: text_of(KEY_QUESTION).unwrap_or_default(),
            category,
        },
    })
}
