use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_optional, env_parse, env_required};
use qdrant_client::qdrant::{
    self, Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    GetPointsBuilder, PointId, PointStruct, PointVectors, ScrollPointsBuilder,
    SearchPointsBuilder, SetPayloadPointsBuilder, UpdatePointVectorsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder, value::Kind,
};
use qdrant_client::{Qdrant, QdrantError};
use tracing::debug;
use uuid::Uuid;

use super::{CollectionStore, cosine_distance, rank};
use crate::error::{MemoryError, MemoryResult};
use crate::filter::{Condition as FilterCondition, MetadataFilter};
use crate::models::{Item, Metadata, MetadataValue, ScoredItem};

const ITEM_ID_FIELD: &str = "item_id";
const TEXT_FIELD: &str = "text";
const METADATA_FIELD: &str = "metadata";
const SCROLL_PAGE_SIZE: u32 = 256;
/// Server message for a point-level write on an id that does not exist.
const MISSING_POINT_MESSAGE: &str = "No point with id";

/// Qdrant connection configuration
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl QdrantConfig {
    pub fn new(url: String) -> Self {
        Self {
            url,
            api_key: None,
            timeout_secs: 30,
        }
    }

    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Loaded from environment variables:
/// - `QDRANT_URL` (required)
/// - `QDRANT_API_KEY` (optional)
/// - `QDRANT_TIMEOUT_SECS` (default: 30)
impl FromEnv for QdrantConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new(env_required("QDRANT_URL")?)
            .with_timeout(env_parse("QDRANT_TIMEOUT_SECS", 30)?);
        if let Some(api_key) = env_optional("QDRANT_API_KEY") {
            config = config.with_api_key(api_key);
        }
        Ok(config)
    }
}

/// Qdrant-backed implementation of [`CollectionStore`].
///
/// Each item is one point. The item id is kept in the payload next to the text and
/// a nested `metadata` object; the point id is derived from the item id.
pub struct QdrantStore {
    client: Qdrant,
}

impl QdrantStore {
    pub fn new(config: QdrantConfig) -> MemoryResult<Self> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(api_key) = config.api_key {
            builder = builder.api_key(api_key);
        }

        builder = builder.timeout(Duration::from_secs(config.timeout_secs));

        let client = builder
            .build()
            .map_err(|e| MemoryError::Store(format!("Failed to build client: {}", e)))?;

        Ok(Self { client })
    }

    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    async fn fetch(
        &self,
        collection: &str,
        id: &str,
        with_vectors: bool,
    ) -> MemoryResult<Option<(Item, Option<Vec<f32>>)>> {
        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(collection, vec![point_id(id)])
                    .with_payload(true)
                    .with_vectors(with_vectors),
            )
            .await?;

        response
            .result
            .into_iter()
            .next()
            .map(|point| {
                let vector = extract_vector(&point.vectors);
                payload_to_item(point.payload).map(|item| (item, vector))
            })
            .transpose()
    }

    async fn upsert(&self, collection: &str, item: Item, vector: Vec<f32>) -> MemoryResult<()> {
        let point = PointStruct::new(point_id(&item.id), vector, item_to_payload(item));
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, vec![point]).wait(true))
            .await?;
        Ok(())
    }

    async fn scroll_all(
        &self,
        collection: &str,
        filter: Option<Filter>,
        with_vectors: bool,
    ) -> MemoryResult<Vec<(Item, Option<Vec<f32>>)>> {
        let mut points = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(collection)
                .limit(SCROLL_PAGE_SIZE)
                .with_payload(true)
                .with_vectors(with_vectors);
            if let Some(filter) = filter.clone() {
                builder = builder.filter(filter);
            }
            if let Some(offset) = offset.take() {
                builder = builder.offset(offset);
            }

            let response = self.client.scroll(builder).await?;
            for point in response.result {
                let vector = extract_vector(&point.vectors);
                points.push((payload_to_item(point.payload)?, vector));
            }

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(points)
    }
}

#[async_trait]
impl CollectionStore for QdrantStore {
    async fn ensure_collection(&self, collection: &str, dimension: usize) -> MemoryResult<()> {
        if self.client.collection_exists(collection).await? {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await?;
        debug!(collection, dimension, "created qdrant collection");
        Ok(())
    }

    async fn insert(&self, collection: &str, item: Item, vector: Vec<f32>) -> MemoryResult<()> {
        if self.fetch(collection, &item.id, false).await?.is_some() {
            return Err(MemoryError::AlreadyExists {
                collection: collection.to_string(),
                id: item.id,
            });
        }
        self.upsert(collection, item, vector).await
    }

    async fn get(&self, collection: &str, id: &str) -> MemoryResult<Option<Item>> {
        Ok(self
            .fetch(collection, id, false)
            .await?
            .map(|(item, _)| item))
    }

    async fn replace(
        &self,
        collection: &str,
        item: Item,
        vector: Option<Vec<f32>>,
    ) -> MemoryResult<()> {
        // Both calls fail on a missing point, so a concurrent delete is never undone.
        let id = item.id.clone();
        let missing = |err: QdrantError| {
            if is_missing_point(&err.to_string()) {
                MemoryError::not_found(collection, &id)
            } else {
                MemoryError::from(err)
            }
        };

        self.client
            .overwrite_payload(
                SetPayloadPointsBuilder::new(collection, item_to_payload(item))
                    .points_selector(vec![point_id(&id)])
                    .wait(true),
            )
            .await
            .map_err(missing)?;

        if let Some(vector) = vector {
            self.client
                .update_vectors(
                    UpdatePointVectorsBuilder::new(
                        collection,
                        vec![PointVectors {
                            id: Some(point_id(&id)),
                            vectors: Some(vector.into()),
                        }],
                    )
                    .wait(true),
                )
                .await
                .map_err(missing)?;
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> MemoryResult<bool> {
        if self.fetch(collection, id, false).await?.is_none() {
            return Ok(false);
        }

        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(vec![point_id(id)])
                    .wait(true),
            )
            .await?;
        Ok(true)
    }

    async fn query(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: &MetadataFilter,
    ) -> MemoryResult<Vec<ScoredItem>> {
        let pushed = PushedFilter::from(filter);

        // Qdrant matches array payloads on any element, so server-side results
        // are only a candidate set and every hit is checked again locally.
        if pushed.complete {
            let mut builder = SearchPointsBuilder::new(collection, vector.clone(), limit as u64)
                .with_payload(true);
            if let Some(f) = pushed.filter.clone() {
                builder = builder.filter(f);
            }

            let hits = self
                .client
                .search_points(builder)
                .await?
                .result
                .into_iter()
                .map(|point| {
                    Ok(ScoredItem {
                        item: payload_to_item(point.payload)?,
                        distance: 1.0 - point.score,
                    })
                })
                .collect::<MemoryResult<Vec<_>>>()?;

            if let Some(scored) = recheck(hits, filter, limit) {
                return Ok(rank(scored, limit));
            }
        }

        let scored = self
            .scroll_all(collection, pushed.filter, true)
            .await?
            .into_iter()
            .filter(|(item, _)| filter.matches(&item.metadata))
            .map(|(item, stored)| ScoredItem {
                distance: stored.map_or(1.0, |s| cosine_distance(&vector, &s)),
                item,
            })
            .collect();
        Ok(rank(scored, limit))
    }

    async fn scan(&self, collection: &str, filter: &MetadataFilter) -> MemoryResult<Vec<Item>> {
        let pushed = PushedFilter::from(filter);
        let mut items: Vec<Item> = self
            .scroll_all(collection, pushed.filter, false)
            .await?
            .into_iter()
            .map(|(item, _)| item)
            .filter(|item| filter.matches(&item.metadata))
            .collect();

        items.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(items)
    }

    async fn ping(&self) -> MemoryResult<()> {
        self.client.health_check().await?;
        Ok(())
    }
}

/// The part of a [`MetadataFilter`] Qdrant can evaluate server-side.
///
/// The translated filter accepts a superset of what [`MetadataFilter::matches`]
/// accepts; results still need the local check.
struct PushedFilter {
    filter: Option<Filter>,
    /// Every condition was translated.
    complete: bool,
}

/// Drops search hits the exact filter rejects.
///
/// Returns `None` when hits were dropped from a full page: more matching points
/// may rank below it and only an exhaustive scan can find them.
fn recheck(
    hits: Vec<ScoredItem>,
    filter: &MetadataFilter,
    limit: usize,
) -> Option<Vec<ScoredItem>> {
    let returned = hits.len();
    let kept: Vec<_> = hits
        .into_iter()
        .filter(|hit| filter.matches(&hit.item.metadata))
        .collect();

    (kept.len() == returned || returned < limit).then_some(kept)
}

fn is_missing_point(message: &str) -> bool {
    message.contains(MISSING_POINT_MESSAGE)
}

impl From<&MetadataFilter> for PushedFilter {
    fn from(filter: &MetadataFilter) -> Self {
        let mut conditions = Vec::new();
        let mut complete = true;

        for condition in filter.conditions() {
            let field = format!("{}.{}", METADATA_FIELD, condition.key());
            match condition {
                FilterCondition::Equals {
                    value: MetadataValue::Text(text),
                    ..
                } => conditions.push(Condition::matches(field, text.clone())),
                FilterCondition::Equals {
                    value: MetadataValue::Bool(flag),
                    ..
                } => conditions.push(Condition::matches(field, *flag)),
                FilterCondition::Contains { value, .. } => {
                    conditions.push(Condition::matches(field, value.clone()))
                }
                FilterCondition::AtLeast { value, .. } => conditions.push(Condition::range(
                    field,
                    qdrant::Range {
                        gte: Some(*value),
                        ..Default::default()
                    },
                )),
                FilterCondition::Equals { .. } => complete = false,
            }
        }

        Self {
            filter: (!conditions.is_empty()).then(|| Filter::must(conditions)),
            complete,
        }
    }
}

/// Item ids that are UUIDs map directly; anything else gets a stable v5 UUID.
fn point_id(id: &str) -> PointId {
    let uuid = Uuid::parse_str(id)
        .unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_URL, id.as_bytes()));
    PointId::from(uuid.to_string())
}

fn item_to_payload(item: Item) -> HashMap<String, QdrantValue> {
    let metadata = item
        .metadata
        .into_iter()
        .map(|(key, value)| (key, metadata_to_qdrant(value)))
        .collect();

    HashMap::from([
        (ITEM_ID_FIELD.to_string(), QdrantValue::from(item.id)),
        (TEXT_FIELD.to_string(), QdrantValue::from(item.text)),
        (
            METADATA_FIELD.to_string(),
            QdrantValue {
                kind: Some(Kind::StructValue(qdrant::Struct { fields: metadata })),
            },
        ),
    ])
}

fn payload_to_item(mut payload: HashMap<String, QdrantValue>) -> MemoryResult<Item> {
    let mut take_text = |field: &str| match payload.remove(field).and_then(|v| v.kind) {
        Some(Kind::StringValue(s)) => Ok(s),
        _ => Err(MemoryError::Store(format!("point payload is missing '{field}'"))),
    };
    let id = take_text(ITEM_ID_FIELD)?;
    let text = take_text(TEXT_FIELD)?;

    let metadata = match payload.remove(METADATA_FIELD).and_then(|v| v.kind) {
        Some(Kind::StructValue(s)) => s
            .fields
            .into_iter()
            .filter_map(|(key, value)| qdrant_to_metadata(value).map(|v| (key, v)))
            .collect(),
        _ => Metadata::new(),
    };

    Ok(Item { id, text, metadata })
}

fn metadata_to_qdrant(value: MetadataValue) -> QdrantValue {
    let kind = match value {
        MetadataValue::Null => Kind::NullValue(0),
        MetadataValue::Bool(b) => Kind::BoolValue(b),
        MetadataValue::Integer(i) => Kind::IntegerValue(i),
        MetadataValue::Float(f) => Kind::DoubleValue(f),
        MetadataValue::Text(s) => Kind::StringValue(s),
        MetadataValue::List(values) => Kind::ListValue(qdrant::ListValue {
            values: values.into_iter().map(metadata_to_qdrant).collect(),
        }),
    };
    QdrantValue { kind: Some(kind) }
}

fn qdrant_to_metadata(value: QdrantValue) -> Option<MetadataValue> {
    match value.kind? {
        Kind::NullValue(_) => Some(MetadataValue::Null),
        Kind::BoolValue(b) => Some(MetadataValue::Bool(b)),
        Kind::IntegerValue(i) => Some(MetadataValue::Integer(i)),
        Kind::DoubleValue(f) => Some(MetadataValue::Float(f)),
        Kind::StringValue(s) => Some(MetadataValue::Text(s)),
        Kind::ListValue(list) => Some(MetadataValue::List(
            list.values.into_iter().filter_map(qdrant_to_metadata).collect(),
        )),
        Kind::StructValue(_) => None,
    }
}

/// Note: uses the deprecated `data` field until the client exposes dense vectors directly.
#[allow(deprecated)]
fn extract_vector(vectors: &Option<qdrant::VectorsOutput>) -> Option<Vec<f32>> {
    match vectors {
        Some(qdrant::VectorsOutput {
            vectors_options: Some(opts),
        }) => match opts {
            qdrant::vectors_output::VectorsOptions::Vector(v) => Some(v.data.clone()),
            qdrant::vectors_output::VectorsOptions::Vectors(map) => {
                map.vectors.values().next().map(|v| v.data.clone())
            }
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_stable() {
        assert_eq!(point_id("note-1"), point_id("note-1"));
        assert_ne!(point_id("note-1"), point_id("note-2"));

        let uuid = "6f1c2a7e-0b8f-4f5e-9a3a-2c9e0d6f7b10";
        assert_eq!(point_id(uuid), PointId::from(uuid.to_string()));
    }

    #[test]
    fn test_payload_round_trip_keeps_types() {
        let mut metadata = Metadata::new();
        metadata.insert("due".into(), MetadataValue::Null);
        metadata.insert("done".into(), MetadataValue::Bool(false));
        metadata.insert("count".into(), MetadataValue::Integer(3));
        metadata.insert("score".into(), MetadataValue::Float(0.25));
        metadata.insert("tags".into(), vec!["a", "b"].into());
        let item = Item {
            id: "note-1".into(),
            text: "hello".into(),
            metadata,
        };

        let restored = payload_to_item(item_to_payload(item.clone())).unwrap();
        assert_eq!(restored, item);
    }

    #[test]
    fn test_payload_without_text_is_error() {
        let payload = HashMap::from([(ITEM_ID_FIELD.to_string(), QdrantValue::from("x"))]);
        assert!(matches!(
            payload_to_item(payload),
            Err(MemoryError::Store(_))
        ));
    }

    #[test]
    fn test_filter_pushdown() {
        let filter = MetadataFilter::new()
            .equals("category", "idea")
            .and(FilterCondition::AtLeast {
                key: "strength".into(),
                value: 0.5,
            });
        let pushed = PushedFilter::from(&filter);
        assert!(pushed.complete);
        assert_eq!(pushed.filter.map(|f| f.must.len()), Some(2));

        let partial = PushedFilter::from(&MetadataFilter::new().equals("score", 0.5));
        assert!(!partial.complete);
        assert!(partial.filter.is_none());
    }

    fn hit(id: &str, tags: Vec<&str>, distance: f32) -> ScoredItem {
        let mut metadata = Metadata::new();
        metadata.insert("tags".into(), tags.into());
        ScoredItem {
            item: Item {
                id: id.into(),
                text: id.into(),
                metadata,
            },
            distance,
        }
    }

    #[test]
    fn test_text_equals_on_list_field_is_rechecked() {
        let filter = MetadataFilter::new().equals("tags", "x");
        let pushed = PushedFilter::from(&filter);
        assert!(pushed.complete);

        // Qdrant returns the list-valued point; the local check drops it.
        let kept = recheck(vec![hit("listed", vec!["x", "y"], 0.1)], &filter, 5).unwrap();
        assert!(kept.is_empty());
    }

    #[test]
    fn test_recheck_falls_back_when_a_full_page_loses_hits() {
        let filter = MetadataFilter::new().equals("tags", vec!["x"]);
        let hits = vec![hit("a", vec!["x"], 0.1), hit("b", vec!["x", "y"], 0.2)];
        assert!(recheck(hits, &filter, 2).is_none());

        let clean = vec![hit("a", vec!["x"], 0.1), hit("c", vec!["x"], 0.3)];
        assert_eq!(recheck(clean, &filter, 2).map(|k| k.len()), Some(2));
    }

    #[test]
    fn test_missing_point_message() {
        assert!(is_missing_point(
            "Error in the response: Not found: No point with id 6f1c2a7e found"
        ));
        assert!(!is_missing_point("Error in the response: Unavailable"));
    }

    #[test]
    fn test_config_from_env() {
        temp_env::with_vars(
            [
                ("QDRANT_URL", Some("http://qdrant:6334")),
                ("QDRANT_API_KEY", None),
                ("QDRANT_TIMEOUT_SECS", Some("5")),
            ],
            || {
                let config = QdrantConfig::from_env().unwrap();
                assert_eq!(config.url, "http://qdrant:6334");
                assert_eq!(config.timeout_secs, 5);
                assert!(config.api_key.is_none());
            },
        );
    }
}
