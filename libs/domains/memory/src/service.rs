use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::collections::{CollectionRegistry, module_template};
use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, MemoryResult};
use crate::filter::MetadataFilter;
use crate::models::{
    CREATED_AT, Item, ItemList, ItemPatch, LAST_UPDATE_SOURCE, Metadata, MetadataValue, NewItem,
    QueryResult, SOURCE, ScoredItem, UPDATED_AT,
};
use crate::store::CollectionStore;

/// Upper bound for `n_results` on a single-collection search.
pub const MAX_QUERY_RESULTS: usize = 100;

/// Path segment of the module search route; an item with this id could not be
/// fetched through `/{collection}/{id}`.
pub const RESERVED_ID: &str = "search";

/// Which client a mutation came from. Drives templates and `source` stamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// User-facing module endpoints
    Module,
    /// A single SofIA request
    Sofia,
    /// An operation inside a SofIA batch
    SofiaBatch,
}

impl Origin {
    fn source_tag(self) -> Option<&'static str> {
        match self {
            Origin::Module => None,
            Origin::Sofia => Some("sofia"),
            Origin::SofiaBatch => Some("sofia_batch"),
        }
    }
}

/// Per-collection CRUD and semantic search over logical collection names.
///
/// Every mutation stamps `created_at`/`updated_at`; embeddings are computed here
/// so stores only ever see vectors.
#[derive(Clone)]
pub struct MemoryService {
    store: Arc<dyn CollectionStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    registry: Arc<CollectionRegistry>,
}

pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn require_text(text: &str) -> MemoryResult<()> {
    if text.trim().is_empty() {
        return Err(MemoryError::validation("text must not be empty"));
    }
    Ok(())
}

fn require_id(id: &str) -> MemoryResult<()> {
    if id.trim().is_empty() {
        return Err(MemoryError::validation("id must not be empty"));
    }
    if id == RESERVED_ID {
        return Err(MemoryError::validation(format!("id '{RESERVED_ID}' is reserved")));
    }
    Ok(())
}

/// Stores report the physical collection; callers only know the logical one.
fn with_logical_name(err: MemoryError, collection: &str) -> MemoryError {
    match err {
        MemoryError::ItemNotFound { id, .. } => MemoryError::not_found(collection, &id),
        MemoryError::AlreadyExists { id, .. } => MemoryError::AlreadyExists {
            collection: collection.to_string(),
            id,
        },
        other => other,
    }
}

fn check_reserved(metadata: &Metadata) -> MemoryResult<()> {
    match metadata.get(SOURCE) {
        Some(value) if value.as_text().is_none() => {
            Err(MemoryError::validation("metadata 'source' must be text"))
        }
        _ => Ok(()),
    }
}

impl MemoryService {
    pub fn new(
        store: Arc<dyn CollectionStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        registry: CollectionRegistry,
    ) -> Self {
        Self {
            store,
            embedder,
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    pub(crate) fn store_backend(&self) -> &dyn CollectionStore {
        self.store.as_ref()
    }

    pub(crate) async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        self.embedder.embed(text).await
    }

    /// Creates every registered collection that is missing from the store.
    #[instrument(skip(self))]
    pub async fn ensure_collections(&self) -> MemoryResult<()> {
        let dimension = self.embedder.dimension();
        for physical in self.registry.physical_names() {
            self.store.ensure_collection(physical, dimension).await?;
        }
        Ok(())
    }

    pub async fn ping(&self) -> MemoryResult<()> {
        self.store.ping().await
    }

    #[instrument(skip(self, input), fields(collection = %collection))]
    pub async fn store(&self, collection: &str, input: NewItem, origin: Origin) -> MemoryResult<Item> {
        let physical = self.registry.resolve(collection)?;
        require_text(&input.text)?;
        check_reserved(&input.metadata)?;
        if let Some(id) = &input.id {
            require_id(id)?;
        }

        let mut metadata = match origin {
            Origin::Module => module_template(collection),
            Origin::Sofia | Origin::SofiaBatch => Metadata::new(),
        };
        metadata.extend(input.metadata);

        if let Some(tag) = origin.source_tag() {
            metadata
                .entry(SOURCE.to_string())
                .or_insert_with(|| MetadataValue::from(tag));
        }

        let timestamp = now();
        metadata.insert(CREATED_AT.to_string(), timestamp.clone().into());
        metadata.insert(UPDATED_AT.to_string(), timestamp.into());

        let item = Item {
            id: input.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            text: input.text,
            metadata,
        };

        let vector = self.embedder.embed(&item.text).await?;
        self.store
            .insert(physical, item.clone(), vector)
            .await
            .map_err(|err| with_logical_name(err, collection))?;

        tracing::debug!(id = %item.id, "stored item");
        Ok(item)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, collection: &str, id: &str) -> MemoryResult<Item> {
        let physical = self.registry.resolve(collection)?;
        self.store
            .get(physical, id)
            .await?
            .ok_or_else(|| MemoryError::not_found(collection, id))
    }

    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: ItemPatch,
        origin: Origin,
    ) -> MemoryResult<Item> {
        let physical = self.registry.resolve(collection)?;
        let mut item = self
            .store
            .get(physical, id)
            .await?
            .ok_or_else(|| MemoryError::not_found(collection, id))?;

        if let Some(text) = &patch.text {
            require_text(text)?;
        }
        if let Some(metadata) = patch.metadata {
            check_reserved(&metadata)?;
            item.metadata.extend(
                metadata
                    .into_iter()
                    .filter(|(key, _)| key != CREATED_AT && key != UPDATED_AT),
            );
        }

        if let Some(tag) = origin.source_tag() {
            item.metadata
                .insert(LAST_UPDATE_SOURCE.to_string(), MetadataValue::from(tag));
        }
        item.metadata.insert(UPDATED_AT.to_string(), now().into());

        let vector = match patch.text {
            Some(text) if text != item.text => {
                item.text = text;
                Some(self.embedder.embed(&item.text).await?)
            }
            _ => None,
        };

        // A delete racing this update surfaces here as not found.
        self.store
            .replace(physical, item.clone(), vector)
            .await
            .map_err(|err| with_logical_name(err, collection))?;
        Ok(item)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, collection: &str, id: &str) -> MemoryResult<()> {
        let physical = self.registry.resolve(collection)?;
        if !self.store.delete(physical, id).await? {
            return Err(MemoryError::not_found(collection, id));
        }
        Ok(())
    }

    /// Nearest items to `text`, ascending by distance.
    #[instrument(skip(self, text, filter))]
    pub async fn search(
        &self,
        collection: &str,
        text: &str,
        n_results: usize,
        filter: &MetadataFilter,
    ) -> MemoryResult<Vec<ScoredItem>> {
        let physical = self.registry.resolve(collection)?;
        require_text(text)?;
        if !(1..=MAX_QUERY_RESULTS).contains(&n_results) {
            return Err(MemoryError::validation(format!(
                "n_results must be between 1 and {MAX_QUERY_RESULTS}"
            )));
        }

        let vector = self.embedder.embed(text).await?;
        self.store.query(physical, vector, n_results, filter).await
    }

    pub async fn query(
        &self,
        collection: &str,
        text: &str,
        n_results: usize,
        filter: &MetadataFilter,
    ) -> MemoryResult<QueryResult> {
        self.search(collection, text, n_results, filter)
            .await
            .map(QueryResult::from)
    }

    /// Filtered items, oldest first. `total` counts matches before paging.
    #[instrument(skip(self, filter))]
    pub async fn list(
        &self,
        collection: &str,
        filter: &MetadataFilter,
        limit: usize,
        offset: usize,
    ) -> MemoryResult<ItemList> {
        let physical = self.registry.resolve(collection)?;
        let items = self.store.scan(physical, filter).await?;
        let total = items.len();

        Ok(ItemList {
            items: items.into_iter().skip(offset).take(limit).collect(),
            total,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::collections::{BUSINESS, IDENTITY};
    use crate::embedding::{HashingEmbedder, MockEmbeddingProvider};
    use crate::store::{InMemoryStore, MockCollectionStore};

    pub(crate) async fn service() -> MemoryService {
        let service = MemoryService::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(HashingEmbedder::new(64)),
            CollectionRegistry::default(),
        );
        service.ensure_collections().await.unwrap();
        service
    }

    fn metadata(pairs: &[(&str, MetadataValue)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_store_stamps_timestamps_and_keeps_caller_keys() {
        let service = service().await;
        let input = NewItem::new("likes long walks").with_metadata(metadata(&[
            ("mood", "calm".into()),
            (CREATED_AT, "1999-01-01T00:00:00Z".into()),
        ]));

        let item = service.store(IDENTITY, input, Origin::Sofia).await.unwrap();

        assert_eq!(item.metadata["mood"], MetadataValue::from("calm"));
        assert_eq!(item.metadata[SOURCE], MetadataValue::from("sofia"));
        assert_ne!(item.created_at(), Some("1999-01-01T00:00:00Z"));
        assert_eq!(item.metadata[CREATED_AT], item.metadata[UPDATED_AT]);
        assert!(Uuid::parse_str(&item.id).is_ok());
    }

    #[tokio::test]
    async fn test_module_store_applies_template() {
        let service = service().await;
        let input = NewItem::new("launch a newsletter")
            .with_metadata(metadata(&[("priority", "high".into())]));

        let item = service.store(BUSINESS, input, Origin::Module).await.unwrap();

        assert_eq!(item.metadata["category"], MetadataValue::from("idea"));
        assert_eq!(item.metadata["priority"], MetadataValue::from("high"));
        assert_eq!(item.metadata["status"], MetadataValue::from("pending"));
        assert!(!item.metadata.contains_key(SOURCE));
    }

    #[tokio::test]
    async fn test_caller_source_wins() {
        let service = service().await;
        let input =
            NewItem::new("x").with_metadata(metadata(&[(SOURCE, "airtable".into())]));
        let item = service
            .store(IDENTITY, input, Origin::SofiaBatch)
            .await
            .unwrap();
        assert_eq!(item.metadata[SOURCE], MetadataValue::from("airtable"));
    }

    #[tokio::test]
    async fn test_non_text_source_is_rejected() {
        let service = service().await;
        let input = NewItem::new("x").with_metadata(metadata(&[(SOURCE, 3i64.into())]));
        let err = service.store(IDENTITY, input, Origin::Sofia).await.unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let service = service().await;
        let err = service
            .store(IDENTITY, NewItem::new("  "), Origin::Module)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_collection() {
        let service = service().await;
        let err = service.get("diary", "a").await.unwrap_err();
        assert!(matches!(err, MemoryError::UnknownCollection(_)));
    }

    #[tokio::test]
    async fn test_caller_id_is_honoured_and_duplicates_conflict() {
        let service = service().await;
        service
            .store(IDENTITY, NewItem::new("a").with_id("fixed"), Origin::Sofia)
            .await
            .unwrap();
        assert_eq!(service.get(IDENTITY, "fixed").await.unwrap().text, "a");

        let err = service
            .store(IDENTITY, NewItem::new("b").with_id("fixed"), Origin::Sofia)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_update_merges_metadata() {
        let service = service().await;
        let created = service
            .store(
                IDENTITY,
                NewItem::new("t").with_metadata(metadata(&[
                    ("a", 1i64.into()),
                    ("b", 2i64.into()),
                ])),
                Origin::Sofia,
            )
            .await
            .unwrap();

        let updated = service
            .update(
                IDENTITY,
                &created.id,
                ItemPatch {
                    text: None,
                    metadata: Some(metadata(&[("b", 3i64.into()), ("c", 4i64.into())])),
                },
                Origin::Sofia,
            )
            .await
            .unwrap();

        assert_eq!(updated.metadata["a"], MetadataValue::Integer(1));
        assert_eq!(updated.metadata["b"], MetadataValue::Integer(3));
        assert_eq!(updated.metadata["c"], MetadataValue::Integer(4));
        assert_eq!(updated.metadata[CREATED_AT], created.metadata[CREATED_AT]);
        assert!(updated.metadata[UPDATED_AT].as_text() >= created.metadata[UPDATED_AT].as_text());
        assert_eq!(updated.metadata[LAST_UPDATE_SOURCE], MetadataValue::from("sofia"));
        assert_eq!(service.get(IDENTITY, &created.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let service = service().await;
        let err = service
            .update(IDENTITY, "nope", ItemPatch::default(), Origin::Module)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::ItemNotFound { .. }));
    }

    #[tokio::test]
    async fn test_double_delete_is_not_found() {
        let service = service().await;
        let item = service
            .store(IDENTITY, NewItem::new("bye"), Origin::Module)
            .await
            .unwrap();

        service.delete(IDENTITY, &item.id).await.unwrap();
        let err = service.delete(IDENTITY, &item.id).await.unwrap_err();
        assert!(matches!(err, MemoryError::ItemNotFound { .. }));
    }

    #[tokio::test]
    async fn test_query_empty_collection_is_empty_result() {
        let service = service().await;
        let result = service
            .query(IDENTITY, "anything", 5, &MetadataFilter::new())
            .await
            .unwrap();
        assert_eq!(result, QueryResult::default());
    }

    #[tokio::test]
    async fn test_search_ranks_and_filters() {
        let service = service().await;
        for (text, category) in [
            ("green tea every morning", "habit"),
            ("morning green tea ritual", "habit"),
            ("morning green tea ritual", "other"),
            ("tax return paperwork", "habit"),
        ] {
            service
                .store(
                    IDENTITY,
                    NewItem::new(text).with_metadata(metadata(&[("category", category.into())])),
                    Origin::Module,
                )
                .await
                .unwrap();
        }

        let hits = service
            .search(
                IDENTITY,
                "green tea morning",
                2,
                &MetadataFilter::new().equals("category", "habit"),
            )
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert!(hits[0].distance <= hits[1].distance);
        assert!(hits.iter().all(|h| h.item.text.contains("tea")));
    }

    #[tokio::test]
    async fn test_search_bounds_n_results() {
        let service = service().await;
        for n in [0, MAX_QUERY_RESULTS + 1] {
            let err = service
                .search(IDENTITY, "q", n, &MetadataFilter::new())
                .await
                .unwrap_err();
            assert!(matches!(err, MemoryError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_list_pages_and_counts() {
        let service = service().await;
        for i in 0..5 {
            service
                .store(IDENTITY, NewItem::new(format!("note {i}")), Origin::Module)
                .await
                .unwrap();
        }

        let page = service
            .list(IDENTITY, &MetadataFilter::new(), 2, 3)
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        let texts: Vec<_> = page.items.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, ["note 3", "note 4"]);
    }

    #[tokio::test]
    async fn test_update_without_text_change_skips_embedding() {
        let mut store = MockCollectionStore::new();
        store.expect_get().returning(|_, id| {
            Ok(Some(Item {
                id: id.to_string(),
                text: "same".into(),
                metadata: Metadata::new(),
            }))
        });
        store
            .expect_replace()
            .withf(|collection, _, vector| collection == "identity_psychology" && vector.is_none())
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut embedder = MockEmbeddingProvider::new();
        embedder.expect_embed().never();

        let service = MemoryService::new(
            Arc::new(store),
            Arc::new(embedder),
            CollectionRegistry::default(),
        );
        let item = service
            .update(
                IDENTITY,
                "a",
                ItemPatch {
                    text: Some("same".into()),
                    metadata: None,
                },
                Origin::Module,
            )
            .await
            .unwrap();
        assert!(item.metadata.contains_key(UPDATED_AT));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let mut store = MockCollectionStore::new();
        store
            .expect_insert()
            .returning(|_, _, _| Err(MemoryError::Store("unavailable".into())));
        let mut embedder = MockEmbeddingProvider::new();
        embedder.expect_embed().returning(|_| Ok(vec![1.0]));

        let service = MemoryService::new(
            Arc::new(store),
            Arc::new(embedder),
            CollectionRegistry::default(),
        );
        let err = service
            .store(IDENTITY, NewItem::new("x"), Origin::Sofia)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Store(_)));
    }

    #[tokio::test]
    async fn test_blank_and_reserved_ids_are_rejected() {
        let service = service().await;
        for id in ["", "   ", RESERVED_ID] {
            let err = service
                .store(IDENTITY, NewItem::new("x").with_id(id), Origin::Sofia)
                .await
                .unwrap_err();
            assert!(matches!(err, MemoryError::Validation(_)), "id {id:?}");
        }
        let listed = service
            .list(IDENTITY, &MetadataFilter::new(), 10, 0)
            .await
            .unwrap();
        assert_eq!(listed.total, 0);
    }

    #[tokio::test]
    async fn test_update_racing_delete_is_not_found_with_logical_name() {
        let mut store = MockCollectionStore::new();
        store.expect_get().returning(|_, id| {
            Ok(Some(Item {
                id: id.to_string(),
                text: "before".into(),
                metadata: Metadata::new(),
            }))
        });
        store
            .expect_replace()
            .times(1)
            .returning(|collection, item, _| Err(MemoryError::not_found(collection, &item.id)));
        let mut embedder = MockEmbeddingProvider::new();
        embedder.expect_embed().returning(|_| Ok(vec![1.0]));

        let service = MemoryService::new(
            Arc::new(store),
            Arc::new(embedder),
            CollectionRegistry::default(),
        );
        let err = service
            .update(
                IDENTITY,
                "x",
                ItemPatch {
                    text: Some("after".into()),
                    metadata: None,
                },
                Origin::Sofia,
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Item 'x' not found in collection 'identity'");
    }

    #[tokio::test]
    async fn test_conflict_names_logical_collection() {
        let service = service().await;
        service
            .store(IDENTITY, NewItem::new("a").with_id("dup"), Origin::Sofia)
            .await
            .unwrap();
        let err = service
            .store(IDENTITY, NewItem::new("b").with_id("dup"), Origin::Sofia)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Item 'dup' already exists in collection 'identity'"
        );
    }
}
