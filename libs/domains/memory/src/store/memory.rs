use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CollectionStore, cosine_distance, rank};
use crate::error::{MemoryError, MemoryResult};
use crate::filter::MetadataFilter;
use crate::models::{Item, ScoredItem};

#[derive(Debug)]
struct StoredPoint {
    item: Item,
    vector: Vec<f32>,
}

#[derive(Debug)]
struct Collection {
    dimension: usize,
    points: Vec<StoredPoint>,
}

impl Collection {
    fn position(&self, id: &str) -> Option<usize> {
        self.points.iter().position(|p| p.item.id == id)
    }

    fn check_dimension(&self, name: &str, vector: &[f32]) -> MemoryResult<()> {
        if vector.len() != self.dimension {
            return Err(MemoryError::Store(format!(
                "collection '{}' expects {} dimensions, got {}",
                name,
                self.dimension,
                vector.len()
            )));
        }
        Ok(())
    }
}

/// Process-local store with exact cosine search.
///
/// Points keep insertion order, which also breaks ties between equal distances.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unknown(collection: &str) -> MemoryError {
    MemoryError::UnknownCollection(collection.to_string())
}

#[async_trait]
impl CollectionStore for InMemoryStore {
    async fn ensure_collection(&self, collection: &str, dimension: usize) -> MemoryResult<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_insert_with(|| Collection {
                dimension,
                points: Vec::new(),
            });
        Ok(())
    }

    async fn insert(&self, collection: &str, item: Item, vector: Vec<f32>) -> MemoryResult<()> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| unknown(collection))?;

        target.check_dimension(collection, &vector)?;
        if target.position(&item.id).is_some() {
            return Err(MemoryError::AlreadyExists {
                collection: collection.to_string(),
                id: item.id,
            });
        }

        target.points.push(StoredPoint { item, vector });
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> MemoryResult<Option<Item>> {
        let collections = self.collections.read().await;
        let target = collections.get(collection).ok_or_else(|| unknown(collection))?;
        Ok(target.position(id).map(|i| target.points[i].item.clone()))
    }

    async fn replace(
        &self,
        collection: &str,
        item: Item,
        vector: Option<Vec<f32>>,
    ) -> MemoryResult<()> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| unknown(collection))?;

        if let Some(vector) = &vector {
            target.check_dimension(collection, vector)?;
        }
        let index = target
            .position(&item.id)
            .ok_or_else(|| MemoryError::not_found(collection, &item.id))?;

        let point = &mut target.points[index];
        point.item = item;
        if let Some(vector) = vector {
            point.vector = vector;
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> MemoryResult<bool> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| unknown(collection))?;

        match target.position(id) {
            Some(index) => {
                target.points.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn query(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: &MetadataFilter,
    ) -> MemoryResult<Vec<ScoredItem>> {
        let collections = self.collections.read().await;
        let target = collections.get(collection).ok_or_else(|| unknown(collection))?;

        let scored = target
            .points
            .iter()
            .filter(|p| filter.matches(&p.item.metadata))
            .map(|p| ScoredItem {
                item: p.item.clone(),
                distance: cosine_distance(&vector, &p.vector),
            })
            .collect();

        Ok(rank(scored, limit))
    }

    async fn scan(&self, collection: &str, filter: &MetadataFilter) -> MemoryResult<Vec<Item>> {
        let collections = self.collections.read().await;
        let target = collections.get(collection).ok_or_else(|| unknown(collection))?;

        Ok(target
            .points
            .iter()
            .filter(|p| filter.matches(&p.item.metadata))
            .map(|p| p.item.clone())
            .collect())
    }

    async fn ping(&self) -> MemoryResult<()> {
        Ok(())
    }
}
