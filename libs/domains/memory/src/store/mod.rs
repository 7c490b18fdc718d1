//! Vector-backed persistence for memory items.
//!
//! Stores are addressed by physical collection name; logical names are resolved
//! by [`CollectionRegistry`](crate::collections::CollectionRegistry) before a call
//! reaches this layer.

mod memory;
mod qdrant;

use async_trait::async_trait;

use crate::error::MemoryResult;
use crate::filter::MetadataFilter;
use crate::models::{Item, ScoredItem};

pub use memory::InMemoryStore;
pub use qdrant::{QdrantConfig, QdrantStore};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Create the collection if it does not exist yet.
    async fn ensure_collection(&self, collection: &str, dimension: usize) -> MemoryResult<()>;

    /// Add a new item. Fails with `AlreadyExists` when the id is taken.
    async fn insert(&self, collection: &str, item: Item, vector: Vec<f32>) -> MemoryResult<()>;

    async fn get(&self, collection: &str, id: &str) -> MemoryResult<Option<Item>>;

    /// Overwrite an existing item. `None` keeps the stored vector.
    async fn replace(
        &self,
        collection: &str,
        item: Item,
        vector: Option<Vec<f32>>,
    ) -> MemoryResult<()>;

    /// Returns `false` when nothing was stored under `id`.
    async fn delete(&self, collection: &str, id: &str) -> MemoryResult<bool>;

    /// Nearest items to `vector`, ascending by distance, at most `limit`.
    async fn query(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: &MetadataFilter,
    ) -> MemoryResult<Vec<ScoredItem>>;

    /// Every item matching `filter`, oldest first.
    async fn scan(&self, collection: &str, filter: &MetadataFilter) -> MemoryResult<Vec<Item>>;

    async fn ping(&self) -> MemoryResult<()>;
}

/// Cosine distance `1 - cos(a, b)`. A zero vector is at distance 1 from everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Sorts ascending by distance, keeping the incoming order on ties.
pub(crate) fn rank(mut scored: Vec<ScoredItem>, limit: usize) -> Vec<ScoredItem> {
    scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    scored.truncate(limit);
    scored
}
