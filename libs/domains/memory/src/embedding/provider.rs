use async_trait::async_trait;

use crate::error::MemoryResult;

/// Turns text into a fixed-size vector.
///
/// Every vector a provider returns has exactly [`dimension`](Self::dimension) entries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>>;
}
