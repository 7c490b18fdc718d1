//! One query ranked across several collections.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use utoipa::ToSchema;

use crate::collections::{BUSINESS, IDENTITY, REMINDERS};
use crate::error::{MemoryError, MemoryResult};
use crate::filter::MetadataFilter;
use crate::models::{Metadata, ScoredItem};
use crate::service::{MAX_QUERY_RESULTS, MemoryService};

pub const DEFAULT_CONSOLIDATE_COLLECTIONS: [&str; 3] = [IDENTITY, BUSINESS, REMINDERS];
pub const DEFAULT_CONSOLIDATE_LIMIT: usize = 10;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConsolidateRequest {
    pub query: String,
    /// Logical collection names. Defaults to identity, business and reminders.
    #[serde(default)]
    pub collections: Option<Vec<String>>,
    /// Maximum merged results (default 10, at most 100).
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConsolidatedResult {
    pub collection: String,
    pub id: String,
    pub text: String,
    #[schema(value_type = Object)]
    pub metadata: Metadata,
    /// Distance from the query; lower is more similar.
    pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConsolidateResponse {
    pub query: String,
    pub collections: Vec<String>,
    pub total_results: usize,
    pub results: Vec<ConsolidatedResult>,
}

/// Tags each hit with its collection, concatenates in the given order, then
/// stable-sorts by distance and truncates. Equal distances keep collection order.
pub fn merge_ranked(
    per_collection: Vec<(String, Vec<ScoredItem>)>,
    limit: usize,
) -> Vec<ConsolidatedResult> {
    let mut merged: Vec<ConsolidatedResult> = per_collection
        .into_iter()
        .flat_map(|(collection, hits)| {
            hits.into_iter().map(move |hit| ConsolidatedResult {
                collection: collection.clone(),
                id: hit.item.id,
                text: hit.item.text,
                metadata: hit.item.metadata,
                similarity: hit.distance,
            })
        })
        .collect();

    merged.sort_by(|a, b| a.similarity.total_cmp(&b.similarity));
    merged.truncate(limit);
    merged
}

/// Order-preserving dedup.
fn distinct(collections: &[String]) -> Vec<&str> {
    let mut seen = Vec::with_capacity(collections.len());
    for name in collections {
        if !seen.contains(&name.as_str()) {
            seen.push(name.as_str());
        }
    }
    seen
}

impl MemoryService {
    /// Queries each collection concurrently and returns one globally ranked list.
    ///
    /// Unknown or failing collections contribute no hits.
    #[instrument(skip(self, request), fields(query = %request.query))]
    pub async fn consolidate(&self, request: ConsolidateRequest) -> MemoryResult<ConsolidateResponse> {
        if request.query.trim().is_empty() {
            return Err(MemoryError::validation("query must not be empty"));
        }
        let limit = request.limit.unwrap_or(DEFAULT_CONSOLIDATE_LIMIT);
        if !(1..=MAX_QUERY_RESULTS).contains(&limit) {
            return Err(MemoryError::validation(format!(
                "limit must be between 1 and {MAX_QUERY_RESULTS}"
            )));
        }
        let collections = request.collections.unwrap_or_else(|| {
            DEFAULT_CONSOLIDATE_COLLECTIONS
                .iter()
                .map(|c| c.to_string())
                .collect()
        });

        let vector = self.embed(&request.query).await?;
        let no_filter = MetadataFilter::new();

        let lookups = distinct(&collections).into_iter().map(|logical| {
            let vector = vector.clone();
            let no_filter = &no_filter;
            async move {
                let hits = match self.registry().resolve(logical) {
                    Ok(physical) => self
                        .store_backend()
                        .query(physical, vector, limit, no_filter)
                        .await
                        .unwrap_or_else(|err| {
                            warn!(collection = logical, error = %err, "consolidation query failed");
                            Vec::new()
                        }),
                    Err(err) => {
                        warn!(collection = logical, error = %err, "skipping collection");
                        Vec::new()
                    }
                };
                (logical.to_string(), hits)
            }
        });

        let results = merge_ranked(join_all(lookups).await, limit);

        Ok(ConsolidateResponse {
            query: request.query,
            collections,
            total_results: results.len(),
            results,
        })
    }
}
