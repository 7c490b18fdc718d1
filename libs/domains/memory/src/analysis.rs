//! Cross-module connection discovery and learning summaries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use utoipa::ToSchema;
use validator::Validate;

use crate::collections::{BUSINESS, CONNECTIONS, IDENTITY, LEARNINGS, REMINDERS};
use crate::error::{MemoryError, MemoryResult};
use crate::filter::MetadataFilter;
use crate::models::{Item, Metadata, MetadataValue, NewItem, SOURCE};
use crate::service::{MemoryService, Origin};

/// Modules searched for connections, in this order.
pub const ANALYZABLE_MODULES: [&str; 4] = [IDENTITY, BUSINESS, REMINDERS, LEARNINGS];

const SNIPPET_CHARS: usize = 50;
const SUMMARY_SNIPPET_CHARS: usize = 100;

fn default_min_similarity() -> f32 {
    0.7
}

fn default_max_connections() -> usize {
    5
}

fn default_max_items() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ConnectionAnalysisRequest {
    #[validate(length(min = 1, message = "item_id must not be empty"))]
    pub item_id: String,
    pub module: String,
    #[serde(default = "default_min_similarity")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_similarity: f32,
    /// Hits considered per module
    #[serde(default = "default_max_connections")]
    #[validate(range(min = 1, max = 20))]
    pub max_connections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectionAnalysis {
    pub source_id: String,
    pub source_module: String,
    /// The connection items that were persisted.
    pub connections: Vec<Item>,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LearningSummaryRequest {
    pub category: Option<String>,
    /// Keeps learnings carrying at least one of these tags
    pub tags: Option<Vec<String>>,
    pub importance: Option<String>,
    #[serde(default = "default_max_items")]
    #[validate(range(min = 1, max = 50))]
    pub max_items: usize,
}

impl Default for LearningSummaryRequest {
    fn default() -> Self {
        Self {
            category: None,
            tags: None,
            importance: None,
            max_items: default_max_items(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LearningSummary {
    pub items: Vec<Item>,
    pub total: usize,
    pub categories: BTreeMap<String, usize>,
    pub summary_text: String,
}

pub(crate) fn snippet(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

pub(crate) fn text_field<'a>(item: &'a Item, key: &str) -> Option<&'a str> {
    item.metadata.get(key).and_then(MetadataValue::as_text)
}

fn importance_rank(item: &Item) -> u8 {
    match text_field(item, "importance").unwrap_or("low") {
        "high" => 0,
        "medium" => 1,
        "low" => 2,
        _ => 3,
    }
}

fn has_any_tag(item: &Item, wanted: &[String]) -> bool {
    item.metadata
        .get("tags")
        .and_then(MetadataValue::as_list)
        .is_some_and(|tags| {
            tags.iter()
                .filter_map(MetadataValue::as_text)
                .any(|tag| wanted.iter().any(|w| w == tag))
        })
}

fn render_summary(items: &[Item]) -> String {
    let mut text = String::from("Learning summary:\n\n");
    for (i, item) in items.iter().enumerate() {
        let category = text_field(item, "category").unwrap_or("general");
        let importance = text_field(item, "importance").unwrap_or("medium");
        text.push_str(&format!(
            "{}. [{} - {}] {}...\n",
            i + 1,
            category.to_uppercase(),
            importance.to_uppercase(),
            snippet(&item.text, SUMMARY_SNIPPET_CHARS)
        ));
        if let Some(source) = text_field(item, SOURCE).filter(|s| !s.is_empty()) {
            text.push_str(&format!("   Source: {source}\n"));
        }
        text.push('\n');
    }
    text
}

impl MemoryService {
    /// The requested modules, or every registered analyzable module when none are named.
    pub(crate) fn analyzable_modules(
        &self,
        requested: &[String],
    ) -> MemoryResult<Vec<&'static str>> {
        if requested.is_empty() {
            return Ok(ANALYZABLE_MODULES
                .into_iter()
                .filter(|module| self.registry().contains(module))
                .collect());
        }
        requested
            .iter()
            .map(|name| {
                ANALYZABLE_MODULES
                    .into_iter()
                    .find(|module| *module == name.as_str())
                    .ok_or_else(|| MemoryError::validation(format!("Module '{name}' is not valid")))
            })
            .collect()
    }

    /// Finds items similar to one source item and records each as a connection.
    #[instrument(skip(self, request), fields(item_id = %request.item_id, module = %request.module))]
    pub async fn analyze_connections(
        &self,
        request: ConnectionAnalysisRequest,
    ) -> MemoryResult<ConnectionAnalysis> {
        request
            .validate()
            .map_err(|e| MemoryError::Validation(e.to_string()))?;
        if !ANALYZABLE_MODULES.contains(&request.module.as_str())
            || !self.registry().contains(&request.module)
        {
            return Err(MemoryError::validation(format!(
                "Module '{}' cannot be analyzed",
                request.module
            )));
        }

        let source = self.get(&request.module, &request.item_id).await?;
        let vector = self.embed(&source.text).await?;
        let no_filter = MetadataFilter::new();

        let mut connections = Vec::new();
        for module in ANALYZABLE_MODULES {
            let Ok(physical) = self.registry().resolve(module) else {
                continue;
            };
            let hits = self
                .store_backend()
                .query(physical, vector.clone(), request.max_connections, &no_filter)
                .await?;

            for hit in hits {
                if module == request.module && hit.item.id == request.item_id {
                    continue;
                }
                let strength = 1.0 - hit.distance;
                if strength < request.min_similarity {
                    continue;
                }

                let metadata: Metadata = [
                    ("source_id", MetadataValue::from(request.item_id.as_str())),
                    ("source_module", request.module.as_str().into()),
                    ("target_id", hit.item.id.as_str().into()),
                    ("target_module", module.into()),
                    ("connection_type", "semantic".into()),
                    ("strength", MetadataValue::Float(f64::from(strength))),
                ]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();

                let text = format!(
                    "Connection between '{}...' and '{}...'",
                    snippet(&source.text, SNIPPET_CHARS),
                    snippet(&hit.item.text, SNIPPET_CHARS)
                );
                let connection = self
                    .store(
                        CONNECTIONS,
                        NewItem::new(text).with_metadata(metadata),
                        Origin::Module,
                    )
                    .await?;
                connections.push(connection);
            }
        }

        debug!(total = connections.len(), "connections recorded");
        Ok(ConnectionAnalysis {
            source_id: request.item_id,
            source_module: request.module,
            total: connections.len(),
            connections,
        })
    }

    /// Most important learnings first, oldest first within the same importance.
    #[instrument(skip(self, request))]
    pub async fn summarize_learnings(
        &self,
        request: LearningSummaryRequest,
    ) -> MemoryResult<LearningSummary> {
        request
            .validate()
            .map_err(|e| MemoryError::Validation(e.to_string()))?;

        let mut filter = MetadataFilter::new();
        if let Some(category) = request.category {
            filter = filter.equals("category", category);
        }
        if let Some(importance) = request.importance {
            filter = filter.equals("importance", importance);
        }

        let mut items = self.list(LEARNINGS, &filter, usize::MAX, 0).await?.items;
        if let Some(tags) = request.tags.filter(|t| !t.is_empty()) {
            items.retain(|item| has_any_tag(item, &tags));
        }

        items.sort_by(|a, b| {
            importance_rank(a)
                .cmp(&importance_rank(b))
                .then_with(|| a.created_at().cmp(&b.created_at()))
        });
        items.truncate(request.max_items);

        let mut categories = BTreeMap::new();
        for item in &items {
            let category = text_field(item, "category").unwrap_or("general");
            *categories.entry(category.to_string()).or_insert(0) += 1;
        }

        Ok(LearningSummary {
            total: items.len(),
            summary_text: render_summary(&items),
            categories,
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::service;

    fn learning(importance: &str, category: &str, tags: Vec<&str>) -> Metadata {
        [
            ("importance", MetadataValue::from(importance)),
            ("category", category.into()),
            ("tags", tags.into()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[tokio::test]
    async fn test_connections_link_similar_items() {
        let service = service().await;
        let source = service
            .store(IDENTITY, NewItem::new("I love baking sourdough bread"), Origin::Module)
            .await
            .unwrap();
        service
            .store(BUSINESS, NewItem::new("I love baking sourdough bread"), Origin::Module)
            .await
            .unwrap();
        service
            .store(REMINDERS, NewItem::new("dentist appointment friday"), Origin::Module)
            .await
            .unwrap();

        let analysis = service
            .analyze_connections(ConnectionAnalysisRequest {
                item_id: source.id.clone(),
                module: IDENTITY.into(),
                min_similarity: 0.9,
                max_connections: 5,
            })
            .await
            .unwrap();

        assert_eq!(analysis.total, 1);
        let connection = &analysis.connections[0];
        assert_eq!(connection.metadata["source_id"], MetadataValue::from(source.id.as_str()));
        assert_eq!(connection.metadata["target_module"], MetadataValue::from(BUSINESS));
        assert!(connection.text.starts_with("Connection between 'I love baking"));

        let stored = service
            .list(CONNECTIONS, &MetadataFilter::new(), 10, 0)
            .await
            .unwrap();
        assert_eq!(stored.total, 1);
    }

    #[tokio::test]
    async fn test_connections_reject_unanalyzable_module() {
        let service = service().await;
        let err = service
            .analyze_connections(ConnectionAnalysisRequest {
                item_id: "x".into(),
                module: CONNECTIONS.into(),
                min_similarity: 0.5,
                max_connections: 5,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_connections_missing_source() {
        let service = service().await;
        let err = service
            .analyze_connections(ConnectionAnalysisRequest {
                item_id: "ghost".into(),
                module: IDENTITY.into(),
                min_similarity: 0.5,
                max_connections: 5,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::ItemNotFound { .. }));
    }

    #[tokio::test]
    async fn test_connections_validate_bounds() {
        let service = service().await;
        let err = service
            .analyze_connections(ConnectionAnalysisRequest {
                item_id: "x".into(),
                module: IDENTITY.into(),
                min_similarity: 1.5,
                max_connections: 50,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_learning_summary_orders_and_counts() {
        let service = service().await;
        for (text, importance, category, tags) in [
            ("low priority lesson", "low", "tech", vec!["rust"]),
            ("critical lesson about backups", "high", "ops", vec!["infra"]),
            ("medium lesson", "medium", "tech", vec!["rust", "async"]),
        ] {
            service
                .store(
                    LEARNINGS,
                    NewItem::new(text).with_metadata(learning(importance, category, tags)),
                    Origin::Module,
                )
                .await
                .unwrap();
        }

        let summary = service
            .summarize_learnings(LearningSummaryRequest {
                max_items: 10,
                ..Default::default()
            })
            .await
            .unwrap();

        let texts: Vec<_> = summary.items.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(
            texts,
            ["critical lesson about backups", "medium lesson", "low priority lesson"]
        );
        assert_eq!(summary.total, 3);
        assert_eq!(summary.categories["tech"], 2);
        assert!(summary
            .summary_text
            .starts_with("Learning summary:\n\n1. [OPS - HIGH] critical lesson about backups...\n"));
    }

    #[tokio::test]
    async fn test_learning_summary_filters_by_tag_and_truncates() {
        let service = service().await;
        for i in 0..3 {
            service
                .store(
                    LEARNINGS,
                    NewItem::new(format!("rust lesson {i}"))
                        .with_metadata(learning("medium", "tech", vec!["rust"])),
                    Origin::Module,
                )
                .await
                .unwrap();
        }
        service
            .store(
                LEARNINGS,
                NewItem::new("cooking lesson").with_metadata(learning("high", "life", vec!["food"])),
                Origin::Module,
            )
            .await
            .unwrap();

        let summary = service
            .summarize_learnings(LearningSummaryRequest {
                tags: Some(vec!["rust".into(), "go".into()]),
                max_items: 2,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(summary.items[0].text, "rust lesson 0");
        assert!(!summary.categories.contains_key("life"));
    }

    #[test]
    fn test_render_summary_includes_source() {
        let mut metadata = learning("high", "ops", vec![]);
        metadata.insert(SOURCE.into(), "postmortem".into());
        let text = render_summary(&[Item {
            id: "1".into(),
            text: "x".repeat(120),
            metadata,
        }]);
        assert!(text.contains(&format!("{}...\n   Source: postmortem\n\n", "x".repeat(100))));
    }
}
