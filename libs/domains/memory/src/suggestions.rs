//! Suggestions generated from stored module data and kept in the
//! `suggestions` collection.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, instrument};
use utoipa::ToSchema;
use validator::Validate;

use crate::collections::SUGGESTIONS;
use crate::error::{MemoryError, MemoryResult};
use crate::filter::MetadataFilter;
use crate::models::{Item, ItemPatch, Metadata, MetadataValue, NewItem};
use crate::priorities::{LAST_ACCESSED, fields, preview_text};
use crate::service::{MemoryService, Origin, now};
use crate::store::cosine_distance;

/// Items at least this similar belong to the same theme or are connected.
pub const SIMILARITY_THRESHOLD: f32 = 0.7;
/// Suggestions of one type produced by a single run.
const PER_TYPE_LIMIT: usize = 2;
/// Leading items per module compared for cross-module connections.
const REPRESENTATIVE_ITEMS: usize = 5;
const THEMES_IN_SUMMARY: usize = 3;
const INSIGHT_RELEVANCE: f64 = 0.8;
const ACTION_RELEVANCE: f64 = 0.7;
const ANALYSIS_MAX_SUGGESTIONS: usize = 10;
const ANALYSIS_MIN_RELEVANCE: f64 = 0.5;

const TYPE: &str = "type";
const CONTEXT: &str = "context";
const RELEVANCE_SCORE: &str = "relevance_score";
const SOURCE_MODULES: &str = "source_modules";
const SOURCE_ITEMS: &str = "source_items";
const IS_IMPLEMENTED: &str = "is_implemented";
const IMPLEMENTATION_DATE: &str = "implementation_date";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SuggestionType {
    Action,
    Insight,
    Connection,
}

impl SuggestionType {
    pub const ALL: [SuggestionType; 3] = [
        SuggestionType::Action,
        SuggestionType::Insight,
        SuggestionType::Connection,
    ];
}

fn default_max_suggestions() -> usize {
    5
}

fn default_min_relevance() -> f64 {
    0.6
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SuggestionRequest {
    /// Modules to analyze; every analyzable module when absent
    pub modules: Option<Vec<String>>,
    #[serde(default = "default_max_suggestions")]
    #[validate(range(min = 1, max = 20))]
    pub max_suggestions: usize,
    /// Every type when absent
    pub suggestion_types: Option<Vec<SuggestionType>>,
    #[serde(default = "default_min_relevance")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_relevance: f64,
}

impl Default for SuggestionRequest {
    fn default() -> Self {
        Self {
            modules: None,
            max_suggestions: default_max_suggestions(),
            suggestion_types: None,
            min_relevance: default_min_relevance(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TimeRange {
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SuggestionAnalysisRequest {
    pub modules: Option<Vec<String>>,
    /// Noted in the summary when both dates are present
    pub time_range: Option<TimeRange>,
    pub focus_areas: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SuggestionResult {
    /// The suggestions that were persisted.
    pub suggestions: Vec<Item>,
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub analysis_summary: String,
}

struct Candidate {
    kind: SuggestionType,
    text: String,
    context: &'static str,
    relevance: f64,
    source_modules: Vec<String>,
    source_items: Vec<String>,
}

impl Candidate {
    fn into_new_item(self) -> NewItem {
        let metadata = fields([
            (TYPE, self.kind.to_string().into()),
            (CONTEXT, self.context.into()),
            (RELEVANCE_SCORE, MetadataValue::Float(self.relevance)),
            (SOURCE_MODULES, self.source_modules.into()),
            (SOURCE_ITEMS, self.source_items.into()),
        ]);
        NewItem::new(self.text).with_metadata(metadata)
    }
}

/// An item with the module it came from and its embedding.
struct Embedded<'a> {
    module: &'static str,
    item: &'a Item,
    vector: Vec<f32>,
}

fn similarity(a: &Embedded<'_>, b: &Embedded<'_>) -> f32 {
    1.0 - cosine_distance(&a.vector, &b.vector)
}

/// Greedy single pass: each item joins the first theme whose leading item is
/// similar enough. Only themes with more than one item are returned.
fn group_themes<'e, 'a>(entries: &'e [Embedded<'a>]) -> Vec<Vec<&'e Embedded<'a>>> {
    let mut themes: Vec<Vec<&Embedded<'a>>> = Vec::new();
    for entry in entries {
        match themes
            .iter_mut()
            .find(|theme| similarity(theme[0], entry) >= SIMILARITY_THRESHOLD)
        {
            Some(theme) => theme.push(entry),
            None => themes.push(vec![entry]),
        }
    }
    themes.retain(|theme| theme.len() > 1);
    themes
}

fn distinct_modules(entries: &[&Embedded<'_>]) -> Vec<String> {
    let mut modules: Vec<String> = Vec::new();
    for entry in entries {
        if !modules.iter().any(|m| m == entry.module) {
            modules.push(entry.module.to_string());
        }
    }
    modules
}

fn leading<'e, 'a>(
    entries: &'e [Embedded<'a>],
    module: &'static str,
) -> impl Iterator<Item = &'e Embedded<'a>> {
    entries
        .iter()
        .filter(move |e| e.module == module)
        .take(REPRESENTATIVE_ITEMS)
}

fn accessed_before(record: &Item, day: &str) -> bool {
    record
        .metadata
        .get(LAST_ACCESSED)
        .and_then(MetadataValue::as_text)
        .and_then(|stamp| stamp.split('T').next())
        .is_some_and(|date| date != day)
}

impl MemoryService {
    /// Builds insight, action and connection suggestions from module data and
    /// persists the ones that clear `min_relevance`.
    #[instrument(skip(self, request))]
    pub async fn generate_suggestions(
        &self,
        request: SuggestionRequest,
    ) -> MemoryResult<SuggestionResult> {
        request
            .validate()
            .map_err(|e| MemoryError::Validation(e.to_string()))?;
        let modules = self.analyzable_modules(request.modules.as_deref().unwrap_or_default())?;
        let kinds = match request.suggestion_types {
            Some(kinds) if !kinds.is_empty() => kinds,
            _ => SuggestionType::ALL.to_vec(),
        };
        let budget = |taken: usize| PER_TYPE_LIMIT.min(request.max_suggestions.saturating_sub(taken));

        let mut data = Vec::with_capacity(modules.len());
        for module in &modules {
            let items = self
                .list(module, &MetadataFilter::new(), usize::MAX, 0)
                .await?
                .items;
            data.push((*module, items));
        }

        let mut entries = Vec::new();
        for (module, items) in &data {
            for item in items {
                entries.push(Embedded {
                    module: *module,
                    item,
                    vector: self.embed(&item.text).await?,
                });
            }
        }

        let mut summary = String::from("Data analysis:\n\n");
        let mut candidates = Vec::new();

        if !entries.is_empty() {
            let themes = group_themes(&entries);
            summary.push_str("Main themes identified:\n");
            for (i, theme) in themes.iter().take(THEMES_IN_SUMMARY).enumerate() {
                summary.push_str(&format!("{}. {}\n", i + 1, preview_text(&theme[0].item.text)));
            }
            summary.push('\n');

            if kinds.contains(&SuggestionType::Insight) {
                for theme in themes.iter().take(budget(candidates.len())) {
                    candidates.push(Candidate {
                        kind: SuggestionType::Insight,
                        text: format!(
                            "Recurring theme identified: '{}'. Consider exploring it further.",
                            preview_text(&theme[0].item.text)
                        ),
                        context: "theme analysis",
                        relevance: INSIGHT_RELEVANCE,
                        source_modules: distinct_modules(theme),
                        source_items: theme.iter().map(|e| e.item.id.clone()).collect(),
                    });
                }
            }
        }

        if kinds.contains(&SuggestionType::Action) {
            let records = self.priority_records().await?;
            let today = Utc::now().format("%Y-%m-%d").to_string();
            let inactive: Vec<_> = entries
                .iter()
                .filter(|entry| {
                    records
                        .get(&(entry.item.id.clone(), entry.module.to_string()))
                        .is_some_and(|record| accessed_before(record, &today))
                })
                .take(budget(candidates.len()))
                .collect();

            for entry in inactive {
                candidates.push(Candidate {
                    kind: SuggestionType::Action,
                    text: format!(
                        "Review and update the item: '{}'",
                        preview_text(&entry.item.text)
                    ),
                    context: "inactive items",
                    relevance: ACTION_RELEVANCE,
                    source_modules: vec![entry.module.to_string()],
                    source_items: vec![entry.item.id.clone()],
                });
            }
        }

        if kinds.contains(&SuggestionType::Connection) && modules.len() > 1 {
            let mut connections = Vec::new();
            for first in &modules {
                for second in &modules {
                    if first >= second {
                        continue;
                    }
                    for a in leading(&entries, *first) {
                        for b in leading(&entries, *second) {
                            let score = similarity(a, b);
                            if score >= SIMILARITY_THRESHOLD {
                                connections.push((a, b, score));
                            }
                        }
                    }
                }
            }
            connections.sort_by(|x, y| y.2.total_cmp(&x.2));

            let take = budget(candidates.len());
            for (a, b, score) in connections.into_iter().take(take) {
                candidates.push(Candidate {
                    kind: SuggestionType::Connection,
                    text: format!(
                        "Possible connection between '{}' and '{}'",
                        preview_text(&a.item.text),
                        preview_text(&b.item.text)
                    ),
                    context: "cross-module connections",
                    relevance: f64::from(score),
                    source_modules: vec![a.module.to_string(), b.module.to_string()],
                    source_items: vec![a.item.id.clone(), b.item.id.clone()],
                });
            }
        }

        candidates.retain(|c| c.relevance >= request.min_relevance);
        candidates.truncate(request.max_suggestions);

        let mut by_type = BTreeMap::new();
        let mut suggestions = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            *by_type.entry(candidate.kind.to_string()).or_insert(0) += 1;
            suggestions.push(
                self.store(SUGGESTIONS, candidate.into_new_item(), Origin::Module)
                    .await?,
            );
        }

        summary.push_str(&format!(
            "Total suggestions generated: {}\n",
            suggestions.len()
        ));
        for (kind, count) in &by_type {
            summary.push_str(&format!("- {kind}: {count}\n"));
        }

        debug!(total = suggestions.len(), "suggestions generated");
        Ok(SuggestionResult {
            total: suggestions.len(),
            suggestions,
            by_type,
            analysis_summary: summary,
        })
    }

    /// Generates with analysis defaults and notes the period and focus areas.
    #[instrument(skip(self, request))]
    pub async fn analyze_suggestions(
        &self,
        request: SuggestionAnalysisRequest,
    ) -> MemoryResult<SuggestionResult> {
        let mut result = self
            .generate_suggestions(SuggestionRequest {
                modules: request.modules,
                max_suggestions: ANALYSIS_MAX_SUGGESTIONS,
                suggestion_types: None,
                min_relevance: ANALYSIS_MIN_RELEVANCE,
            })
            .await?;

        let summary = &mut result.analysis_summary;
        if let Some(range) = request
            .time_range
            .filter(|r| !r.start_date.is_empty() && !r.end_date.is_empty())
        {
            summary.push_str(&format!(
                "\nAnalysis period: {} to {}\n",
                range.start_date, range.end_date
            ));
        }
        if let Some(areas) = request.focus_areas.filter(|a| !a.is_empty()) {
            summary.push_str("\nFocus areas:\n");
            for (i, area) in areas.iter().enumerate() {
                summary.push_str(&format!("{}. {area}\n", i + 1));
            }
        }
        Ok(result)
    }

    /// Marks a suggestion implemented, stamping the implementation date.
    #[instrument(skip(self))]
    pub async fn implement_suggestion(&self, id: &str) -> MemoryResult<Item> {
        let changes: Metadata = fields([
            (IS_IMPLEMENTED, MetadataValue::Bool(true)),
            (IMPLEMENTATION_DATE, now().into()),
        ]);
        let patch = ItemPatch {
            text: None,
            metadata: Some(changes),
        };
        self.update(SUGGESTIONS, id, patch, Origin::Module).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::{BUSINESS, CONNECTIONS, IDENTITY, LEARNINGS, PRIORITIES};
    use crate::priorities::{ITEM_ID, PriorityAdjustRequest, PriorityLevel};
    use crate::service::tests::service;

    async fn store(service: &MemoryService, module: &str, text: &str) -> Item {
        service
            .store(module, NewItem::new(text), Origin::Module)
            .await
            .unwrap()
    }

    fn request(modules: &[&str], kinds: &[SuggestionType]) -> SuggestionRequest {
        SuggestionRequest {
            modules: Some(modules.iter().map(|m| m.to_string()).collect()),
            suggestion_types: Some(kinds.to_vec()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_recurring_theme_becomes_insight() {
        let service = service().await;
        let first = store(&service, IDENTITY, "morning yoga routine").await;
        let second = store(&service, LEARNINGS, "morning yoga routine").await;
        store(&service, LEARNINGS, "quarterly tax filing deadline").await;

        let result = service
            .generate_suggestions(request(&[IDENTITY, LEARNINGS], &[SuggestionType::Insight]))
            .await
            .unwrap();

        assert_eq!(result.total, 1);
        assert_eq!(result.by_type, BTreeMap::from([("insight".to_string(), 1)]));
        let insight = &result.suggestions[0];
        assert_eq!(
            insight.text,
            "Recurring theme identified: 'morning yoga routine'. Consider exploring it further."
        );
        assert_eq!(
            insight.metadata[SOURCE_ITEMS],
            MetadataValue::from(vec![first.id.as_str(), second.id.as_str()])
        );
        assert_eq!(insight.metadata[IS_IMPLEMENTED], MetadataValue::Bool(false));
        assert!(result
            .analysis_summary
            .starts_with("Data analysis:\n\nMain themes identified:\n1. morning yoga routine\n"));
        assert!(result.analysis_summary.ends_with("Total suggestions generated: 1\n- insight: 1\n"));

        let stored = service
            .list(SUGGESTIONS, &MetadataFilter::new(), 10, 0)
            .await
            .unwrap();
        assert_eq!(stored.total, 1);
    }

    #[tokio::test]
    async fn test_cross_module_connection() {
        let service = service().await;
        let idea = store(&service, BUSINESS, "handmade ceramic mugs").await;
        let habit = store(&service, IDENTITY, "handmade ceramic mugs").await;

        let result = service
            .generate_suggestions(request(&[IDENTITY, BUSINESS], &[SuggestionType::Connection]))
            .await
            .unwrap();

        assert_eq!(result.total, 1);
        let connection = &result.suggestions[0];
        assert_eq!(connection.metadata[TYPE], MetadataValue::from("connection"));
        assert_eq!(
            connection.metadata[SOURCE_MODULES],
            MetadataValue::from(vec![BUSINESS, IDENTITY])
        );
        assert_eq!(
            connection.metadata[SOURCE_ITEMS],
            MetadataValue::from(vec![idea.id.as_str(), habit.id.as_str()])
        );
        let relevance = connection.metadata[RELEVANCE_SCORE].as_f64().unwrap();
        assert!(relevance > 0.99);
    }

    #[tokio::test]
    async fn test_single_module_has_no_connections() {
        let service = service().await;
        store(&service, BUSINESS, "same words").await;
        store(&service, BUSINESS, "same words").await;

        let result = service
            .generate_suggestions(request(&[BUSINESS], &[SuggestionType::Connection]))
            .await
            .unwrap();
        assert_eq!(result.total, 0);
        assert!(result.by_type.is_empty());
    }

    #[tokio::test]
    async fn test_stale_priority_record_becomes_action() {
        let service = service().await;
        let item = store(&service, IDENTITY, "learn to sail").await;
        store(&service, IDENTITY, "fresh note").await;
        let record = service
            .adjust_priority(PriorityAdjustRequest {
                item_id: item.id.clone(),
                module: IDENTITY.into(),
                priority_level: PriorityLevel::Medium,
                relevance_score: None,
            })
            .await
            .unwrap();
        assert_eq!(record.metadata[ITEM_ID], MetadataValue::from(item.id.as_str()));

        let fresh = service
            .generate_suggestions(request(&[IDENTITY], &[SuggestionType::Action]))
            .await
            .unwrap();
        assert_eq!(fresh.total, 0);

        service
            .update(
                PRIORITIES,
                &record.id,
                ItemPatch {
                    text: None,
                    metadata: Some(fields([(LAST_ACCESSED, "2020-01-01T08:00:00Z".into())])),
                },
                Origin::Module,
            )
            .await
            .unwrap();

        let stale = service
            .generate_suggestions(request(&[IDENTITY], &[SuggestionType::Action]))
            .await
            .unwrap();
        assert_eq!(stale.total, 1);
        let action = &stale.suggestions[0];
        assert_eq!(action.text, "Review and update the item: 'learn to sail'");
        assert_eq!(
            action.metadata[SOURCE_ITEMS],
            MetadataValue::from(vec![item.id.as_str()])
        );
    }

    #[tokio::test]
    async fn test_min_relevance_drops_before_persisting() {
        let service = service().await;
        store(&service, IDENTITY, "recurring thought").await;
        store(&service, LEARNINGS, "recurring thought").await;

        let result = service
            .generate_suggestions(SuggestionRequest {
                min_relevance: 0.9,
                ..request(&[IDENTITY, LEARNINGS], &[SuggestionType::Insight])
            })
            .await
            .unwrap();

        assert_eq!(result.total, 0);
        let stored = service
            .list(SUGGESTIONS, &MetadataFilter::new(), 10, 0)
            .await
            .unwrap();
        assert_eq!(stored.total, 0);
    }

    #[tokio::test]
    async fn test_generate_validates_input() {
        let service = service().await;
        let module = service
            .generate_suggestions(request(&[CONNECTIONS], &[]))
            .await
            .unwrap_err();
        assert!(matches!(module, MemoryError::Validation(_)));

        let bound = service
            .generate_suggestions(SuggestionRequest {
                max_suggestions: 0,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(bound, MemoryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_analysis_notes_period_and_focus() {
        let service = service().await;
        let result = service
            .analyze_suggestions(SuggestionAnalysisRequest {
                modules: None,
                time_range: Some(TimeRange {
                    start_date: "2024-01-01".into(),
                    end_date: "2024-03-31".into(),
                }),
                focus_areas: Some(vec!["health".into(), "savings".into()]),
            })
            .await
            .unwrap();

        assert_eq!(result.total, 0);
        assert!(result.analysis_summary.ends_with(
            "\nAnalysis period: 2024-01-01 to 2024-03-31\n\nFocus areas:\n1. health\n2. savings\n"
        ));
    }

    #[tokio::test]
    async fn test_implement_marks_suggestion() {
        let service = service().await;
        let suggestion = service
            .store(SUGGESTIONS, NewItem::new("call an old friend"), Origin::Module)
            .await
            .unwrap();

        let done = service.implement_suggestion(&suggestion.id).await.unwrap();
        assert_eq!(done.metadata[IS_IMPLEMENTED], MetadataValue::Bool(true));
        assert!(done.metadata[IMPLEMENTATION_DATE].as_text().is_some());
        assert_eq!(done.metadata[TYPE], MetadataValue::from("action"));

        let err = service.implement_suggestion("ghost").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Item 'ghost' not found in collection 'suggestions'"
        );
    }

    #[test]
    fn test_accessed_before_compares_days() {
        let record = Item {
            id: "r".into(),
            text: String::new(),
            metadata: fields([(LAST_ACCESSED, "2024-05-01T23:59:00Z".into())]),
        };
        assert!(accessed_before(&record, "2024-05-02"));
        assert!(!accessed_before(&record, "2024-05-01"));
    }
}
