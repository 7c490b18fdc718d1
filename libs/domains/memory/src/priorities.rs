//! Duplicate and low-relevance review of module items, and the priority
//! records kept for them in the `priorities` collection.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, instrument};
use utoipa::ToSchema;
use validator::Validate;

use crate::analysis::{snippet, text_field};
use crate::collections::PRIORITIES;
use crate::error::{MemoryError, MemoryResult};
use crate::filter::MetadataFilter;
use crate::models::{Item, ItemPatch, Metadata, MetadataValue, NewItem};
use crate::service::{MemoryService, Origin, now};
use crate::store::cosine_distance;

/// Above this similarity a duplicate pair is merged rather than reviewed.
pub const MERGE_SIMILARITY: f32 = 0.95;
/// Items scoring below this are reported as low relevance.
pub const LOW_RELEVANCE: f64 = 0.3;
/// Unused items scoring below this are archived.
pub const ARCHIVE_RELEVANCE: f64 = 0.2;

/// Text length that earns full relevance when an item has no priority record.
const FULL_RELEVANCE_CHARS: f64 = 1000.0;
const UNUSED_PENALTY: f64 = 0.8;
const DEFAULT_RELEVANCE: f64 = 0.5;
const OPTIMIZE_MIN_SIMILARITY: f32 = 0.9;
const OPTIMIZE_MAX_ITEMS: usize = 1000;
const PREVIEW_CHARS: usize = 100;
const RECORD_SNIPPET_CHARS: usize = 50;

pub(crate) const ITEM_ID: &str = "item_id";
pub(crate) const MODULE: &str = "module";
pub(crate) const LAST_ACCESSED: &str = "last_accessed";
const PRIORITY_LEVEL: &str = "priority_level";
const RELEVANCE_SCORE: &str = "relevance_score";
const USAGE_COUNT: &str = "usage_count";
const IS_DUPLICATE: &str = "is_duplicate";
const DUPLICATE_OF: &str = "duplicate_of";

/// Priority records keyed by `(item_id, module)`.
pub(crate) type PriorityRecords = HashMap<(String, String), Item>;

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
pub enum PriorityLevel {
    High,
    Medium,
    Low,
    /// Set by optimization only
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Merge,
    Review,
    Archive,
}

fn default_min_similarity() -> f32 {
    0.85
}

fn default_max_items() -> usize {
    100
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct PriorityReviewRequest {
    /// One module; every analyzable module when absent
    pub module: Option<String>,
    #[serde(default = "default_min_similarity")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_similarity: f32,
    /// Items compared per module, oldest first
    #[serde(default = "default_max_items")]
    #[validate(range(min = 1))]
    pub max_items: usize,
    #[serde(default = "default_true")]
    pub include_low_relevance: bool,
    #[serde(default = "default_true")]
    pub include_duplicates: bool,
}

impl Default for PriorityReviewRequest {
    fn default() -> Self {
        Self {
            module: None,
            min_similarity: default_min_similarity(),
            max_items: default_max_items(),
            include_low_relevance: true,
            include_duplicates: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct PriorityAdjustRequest {
    #[validate(length(min = 1, message = "item_id must not be empty"))]
    pub item_id: String,
    pub module: String,
    pub priority_level: PriorityLevel,
    #[validate(range(min = 0.0, max = 1.0))]
    pub relevance_score: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PriorityOptimizeRequest {
    pub module: Option<String>,
    #[serde(default)]
    pub auto_merge_duplicates: bool,
    #[serde(default)]
    pub auto_archive_low_relevance: bool,
}

/// Id, shortened text and module of a reviewed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ItemPreview {
    pub id: String,
    pub text: String,
    pub module: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DuplicatePair {
    pub item1: ItemPreview,
    pub item2: ItemPreview,
    pub similarity: f32,
    pub suggested_action: ReviewAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LowRelevanceItem {
    pub id: String,
    pub text: String,
    pub module: String,
    pub relevance_score: f64,
    pub usage_count: i64,
    pub suggested_action: ReviewAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SuggestedAction {
    MergeDuplicates {
        items: Vec<String>,
        module: String,
        reason: String,
    },
    ArchiveItem {
        item_id: String,
        module: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PriorityReview {
    /// Every item in the reviewed modules, before `max_items` applies
    pub total_items_reviewed: usize,
    pub potential_duplicates: Vec<DuplicatePair>,
    pub low_relevance_items: Vec<LowRelevanceItem>,
    pub suggested_actions: Vec<SuggestedAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MergedDuplicate {
    pub primary_item: ItemPreview,
    pub duplicate_item: ItemPreview,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ArchivedItem {
    pub id: String,
    pub text: String,
    pub module: String,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReprioritizedItem {
    pub id: String,
    pub text: String,
    pub module: String,
    pub old_priority: PriorityLevel,
    pub new_priority: PriorityLevel,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PriorityOptimization {
    pub total_items_optimized: usize,
    pub merged_duplicates: Vec<MergedDuplicate>,
    pub archived_items: Vec<ArchivedItem>,
    pub reprioritized_items: Vec<ReprioritizedItem>,
}

pub(crate) fn preview_text(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        format!("{}...", snippet(text, PREVIEW_CHARS))
    } else {
        text.to_string()
    }
}

pub(crate) fn preview(item: &Item, module: &str) -> ItemPreview {
    ItemPreview {
        id: item.id.clone(),
        text: preview_text(&item.text),
        module: module.to_string(),
    }
}

fn number_field(item: &Item, key: &str) -> Option<f64> {
    item.metadata.get(key).and_then(MetadataValue::as_f64)
}

fn level_of(record: &Item) -> PriorityLevel {
    text_field(record, PRIORITY_LEVEL)
        .and_then(|level| level.parse().ok())
        .unwrap_or(PriorityLevel::Medium)
}

pub(crate) fn fields<const N: usize>(pairs: [(&str, MetadataValue); N]) -> Metadata {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Low-relevance entry for `item`, if it scores below [`LOW_RELEVANCE`].
///
/// Without a priority record the score grows with text length. A record's
/// score is used as is, discounted when the item was never used.
fn assess_relevance(item: &Item, module: &str, record: Option<&Item>) -> Option<LowRelevanceItem> {
    let mut relevance = (item.text.chars().count() as f64 / FULL_RELEVANCE_CHARS).min(1.0);
    let mut usage_count = 0;
    if let Some(record) = record {
        relevance = number_field(record, RELEVANCE_SCORE).unwrap_or(relevance);
        usage_count = number_field(record, USAGE_COUNT).map_or(0, |n| n as i64);
        if usage_count == 0 {
            relevance *= UNUSED_PENALTY;
        }
    }

    if relevance >= LOW_RELEVANCE {
        return None;
    }
    let archive = relevance < ARCHIVE_RELEVANCE && usage_count == 0;
    Some(LowRelevanceItem {
        id: item.id.clone(),
        text: preview_text(&item.text),
        module: module.to_string(),
        relevance_score: relevance,
        usage_count,
        suggested_action: if archive {
            ReviewAction::Archive
        } else {
            ReviewAction::Review
        },
    })
}

/// New level from usage and relevance, or `None` when it stays put.
fn reprioritize(current: PriorityLevel, usage_count: f64, relevance: f64) -> Option<PriorityLevel> {
    if current == PriorityLevel::Archived {
        return None;
    }
    let next = if usage_count > 10.0 && relevance > 0.7 {
        PriorityLevel::High
    } else if usage_count < 2.0 && relevance < 0.3 {
        PriorityLevel::Low
    } else {
        current
    };
    (next != current).then_some(next)
}

impl MemoryService {
    /// Every priority record, the oldest one winning when a key repeats.
    pub(crate) async fn priority_records(&self) -> MemoryResult<PriorityRecords> {
        let records = self
            .list(PRIORITIES, &MetadataFilter::new(), usize::MAX, 0)
            .await?
            .items;

        let mut by_key = PriorityRecords::new();
        for record in records {
            let (Some(item_id), Some(module)) =
                (text_field(&record, ITEM_ID), text_field(&record, MODULE))
            else {
                continue;
            };
            by_key
                .entry((item_id.to_string(), module.to_string()))
                .or_insert(record);
        }
        Ok(by_key)
    }

    async fn find(&self, module: &str, id: &str) -> MemoryResult<Option<Item>> {
        match self.get(module, id).await {
            Ok(item) => Ok(Some(item)),
            Err(MemoryError::ItemNotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Merges `changes` into the record for `item`, creating it when missing.
    async fn upsert_priority(
        &self,
        module: &str,
        item: &Item,
        changes: Metadata,
        initial_relevance: f64,
    ) -> MemoryResult<Item> {
        let text = format!(
            "Priority for item '{}...' in module '{module}'",
            snippet(&item.text, RECORD_SNIPPET_CHARS)
        );
        let filter = MetadataFilter::new()
            .equals(ITEM_ID, item.id.as_str())
            .equals(MODULE, module);

        match self.list(PRIORITIES, &filter, 1, 0).await?.items.pop() {
            Some(record) => {
                let patch = ItemPatch {
                    text: Some(text),
                    metadata: Some(changes),
                };
                self.update(PRIORITIES, &record.id, patch, Origin::Module)
                    .await
            }
            None => {
                let mut metadata = fields([
                    (ITEM_ID, item.id.as_str().into()),
                    (MODULE, module.into()),
                    (RELEVANCE_SCORE, MetadataValue::Float(initial_relevance)),
                    (USAGE_COUNT, MetadataValue::Integer(0)),
                    (LAST_ACCESSED, now().into()),
                ]);
                metadata.extend(changes);
                self.store(
                    PRIORITIES,
                    NewItem::new(text).with_metadata(metadata),
                    Origin::Module,
                )
                .await
            }
        }
    }

    async fn find_duplicates(
        &self,
        module: &str,
        items: &[Item],
        min_similarity: f32,
        review: &mut PriorityReview,
    ) -> MemoryResult<()> {
        let mut vectors = Vec::with_capacity(items.len());
        for item in items {
            vectors.push(self.embed(&item.text).await?);
        }

        for (i, first) in items.iter().enumerate() {
            for (j, second) in items.iter().enumerate().skip(i + 1) {
                let similarity = 1.0 - cosine_distance(&vectors[i], &vectors[j]);
                if similarity < min_similarity {
                    continue;
                }

                let merge = similarity > MERGE_SIMILARITY;
                review.potential_duplicates.push(DuplicatePair {
                    item1: preview(first, module),
                    item2: preview(second, module),
                    similarity,
                    suggested_action: if merge {
                        ReviewAction::Merge
                    } else {
                        ReviewAction::Review
                    },
                });
                if merge {
                    review.suggested_actions.push(SuggestedAction::MergeDuplicates {
                        items: vec![first.id.clone(), second.id.clone()],
                        module: module.to_string(),
                        reason: format!("Duplicates with similarity {similarity:.2}"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Reports near-duplicate pairs and low-relevance items per module.
    #[instrument(skip(self, request), fields(module = ?request.module))]
    pub async fn review_priorities(
        &self,
        request: PriorityReviewRequest,
    ) -> MemoryResult<PriorityReview> {
        request
            .validate()
            .map_err(|e| MemoryError::Validation(e.to_string()))?;
        let modules = self.analyzable_modules(request.module.as_slice())?;
        let records = if request.include_low_relevance {
            self.priority_records().await?
        } else {
            PriorityRecords::new()
        };

        let mut review = PriorityReview::default();
        for module in modules {
            let mut items = self
                .list(module, &MetadataFilter::new(), usize::MAX, 0)
                .await?
                .items;
            review.total_items_reviewed += items.len();
            items.truncate(request.max_items);

            if request.include_duplicates && items.len() > 1 {
                self.find_duplicates(module, &items, request.min_similarity, &mut review)
                    .await?;
            }

            if request.include_low_relevance {
                for item in &items {
                    let record = records.get(&(item.id.clone(), module.to_string()));
                    let Some(low) = assess_relevance(item, module, record) else {
                        continue;
                    };
                    if low.suggested_action == ReviewAction::Archive {
                        review.suggested_actions.push(SuggestedAction::ArchiveItem {
                            item_id: low.id.clone(),
                            module: module.to_string(),
                            reason: format!(
                                "Low relevance ({:.2}) and never used",
                                low.relevance_score
                            ),
                        });
                    }
                    review.low_relevance_items.push(low);
                }
            }
        }

        debug!(
            reviewed = review.total_items_reviewed,
            duplicates = review.potential_duplicates.len(),
            low_relevance = review.low_relevance_items.len(),
            "priority review finished"
        );
        Ok(review)
    }

    /// Sets an item's priority level, creating its priority record on first use.
    #[instrument(skip(self, request), fields(item_id = %request.item_id, module = %request.module))]
    pub async fn adjust_priority(&self, request: PriorityAdjustRequest) -> MemoryResult<Item> {
        request
            .validate()
            .map_err(|e| MemoryError::Validation(e.to_string()))?;
        self.analyzable_modules(std::slice::from_ref(&request.module))?;
        if request.priority_level == PriorityLevel::Archived {
            return Err(MemoryError::validation(
                "priority_level must be one of high, medium, low",
            ));
        }

        let item = self.get(&request.module, &request.item_id).await?;

        let mut changes = fields([(PRIORITY_LEVEL, request.priority_level.to_string().into())]);
        if let Some(score) = request.relevance_score {
            changes.insert(RELEVANCE_SCORE.to_string(), MetadataValue::Float(score));
        }
        self.upsert_priority(
            &request.module,
            &item,
            changes,
            request.relevance_score.unwrap_or(DEFAULT_RELEVANCE),
        )
        .await
    }

    /// Applies a strict review: marks merged duplicates, archives unused
    /// low-relevance items, then moves levels by usage and relevance.
    ///
    /// An item is merged at most once, and never after it was merged away itself.
    #[instrument(skip(self, request), fields(module = ?request.module))]
    pub async fn optimize_priorities(
        &self,
        request: PriorityOptimizeRequest,
    ) -> MemoryResult<PriorityOptimization> {
        let modules = self.analyzable_modules(request.module.as_slice())?;
        let review = self
            .review_priorities(PriorityReviewRequest {
                module: request.module.clone(),
                min_similarity: OPTIMIZE_MIN_SIMILARITY,
                max_items: OPTIMIZE_MAX_ITEMS,
                include_low_relevance: true,
                include_duplicates: true,
            })
            .await?;

        let mut result = PriorityOptimization::default();

        if request.auto_merge_duplicates {
            let mut merged: HashSet<(String, String)> = HashSet::new();
            let pairs = review
                .potential_duplicates
                .iter()
                .filter(|pair| pair.suggested_action == ReviewAction::Merge);

            for pair in pairs {
                let primary_key = (pair.item1.module.clone(), pair.item1.id.clone());
                let duplicate_key = (pair.item2.module.clone(), pair.item2.id.clone());
                if merged.contains(&primary_key) || merged.contains(&duplicate_key) {
                    continue;
                }
                let Some(primary) = self.find(&pair.item1.module, &pair.item1.id).await? else {
                    continue;
                };
                let Some(duplicate) = self.find(&pair.item2.module, &pair.item2.id).await? else {
                    continue;
                };

                let changes = fields([
                    (IS_DUPLICATE, MetadataValue::Bool(true)),
                    (DUPLICATE_OF, primary.id.as_str().into()),
                ]);
                self.upsert_priority(&pair.item2.module, &duplicate, changes, DEFAULT_RELEVANCE)
                    .await?;

                merged.insert(duplicate_key);
                result.merged_duplicates.push(MergedDuplicate {
                    primary_item: preview(&primary, &pair.item1.module),
                    duplicate_item: preview(&duplicate, &pair.item2.module),
                });
                result.total_items_optimized += 1;
            }
        }

        if request.auto_archive_low_relevance {
            let candidates = review
                .low_relevance_items
                .iter()
                .filter(|low| low.suggested_action == ReviewAction::Archive);

            for low in candidates {
                let Some(item) = self.find(&low.module, &low.id).await? else {
                    continue;
                };
                let changes = fields([(
                    PRIORITY_LEVEL,
                    PriorityLevel::Archived.to_string().into(),
                )]);
                self.upsert_priority(&low.module, &item, changes, low.relevance_score)
                    .await?;

                result.archived_items.push(ArchivedItem {
                    id: item.id.clone(),
                    text: preview_text(&item.text),
                    module: low.module.clone(),
                    relevance_score: low.relevance_score,
                });
                result.total_items_optimized += 1;
            }
        }

        let records = self.priority_records().await?;
        for module in modules {
            let items = self
                .list(module, &MetadataFilter::new(), usize::MAX, 0)
                .await?
                .items;
            for item in items {
                let Some(record) = records.get(&(item.id.clone(), module.to_string())) else {
                    continue;
                };
                let current = level_of(record);
                let Some(next) = reprioritize(
                    current,
                    number_field(record, USAGE_COUNT).unwrap_or(0.0),
                    number_field(record, RELEVANCE_SCORE).unwrap_or(DEFAULT_RELEVANCE),
                ) else {
                    continue;
                };

                let patch = ItemPatch {
                    text: None,
                    metadata: Some(fields([(PRIORITY_LEVEL, next.to_string().into())])),
                };
                self.update(PRIORITIES, &record.id, patch, Origin::Module)
                    .await?;

                result.reprioritized_items.push(ReprioritizedItem {
                    id: item.id.clone(),
                    text: preview_text(&item.text),
                    module: module.to_string(),
                    old_priority: current,
                    new_priority: next,
                });
                result.total_items_optimized += 1;
            }
        }

        debug!(optimized = result.total_items_optimized, "priority optimization finished");
        Ok(result)
    }
}
