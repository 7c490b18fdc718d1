use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;
use validator::Validate;

/// Reserved metadata key stamped once at creation.
pub const CREATED_AT: &str = "created_at";
/// Reserved metadata key refreshed on every mutation.
pub const UPDATED_AT: &str = "updated_at";
/// Reserved metadata key recording which client wrote the item.
pub const SOURCE: &str = "source";
/// Metadata key recording which client last updated the item.
pub const LAST_UPDATE_SOURCE: &str = "last_update_source";

/// A metadata value. Nested objects are not representable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<MetadataValue>),
}

impl MetadataValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Integer(i) => Some(*i as f64),
            MetadataValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MetadataValue]> {
        match self {
            MetadataValue::List(values) => Some(values),
            _ => None,
        }
    }
}

/// Integers and floats compare numerically, so `3` equals `3.0`.
impl PartialEq for MetadataValue {
    fn eq(&self, other: &Self) -> bool {
        use MetadataValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Integer(_) | Float(_), Integer(_) | Float(_)) => self.as_f64() == other.as_f64(),
            (Text(a), Text(b)) => a == b,
            (List(a), List(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl<T: Into<MetadataValue>> From<Vec<T>> for MetadataValue {
    fn from(values: Vec<T>) -> Self {
        MetadataValue::List(values.into_iter().map(Into::into).collect())
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// A stored memory item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Item {
    pub id: String,
    pub text: String,
    #[schema(value_type = Object)]
    pub metadata: Metadata,
}

impl Item {
    pub fn created_at(&self) -> Option<&str> {
        self.metadata.get(CREATED_AT).and_then(MetadataValue::as_text)
    }
}

/// Input for creating an item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewItem {
    /// Caller-chosen id. A fresh UUID is assigned when absent.
    pub id: Option<String>,
    pub text: String,
    pub metadata: Metadata,
}

impl NewItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Partial update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, ToSchema)]
pub struct ItemPatch {
    pub text: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Metadata>,
}

/// An item paired with its distance from a query (lower is closer).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItem {
    pub item: Item,
    pub distance: f32,
}

/// Similarity search response; `distances[i]` belongs to `items[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QueryResult {
    pub items: Vec<Item>,
    pub distances: Vec<f32>,
}

impl From<Vec<ScoredItem>> for QueryResult {
    fn from(scored: Vec<ScoredItem>) -> Self {
        let (items, distances) = scored.into_iter().map(|s| (s.item, s.distance)).unzip();
        Self { items, distances }
    }
}

/// A page of items plus the number of items matching before paging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ItemList {
    pub items: Vec<Item>,
    pub total: usize,
}

/// Body for creating an item through a module endpoint.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateItemRequest {
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub text: String,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn deleted(collection: &str, id: &str) -> Self {
        Self {
            message: format!("Item '{id}' deleted from collection '{collection}'"),
        }
    }
}
