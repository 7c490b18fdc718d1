//! Metadata filters shared by search, listing, and the stores.

use std::collections::HashMap;

use crate::error::{MemoryError, MemoryResult};
use crate::models::{Metadata, MetadataValue};

/// Query-string parameter matched against membership in the `tags` list.
pub const TAG_PARAM: &str = "tag";
const TAGS_KEY: &str = "tags";
/// Prefix turning a query-string parameter into a numeric lower bound.
const MIN_PREFIX: &str = "min_";

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `metadata[key]` equals the value exactly
    Equals { key: String, value: MetadataValue },
    /// `metadata[key]` is a list containing the text value
    Contains { key: String, value: String },
    /// `metadata[key]` is numeric and at least the bound
    AtLeast { key: String, value: f64 },
}

impl Condition {
    pub fn key(&self) -> &str {
        match self {
            Condition::Equals { key, .. }
            | Condition::Contains { key, .. }
            | Condition::AtLeast { key, .. } => key,
        }
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        let Some(actual) = metadata.get(self.key()) else {
            return false;
        };
        match self {
            Condition::Equals { value, .. } => actual == value,
            Condition::Contains { value, .. } => actual
                .as_list()
                .is_some_and(|list| list.iter().any(|v| v.as_text() == Some(value))),
            Condition::AtLeast { value, .. } => actual.as_f64().is_some_and(|n| n >= *value),
        }
    }
}

/// Conjunction of conditions. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    conditions: Vec<Condition>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn equals(self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.and(Condition::Equals {
            key: key.into(),
            value: value.into(),
        })
    }

    /// Exact match on every pair, as sent in a JSON `filter` object.
    pub fn equals_all(pairs: Metadata) -> Self {
        Self {
            conditions: pairs
                .into_iter()
                .map(|(key, value)| Condition::Equals { key, value })
                .collect(),
        }
    }

    /// Builds a filter from free-form query-string parameters.
    ///
    /// `tag=x` matches items whose `tags` list contains `x`, `min_<key>=n` keeps
    /// items whose numeric `<key>` is at least `n`, and any other `key=value`
    /// is an exact text match.
    pub fn from_query_params(params: HashMap<String, String>) -> MemoryResult<Self> {
        let mut params: Vec<_> = params.into_iter().collect();
        params.sort();

        let mut filter = Self::new();
        for (key, value) in params {
            let condition = if key == TAG_PARAM {
                Condition::Contains {
                    key: TAGS_KEY.to_string(),
                    value,
                }
            } else if let Some(field) = key.strip_prefix(MIN_PREFIX) {
                let bound = value.trim().parse::<f64>().map_err(|_| {
                    MemoryError::validation(format!("'{key}' must be a number, got '{value}'"))
                })?;
                Condition::AtLeast {
                    key: field.to_string(),
                    value: bound,
                }
            } else {
                Condition::Equals {
                    key,
                    value: MetadataValue::Text(value),
                }
            };
            filter.conditions.push(condition);
        }
        Ok(filter)
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions.iter().all(|c| c.matches(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> Metadata {
        let mut m = Metadata::new();
        m.insert("category".into(), "idea".into());
        m.insert("strength".into(), MetadataValue::Float(0.8));
        m.insert("count".into(), MetadataValue::Integer(2));
        m.insert("tags".into(), vec!["rust", "async"].into());
        m
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(MetadataFilter::new().matches(&Metadata::new()));
    }

    #[test]
    fn test_equals_requires_every_pair() {
        let m = metadata();
        assert!(MetadataFilter::new().equals("category", "idea").matches(&m));
        assert!(
            !MetadataFilter::new()
                .equals("category", "idea")
                .equals("count", 3i64)
                .matches(&m)
        );
        assert!(MetadataFilter::new().equals("count", 2.0).matches(&m));
        assert!(!MetadataFilter::new().equals("missing", "x").matches(&m));
    }

    #[test]
    fn test_query_params_build_tag_and_bounds() {
        let params = HashMap::from([
            ("tag".to_string(), "rust".to_string()),
            ("min_strength".to_string(), "0.7".to_string()),
            ("category".to_string(), "idea".to_string()),
        ]);
        let filter = MetadataFilter::from_query_params(params).unwrap();
        assert_eq!(filter.conditions().len(), 3);
        assert!(filter.matches(&metadata()));

        let strict = MetadataFilter::from_query_params(HashMap::from([(
            "min_strength".to_string(),
            "0.9".to_string(),
        )]))
        .unwrap();
        assert!(!strict.matches(&metadata()));
    }

    #[test]
    fn test_query_param_text_does_not_match_numbers() {
        let filter =
            MetadataFilter::from_query_params(HashMap::from([("count".into(), "2".into())]))
                .unwrap();
        assert!(!filter.matches(&metadata()));
    }

    #[test]
    fn test_invalid_bound_is_validation_error() {
        let err = MetadataFilter::from_query_params(HashMap::from([(
            "min_strength".into(),
            "high".into(),
        )]))
        .unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }
}
