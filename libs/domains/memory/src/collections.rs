//! The fixed set of logical memory collections and their physical names.

use std::collections::BTreeMap;

use core_config::{ConfigError, FromEnv, env_optional, env_or_default};

use crate::error::{MemoryError, MemoryResult};
use crate::models::{Metadata, MetadataValue};

pub const IDENTITY: &str = "identity";
pub const BUSINESS: &str = "business";
pub const REMINDERS: &str = "reminders";
pub const CONNECTIONS: &str = "connections";
pub const LEARNINGS: &str = "learnings";
pub const PRIORITIES: &str = "priorities";
pub const SUGGESTIONS: &str = "suggestions";

pub const DEFAULT_COLLECTIONS: [(&str, &str); 7] = [
    (IDENTITY, "identity_psychology"),
    (BUSINESS, "business_strategy"),
    (REMINDERS, "reminders_urls"),
    (CONNECTIONS, "smart_connections"),
    (LEARNINGS, "learnings_reflections"),
    (PRIORITIES, "priority_filtering"),
    (SUGGESTIONS, "smart_suggestions"),
];

/// Immutable logical → physical collection map, loaded once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRegistry {
    collections: BTreeMap<String, String>,
    default_collection: String,
}

impl CollectionRegistry {
    pub fn new(
        collections: BTreeMap<String, String>,
        default_collection: impl Into<String>,
    ) -> MemoryResult<Self> {
        let default_collection = default_collection.into();
        if collections.is_empty() {
            return Err(MemoryError::Config(
                "at least one collection must be registered".to_string(),
            ));
        }
        if !collections.contains_key(&default_collection) {
            return Err(MemoryError::Config(format!(
                "default collection '{default_collection}' is not registered"
            )));
        }
        Ok(Self {
            collections,
            default_collection,
        })
    }

    /// Physical name for a logical collection.
    pub fn resolve(&self, logical: &str) -> MemoryResult<&str> {
        self.collections
            .get(logical)
            .map(String::as_str)
            .ok_or_else(|| MemoryError::UnknownCollection(logical.to_string()))
    }

    pub fn contains(&self, logical: &str) -> bool {
        self.collections.contains_key(logical)
    }

    pub fn default_collection(&self) -> &str {
        &self.default_collection
    }

    pub fn physical_names(&self) -> impl Iterator<Item = &str> {
        self.collections.values().map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.collections
    }
}

impl Default for CollectionRegistry {
    fn default() -> Self {
        Self {
            collections: DEFAULT_COLLECTIONS
                .iter()
                .map(|(logical, physical)| (logical.to_string(), physical.to_string()))
                .collect(),
            default_collection: IDENTITY.to_string(),
        }
    }
}

/// Parses `logical=physical,...`.
fn parse_collections(raw: &str) -> Result<BTreeMap<String, String>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((logical, physical))
                if !logical.trim().is_empty() && !physical.trim().is_empty() =>
            {
                Ok((logical.trim().to_string(), physical.trim().to_string()))
            }
            _ => Err(format!("expected logical=physical, got '{entry}'")),
        })
        .collect()
}

/// Loaded from environment variables:
/// - `MEMORY_COLLECTIONS` (optional) - `logical=physical` pairs replacing the defaults
/// - `MEMORY_DEFAULT_COLLECTION` (default: identity)
impl FromEnv for CollectionRegistry {
    fn from_env() -> Result<Self, ConfigError> {
        let collections = match env_optional("MEMORY_COLLECTIONS") {
            Some(raw) => parse_collections(&raw).map_err(|details| ConfigError::ParseError {
                key: "MEMORY_COLLECTIONS".to_string(),
                details,
            })?,
            None => Self::default().collections,
        };
        let default_collection = env_or_default("MEMORY_DEFAULT_COLLECTION", IDENTITY);

        Self::new(collections, default_collection).map_err(|e| ConfigError::ParseError {
            key: "MEMORY_DEFAULT_COLLECTION".to_string(),
            details: e.to_string(),
        })
    }
}

/// Starting metadata for items created through a module endpoint.
pub fn module_template(logical: &str) -> Metadata {
    use MetadataValue::{Bool, Float, Integer, List, Null};

    let entries: Vec<(&str, MetadataValue)> = match logical {
        IDENTITY => vec![("category", "general".into())],
        BUSINESS => vec![
            ("category", "idea".into()),
            ("priority", "medium".into()),
            ("status", "pending".into()),
        ],
        REMINDERS => vec![
            ("type", "reminder".into()),
            ("url", "".into()),
            ("due_date", Null),
            ("priority", "medium".into()),
            ("status", "active".into()),
        ],
        CONNECTIONS => vec![
            ("source_id", "".into()),
            ("source_module", "".into()),
            ("target_id", "".into()),
            ("target_module", "".into()),
            ("connection_type", "semantic".into()),
            ("strength", Float(0.0)),
        ],
        LEARNINGS => vec![
            ("category", "general".into()),
            ("source", "".into()),
            ("context", "".into()),
            ("importance", "medium".into()),
            ("tags", List(vec![])),
        ],
        PRIORITIES => vec![
            ("item_id", "".into()),
            ("module", "".into()),
            ("priority_level", "medium".into()),
            ("relevance_score", Float(0.0)),
            ("usage_count", Integer(0)),
            ("is_duplicate", Bool(false)),
            ("duplicate_of", Null),
        ],
        SUGGESTIONS => vec![
            ("type", "action".into()),
            ("context", "".into()),
            ("relevance_score", Float(0.0)),
            ("source_modules", List(vec![])),
            ("source_items", List(vec![])),
            ("is_implemented", Bool(false)),
            ("implementation_date", Null),
        ],
        _ => vec![],
    };

    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
