//! HTTP handlers for the memory domain.
//!
//! Five routers, each with its state applied:
//! - [`modules`]: per-collection CRUD and search for user-facing clients
//! - [`sofia`]: the assistant integration surface, including batch and consolidation
//! - [`analysis`]: connection discovery and learning summaries
//! - [`priorities`]: duplicate/relevance review and priority records
//! - [`suggestions`]: generated suggestions and their implementation state
//!
//! Authentication is layered on by the application. Handlers only check scopes
//! through [`ReadAccess`](axum_helpers::ReadAccess) and [`WriteAccess`](axum_helpers::WriteAccess).

pub mod analysis;
pub mod modules;
pub mod priorities;
pub mod sofia;
pub mod suggestions;

use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{MemoryError, MemoryResult};

pub use analysis::AnalysisApiDoc;
pub use modules::ModuleApiDoc;
pub use priorities::PrioritiesApiDoc;
pub use sofia::SofiaApiDoc;
pub use suggestions::SuggestionsApiDoc;

/// Removes `key` from the query parameters and parses it, or returns `default`.
fn take_param<T: FromStr>(
    params: &mut HashMap<String, String>,
    key: &str,
    default: T,
) -> MemoryResult<T> {
    match params.remove(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            MemoryError::validation(format!("'{key}' must be a non-negative integer, got '{raw}'"))
        }),
    }
}

fn bounded(key: &str, value: usize, min: usize, max: usize) -> MemoryResult<usize> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(MemoryError::validation(format!(
            "'{key}' must be between {min} and {max}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_param() {
        let mut params = HashMap::from([
            ("limit".to_string(), "20".to_string()),
            ("offset".to_string(), "-1".to_string()),
            ("category".to_string(), "idea".to_string()),
        ]);

        assert_eq!(take_param(&mut params, "limit", 100usize).unwrap(), 20);
        assert_eq!(take_param(&mut params, "n_results", 5usize).unwrap(), 5);
        assert!(take_param(&mut params, "offset", 0usize).is_err());
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_bounded() {
        assert_eq!(bounded("limit", 1, 1, 10).unwrap(), 1);
        let err = bounded("limit", 0, 1, 10).unwrap_err();
        assert_eq!(err.to_string(), "'limit' must be between 1 and 10");
    }
}
