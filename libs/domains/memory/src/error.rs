use axum::response::{IntoResponse, Response};
use axum_helpers::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Collection '{0}' not found")]
    UnknownCollection(String),

    #[error("Item '{id}' not found in collection '{collection}'")]
    ItemNotFound { collection: String, id: String },

    #[error("Item '{id}' already exists in collection '{collection}'")]
    AlreadyExists { collection: String, id: String },

    #[error("{0}")]
    Validation(String),

    #[error("unsupported operation type")]
    UnsupportedOperation(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type MemoryResult<T> = Result<T, MemoryError>;

impl MemoryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        MemoryError::Validation(msg.into())
    }

    pub fn not_found(collection: &str, id: &str) -> Self {
        MemoryError::ItemNotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<qdrant_client::QdrantError> for MemoryError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        MemoryError::Store(err.to_string())
    }
}

impl From<reqwest::Error> for MemoryError {
    fn from(err: reqwest::Error) -> Self {
        MemoryError::Embedding(err.to_string())
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(err: serde_json::Error) -> Self {
        MemoryError::Internal(format!("JSON error: {}", err))
    }
}

/// Convert MemoryError to AppError for standardized HTTP error responses
impl From<MemoryError> for AppError {
    fn from(err: MemoryError) -> Self {
        let message = err.to_string();
        match err {
            MemoryError::UnknownCollection(_) | MemoryError::ItemNotFound { .. } => {
                AppError::NotFound(message)
            }
            MemoryError::AlreadyExists { .. } => AppError::Conflict(message),
            MemoryError::Validation(_) | MemoryError::UnsupportedOperation(_) => {
                AppError::BadRequest(message)
            }
            MemoryError::Store(_) | MemoryError::Embedding(_) => AppError::BadGateway(message),
            MemoryError::Config(_) | MemoryError::Internal(_) => {
                AppError::InternalServerError(message)
            }
        }
    }
}

impl IntoResponse for MemoryError {
    fn into_response(self) -> Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (MemoryError::UnknownCollection("x".into()), StatusCode::NOT_FOUND),
            (MemoryError::not_found("identity", "a"), StatusCode::NOT_FOUND),
            (
                MemoryError::AlreadyExists {
                    collection: "identity".into(),
                    id: "a".into(),
                },
                StatusCode::CONFLICT,
            ),
            (MemoryError::validation("bad"), StatusCode::BAD_REQUEST),
            (MemoryError::Store("down".into()), StatusCode::BAD_GATEWAY),
            (MemoryError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_unsupported_operation_message() {
        let err = MemoryError::UnsupportedOperation("upsert".into());
        assert_eq!(err.to_string(), "unsupported operation type");
    }
}
