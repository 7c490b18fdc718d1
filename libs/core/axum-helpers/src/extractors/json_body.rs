//! JSON extractor whose rejections use the standard error envelope.

use crate::errors::AppError;
use axum::extract::{FromRequest, Json, Request};
use serde::de::DeserializeOwned;

/// Like [`axum::Json`], but a malformed or mistyped body is rejected as
/// [`AppError`] (400) instead of axum's plain-text 422.
///
/// Use [`ValidatedJson`](super::ValidatedJson) when the payload derives `Validate`.
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(data) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header},
        routing::post,
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn handler(JsonBody(values): JsonBody<Vec<u32>>) -> String {
        values.len().to_string()
    }

    fn request(body: &str, content_type: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_wrong_shape_is_bad_request_envelope() {
        let app = Router::new().route("/", post(handler));
        let response = app
            .oneshot(request(r#"{"not": "a list"}"#, "application/json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["code"].is_i64());
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_missing_content_type_is_415() {
        let app = Router::new().route("/", post(handler));
        let response = app.oneshot(request("[1, 2]", "text/plain")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}
