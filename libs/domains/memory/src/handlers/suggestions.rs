//! Suggestion endpoints mounted at `/suggestions`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use axum_helpers::{
    JsonBody, ValidatedJson, WriteAccess,
    errors::responses::{
        BadRequestResponse, BadRequestValidationResponse, ForbiddenResponse, NotFoundResponse,
        UnauthorizedResponse,
    },
};
use utoipa::OpenApi;

use crate::error::MemoryResult;
use crate::models::Item;
use crate::service::MemoryService;
use crate::suggestions::{
    SuggestionAnalysisRequest, SuggestionRequest, SuggestionResult, SuggestionType, TimeRange,
};

pub const TAG: &str = "suggestions";

#[derive(OpenApi)]
#[openapi(
    paths(generate_suggestions, analyze_suggestions, implement_suggestion),
    components(
        schemas(
            SuggestionRequest,
            SuggestionAnalysisRequest,
            SuggestionResult,
            SuggestionType,
            TimeRange,
            Item
        ),
        responses(
            BadRequestResponse,
            BadRequestValidationResponse,
            UnauthorizedResponse,
            ForbiddenResponse,
            NotFoundResponse
        )
    ),
    tags((name = TAG, description = "Generated suggestions"))
)]
pub struct SuggestionsApiDoc;

pub fn router(service: Arc<MemoryService>) -> Router {
    Router::new()
        .route("/generate", post(generate_suggestions))
        .route("/analyze", post(analyze_suggestions))
        .route("/{id}/implement", post(implement_suggestion))
        .with_state(service)
}

/// Generate and store suggestions
#[utoipa::path(
    post,
    path = "/generate",
    tag = TAG,
    request_body = SuggestionRequest,
    responses(
        (status = 200, description = "Stored suggestions", body = SuggestionResult),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse)
    )
)]
async fn generate_suggestions(
    _access: WriteAccess,
    State(service): State<Arc<MemoryService>>,
    ValidatedJson(request): ValidatedJson<SuggestionRequest>,
) -> MemoryResult<Json<SuggestionResult>> {
    let result = service.generate_suggestions(request).await?;
    Ok(Json(result))
}

/// Generate suggestions for a period and set of focus areas
#[utoipa::path(
    post,
    path = "/analyze",
    tag = TAG,
    request_body = SuggestionAnalysisRequest,
    responses(
        (status = 200, description = "Stored suggestions", body = SuggestionResult),
        (status = 400, response = BadRequestResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse)
    )
)]
async fn analyze_suggestions(
    _access: WriteAccess,
    State(service): State<Arc<MemoryService>>,
    JsonBody(request): JsonBody<SuggestionAnalysisRequest>,
) -> MemoryResult<Json<SuggestionResult>> {
    let result = service.analyze_suggestions(request).await?;
    Ok(Json(result))
}

/// Mark a suggestion as implemented
#[utoipa::path(
    post,
    path = "/{id}/implement",
    tag = TAG,
    params(("id" = String, Path, description = "Suggestion ID")),
    responses(
        (status = 200, description = "Suggestion updated", body = Item),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn implement_suggestion(
    _access: WriteAccess,
    State(service): State<Arc<MemoryService>>,
    Path(id): Path<String>,
) -> MemoryResult<Json<Item>> {
    let item = service.implement_suggestion(&id).await?;
    Ok(Json(item))
}
