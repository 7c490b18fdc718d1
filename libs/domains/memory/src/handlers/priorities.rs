//! Priority endpoints mounted at `/priorities`.

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::post};
use axum_helpers::{
    JsonBody, ReadAccess, ValidatedJson, WriteAccess,
    errors::responses::{
        BadRequestResponse, BadRequestValidationResponse, ForbiddenResponse, UnauthorizedResponse,
    },
};
use utoipa::OpenApi;

use crate::error::MemoryResult;
use crate::models::Item;
use crate::priorities::{
    ArchivedItem, DuplicatePair, ItemPreview, LowRelevanceItem, MergedDuplicate,
    PriorityAdjustRequest, PriorityLevel, PriorityOptimization, PriorityOptimizeRequest,
    PriorityReview, PriorityReviewRequest, ReprioritizedItem, ReviewAction, SuggestedAction,
};
use crate::service::MemoryService;

pub const TAG: &str = "priorities";

#[derive(OpenApi)]
#[openapi(
    paths(review_priorities, adjust_priority, optimize_priorities),
    components(
        schemas(
            PriorityReviewRequest,
            PriorityReview,
            PriorityAdjustRequest,
            PriorityOptimizeRequest,
            PriorityOptimization,
            PriorityLevel,
            ReviewAction,
            ItemPreview,
            DuplicatePair,
            LowRelevanceItem,
            SuggestedAction,
            MergedDuplicate,
            ArchivedItem,
            ReprioritizedItem,
            Item
        ),
        responses(
            BadRequestResponse,
            BadRequestValidationResponse,
            UnauthorizedResponse,
            ForbiddenResponse
        )
    ),
    tags((name = TAG, description = "Duplicate review and priority records"))
)]
pub struct PrioritiesApiDoc;

pub fn router(service: Arc<MemoryService>) -> Router {
    Router::new()
        .route("/review", post(review_priorities))
        .route("/adjust", post(adjust_priority))
        .route("/optimize", post(optimize_priorities))
        .with_state(service)
}

/// Report duplicates and low-relevance items
#[utoipa::path(
    post,
    path = "/review",
    tag = TAG,
    request_body = PriorityReviewRequest,
    responses(
        (status = 200, description = "Review findings", body = PriorityReview),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse)
    )
)]
async fn review_priorities(
    _access: ReadAccess,
    State(service): State<Arc<MemoryService>>,
    ValidatedJson(request): ValidatedJson<PriorityReviewRequest>,
) -> MemoryResult<Json<PriorityReview>> {
    let review = service.review_priorities(request).await?;
    Ok(Json(review))
}

/// Set the priority of one item
#[utoipa::path(
    post,
    path = "/adjust",
    tag = TAG,
    request_body = PriorityAdjustRequest,
    responses(
        (status = 200, description = "Priority record", body = Item),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse)
    )
)]
async fn adjust_priority(
    _access: WriteAccess,
    State(service): State<Arc<MemoryService>>,
    ValidatedJson(request): ValidatedJson<PriorityAdjustRequest>,
) -> MemoryResult<Json<Item>> {
    let record = service.adjust_priority(request).await?;
    Ok(Json(record))
}

/// Merge duplicates, archive stale items and move priority levels
#[utoipa::path(
    post,
    path = "/optimize",
    tag = TAG,
    request_body = PriorityOptimizeRequest,
    responses(
        (status = 200, description = "Changes applied", body = PriorityOptimization),
        (status = 400, response = BadRequestResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse)
    )
)]
async fn optimize_priorities(
    _access: WriteAccess,
    State(service): State<Arc<MemoryService>>,
    JsonBody(request): JsonBody<PriorityOptimizeRequest>,
) -> MemoryResult<Json<PriorityOptimization>> {
    let optimization = service.optimize_priorities(request).await?;
    Ok(Json(optimization))
}
