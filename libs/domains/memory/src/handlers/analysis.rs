//! Analysis endpoints mounted at `/analysis`.

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::post};
use axum_helpers::{
    ReadAccess, ValidatedJson, WriteAccess,
    errors::responses::{
        BadRequestValidationResponse, ForbiddenResponse, NotFoundResponse, UnauthorizedResponse,
    },
};
use utoipa::OpenApi;

use crate::analysis::{
    ConnectionAnalysis, ConnectionAnalysisRequest, LearningSummary, LearningSummaryRequest,
};
use crate::error::MemoryResult;
use crate::service::MemoryService;

pub const TAG: &str = "analysis";

#[derive(OpenApi)]
#[openapi(
    paths(analyze_connections, summarize_learnings),
    components(
        schemas(
            ConnectionAnalysisRequest,
            ConnectionAnalysis,
            LearningSummaryRequest,
            LearningSummary
        ),
        responses(
            BadRequestValidationResponse,
            UnauthorizedResponse,
            ForbiddenResponse,
            NotFoundResponse
        )
    ),
    tags((name = TAG, description = "Connections and learning summaries"))
)]
pub struct AnalysisApiDoc;

pub fn router(service: Arc<MemoryService>) -> Router {
    Router::new()
        .route("/connections", post(analyze_connections))
        .route("/learnings/summary", post(summarize_learnings))
        .with_state(service)
}

/// Find and record connections for one item
#[utoipa::path(
    post,
    path = "/connections",
    tag = TAG,
    request_body = ConnectionAnalysisRequest,
    responses(
        (status = 200, description = "Connections recorded", body = ConnectionAnalysis),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn analyze_connections(
    _access: WriteAccess,
    State(service): State<Arc<MemoryService>>,
    ValidatedJson(request): ValidatedJson<ConnectionAnalysisRequest>,
) -> MemoryResult<Json<ConnectionAnalysis>> {
    let analysis = service.analyze_connections(request).await?;
    Ok(Json(analysis))
}

/// Summarize the most important learnings
#[utoipa::path(
    post,
    path = "/learnings/summary",
    tag = TAG,
    request_body = LearningSummaryRequest,
    responses(
        (status = 200, description = "Summary", body = LearningSummary),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse)
    )
)]
async fn summarize_learnings(
    _access: ReadAccess,
    State(service): State<Arc<MemoryService>>,
    ValidatedJson(request): ValidatedJson<LearningSummaryRequest>,
) -> MemoryResult<Json<LearningSummary>> {
    let summary = service.summarize_learnings(request).await?;
    Ok(Json(summary))
}
