//! SofIA integration endpoints mounted at `/sofia`.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post, put},
};
use axum_helpers::{
    JsonBody, ReadAccess, WriteAccess,
    errors::responses::{
        BadGatewayResponse, BadRequestResponse, ConflictResponse, ForbiddenResponse,
        NotFoundResponse, UnauthorizedResponse,
    },
};
use serde::Deserialize;
use utoipa::{OpenApi, ToSchema};

use crate::batch::{
    BatchBody, BatchReport, BatchRequest, DEFAULT_N_RESULTS, OperationError, OperationResult,
};
use crate::consolidate::{ConsolidateRequest, ConsolidateResponse, ConsolidatedResult};
use crate::error::MemoryResult;
use crate::filter::MetadataFilter;
use crate::models::{Item, ItemPatch, MessageResponse, Metadata, NewItem, QueryResult};
use crate::service::{MemoryService, Origin};

pub const TAG: &str = "sofia";

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SofiaStoreRequest {
    pub text: String,
    /// Logical collection; the default collection when absent
    pub collection: Option<String>,
    /// Caller-chosen id; a UUID is assigned when absent
    pub id: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SofiaQueryRequest {
    pub text: String,
    pub collection: Option<String>,
    /// 1-100 (default 5)
    pub n_results: Option<usize>,
    /// Exact-match metadata filter
    #[schema(value_type = Option<Object>)]
    pub filter: Option<Metadata>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        store_item,
        query_items,
        update_item,
        delete_item,
        run_batch,
        consolidate,
        list_collections
    ),
    components(
        schemas(
            SofiaStoreRequest,
            SofiaQueryRequest,
            Item,
            ItemPatch,
            QueryResult,
            MessageResponse,
            BatchRequest,
            BatchReport,
            OperationResult,
            OperationError,
            ConsolidateRequest,
            ConsolidateResponse,
            ConsolidatedResult
        ),
        responses(
            BadRequestResponse,
            UnauthorizedResponse,
            ForbiddenResponse,
            NotFoundResponse,
            ConflictResponse,
            BadGatewayResponse
        )
    ),
    tags((name = TAG, description = "Assistant integration: API key or bearer token"))
)]
pub struct SofiaApiDoc;

pub fn router(service: Arc<MemoryService>) -> Router {
    Router::new()
        .route("/store", post(store_item))
        .route("/query", post(query_items))
        .route("/update/{collection}/{id}", put(update_item))
        .route("/delete/{collection}/{id}", delete(delete_item))
        .route("/batch", post(run_batch))
        .route("/consolidate", post(consolidate))
        .route("/collections", get(list_collections))
        .with_state(service)
}

/// Store an item
///
/// Adds `source: "sofia"` unless the caller sent one.
#[utoipa::path(
    post,
    path = "/store",
    tag = TAG,
    request_body = SofiaStoreRequest,
    responses(
        (status = 200, description = "Item stored", body = Item),
        (status = 400, response = BadRequestResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse),
        (status = 502, response = BadGatewayResponse)
    )
)]
async fn store_item(
    _access: WriteAccess,
    State(service): State<Arc<MemoryService>>,
    JsonBody(request): JsonBody<SofiaStoreRequest>,
) -> MemoryResult<Json<Item>> {
    let collection = request
        .collection
        .unwrap_or_else(|| service.registry().default_collection().to_string());
    let input = NewItem {
        id: request.id,
        text: request.text,
        metadata: request.metadata.unwrap_or_default(),
    };

    let item = service.store(&collection, input, Origin::Sofia).await?;
    Ok(Json(item))
}

/// Semantic search in one collection
#[utoipa::path(
    post,
    path = "/query",
    tag = TAG,
    request_body = SofiaQueryRequest,
    responses(
        (status = 200, description = "Nearest items, closest first", body = QueryResult),
        (status = 400, response = BadRequestResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn query_items(
    _access: ReadAccess,
    State(service): State<Arc<MemoryService>>,
    JsonBody(request): JsonBody<SofiaQueryRequest>,
) -> MemoryResult<Json<QueryResult>> {
    let collection = request
        .collection
        .unwrap_or_else(|| service.registry().default_collection().to_string());
    let filter = MetadataFilter::equals_all(request.filter.unwrap_or_default());

    let result = service
        .query(
            &collection,
            &request.text,
            request.n_results.unwrap_or(DEFAULT_N_RESULTS),
            &filter,
        )
        .await?;
    Ok(Json(result))
}

/// Update an item
///
/// Records `last_update_source: "sofia"`.
#[utoipa::path(
    put,
    path = "/update/{collection}/{id}",
    tag = TAG,
    params(
        ("collection" = String, Path, description = "Logical collection name"),
        ("id" = String, Path, description = "Item ID")
    ),
    request_body = ItemPatch,
    responses(
        (status = 200, description = "Item updated", body = Item),
        (status = 400, response = BadRequestResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn update_item(
    _access: WriteAccess,
    State(service): State<Arc<MemoryService>>,
    Path((collection, id)): Path<(String, String)>,
    JsonBody(patch): JsonBody<ItemPatch>,
) -> MemoryResult<Json<Item>> {
    let item = service
        .update(&collection, &id, patch, Origin::Sofia)
        .await?;
    Ok(Json(item))
}

/// Delete an item
#[utoipa::path(
    delete,
    path = "/delete/{collection}/{id}",
    tag = TAG,
    params(
        ("collection" = String, Path, description = "Logical collection name"),
        ("id" = String, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Item deleted", body = MessageResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn delete_item(
    _access: WriteAccess,
    State(service): State<Arc<MemoryService>>,
    Path((collection, id)): Path<(String, String)>,
) -> MemoryResult<Json<MessageResponse>> {
    service.delete(&collection, &id).await?;
    Ok(Json(MessageResponse::deleted(&collection, &id)))
}

/// Run several operations in order
///
/// Accepts `{"operations": [...]}` or a bare array. Each operation succeeds or
/// fails on its own; the response is 200 whenever the body is a list.
#[utoipa::path(
    post,
    path = "/batch",
    tag = TAG,
    request_body = BatchRequest,
    responses(
        (status = 200, description = "Per-operation results in input order", body = BatchReport),
        (status = 400, response = BadRequestResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse)
    )
)]
async fn run_batch(
    _access: WriteAccess,
    State(service): State<Arc<MemoryService>>,
    JsonBody(body): JsonBody<BatchBody>,
) -> Json<BatchReport> {
    Json(service.run_batch(body.into_operations()).await)
}

/// Query several collections and rank the hits together
#[utoipa::path(
    post,
    path = "/consolidate",
    tag = TAG,
    request_body = ConsolidateRequest,
    responses(
        (status = 200, description = "Hits across collections, closest first", body = ConsolidateResponse),
        (status = 400, response = BadRequestResponse),
        (status = 401, response = UnauthorizedResponse)
    )
)]
async fn consolidate(
    _access: ReadAccess,
    State(service): State<Arc<MemoryService>>,
    JsonBody(request): JsonBody<ConsolidateRequest>,
) -> MemoryResult<Json<ConsolidateResponse>> {
    let response = service.consolidate(request).await?;
    Ok(Json(response))
}

/// Logical to physical collection names
#[utoipa::path(
    get,
    path = "/collections",
    tag = TAG,
    responses(
        (status = 200, description = "Registered collections", body = BTreeMap<String, String>),
        (status = 401, response = UnauthorizedResponse)
    )
)]
async fn list_collections(
    _access: ReadAccess,
    State(service): State<Arc<MemoryService>>,
) -> Json<BTreeMap<String, String>> {
    Json(service.registry().as_map().clone())
}
