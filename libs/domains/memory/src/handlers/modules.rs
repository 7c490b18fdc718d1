//! Per-collection endpoints mounted at `/memory`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use axum_helpers::{
    JsonBody, ReadAccess, ValidatedJson, WriteAccess,
    errors::responses::{
        BadGatewayResponse, BadRequestResponse, BadRequestValidationResponse, ForbiddenResponse,
        InternalServerErrorResponse, NotFoundResponse, UnauthorizedResponse,
    },
};
use utoipa::OpenApi;

use super::{bounded, take_param};
use crate::error::{MemoryError, MemoryResult};
use crate::filter::MetadataFilter;
use crate::models::{
    CreateItemRequest, Item, ItemList, ItemPatch, MessageResponse, NewItem, QueryResult,
};
use crate::service::{MAX_QUERY_RESULTS, MemoryService, Origin};

pub const TAG: &str = "memory";

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 1000;
const DEFAULT_SEARCH_RESULTS: usize = 5;

#[derive(OpenApi)]
#[openapi(
    paths(list_items, create_item, search_items, get_item, update_item, delete_item),
    components(
        schemas(Item, ItemList, ItemPatch, CreateItemRequest, QueryResult, MessageResponse),
        responses(
            BadRequestResponse,
            BadRequestValidationResponse,
            UnauthorizedResponse,
            ForbiddenResponse,
            NotFoundResponse,
            BadGatewayResponse,
            InternalServerErrorResponse
        )
    ),
    tags((name = TAG, description = "Per-module memory items"))
)]
pub struct ModuleApiDoc;

pub fn router(service: Arc<MemoryService>) -> Router {
    Router::new()
        .route("/{collection}", get(list_items).post(create_item))
        .route("/{collection}/search", get(search_items))
        .route(
            "/{collection}/{id}",
            get(get_item).put(update_item).delete(delete_item),
        )
        .with_state(service)
}

/// List items in a collection
///
/// Query parameters other than `limit` and `offset` filter on metadata:
/// `tag=x` matches the `tags` list, `min_<key>=n` is a numeric lower bound,
/// anything else is an exact text match.
#[utoipa::path(
    get,
    path = "/{collection}",
    tag = TAG,
    params(
        ("collection" = String, Path, description = "Logical collection name"),
        ("limit" = Option<usize>, Query, description = "Page size, 1-1000 (default 100)"),
        ("offset" = Option<usize>, Query, description = "Items to skip (default 0)")
    ),
    responses(
        (status = 200, description = "Matching items", body = ItemList),
        (status = 400, response = BadRequestResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn list_items(
    _access: ReadAccess,
    State(service): State<Arc<MemoryService>>,
    Path(collection): Path<String>,
    Query(mut params): Query<HashMap<String, String>>,
) -> MemoryResult<Json<ItemList>> {
    let limit = take_param(&mut params, "limit", DEFAULT_LIST_LIMIT)?;
    let limit = bounded("limit", limit, 1, MAX_LIST_LIMIT)?;
    let offset = take_param(&mut params, "offset", 0usize)?;
    let filter = MetadataFilter::from_query_params(params)?;

    let page = service.list(&collection, &filter, limit, offset).await?;
    Ok(Json(page))
}

/// Create an item
#[utoipa::path(
    post,
    path = "/{collection}",
    tag = TAG,
    params(("collection" = String, Path, description = "Logical collection name")),
    request_body = CreateItemRequest,
    responses(
        (status = 201, description = "Item created", body = Item),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse),
        (status = 404, response = NotFoundResponse),
        (status = 502, response = BadGatewayResponse)
    )
)]
async fn create_item(
    _access: WriteAccess,
    State(service): State<Arc<MemoryService>>,
    Path(collection): Path<String>,
    ValidatedJson(input): ValidatedJson<CreateItemRequest>,
) -> MemoryResult<impl IntoResponse> {
    let input = NewItem::new(input.text).with_metadata(input.metadata.unwrap_or_default());
    let item = service.store(&collection, input, Origin::Module).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Semantic search within a collection
#[utoipa::path(
    get,
    path = "/{collection}/search",
    tag = TAG,
    params(
        ("collection" = String, Path, description = "Logical collection name"),
        ("query" = String, Query, description = "Text to search for"),
        ("n_results" = Option<usize>, Query, description = "1-100 (default 5)")
    ),
    responses(
        (status = 200, description = "Nearest items, closest first", body = QueryResult),
        (status = 400, response = BadRequestResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse),
        (status = 502, response = BadGatewayResponse)
    )
)]
async fn search_items(
    _access: ReadAccess,
    State(service): State<Arc<MemoryService>>,
    Path(collection): Path<String>,
    Query(mut params): Query<HashMap<String, String>>,
) -> MemoryResult<Json<QueryResult>> {
    let query = params
        .remove("query")
        .ok_or_else(|| MemoryError::validation("'query' parameter is required"))?;
    let n_results = take_param(&mut params, "n_results", DEFAULT_SEARCH_RESULTS)?;
    let n_results = bounded("n_results", n_results, 1, MAX_QUERY_RESULTS)?;
    let filter = MetadataFilter::from_query_params(params)?;

    let result = service
        .query(&collection, &query, n_results, &filter)
        .await?;
    Ok(Json(result))
}

/// Get an item by ID
#[utoipa::path(
    get,
    path = "/{collection}/{id}",
    tag = TAG,
    params(
        ("collection" = String, Path, description = "Logical collection name"),
        ("id" = String, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Item found", body = Item),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn get_item(
    _access: ReadAccess,
    State(service): State<Arc<MemoryService>>,
    Path((collection, id)): Path<(String, String)>,
) -> MemoryResult<Json<Item>> {
    let item = service.get(&collection, &id).await?;
    Ok(Json(item))
}

/// Update an item
///
/// Metadata keys are merged; keys not sent are kept.
#[utoipa::path(
    put,
    path = "/{collection}/{id}",
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
        (status = 403, response = ForbiddenResponse),
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
        .update(&collection, &id, patch, Origin::Module)
        .await?;
    Ok(Json(item))
}

/// Delete an item
#[utoipa::path(
    delete,
    path = "/{collection}/{id}",
    tag = TAG,
    params(
        ("collection" = String, Path, description = "Logical collection name"),
        ("id" = String, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Item deleted", body = MessageResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse),
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
