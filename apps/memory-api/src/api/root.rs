use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

pub const TAG: &str = "info";

const DESCRIPTION: &str = "Long-term memory for the SofIA assistant";
const DOCUMENTATION: &str = "/swagger-ui";

#[derive(Debug, Serialize, ToSchema)]
pub struct ModuleLink {
    pub name: String,
    pub endpoint: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RootInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub documentation: &'static str,
    pub modules: Vec<ModuleLink>,
}

pub fn router(state: &AppState) -> Router {
    Router::new()
        .route("/", get(root_info))
        .with_state(state.clone())
}

/// Service name, version, and entry points
#[utoipa::path(
    get,
    path = "/",
    tag = TAG,
    responses((status = 200, description = "API overview", body = RootInfo))
)]
pub async fn root_info(State(state): State<AppState>) -> Json<RootInfo> {
    let link = |name: &str, endpoint: String| ModuleLink {
        name: name.to_string(),
        endpoint,
    };

    let mut modules: Vec<_> = state
        .service
        .registry()
        .as_map()
        .keys()
        .map(|logical| link(logical, format!("/api/memory/{logical}")))
        .collect();
    modules.push(link("sofia", "/api/sofia".to_string()));
    modules.push(link("analysis", "/api/analysis".to_string()));
    modules.push(link("priorities", "/api/priorities".to_string()));
    modules.push(link("suggestions", "/api/suggestions".to_string()));

    Json(RootInfo {
        name: state.config.app.name,
        version: state.config.app.version,
        description: DESCRIPTION,
        documentation: DOCUMENTATION,
        modules,
    })
}
