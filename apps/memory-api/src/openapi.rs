use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(crate::api::root::root_info, crate::api::auth::issue_token),
    components(
        schemas(
            axum_helpers::ErrorResponse,
            crate::api::root::RootInfo,
            crate::api::root::ModuleLink,
            crate::api::auth::TokenRequest,
            crate::api::auth::TokenResponse
        )
    ),
    info(
        title = "Memory API",
        version = "0.1.0",
        description = "Collections of text items with semantic search, used as long-term memory by the SofIA assistant"
    ),
    servers(
        (url = "/api", description = "API base path")
    ),
    tags(
        (name = crate::api::root::TAG, description = "Service overview"),
        (name = crate::api::auth::TAG, description = "Access tokens")
    ),
    nest(
        (path = "/memory", api = domain_memory::handlers::ModuleApiDoc),
        (path = "/sofia", api = domain_memory::handlers::SofiaApiDoc),
        (path = "/analysis", api = domain_memory::handlers::AnalysisApiDoc),
        (path = "/priorities", api = domain_memory::handlers::PrioritiesApiDoc),
        (path = "/suggestions", api = domain_memory::handlers::SuggestionsApiDoc)
    )
)]
pub struct ApiDoc;
