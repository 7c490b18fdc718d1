use std::sync::Arc;
use std::time::Duration;

use axum_helpers::AuthGate;
use axum_helpers::server::{create_production_app, health_router};
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_memory::{CollectionStore, InMemoryStore, MemoryService, QdrantStore};
use tracing::{info, warn};

mod api;
mod config;
mod openapi;
mod state;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Install color-eyre first for colored error output (before any fallible operations)
    install_color_eyre();

    // Load configuration from environment variables
    let config = Config::from_env()?;

    // Initialize tracing with ErrorLayer for span trace capture
    init_tracing(&config.environment);

    let store: Arc<dyn CollectionStore> = match &config.qdrant {
        Some(qdrant) => {
            info!("Connecting to Qdrant at {}", qdrant.url);
            Arc::new(QdrantStore::new(qdrant.clone())?)
        }
        None => {
            warn!("QDRANT_URL not set, items are kept in memory and lost on restart");
            Arc::new(InMemoryStore::new())
        }
    };

    info!(
        provider = config.embedding.provider_name(),
        dimension = config.embedding.dimension(),
        "Embedding provider configured"
    );
    let embedder = config.embedding.clone().build();

    let service = MemoryService::new(store, embedder, config.collections.clone());
    service
        .ensure_collections()
        .await
        .map_err(|e| eyre::eyre!("Failed to prepare collections: {}", e))?;

    let auth = AuthGate::new(&config.jwt, &config.api_key);

    let state = AppState {
        config,
        service: Arc::new(service),
        auth,
    };

    // Build router with API routes (pass reference, not ownership!)
    let api_routes = api::routes(&state);

    // create_router adds docs/middleware to our composed routes
    let router = axum_helpers::create_router::<openapi::ApiDoc>(api_routes)?;

    // - /health: liveness check with app name/version
    // - /ready: readiness check that pings the vector store
    let app = router
        .merge(health_router(state.config.app))
        .merge(api::ready_router(state.clone()));

    info!("Starting memory API with production-ready shutdown (30s timeout)");

    let server = state.config.server.clone();
    create_production_app(
        app,
        &server,
        Duration::from_secs(30), // 30s graceful shutdown timeout
        async move {
            drop(state);
            info!("Vector store client released");
        },
    )
    .await
    .map_err(|e| eyre::eyre!("Server error: {}", e))?;

    info!("Memory API shutdown complete");
    Ok(())
}
