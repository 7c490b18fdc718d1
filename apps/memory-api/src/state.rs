//! Application state management.
//!
//! This module defines the shared application state passed to the app-level handlers.
//! The domain routers receive the [`MemoryService`] directly.

use std::sync::Arc;

use axum_helpers::AuthGate;
use domain_memory::MemoryService;

/// Shared application state.
///
/// Cloned per handler; every field is an `Arc` or holds one.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration loaded from environment variables
    pub config: crate::config::Config,
    /// Item facade over the vector store and embedder
    pub service: Arc<MemoryService>,
    /// Token issuer and verifier shared by the auth middlewares
    pub auth: AuthGate,
}
