//! Memory Domain
//!
//! Named "memory" collections stored in a vector database, with per-collection
//! CRUD and semantic search, plus a batch/consolidation surface for the SofIA
//! assistant.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Handlers (modules / sofia / analysis /   │  ← HTTP endpoints, scope checks
//! │   priorities / suggestions)              │
//! └─────────────────────┬────────────────────┘
//!                       │
//! ┌─────────────────────▼────────────────────┐
//! │ MemoryService                            │  ← stamping, validation,
//! │   batch · consolidate · analysis         │    batch, consolidation
//! │   priorities · suggestions               │
//! └──────────┬──────────────────────┬────────┘
//!            │                      │
//! ┌──────────▼─────────┐  ┌─────────▼─────────┐
//! │ CollectionStore    │  │ EmbeddingProvider │
//! │ Qdrant / in-memory │  │ OpenAI / hashing  │
//! └────────────────────┘  └───────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use domain_memory::{
//!     CollectionRegistry, HashingEmbedder, InMemoryStore, MemoryService, handlers,
//! };
//!
//! # async fn run() -> domain_memory::MemoryResult<()> {
//! let service = MemoryService::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(HashingEmbedder::default()),
//!     CollectionRegistry::default(),
//! );
//! service.ensure_collections().await?;
//!
//! let service = Arc::new(service);
//! let router = axum::Router::new()
//!     .nest("/memory", handlers::modules::router(service.clone()))
//!     .nest("/sofia", handlers::sofia::router(service));
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod batch;
pub mod collections;
pub mod consolidate;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod models;
pub mod priorities;
pub mod service;
pub mod store;
pub mod suggestions;

pub use analysis::{
    ConnectionAnalysis, ConnectionAnalysisRequest, LearningSummary, LearningSummaryRequest,
};
pub use batch::{BatchBody, BatchReport, OperationError, OperationResult};
pub use collections::CollectionRegistry;
pub use consolidate::{ConsolidateRequest, ConsolidateResponse, ConsolidatedResult};
pub use embedding::{EmbeddingConfig, EmbeddingProvider, HashingEmbedder, OpenAIProvider};
pub use error::{MemoryError, MemoryResult};
pub use filter::{Condition, MetadataFilter};
pub use models::{Item, ItemList, ItemPatch, Metadata, MetadataValue, NewItem, QueryResult};
pub use priorities::{
    PriorityAdjustRequest, PriorityLevel, PriorityOptimization, PriorityOptimizeRequest,
    PriorityReview, PriorityReviewRequest,
};
pub use service::{MemoryService, Origin};
pub use store::{CollectionStore, InMemoryStore, QdrantConfig, QdrantStore};
pub use suggestions::{
    SuggestionAnalysisRequest, SuggestionRequest, SuggestionResult, SuggestionType,
};
