//! Authentication and authorization.
//!
//! Two credentials are accepted:
//! - `Authorization: Bearer <jwt>` issued by the token endpoint, carrying `read`/`write` scopes
//! - `X-API-Key: <key>` for the SofIA integration, granting both scopes
//!
//! The middlewares insert a [`Principal`] into request extensions. Handlers then
//! demand a scope through the [`ReadAccess`] / [`WriteAccess`] extractors.
//!
//! ```ignore
//! use axum_helpers::auth::{AuthGate, JwtConfig, ApiKeyConfig, require_bearer};
//! use core_config::FromEnv;
//!
//! let gate = AuthGate::new(&JwtConfig::from_env()?, &ApiKeyConfig::from_env()?);
//!
//! let protected = Router::new()
//!     .route("/memory/{collection}", get(list))
//!     .layer(axum::middleware::from_fn_with_state(gate, require_bearer));
//! ```

pub mod config;
pub mod jwt;
pub mod middleware;
pub mod principal;

pub use config::{ApiKeyConfig, JwtConfig};
pub use jwt::{IssuedToken, JwtAuth, JwtClaims, Scope};
pub use middleware::{AuthGate, require_bearer, require_credentials};
pub use principal::{Principal, PrincipalKind, ReadAccess, WriteAccess};
