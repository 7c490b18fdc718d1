use super::{
    config::{ApiKeyConfig, JwtConfig},
    jwt::JwtAuth,
    principal::Principal,
};
use crate::{errors::AppError, http::cors::API_KEY_HEADER};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};

/// Subject recorded for callers authenticated by API key.
pub const SERVICE_SUBJECT: &str = "sofia";

/// Shared state for the auth middlewares.
#[derive(Clone)]
pub struct AuthGate {
    jwt: JwtAuth,
    api_key_digest: Option<[u8; 32]>,
}

impl AuthGate {
    pub fn new(jwt: &JwtConfig, api_key: &ApiKeyConfig) -> Self {
        if api_key.key.is_none() {
            tracing::info!("SOFIA_API_KEY not set, API key authentication disabled");
        }
        Self {
            jwt: JwtAuth::new(jwt),
            api_key_digest: api_key.key.as_deref().map(digest),
        }
    }

    pub fn jwt(&self) -> &JwtAuth {
        &self.jwt
    }

    /// Compares digests so the check does not short-circuit on the key's prefix.
    fn api_key_matches(&self, candidate: &str) -> bool {
        self.api_key_digest
            .is_some_and(|expected| expected == digest(candidate))
    }

    fn principal_from_bearer(&self, headers: &HeaderMap) -> Result<Principal, Response> {
        let token = extract_bearer_token(headers).ok_or_else(|| {
            tracing::debug!("No bearer token in Authorization header");
            unauthorized("Not authenticated")
        })?;

        let claims = self.jwt.verify_token(token).map_err(|e| {
            tracing::debug!("JWT verification failed: {}", e);
            unauthorized("Could not validate credentials")
        })?;

        Ok(Principal::user(claims.sub, claims.scopes))
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| {
            auth.strip_prefix("Bearer ")
                .or_else(|| auth.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn unauthorized(message: &str) -> Response {
    let mut response = AppError::Unauthorized(message.to_string()).into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}

/// Requires a valid bearer token.
///
/// Inserts the token's [`Principal`] into request extensions on success.
///
/// ```ignore
/// let protected = Router::new()
///     .route("/memory/{collection}", get(list))
///     .layer(axum::middleware::from_fn_with_state(gate, require_bearer));
/// ```
pub async fn require_bearer(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Response {
    match gate.principal_from_bearer(request.headers()) {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(response) => response,
    }
}

/// Requires either a valid `X-API-Key` or a valid bearer token.
///
/// A present but wrong API key is rejected even if a bearer token is also sent.
pub async fn require_credentials(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let principal = match api_key {
        Some(key) if gate.api_key_matches(&key) => Principal::service(SERVICE_SUBJECT),
        Some(_) => {
            tracing::debug!("Rejected request with invalid API key");
            return AppError::Unauthorized("Invalid API key".to_string()).into_response();
        }
        None => match gate.principal_from_bearer(request.headers()) {
            Ok(principal) => principal,
            Err(response) => return response,
        },
    };

    request.extensions_mut().insert(principal);
    next.run(request).await
}
