//! Password-grant token endpoint.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordVerifier},
};
use axum::{Form, Json, Router, extract::State, routing::post};
use axum_helpers::{
    AppError, Scope,
    errors::responses::{InternalServerErrorResponse, UnauthorizedResponse},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::AppState;

pub const TAG: &str = "auth";

const INVALID_CREDENTIALS: &str = "Incorrect username or password";

/// OAuth2 password-grant form.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
    /// Space-separated scopes; both `read` and `write` when absent
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Seconds until the token expires
    pub expires_in: i64,
    pub scope: String,
}

pub fn router(state: &AppState) -> Router {
    Router::new()
        .route("/token", post(issue_token))
        .with_state(state.clone())
}

fn password_matches(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("Configured password hash is unreadable: {}", e);
            false
        }
    }
}

/// Exchange a username and password for an access token
#[utoipa::path(
    post,
    path = "/token",
    tag = TAG,
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
pub async fn issue_token(
    State(state): State<AppState>,
    Form(request): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let user = &state.config.auth;
    if request.username != user.username || !password_matches(&request.password, &user.password_hash)
    {
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    let scopes = Scope::resolve_requested(request.scope.as_deref());
    let issued = state
        .auth
        .jwt()
        .create_access_token(&request.username, &scopes)
        .map_err(|e| {
            tracing::error!("Failed to create access token: {:?}", e);
            AppError::InternalServerError("Failed to create token".to_string())
        })?;

    tracing::info!(subject = %request.username, ?scopes, "Issued access token");

    Ok(Json(TokenResponse {
        access_token: issued.token,
        token_type: "bearer".to_string(),
        expires_in: issued.expires_in,
        scope: scopes
            .iter()
            .map(Scope::to_string)
            .collect::<Vec<_>>()
            .join(" "),
    }))
}
