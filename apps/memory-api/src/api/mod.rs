use axum::{Router, middleware};
use axum_helpers::{require_bearer, require_credentials};
use domain_memory::handlers;

use crate::state::AppState;

pub mod auth;
pub mod health;
pub mod root;

/// Creates the API routes without the `/api` prefix.
/// The `/api` prefix will be added by the `create_router` helper.
///
/// Module, analysis, priority and suggestion routes accept bearer tokens only. SofIA routes also
/// accept the `X-API-Key` header.
pub fn routes(state: &AppState) -> Router {
    let bearer = || middleware::from_fn_with_state(state.auth.clone(), require_bearer);

    Router::new()
        .merge(root::router(state))
        .merge(auth::router(state))
        .nest(
            "/memory",
            handlers::modules::router(state.service.clone()).layer(bearer()),
        )
        .nest(
            "/analysis",
            handlers::analysis::router(state.service.clone()).layer(bearer()),
        )
        .nest(
            "/priorities",
            handlers::priorities::router(state.service.clone()).layer(bearer()),
        )
        .nest(
            "/suggestions",
            handlers::suggestions::router(state.service.clone()).layer(bearer()),
        )
        .nest(
            "/sofia",
            handlers::sofia::router(state.service.clone()).layer(middleware::from_fn_with_state(
                state.auth.clone(),
                require_credentials,
            )),
        )
}

/// Creates a router with the /ready endpoint that pings the vector store.
///
/// This router has state applied and can be merged with the stateless app router
/// from `create_router`.
pub fn ready_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .route("/ready", get(health::ready_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString},
    };
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use axum_helpers::{ApiKeyConfig, AuthGate, JwtConfig};
    use core_config::{app_info, server::ServerConfig};
    use domain_memory::embedding::EmbeddingBackend;
    use domain_memory::{
        CollectionRegistry, EmbeddingConfig, HashingEmbedder, InMemoryStore, MemoryService,
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt; // For oneshot()

    use super::*;
    use crate::config::{AuthUserConfig, Config, Environment};

    const SECRET: &str = "test-secret-with-at-least-32-characters";
    const API_KEY: &str = "sofia-test-key";
    const PASSWORD: &str = "correct horse battery staple";

    fn password_hash() -> String {
        let salt = SaltString::encode_b64(b"memory-api-tests").unwrap();
        Argon2::default()
            .hash_password(PASSWORD.as_bytes(), &salt)
            .unwrap()
            .to_string()
    }

    async fn state() -> AppState {
        let config = Config {
            app: app_info!(),
            server: ServerConfig::default(),
            environment: Environment::Development,
            jwt: JwtConfig::new(SECRET),
            api_key: ApiKeyConfig::new(API_KEY),
            auth: AuthUserConfig {
                username: "admin".to_string(),
                password_hash: password_hash(),
            },
            collections: CollectionRegistry::default(),
            embedding: EmbeddingConfig {
                backend: EmbeddingBackend::Hashing { dimension: 64 },
            },
            qdrant: None,
        };

        let service = MemoryService::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(HashingEmbedder::new(64)),
            config.collections.clone(),
        );
        service.ensure_collections().await.unwrap();

        let auth = AuthGate::new(&config.jwt, &config.api_key);
        AppState {
            config,
            service: Arc::new(service),
            auth,
        }
    }

    async fn app() -> Router {
        let state = state().await;
        routes(&state).merge(ready_router(state))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn token_request(form: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/token")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap()
    }

    async fn token(app: &Router, scope: Option<&str>) -> String {
        let mut form = format!("username=admin&password={}", PASSWORD.replace(' ', "+"));
        if let Some(scope) = scope {
            form.push_str(&format!("&scope={}", scope.replace(' ', "+")));
        }
        let (status, body) = send(app, token_request(&form)).await;
        assert_eq!(status, StatusCode::OK);
        body["access_token"].as_str().unwrap().to_string()
    }

    fn authed(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn with_api_key(key: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("x-api-key", key)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_root_lists_modules() {
        let app = app().await;
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (status, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "memory_api");
        assert_eq!(body["documentation"], "/swagger-ui");
        let endpoints: Vec<_> = body["modules"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["endpoint"].as_str().unwrap())
            .collect();
        assert_eq!(endpoints.len(), 11);
        assert!(endpoints.contains(&"/api/memory/identity"));
        assert!(endpoints.contains(&"/api/sofia"));
        assert!(endpoints.contains(&"/api/suggestions"));
    }

    #[tokio::test]
    async fn test_token_grants_all_scopes_by_default() {
        let app = app().await;
        let form = format!("username=admin&password={}", PASSWORD.replace(' ', "+"));
        let (status, body) = send(&app, token_request(&form)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "bearer");
        assert_eq!(body["expires_in"], 30 * 60);
        assert_eq!(body["scope"], "read write");
    }

    #[tokio::test]
    async fn test_token_rejects_wrong_credentials() {
        let app = app().await;
        for form in ["username=admin&password=nope", "username=root&password=correct"] {
            let (status, body) = send(&app, token_request(form)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body["message"], "Incorrect username or password");
        }
    }

    #[tokio::test]
    async fn test_bearer_token_reaches_module_routes() {
        let app = app().await;
        let token = token(&app, None).await;

        let (status, created) = send(
            &app,
            authed("POST", "/memory/identity", &token, Some(json!({"text": "likes tea"}))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let uri = format!("/memory/identity/{}", created["id"].as_str().unwrap());
        let (status, fetched) = send(&app, authed("GET", &uri, &token, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["text"], "likes tea");
    }

    #[tokio::test]
    async fn test_read_only_token_cannot_write() {
        let app = app().await;
        let token = token(&app, Some("read")).await;

        let (status, _) = send(&app, authed("GET", "/memory/business", &token, None)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            authed("POST", "/memory/business", &token, Some(json!({"text": "x"}))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_module_routes_reject_missing_or_bad_token() {
        let app = app().await;

        let request = Request::builder()
            .uri("/memory/identity")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, authed("GET", "/memory/identity", "garbage", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_api_key_only_opens_sofia_routes() {
        let app = app().await;

        let (status, item) = send(
            &app,
            with_api_key(API_KEY, "/sofia/store", json!({"text": "remember the milk"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(item["metadata"]["source"], "sofia");

        let (status, _) = send(
            &app,
            with_api_key("wrong", "/sofia/store", json!({"text": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            with_api_key(API_KEY, "/analysis/learnings/summary", json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_sofia_accepts_bearer_token() {
        let app = app().await;
        let token = token(&app, None).await;

        let (status, body) = send(
            &app,
            authed("POST", "/sofia/batch", &token, Some(json!({"operations": []}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_operations"], 0);
    }

    #[tokio::test]
    async fn test_priority_and_suggestion_routes_need_bearer() {
        let app = app().await;

        let (status, _) = send(
            &app,
            with_api_key(API_KEY, "/priorities/review", json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let read_only = token(&app, Some("read")).await;
        let (status, body) = send(
            &app,
            authed("POST", "/priorities/review", &read_only, Some(json!({}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["potential_duplicates"], json!([]));

        let (status, _) = send(
            &app,
            authed("POST", "/suggestions/generate", &read_only, Some(json!({}))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_ready_pings_store() {
        let app = app().await;
        let request = Request::builder().uri("/ready").body(Body::empty()).unwrap();
        let (status, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ready", "vector_store": "connected"}));
    }
}
