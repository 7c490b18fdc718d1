use argon2::password_hash::PasswordHash;
use axum_helpers::{ApiKeyConfig, JwtConfig};
use core_config::{
    AppInfo, ConfigError, FromEnv, app_info, env_optional, env_or_default, env_required,
    server::ServerConfig,
};
use domain_memory::{CollectionRegistry, EmbeddingConfig, QdrantConfig};

// Re-export Environment for use in other modules
pub use core_config::Environment;

/// The single user allowed to request tokens with a password.
///
/// Loaded from environment variables:
/// - `AUTH_USERNAME` (default: admin)
/// - `AUTH_PASSWORD_HASH` (required) - argon2 PHC string
#[derive(Clone, Debug)]
pub struct AuthUserConfig {
    pub username: String,
    pub password_hash: String,
}

impl FromEnv for AuthUserConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let username = env_or_default("AUTH_USERNAME", "admin");
        let password_hash = env_required("AUTH_PASSWORD_HASH")?;

        PasswordHash::new(&password_hash).map_err(|e| ConfigError::ParseError {
            key: "AUTH_PASSWORD_HASH".to_string(),
            details: format!("not a PHC password hash: {e}"),
        })?;

        Ok(Self {
            username,
            password_hash,
        })
    }
}

/// Application-specific configuration
/// Composes shared config components from the `config` library and the memory domain
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub server: ServerConfig,
    pub environment: Environment,
    pub jwt: JwtConfig,
    pub api_key: ApiKeyConfig,
    pub auth: AuthUserConfig,
    pub collections: CollectionRegistry,
    pub embedding: EmbeddingConfig,
    /// `None` runs on the in-memory store
    pub qdrant: Option<QdrantConfig>,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let environment = Environment::from_env();
        let server = ServerConfig::from_env()?; // Uses defaults: HOST=0.0.0.0, PORT=8080
        let jwt = JwtConfig::from_env()?; // Required - will fail if not set
        let api_key = ApiKeyConfig::from_env()?;
        let auth = AuthUserConfig::from_env()?;
        let collections = CollectionRegistry::from_env()?;
        let embedding = EmbeddingConfig::from_env()?;
        let qdrant = match env_optional("QDRANT_URL") {
            Some(_) => Some(QdrantConfig::from_env()?),
            None => None,
        };

        Ok(Self {
            app: app_info!(),
            server,
            environment,
            jwt,
            api_key,
            auth,
            collections,
            embedding,
            qdrant,
        })
    }
}
