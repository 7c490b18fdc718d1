use std::sync::Arc;

use core_config::{ConfigError, FromEnv, env_optional, env_or_default, env_parse};

use super::hashing::DEFAULT_HASHING_DIMENSION;
use super::openai::{DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_DIMENSION, DEFAULT_OPENAI_MODEL};
use super::{EmbeddingProvider, HashingEmbedder, OpenAIConfig, OpenAIProvider};

#[derive(Debug, Clone)]
pub enum EmbeddingBackend {
    OpenAI(OpenAIConfig),
    Hashing { dimension: usize },
}

/// Embedding provider selection.
///
/// Loaded from environment variables:
/// - `EMBEDDING_PROVIDER` - `openai` or `hashing` (default: `openai` when `OPENAI_API_KEY` is set)
/// - `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `EMBEDDING_MODEL`
/// - `EMBEDDING_DIMENSION` (default: 1536 for openai, 384 for hashing)
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
}

impl EmbeddingConfig {
    pub fn dimension(&self) -> usize {
        match &self.backend {
            EmbeddingBackend::OpenAI(config) => config.dimension,
            EmbeddingBackend::Hashing { dimension } => *dimension,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self.backend {
            EmbeddingBackend::OpenAI(_) => "openai",
            EmbeddingBackend::Hashing { .. } => "hashing",
        }
    }

    pub fn build(self) -> Arc<dyn EmbeddingProvider> {
        match self.backend {
            EmbeddingBackend::OpenAI(config) => Arc::new(OpenAIProvider::new(config)),
            EmbeddingBackend::Hashing { dimension } => Arc::new(HashingEmbedder::new(dimension)),
        }
    }
}

impl FromEnv for EmbeddingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let api_key = env_optional("OPENAI_API_KEY");
        let provider = env_optional("EMBEDDING_PROVIDER")
            .map(|p| p.to_lowercase())
            .unwrap_or_else(|| {
                if api_key.is_some() { "openai" } else { "hashing" }.to_string()
            });

        let backend = match provider.as_str() {
            "openai" => {
                let api_key = api_key.ok_or_else(|| {
                    ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string())
                })?;
                let dimension = env_parse("EMBEDDING_DIMENSION", DEFAULT_OPENAI_DIMENSION)?;
                EmbeddingBackend::OpenAI(
                    OpenAIConfig::new(api_key)
                        .with_base_url(env_or_default("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL))
                        .with_model(
                            env_or_default("EMBEDDING_MODEL", DEFAULT_OPENAI_MODEL),
                            dimension,
                        ),
                )
            }
            "hashing" => EmbeddingBackend::Hashing {
                dimension: env_parse("EMBEDDING_DIMENSION", DEFAULT_HASHING_DIMENSION)?,
            },
            other => {
                return Err(ConfigError::ParseError {
                    key: "EMBEDDING_PROVIDER".to_string(),
                    details: format!("unknown provider '{other}', expected openai or hashing"),
                });
            }
        };

        let config = Self { backend };
        if config.dimension() == 0 {
            return Err(ConfigError::ParseError {
                key: "EMBEDDING_DIMENSION".to_string(),
                details: "must be positive".to_string(),
            });
        }
        Ok(config)
    }
}
