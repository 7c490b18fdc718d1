mod config;
mod hashing;
mod openai;
mod provider;

pub use config::{EmbeddingBackend, EmbeddingConfig};
pub use hashing::HashingEmbedder;
pub use openai::{OpenAIConfig, OpenAIProvider};
pub use provider::EmbeddingProvider;

#[cfg(test)]
pub use provider::MockEmbeddingProvider;
