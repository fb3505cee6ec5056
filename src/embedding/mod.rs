//! Embedding providers that turn text into fixed-length vectors.
//!
//! Every provider checks the returned vector against the configured dimension so a model
//! swap cannot silently poison the chunk store.

mod ollama;
mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{Config, EmbeddingProvider};

pub use ollama::OllamaEmbeddingClient;
pub use openai::OpenAiEmbeddingClient;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached or constructed.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Returned vector length does not match configuration.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured on the server.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce the embedding vector for `text`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError>;
}

/// Build the embedding client selected by configuration.
pub fn embedding_client_from_config(
    config: &Config,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
    tracing::debug!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension = config.embedding_dimension,
        "Building embedding client"
    );
    let client: Arc<dyn EmbeddingClient> = match config.embedding_provider {
        EmbeddingProvider::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                EmbeddingClientError::ProviderUnavailable("OPENAI_API_KEY is not set".into())
            })?;
            Arc::new(OpenAiEmbeddingClient::new(
                &config.openai_base_url,
                api_key,
                &config.embedding_model,
                config.embedding_dimension,
            )?)
        }
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbeddingClient::new(
            &config.ollama_url,
            &config.embedding_model,
            config.embedding_dimension,
        )?),
        EmbeddingProvider::Hash => Arc::new(HashEmbeddingClient::new(config.embedding_dimension)),
    };
    Ok(client)
}

/// Deterministic offline embedding client that hashes bytes into vector slots.
///
/// Identical text always maps to the same unit vector, which keeps demos and tests
/// reproducible without a model.
#[derive(Debug, Clone)]
pub struct HashEmbeddingClient {
    dimension: usize,
}

impl HashEmbeddingClient {
    /// Construct a client producing vectors of `dimension` components.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self::encode(text, self.dimension))
    }
}

pub(crate) fn check_dimension(
    vector: Vec<f32>,
    expected: usize,
) -> Result<Vec<f32>, EmbeddingClientError> {
    if vector.is_empty() {
        return Err(EmbeddingClientError::InvalidResponse(
            "provider returned an empty vector".into(),
        ));
    }
    if vector.len() != expected {
        return Err(EmbeddingClientError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(vector)
}
