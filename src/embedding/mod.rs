//! Embedding client abstraction and adapters.
//!
//! Every adapter reports a `model_id` naming its embedding space (`provider:model`). Indexes
//! remember the id they were built with so queries can refuse vectors from another space.

mod ollama;
mod openai;

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use ollama::OllamaEmbeddingClient;
pub use openai::OpenAiEmbeddingClient;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),
    /// Provider answered with a non-success status.
    #[error("Embedding provider rejected the request: {0}")]
    Rejected(String),
    /// Provider answered with a body we could not use.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
    /// Provider did not answer within the configured bound.
    #[error("Embedding provider timed out after {0:?}")]
    Timeout(Duration),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Identity of the embedding space produced by this client.
    fn model_id(&self) -> &str;

    /// Produce an embedding vector for each supplied text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Run an embedding call bounded by `limit`, treating expiry as a provider error.
pub async fn embed_with_timeout(
    client: &dyn EmbeddingClient,
    texts: Vec<String>,
    limit: Duration,
) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
    match tokio::time::timeout(limit, client.generate_embeddings(texts)).await {
        Ok(result) => result,
        Err(_) => Err(EmbeddingClientError::Timeout(limit)),
    }
}

/// Check that a provider returned one finite vector of the expected width per input.
pub(crate) fn validate_embeddings(
    vectors: &[Vec<f32>],
    expected_count: usize,
    dimension: usize,
) -> Result<(), EmbeddingClientError> {
    if vectors.len() != expected_count {
        return Err(EmbeddingClientError::InvalidResponse(format!(
            "expected {expected_count} vectors, got {}",
            vectors.len()
        )));
    }
    for (idx, vector) in vectors.iter().enumerate() {
        if vector.len() != dimension {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "vector {idx} has dimension {}, expected {dimension}",
                vector.len()
            )));
        }
        if vector.iter().any(|value| !value.is_finite()) {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "vector {idx} contains non-finite values"
            )));
        }
    }
    Ok(())
}

/// Deterministic embedding client that hashes bytes into vector slots.
///
/// Needs no network access, which makes it the default for offline runs and tests.
pub struct LocalHashEmbedder {
    model_id: String,
    dimension: usize,
}

impl LocalHashEmbedder {
    /// Construct a hashing embedder producing vectors of `dimension` slots.
    pub fn new(dimension: usize) -> Self {
        Self {
            model_id: format!("local:hash-{dimension}"),
            dimension,
        }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        for word in text.split(|c: char| !c.is_alphanumeric()) {
            if word.is_empty() {
                continue;
            }
            let lowered = word.to_lowercase();
            let slot = fnv1a(lowered.as_bytes()) as usize % dimension;
            embedding[slot] += 1.0;
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

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl EmbeddingClient for LocalHashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::InvalidResponse(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }
}

/// Build an embedding client suitable for the supplied configuration.
pub fn build_embedding_client(
    config: &Config,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
    let client: Arc<dyn EmbeddingClient> = match config.embedding_provider {
        EmbeddingProvider::Local => Arc::new(LocalHashEmbedder::new(config.embedding_dimension)),
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbeddingClient::new(
            config.embedding_url.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
        )?),
        EmbeddingProvider::OpenAI => Arc::new(OpenAiEmbeddingClient::new(
            config.embedding_url.clone(),
            config.embedding_api_key.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
        )?),
    };
    tracing::info!(
        provider = ?config.embedding_provider,
        model_id = client.model_id(),
        dimension = config.embedding_dimension,
        "Embedding client initialized"
    );
    Ok(client)
}

pub(crate) fn http_client(agent: &str) -> Result<reqwest::Client, EmbeddingClientError> {
    reqwest::Client::builder()
        .user_agent(agent)
        .build()
        .map_err(|error| EmbeddingClientError::Unavailable(format!("HTTP client setup: {error}")))
}
