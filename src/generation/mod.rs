//! Abstractions for answering prompts with hosted or local generative models.
//!
//! Both adapters issue plain HTTP requests and always ask for the most deterministic sampling
//! the provider supports (`temperature = 0`).

mod ollama;
mod openai;

use crate::config::{Config, GenerationProvider};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use ollama::OllamaGenerationClient;
pub use openai::OpenAiChatClient;

/// Errors surfaced while generating an answer.
#[derive(Debug, Error)]
pub enum GenerationClientError {
    /// Provider could not be reached.
    #[error("Generation provider unavailable: {0}")]
    Unavailable(String),
    /// Provider refused the configured credential.
    #[error("Generation provider rejected the credential: {0}")]
    Authentication(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Provider did not answer within the configured bound.
    #[error("Generation provider timed out after {0:?}")]
    Timeout(Duration),
}

/// Prompt passed to the generative provider.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Fully assembled prompt text.
    pub prompt: String,
}

/// Interface implemented by generative providers.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Model identifier used for logging.
    fn model_id(&self) -> &str;

    /// Generate a completion for the supplied prompt.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError>;
}

/// Run a generation call bounded by `limit`, treating expiry as a provider error.
pub async fn generate_with_timeout(
    client: &dyn GenerationClient,
    request: GenerationRequest,
    limit: Duration,
) -> Result<String, GenerationClientError> {
    match tokio::time::timeout(limit, client.generate(request)).await {
        Ok(result) => result,
        Err(_) => Err(GenerationClientError::Timeout(limit)),
    }
}

/// Build a generation client based on configuration.
pub fn build_generation_client(
    config: &Config,
) -> Result<Arc<dyn GenerationClient>, GenerationClientError> {
    let client: Arc<dyn GenerationClient> = match config.generation_provider {
        GenerationProvider::OpenAI => {
            let api_key = config.generation_api_key.clone().ok_or_else(|| {
                GenerationClientError::Authentication("GENERATION_API_KEY is not set".into())
            })?;
            Arc::new(OpenAiChatClient::new(
                config.generation_url.clone(),
                api_key,
                config.generation_model.clone(),
            )?)
        }
        GenerationProvider::Ollama => Arc::new(OllamaGenerationClient::new(
            config.generation_url.clone(),
            config.generation_model.clone(),
        )?),
    };
    tracing::info!(
        provider = ?config.generation_provider,
        model = client.model_id(),
        "Generation client initialized"
    );
    Ok(client)
}

pub(crate) fn http_client(agent: &str) -> Result<reqwest::Client, GenerationClientError> {
    reqwest::Client::builder()
        .user_agent(agent)
        .build()
        .map_err(|error| GenerationClientError::Unavailable(format!("HTTP client setup: {error}")))
}
