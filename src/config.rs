use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;
const DEFAULT_TOP_K: usize = 4;
const DEFAULT_ANSWER_CONCURRENCY: usize = 4;
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 64;
const DEFAULT_EMBEDDING_TIMEOUT_SECS: u64 = 30;
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the proposal analyzer.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Embedding provider used to vectorize chunks and questions.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Optional base URL override for the embedding provider.
    pub embedding_url: Option<String>,
    /// Optional bearer credential for hosted embedding APIs.
    pub embedding_api_key: Option<String>,
    /// Generative provider used to answer questions.
    pub generation_provider: GenerationProvider,
    /// Optional base URL override for the generative provider.
    pub generation_url: Option<String>,
    /// Bearer credential for hosted generation APIs.
    pub generation_api_key: Option<String>,
    /// Generative model identifier.
    pub generation_model: String,
    /// Maximum chunk length in characters.
    pub text_splitter_chunk_size: usize,
    /// Characters shared by consecutive chunks of the same segment.
    pub text_splitter_chunk_overlap: usize,
    /// Number of chunks retrieved per question.
    pub retrieval_top_k: usize,
    /// Upper bound on concurrently answered questions within one request.
    pub answer_concurrency: usize,
    /// Maximum chunks sent to the embedding provider per call.
    pub embedding_batch_size: usize,
    /// Bound on every embedding call.
    pub embedding_timeout: Duration,
    /// Bound on every generation call.
    pub generation_timeout: Duration,
    /// Replacement for the built-in default question set.
    pub default_questions: Option<Vec<String>>,
    /// Request body limit applied to uploads.
    pub max_upload_bytes: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic in-process hashing embedder.
    Local,
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI-compatible embeddings API.
    OpenAI,
}

/// Supported generative backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// Hosted OpenAI-compatible chat completions API (Groq, OpenAI, ...).
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let generation_provider = match load_env_optional("GENERATION_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("GENERATION_PROVIDER".into()))?,
            None => GenerationProvider::OpenAI,
        };
        let generation_api_key = load_env_optional("GENERATION_API_KEY");
        if generation_provider == GenerationProvider::OpenAI && generation_api_key.is_none() {
            return Err(ConfigError::MissingVariable("GENERATION_API_KEY".into()));
        }

        let embedding_dimension: usize = load_env("EMBEDDING_DIMENSION")?
            .parse()
            .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()))?;
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }

        let text_splitter_chunk_size =
            parse_optional("TEXT_SPLITTER_CHUNK_SIZE")?.unwrap_or(DEFAULT_CHUNK_SIZE);
        let text_splitter_chunk_overlap =
            parse_optional("TEXT_SPLITTER_CHUNK_OVERLAP")?.unwrap_or(DEFAULT_CHUNK_OVERLAP);
        if text_splitter_chunk_overlap >= text_splitter_chunk_size {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_OVERLAP".into(),
            ));
        }

        let retrieval_top_k = parse_optional("RETRIEVAL_TOP_K")?.unwrap_or(DEFAULT_TOP_K);
        if retrieval_top_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVAL_TOP_K".into()));
        }
        let answer_concurrency =
            parse_optional("ANSWER_CONCURRENCY")?.unwrap_or(DEFAULT_ANSWER_CONCURRENCY);
        if answer_concurrency == 0 {
            return Err(ConfigError::InvalidValue("ANSWER_CONCURRENCY".into()));
        }

        let embedding_batch_size =
            parse_optional("EMBEDDING_BATCH_SIZE")?.unwrap_or(DEFAULT_EMBEDDING_BATCH_SIZE);
        if embedding_batch_size == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_BATCH_SIZE".into()));
        }

        let default_questions = load_env_optional("DEFAULT_QUESTIONS")
            .map(|raw| {
                parse_question_list(&raw)
                    .ok_or_else(|| ConfigError::InvalidValue("DEFAULT_QUESTIONS".into()))
            })
            .transpose()?;

        Ok(Self {
            embedding_provider: load_env("EMBEDDING_PROVIDER")?
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))?,
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension,
            embedding_url: load_env_optional("EMBEDDING_URL"),
            embedding_api_key: load_env_optional("EMBEDDING_API_KEY"),
            generation_provider,
            generation_url: load_env_optional("GENERATION_URL"),
            generation_api_key,
            generation_model: load_env("GENERATION_MODEL")?,
            text_splitter_chunk_size,
            text_splitter_chunk_overlap,
            retrieval_top_k,
            answer_concurrency,
            embedding_batch_size,
            embedding_timeout: Duration::from_secs(
                parse_optional("EMBEDDING_TIMEOUT_SECS")?
                    .unwrap_or(DEFAULT_EMBEDDING_TIMEOUT_SECS),
            ),
            generation_timeout: Duration::from_secs(
                parse_optional("GENERATION_TIMEOUT_SECS")?
                    .unwrap_or(DEFAULT_GENERATION_TIMEOUT_SECS),
            ),
            default_questions,
            max_upload_bytes: parse_optional("MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            server_port: parse_optional("SERVER_PORT")?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Parse a JSON array of non-blank strings, returning `None` when the shape is wrong.
fn parse_question_list(raw: &str) -> Option<Vec<String>> {
    let questions: Vec<String> = serde_json::from_str(raw).ok()?;
    if questions.is_empty() || questions.iter().any(|question| question.trim().is_empty()) {
        return None;
    }
    Some(questions)
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for GenerationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "groq" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        generation_provider = ?config.generation_provider,
        generation_model = %config.generation_model,
        chunk_size = config.text_splitter_chunk_size,
        chunk_overlap = config.text_splitter_chunk_overlap,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
