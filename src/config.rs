use serde::Deserialize;
use std::env;
use thiserror::Error;

const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
const DEFAULT_GENERATION_MODEL: &str = "gpt-4o";
const DEFAULT_GENERATION_TEMPERATURE: f32 = 0.3;
const DEFAULT_GENERATION_MAX_TOKENS: u32 = 2048;
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_QDRANT_COLLECTION: &str = "pdfchat-chunks";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_INGESTION_CONCURRENCY: usize = 4;

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

/// Runtime configuration for the pdfchat server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Embedding provider used to vectorize chunks and questions.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Chat model provider used to stream answers.
    pub generation_provider: GenerationProvider,
    /// Chat model identifier.
    pub generation_model: String,
    /// Sampling temperature for answers.
    pub generation_temperature: f32,
    /// Upper bound on generated tokens per answer.
    pub generation_max_tokens: u32,
    /// API key for OpenAI-compatible endpoints.
    pub openai_api_key: Option<String>,
    /// Base URL for OpenAI-compatible endpoints.
    pub openai_base_url: String,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Qdrant base URL; chunks stay in memory when unset.
    pub qdrant_url: Option<String>,
    /// Qdrant collection holding document chunks.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: usize,
    /// Number of documents ingested concurrently.
    pub ingestion_concurrency: usize,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Deterministic offline hashing, useful for demos and tests.
    Hash,
}

/// Supported streaming chat backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI chat completions API.
    OpenAI,
}

impl Config {
    /// Load `.env` (when present) and then read configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Log the effective settings. Call once tracing is installed.
    pub fn log_summary(&self) {
        tracing::info!(
            embedding_provider = ?self.embedding_provider,
            embedding_model = %self.embedding_model,
            embedding_dimension = self.embedding_dimension,
            generation_provider = ?self.generation_provider,
            generation_model = %self.generation_model,
            qdrant_url = ?self.qdrant_url,
            server_port = ?self.server_port,
            ingestion_concurrency = self.ingestion_concurrency,
            "Loaded configuration"
        );
    }

    /// Read configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Lookup(lookup);
        let config = Self {
            embedding_provider: vars.required("EMBEDDING_PROVIDER")?.parse().map_err(|()| {
                ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string())
            })?,
            embedding_model: vars
                .optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension: vars
                .parsed("EMBEDDING_DIMENSION")?
                .unwrap_or(DEFAULT_EMBEDDING_DIMENSION),
            generation_provider: vars.required("GENERATION_PROVIDER")?.parse().map_err(
                |()| ConfigError::InvalidValue("GENERATION_PROVIDER".to_string()),
            )?,
            generation_model: vars
                .optional("GENERATION_MODEL")
                .unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string()),
            generation_temperature: vars
                .parsed("GENERATION_TEMPERATURE")?
                .unwrap_or(DEFAULT_GENERATION_TEMPERATURE),
            generation_max_tokens: vars
                .parsed("GENERATION_MAX_TOKENS")?
                .unwrap_or(DEFAULT_GENERATION_MAX_TOKENS),
            openai_api_key: vars.optional("OPENAI_API_KEY"),
            openai_base_url: vars
                .optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            ollama_url: vars
                .optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            qdrant_url: vars.optional("QDRANT_URL"),
            qdrant_collection_name: vars
                .optional("QDRANT_COLLECTION_NAME")
                .unwrap_or_else(|| DEFAULT_QDRANT_COLLECTION.to_string()),
            qdrant_api_key: vars.optional("QDRANT_API_KEY"),
            server_port: vars.parsed("SERVER_PORT")?,
            max_upload_bytes: vars
                .parsed("MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            ingestion_concurrency: vars
                .parsed("INGESTION_CONCURRENCY")?
                .unwrap_or(DEFAULT_INGESTION_CONCURRENCY),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.ingestion_concurrency == 0 {
            return Err(ConfigError::InvalidValue("INGESTION_CONCURRENCY".into()));
        }
        let needs_openai = self.embedding_provider == EmbeddingProvider::OpenAI
            || self.generation_provider == GenerationProvider::OpenAI;
        if needs_openai && self.openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".into()));
        }
        Ok(())
    }
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.optional(key)
            .map(|value| {
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(key.to_string()))
            })
            .transpose()
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for GenerationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}
