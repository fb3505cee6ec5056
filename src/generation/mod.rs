//! Streaming chat-completion providers.
//!
//! A provider takes an ordered list of prompt messages and returns a stream of text
//! fragments. Dropping the stream closes the underlying HTTP response.

mod ollama;
mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{Config, GenerationProvider};

pub use ollama::OllamaChatClient;
pub use openai::OpenAiChatClient;

/// Author of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    /// Instructions that frame the conversation.
    System,
    /// User input.
    User,
    /// Earlier model output.
    Assistant,
}

/// Single message sent to the chat model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Author of the message.
    pub role: PromptRole,
    /// Message text.
    pub content: String,
}

impl PromptMessage {
    /// Convenience constructor.
    pub fn new(role: PromptRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Sampling parameters applied to every completion.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

impl GenerationSettings {
    /// Read generation parameters from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.generation_model.clone(),
            temperature: config.generation_temperature,
            max_tokens: config.generation_max_tokens,
        }
    }
}

/// Errors surfaced while requesting or streaming a completion.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Provider could not be reached or constructed.
    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider rejected the request or reported an error mid-stream.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider output could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Transport failed while the response was streaming.
    #[error("Completion stream interrupted: {0}")]
    Stream(String),
}

/// Ordered text fragments produced by a provider.
pub type TokenStream = BoxStream<'static, Result<String, GenerationError>>;

/// Interface implemented by streaming chat backends.
#[async_trait]
pub trait ChatCompletionClient: Send + Sync {
    /// Start a completion for `messages`. Resolves once the provider accepted the request.
    async fn stream_chat(&self, messages: Vec<PromptMessage>)
    -> Result<TokenStream, GenerationError>;
}

/// Build the chat client selected by configuration.
pub fn chat_client_from_config(
    config: &Config,
) -> Result<Arc<dyn ChatCompletionClient>, GenerationError> {
    let settings = GenerationSettings::from_config(config);
    tracing::debug!(
        provider = ?config.generation_provider,
        model = %settings.model,
        "Building chat client"
    );
    let client: Arc<dyn ChatCompletionClient> = match config.generation_provider {
        GenerationProvider::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                GenerationError::ProviderUnavailable("OPENAI_API_KEY is not set".into())
            })?;
            Arc::new(OpenAiChatClient::new(
                &config.openai_base_url,
                api_key,
                settings,
            )?)
        }
        GenerationProvider::Ollama => Arc::new(OllamaChatClient::new(&config.ollama_url, settings)?),
    };
    Ok(client)
}

/// Splits a byte stream into complete lines, holding partial lines across chunks.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append `chunk` and return every line it completed, without terminators.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(position) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=position).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            lines.push(text.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Return the trailing line left when the stream ended without a newline.
    pub(crate) fn finish(self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.pending);
        let text = text.trim_end_matches('\r');
        (!text.trim().is_empty()).then(|| text.to_string())
    }
}
