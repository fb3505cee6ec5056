use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{
    ChatCompletionClient, GenerationError, GenerationSettings, LineBuffer, PromptMessage,
    TokenStream,
};

/// Streaming client for OpenAI `/chat/completions` and compatible servers.
pub struct OpenAiChatClient {
    http: Client,
    base_url: String,
    api_key: String,
    settings: GenerationSettings,
}

impl OpenAiChatClient {
    /// Build a client against `base_url` (for example `https://api.openai.com/v1`).
    pub fn new(
        base_url: &str,
        api_key: String,
        settings: GenerationSettings,
    ) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .user_agent("pdfchat/chat")
            .build()
            .map_err(|error| GenerationError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            settings,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ProviderError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    message: String,
}

#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Token(String),
    Done,
    Skip,
}

/// Interpret one line of an OpenAI event stream.
fn parse_sse_line(line: &str) -> Result<SseLine, GenerationError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(SseLine::Skip);
    }
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let chunk: CompletionChunk = serde_json::from_str(data)
        .map_err(|error| GenerationError::InvalidResponse(format!("bad stream chunk: {error}")))?;
    if let Some(error) = chunk.error {
        return Err(GenerationError::GenerationFailed(error.message));
    }

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty());
    Ok(content.map_or(SseLine::Skip, SseLine::Token))
}

#[async_trait]
impl ChatCompletionClient for OpenAiChatClient {
    async fn stream_chat(
        &self,
        messages: Vec<PromptMessage>,
    ) -> Result<TokenStream, GenerationError> {
        let payload = json!({
            "model": self.settings.model,
            "messages": messages,
            "stream": true,
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, model = %self.settings.model, "Chat completion rejected");
            return Err(GenerationError::GenerationFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let mut bytes = response.bytes_stream();
        let stream = try_stream! {
            let mut lines = LineBuffer::default();
            let mut finished = false;
            while !finished {
                let Some(chunk) = bytes.next().await else {
                    break;
                };
                let chunk = chunk.map_err(|error| GenerationError::Stream(error.to_string()))?;
                for line in lines.push(&chunk) {
                    match parse_sse_line(&line)? {
                        SseLine::Token(token) => yield token,
                        SseLine::Done => {
                            finished = true;
                            break;
                        }
                        SseLine::Skip => {}
                    }
                }
            }
            if !finished {
                if let Some(line) = lines.finish() {
                    if let SseLine::Token(token) = parse_sse_line(&line)? {
                        yield token;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
