use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{
    ChatCompletionClient, GenerationError, GenerationSettings, LineBuffer, PromptMessage,
    TokenStream,
};

/// Streaming chat client for the Ollama `/api/chat` endpoint.
///
/// Ollama streams newline-delimited JSON objects and marks the last one with `done: true`.
pub struct OllamaChatClient {
    http: Client,
    base_url: String,
    settings: GenerationSettings,
}

impl OllamaChatClient {
    /// Build a client against the Ollama base URL.
    pub fn new(base_url: &str, settings: GenerationSettings) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .user_agent("pdfchat/chat")
            .build()
            .map_err(|error| GenerationError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            settings,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

/// Parse one NDJSON line into an optional token and the `done` flag.
fn parse_chunk_line(line: &str) -> Result<(Option<String>, bool), GenerationError> {
    if line.trim().is_empty() {
        return Ok((None, false));
    }
    let chunk: ChatChunk = serde_json::from_str(line).map_err(|error| {
        GenerationError::InvalidResponse(format!("failed to decode Ollama chunk: {error}"))
    })?;
    if let Some(error) = chunk.error {
        return Err(GenerationError::GenerationFailed(error));
    }
    let token = chunk
        .message
        .map(|message| message.content)
        .filter(|content| !content.is_empty());
    Ok((token, chunk.done))
}

#[async_trait]
impl ChatCompletionClient for OllamaChatClient {
    async fn stream_chat(
        &self,
        messages: Vec<PromptMessage>,
    ) -> Result<TokenStream, GenerationError> {
        let payload = json!({
            "model": self.settings.model,
            "messages": messages,
            "stream": true,
            "options": {
                "temperature": self.settings.temperature,
                "num_predict": self.settings.max_tokens,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
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
                    let (token, done) = parse_chunk_line(&line)?;
                    if let Some(token) = token {
                        yield token;
                    }
                    if done {
                        finished = true;
                        break;
                    }
                }
            }
            if !finished {
                if let Some(line) = lines.finish() {
                    let (token, _) = parse_chunk_line(&line)?;
                    if let Some(token) = token {
                        yield token;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::PromptRole;
    use httpmock::{Method::POST, MockServer};

    fn client_for(server: &MockServer) -> OllamaChatClient {
        OllamaChatClient::new(
            &server.base_url(),
            GenerationSettings {
                model: "llama3".into(),
                temperature: 0.3,
                max_tokens: 128,
            },
        )
        .expect("client")
    }

    #[tokio::test]
    async fn streams_ndjson_tokens() {
        let server = MockServer::start_async().await;
        let body = [
            r#"{"message":{"role":"assistant","content":"Hi"},"done":false}"#,
            r#"{"message":{"role":"assistant","content":""},"done":false}"#,
            r#"{"message":{"role":"assistant","content":" there"},"done":false}"#,
            r#"{"message":{"role":"assistant","content":""},"done":true}"#,
        ]
        .join("\n");

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/chat")
                    .body_contains("\"num_predict\":128");
                then.status(200).body(body);
            })
            .await;

        let stream = client_for(&server)
            .stream_chat(vec![PromptMessage::new(PromptRole::User, "hello")])
            .await
            .expect("stream");
        let tokens: Vec<String> = stream.map(|token| token.expect("token")).collect().await;

        mock.assert();
        assert_eq!(tokens, vec!["Hi", " there"]);
    }

    #[tokio::test]
    async fn mid_stream_error_ends_with_failure() {
        let server = MockServer::start_async().await;
        let body = [
            r#"{"message":{"content":"partial"},"done":false}"#,
            r#"{"error":"model crashed"}"#,
        ]
        .join("\n");
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(200).body(body);
            })
            .await;

        let stream = client_for(&server)
            .stream_chat(Vec::new())
            .await
            .expect("stream");
        let items: Vec<Result<String, GenerationError>> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().expect("token"), "partial");
        assert!(matches!(&items[1], Err(GenerationError::GenerationFailed(message)) if message == "model crashed"));
    }

    #[tokio::test]
    async fn unterminated_final_line_is_still_delivered() {
        let server = MockServer::start_async().await;
        let body = [
            r#"{"message":{"content":"one"},"done":false}"#,
            r#"{"message":{"content":" two"},"done":false}"#,
        ]
        .join("\n");
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(200).body(body);
            })
            .await;

        let tokens: Vec<String> = client_for(&server)
            .stream_chat(Vec::new())
            .await
            .expect("stream")
            .map(|token| token.expect("token"))
            .collect()
            .await;
        assert_eq!(tokens, vec!["one", " two"]);
    }

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(parse_chunk_line("   ").unwrap(), (None, false));
    }
}
