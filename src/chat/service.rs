//! Question answering: embed, retrieve, prompt, stream.

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::stream;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;

use super::prompt::{build_context, build_messages, system_prompt};
use super::{ChatError, ChatEvent, ChatRequest, ChatSettings};
use crate::embedding::EmbeddingClient;
use crate::generation::ChatCompletionClient;
use crate::metrics::PipelineMetrics;
use crate::models::{ChatMessage, ChunkMatch};
use crate::storage::{ChunkSearch, DocumentStore, SearchQuery};

/// Answer events in delivery order. An `Err` item ends the stream.
pub type ChatStream = BoxStream<'static, Result<ChatEvent, ChatError>>;

/// Retrieval-augmented answering over stored chunks.
///
/// Matches are only used when their document still exists, so chunks left behind by a
/// deleted document never reach a prompt.
pub struct ChatPipeline {
    embedder: Arc<dyn EmbeddingClient>,
    search: Arc<dyn ChunkSearch>,
    documents: Arc<dyn DocumentStore>,
    generator: Arc<dyn ChatCompletionClient>,
    metrics: Arc<PipelineMetrics>,
    settings: ChatSettings,
}

impl ChatPipeline {
    /// Wire a pipeline from its collaborators.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        search: Arc<dyn ChunkSearch>,
        documents: Arc<dyn DocumentStore>,
        generator: Arc<dyn ChatCompletionClient>,
        metrics: Arc<PipelineMetrics>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            embedder,
            search,
            documents,
            generator,
            metrics,
            settings,
        }
    }

    /// Start answering `request`.
    ///
    /// Validation, embedding, retrieval, and the start of generation happen before this
    /// returns, so their failures surface as `Err` with nothing streamed. Once the stream is
    /// returned it yields the sources, the answer fragments, and `done`; a provider failure
    /// mid-answer yields a final `Err` instead of `done`. Dropping the stream stops pulling
    /// from the provider.
    pub async fn stream_answer(&self, request: ChatRequest) -> Result<ChatStream, ChatError> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(ChatError::Validation("Message is required".into()));
        }
        let document_id = request
            .document_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        self.metrics.record_chat();
        tracing::info!(document_id = ?document_id, history = request.history.len(), "Answering question");

        let vector = self.embedder.embed(question).await?;
        let found = self
            .search
            .match_chunks(SearchQuery {
                vector,
                similarity_floor: self.settings.similarity_floor,
                limit: self.settings.match_limit,
                document_id,
            })
            .await?;
        let sources = self.known_documents_only(found).await?;
        tracing::debug!(matches = sources.len(), "Retrieved context chunks");

        let context = build_context(&sources);
        let messages = build_messages(
            system_prompt(&context),
            &request.history,
            question,
            self.settings.history_limit,
        );
        let mut tokens = self.generator.stream_chat(messages).await?;

        let events = stream! {
            yield Ok(ChatEvent::Sources { sources });
            while let Some(token) = tokens.next().await {
                match token {
                    Ok(content) if content.is_empty() => {}
                    Ok(content) => yield Ok(ChatEvent::Text { content }),
                    Err(error) => {
                        tracing::error!(error = %error, "Answer stream broke off");
                        yield Err(ChatError::Generation(error));
                        return;
                    }
                }
            }
            yield Ok(ChatEvent::Done);
        };

        Ok(Box::pin(events))
    }

    async fn known_documents_only(
        &self,
        found: Vec<ChunkMatch>,
    ) -> Result<Vec<ChunkMatch>, ChatError> {
        let mut known: HashMap<String, bool> = HashMap::new();
        let mut kept = Vec::with_capacity(found.len());
        for candidate in found {
            let exists = match known.get(&candidate.document_id) {
                Some(exists) => *exists,
                None => {
                    let exists = self.documents.get(&candidate.document_id).await?.is_some();
                    known.insert(candidate.document_id.clone(), exists);
                    exists
                }
            };
            if exists {
                kept.push(candidate);
            } else {
                tracing::debug!(
                    chunk_id = %candidate.id,
                    document_id = %candidate.document_id,
                    "Skipping chunk of unknown document"
                );
            }
        }
        Ok(kept)
    }
}

/// Drain `stream` into a single assistant message.
pub async fn collect_reply(mut stream: ChatStream) -> Result<ChatMessage, ChatError> {
    let mut sources: Vec<ChunkMatch> = Vec::new();
    let mut content = String::new();
    while let Some(event) = stream.next().await {
        match event? {
            ChatEvent::Sources { sources: found } => sources = found,
            ChatEvent::Text { content: fragment } => content.push_str(&fragment),
            ChatEvent::Done => break,
            ChatEvent::Error { message } => {
                return Err(ChatError::Generation(
                    crate::generation::GenerationError::GenerationFailed(message),
                ));
            }
        }
    }
    Ok(ChatMessage::assistant(content, sources))
}
