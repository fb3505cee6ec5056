//! Retrieval-augmented chat over ingested documents.
//!
//! A question is embedded, matched against stored chunks, and answered by a streaming chat
//! model whose system prompt carries the numbered matches. The caller receives the matches
//! first, then answer fragments, then a completion marker.

pub mod events;
pub mod prompt;
pub mod service;

use thiserror::Error;

use crate::embedding::EmbeddingClientError;
use crate::generation::GenerationError;
use crate::models::ChatTurn;
use crate::storage::StorageError;

pub use events::ChatEvent;
pub use service::{ChatPipeline, ChatStream, collect_reply};

/// Chunks scoring at or below this similarity are never used as context.
pub const DEFAULT_SIMILARITY_FLOOR: f32 = 0.5;
/// Maximum number of chunks placed in the prompt.
pub const DEFAULT_MATCH_LIMIT: usize = 5;
/// Number of trailing history turns forwarded to the model.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Retrieval and prompt tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    /// Minimum similarity a chunk must exceed.
    pub similarity_floor: f32,
    /// Maximum number of chunks retrieved.
    pub match_limit: usize,
    /// Maximum number of history turns kept.
    pub history_limit: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            similarity_floor: DEFAULT_SIMILARITY_FLOOR,
            match_limit: DEFAULT_MATCH_LIMIT,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// A user question with its optional document scope and prior turns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatRequest {
    /// The question to answer.
    pub question: String,
    /// Restrict retrieval to this document when set.
    pub document_id: Option<String>,
    /// Earlier turns, oldest first.
    pub history: Vec<ChatTurn>,
}

/// Errors raised while answering a question.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The request was rejected before any provider call.
    #[error("{0}")]
    Validation(String),
    /// The question could not be embedded.
    #[error("Failed to embed question: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Similarity search failed.
    #[error("Failed to search document chunks: {0}")]
    Search(#[from] StorageError),
    /// The chat model failed to start or broke off mid-answer.
    #[error("Failed to generate answer: {0}")]
    Generation(#[from] GenerationError),
}
