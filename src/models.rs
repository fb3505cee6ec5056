//! Domain records shared by the ingestion and chat pipelines.
//!
//! `Document` and `DocumentChunk` mirror what the record store persists. `ChunkMatch`,
//! `ChatTurn`, and `ChatMessage` are query-time values that never reach storage.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Processing state of an uploaded document.
///
/// A single ingestion run moves a document from `Processing` to either `Ready` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Text extraction, embedding, or persistence is still running.
    Processing,
    /// Every chunk was embedded and stored; the document is searchable.
    Ready,
    /// Ingestion failed; any chunks present are partial and must not be relied upon.
    Error,
}

impl DocumentStatus {
    /// Lowercase label used in payloads and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }

    /// Whether an ingestion run has finished with this status.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Error)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uploaded document tracked by the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Opaque unique identifier.
    pub id: String,
    /// Original file name supplied by the uploader.
    pub name: String,
    /// Upload size in bytes, when known.
    pub size: Option<u64>,
    /// Current processing state.
    pub status: DocumentStatus,
    /// RFC3339 creation timestamp.
    pub created_at: String,
}

impl Document {
    /// Create a fresh document record in the `processing` state.
    pub fn new(name: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            id: generate_id(),
            name: name.into(),
            size,
            status: DocumentStatus::Processing,
            created_at: now_rfc3339(),
        }
    }
}

/// Persisted chunk of a document's text together with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Unique chunk identifier.
    pub id: String,
    /// Owning document.
    pub document_id: String,
    /// Trimmed, non-empty chunk text.
    pub content: String,
    /// Embedding vector for `content`.
    pub embedding: Vec<f32>,
    /// Zero-based position of the chunk within its document.
    pub chunk_index: usize,
    /// RFC3339 creation timestamp.
    pub created_at: String,
}

/// Chunk row handed to the chunk store before identifiers and timestamps are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    /// Trimmed, non-empty chunk text.
    pub content: String,
    /// Embedding vector for `content`.
    pub embedding: Vec<f32>,
    /// Zero-based position of the chunk within its document.
    pub chunk_index: usize,
}

/// Query-time projection of a stored chunk ranked by similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMatch {
    /// Chunk identifier.
    pub id: String,
    /// Owning document.
    pub document_id: String,
    /// Chunk text.
    pub content: String,
    /// Similarity score; higher means more relevant.
    pub similarity: f32,
}

/// Conversation participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message typed by the user.
    User,
    /// Message produced by the assistant.
    Assistant,
}

/// Prior conversation turn supplied with a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Author of the turn.
    pub role: Role,
    /// Text of the turn.
    pub content: String,
}

/// Conversational message as presented to a client, with optional cited sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message identifier.
    pub id: String,
    /// Author of the message.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Chunks the answer was grounded on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<ChunkMatch>>,
    /// RFC3339 timestamp.
    pub timestamp: String,
}

impl ChatMessage {
    /// Build an assistant message carrying the sources it was grounded on.
    pub fn assistant(content: String, sources: Vec<ChunkMatch>) -> Self {
        Self {
            id: generate_id(),
            role: Role::Assistant,
            content,
            sources: Some(sources),
            timestamp: now_rfc3339(),
        }
    }
}

/// Generate a random identifier for documents, chunks, and messages.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC timestamp formatted as RFC3339.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_starts_processing() {
        let document = Document::new("report.pdf", Some(42));
        assert_eq!(document.status, DocumentStatus::Processing);
        assert_eq!(document.size, Some(42));
        assert!(!document.id.is_empty());
        assert!(document.created_at.contains('T'));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&DocumentStatus::Ready).unwrap();
        assert_eq!(json, "\"ready\"");
        assert!(DocumentStatus::Error.is_terminal());
        assert!(!DocumentStatus::Processing.is_terminal());
    }

    #[test]
    fn chat_turn_parses_wire_roles() {
        let turn: ChatTurn =
            serde_json::from_str(r#"{"role":"assistant","content":"hi"}"#).unwrap();
        assert_eq!(turn.role, Role::Assistant);
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = now_rfc3339();
        assert!(ts.contains('T') && ts.ends_with('Z'));
    }
}
