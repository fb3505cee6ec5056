//! Record store abstractions for documents and their chunks.
//!
//! The ingestion and chat pipelines only see these traits. [`memory`] backs them with
//! in-process maps; [`crate::qdrant::QdrantService`] backs the chunk side with a Qdrant
//! collection.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ChunkMatch, Document, DocumentChunk, DocumentStatus, NewChunk};
use crate::qdrant::QdrantError;

pub use memory::{MemoryChunkStore, MemoryDocumentStore};

/// Errors surfaced by record store backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No document exists with the requested identifier.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),
    /// Qdrant rejected or failed a request.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
    /// Backend failure that does not fit another variant.
    #[error("Storage backend failed: {0}")]
    Backend(String),
}

/// Persistence for document records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document record and return it as stored.
    async fn create(&self, document: Document) -> Result<Document, StorageError>;

    /// Fetch a document by identifier.
    async fn get(&self, id: &str) -> Result<Option<Document>, StorageError>;

    /// List every document, newest first.
    async fn list(&self) -> Result<Vec<Document>, StorageError>;

    /// Overwrite the status of an existing document.
    async fn update_status(&self, id: &str, status: DocumentStatus) -> Result<(), StorageError>;

    /// Remove a document record. Returns `false` when nothing was removed.
    async fn delete(&self, id: &str) -> Result<bool, StorageError>;
}

/// Persistence for embedded chunks.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Store a batch of chunks for `document_id` and return how many were written.
    async fn insert_batch(
        &self,
        document_id: &str,
        chunks: Vec<NewChunk>,
    ) -> Result<usize, StorageError>;

    /// Remove every chunk owned by `document_id`.
    async fn delete_for_document(&self, document_id: &str) -> Result<(), StorageError>;

    /// Return the chunks of `document_id` ordered by `chunk_index`.
    async fn chunks_for_document(&self, document_id: &str)
    -> Result<Vec<DocumentChunk>, StorageError>;
}

/// Parameters for a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Query embedding.
    pub vector: Vec<f32>,
    /// Matches scoring at or below this value are discarded.
    pub similarity_floor: f32,
    /// Maximum number of matches returned.
    pub limit: usize,
    /// Restrict matches to a single document when set.
    pub document_id: Option<String>,
}

/// Similarity search over stored chunks.
#[async_trait]
pub trait ChunkSearch: Send + Sync {
    /// Return at most `query.limit` matches scoring above the floor, best first.
    async fn match_chunks(&self, query: SearchQuery) -> Result<Vec<ChunkMatch>, StorageError>;
}

/// Delete a document together with every chunk it owns.
///
/// Chunks go first so a failure never leaves orphaned chunks behind a missing document.
/// Chunks are removed even when the record is already gone. Returns whether a document
/// record was removed.
pub async fn delete_document_cascade(
    documents: &dyn DocumentStore,
    chunks: &dyn ChunkStore,
    id: &str,
) -> Result<bool, StorageError> {
    chunks.delete_for_document(id).await?;
    let removed = documents.delete(id).await?;
    if removed {
        tracing::info!(document_id = id, "Document deleted with its chunks");
    } else {
        tracing::debug!(document_id = id, "Removed chunks of unknown document");
    }
    Ok(removed)
}
