//! Core data types and error definitions for the ingestion pipeline.

use thiserror::Error;

use super::splitter::SplitterOptions;
use crate::embedding::EmbeddingClientError;
use crate::extraction::ExtractionError;
use crate::storage::StorageError;

/// Number of chunks embedded concurrently and stored per write.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// A chunk size of zero cannot bound anything.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// The overlap would swallow the whole chunk.
    #[error("chunk overlap {chunk_overlap} must be smaller than chunk size {chunk_size}")]
    OverlapTooLarge {
        /// Configured chunk size.
        chunk_size: usize,
        /// Configured overlap.
        chunk_overlap: usize,
    },
}

/// Errors that end an ingestion run with the document in `error`.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The PDF could not be turned into text.
    #[error("Failed to extract text: {0}")]
    Extraction(#[from] ExtractionError),
    /// The PDF yielded no text at all.
    #[error("No text content could be extracted from the PDF")]
    EmptyContent,
    /// The splitter rejected its policy.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// A chunk could not be embedded.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Status or chunk writes failed.
    #[error("Failed to persist ingestion results: {0}")]
    Persistence(#[from] StorageError),
}

/// Tunables for a single ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionSettings {
    /// Splitting policy applied to the extracted text.
    pub splitter: SplitterOptions,
    /// Chunks embedded concurrently and written together.
    pub batch_size: usize,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            splitter: SplitterOptions::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Summary of a completed ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionOutcome {
    /// Document that reached `ready`.
    pub document_id: String,
    /// Number of chunks stored.
    pub chunk_count: usize,
    /// Number of batches written.
    pub batches: usize,
}
