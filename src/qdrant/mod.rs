//! Qdrant vector store integration for document chunks.

pub mod client;
pub mod filters;
mod payload;
/// Streaming helpers for Qdrant scroll pagination.
pub mod scroller;
pub mod types;

pub use client::QdrantService;
pub use filters::document_filter;
pub use types::{QdrantError, QdrantSettings, ScoredPoint};
