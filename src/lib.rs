#![deny(missing_docs)]

//! Core library for pdfchat: PDF ingestion and retrieval-augmented chat.

/// HTTP routing and REST/SSE handlers.
pub mod api;
/// Retrieval and streaming chat pipeline.
pub mod chat;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Plain-text extraction from uploaded documents.
pub mod extraction;
/// Streaming chat-completion client abstraction and adapters.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and chat counters.
pub mod metrics;
/// Domain records shared across pipelines.
pub mod models;
/// Document processing pipeline: splitting, ingestion, and background scheduling.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Record store and chunk search abstractions.
pub mod storage;
