//! HTTP surface for pdfchat.
//!
//! This module exposes an Axum router with the following endpoints:
//!
//! - `POST /documents` – Upload a PDF (multipart field `file`). The document is recorded as
//!   `processing` and ingested in the background; the response carries its `documentId`.
//! - `GET /documents` – List documents, newest first.
//! - `GET /documents/events` – Server-sent stream of ingestion status transitions.
//! - `GET /documents/:id` – Fetch one document, typically to poll its status.
//! - `GET /documents/:id/chunks` – Inspect the stored chunks of a document.
//! - `DELETE /documents/:id` – Delete a document and its chunks.
//! - `POST /chat` – Ask a question; the answer streams back as server-sent events.
//! - `GET /metrics` – Ingestion and chat counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures_core::Stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::chat::{ChatError, ChatEvent, ChatPipeline, ChatRequest};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::models::{ChatTurn, Document, DocumentStatus};
use crate::processing::{IngestionQueue, StatusChange};
use crate::storage::{ChunkStore, DocumentStore, StorageError, delete_document_cascade};

const PDF_CONTENT_TYPE: &str = "application/pdf";
const DEFAULT_FILE_NAME: &str = "document.pdf";
const CHAT_FAILED_MESSAGE: &str = "Chat failed. Please try again.";
// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared handles used by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Document records.
    pub documents: Arc<dyn DocumentStore>,
    /// Chunk records.
    pub chunks: Arc<dyn ChunkStore>,
    /// Background ingestion scheduler.
    pub queue: IngestionQueue,
    /// Question answering pipeline.
    pub chat: Arc<ChatPipeline>,
    /// Pipeline counters.
    pub metrics: Arc<PipelineMetrics>,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: usize,
}

/// Build the HTTP router.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;
    Router::new()
        .route(
            "/documents",
            get(list_documents)
                .post(upload_document)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/documents/events", get(document_events))
        .route(
            "/documents/:id",
            get(get_document).delete(delete_document),
        )
        .route("/documents/:id/chunks", get(list_chunks))
        .route("/chat", post(chat))
        .route("/metrics", get(get_metrics))
        .route("/commands", get(get_commands))
        .with_state(state)
}

/// Response body for `POST /documents`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    document_id: String,
    status: DocumentStatus,
}

/// Accept a PDF upload and schedule its ingestion.
///
/// Only the `file` field is read; other fields are ignored.
async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(AppError::from_multipart)? {
        if field.name() != Some("file") {
            continue;
        }

        if field.content_type() != Some(PDF_CONTENT_TYPE) {
            return Err(AppError::bad_request("Only PDF files are supported"));
        }
        let file_name = field
            .file_name()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FILE_NAME)
            .to_string();

        let bytes = field.bytes().await.map_err(AppError::from_multipart)?;
        if bytes.len() > state.max_upload_bytes {
            return Err(AppError::payload_too_large(state.max_upload_bytes));
        }
        if bytes.is_empty() {
            return Err(AppError::bad_request("Uploaded file is empty"));
        }

        let document = state
            .documents
            .create(Document::new(file_name, Some(bytes.len() as u64)))
            .await?;
        tracing::info!(
            document_id = %document.id,
            name = %document.name,
            bytes = bytes.len(),
            "Document uploaded"
        );

        if let Err(error) = state.queue.begin_ingestion(document.id.clone(), bytes.to_vec()) {
            tracing::error!(document_id = %document.id, error = %error, "Failed to schedule ingestion");
            state
                .documents
                .update_status(&document.id, DocumentStatus::Error)
                .await?;
            return Err(AppError::internal("Upload failed"));
        }

        return Ok(Json(UploadResponse {
            document_id: document.id,
            status: document.status,
        }));
    }

    Err(AppError::bad_request("No file provided"))
}

/// List every document, newest first.
async fn list_documents(State(state): State<AppState>) -> Result<Json<Vec<Document>>, AppError> {
    Ok(Json(state.documents.list().await?))
}

/// Fetch a single document.
async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, AppError> {
    state
        .documents
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Document not found"))
}

/// Chunk projection without the embedding.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChunkView {
    id: String,
    chunk_index: usize,
    content: String,
}

/// List the stored chunks of a document in order.
async fn list_chunks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ChunkView>>, AppError> {
    if state.documents.get(&id).await?.is_none() {
        return Err(AppError::not_found("Document not found"));
    }
    let chunks = state.chunks.chunks_for_document(&id).await?;
    Ok(Json(
        chunks
            .into_iter()
            .map(|chunk| ChunkView {
                id: chunk.id,
                chunk_index: chunk.chunk_index,
                content: chunk.content,
            })
            .collect(),
    ))
}

/// Delete a document and its chunks. Deleting an unknown id succeeds.
async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let removed =
        delete_document_cascade(state.documents.as_ref(), state.chunks.as_ref(), &id).await?;
    if !removed {
        tracing::debug!(document_id = %id, "Delete requested for unknown document");
    }
    Ok(Json(json!({ "success": true })))
}

/// Stream ingestion status transitions as they happen, until the server begins shutting down.
async fn document_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = state
        .queue
        .status_feed()
        .map(|change| Ok(status_event(&change)));
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn status_event(change: &StatusChange) -> Event {
    match serde_json::to_string(change) {
        Ok(data) => Event::default().data(data),
        Err(error) => {
            tracing::error!(error = %error, "Failed to encode status change");
            Event::default().comment("unencodable status change")
        }
    }
}

/// Request body for `POST /chat`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    document_id: Option<String>,
    #[serde(default)]
    conversation_history: Vec<ChatTurn>,
}

/// Answer a question as a stream of `data:` events.
async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let answer = state
        .chat
        .stream_answer(ChatRequest {
            question: body.message,
            document_id: body.document_id,
            history: body.conversation_history,
        })
        .await?;

    let events = answer.map(|item| {
        let event = item.unwrap_or_else(|error| {
            tracing::error!(error = %error, "Chat stream failed");
            ChatEvent::Error {
                message: CHAT_FAILED_MESSAGE.to_string(),
            }
        });
        Ok(chat_event(&event))
    });
    Ok(Sse::new(events))
}

fn chat_event(event: &ChatEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|error| {
        tracing::error!(error = %error, "Failed to encode chat event");
        json!({ "type": "error", "message": CHAT_FAILED_MESSAGE }).to_string()
    });
    Event::default().data(data)
}

/// Return pipeline counters.
async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload_document",
                method: "POST",
                path: "/documents",
                description: "Upload a PDF as multipart field `file`. Returns { \"documentId\": string, \"status\": \"processing\" } and ingests in the background.",
                request_example: None,
            },
            CommandDescriptor {
                name: "list_documents",
                method: "GET",
                path: "/documents",
                description: "List uploaded documents, newest first.",
                request_example: None,
            },
            CommandDescriptor {
                name: "document_events",
                method: "GET",
                path: "/documents/events",
                description: "Server-sent stream of { documentId, status, error? } ingestion transitions.",
                request_example: None,
            },
            CommandDescriptor {
                name: "get_document",
                method: "GET",
                path: "/documents/{id}",
                description: "Fetch one document including its processing status.",
                request_example: None,
            },
            CommandDescriptor {
                name: "list_chunks",
                method: "GET",
                path: "/documents/{id}/chunks",
                description: "List the stored chunks of a document in order.",
                request_example: None,
            },
            CommandDescriptor {
                name: "delete_document",
                method: "DELETE",
                path: "/documents/{id}",
                description: "Delete a document together with its chunks.",
                request_example: None,
            },
            CommandDescriptor {
                name: "chat",
                method: "POST",
                path: "/chat",
                description: "Ask a question. Streams `sources`, `text`, and `done` events; `error` replaces `done` on failure.",
                request_example: Some(json!({
                    "message": "What does the report conclude?",
                    "documentId": "optional-document-id",
                    "conversationHistory": [
                        { "role": "user", "content": "Hi" },
                        { "role": "assistant", "content": "Hello! Ask me about your documents." }
                    ]
                })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion and chat counters.",
                request_example: None,
            },
        ],
    })
}

/// Error rendered as `{"error": message}` with an HTTP status.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn payload_too_large(limit: usize) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("File size must be at most {} bytes", limit),
        )
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    fn from_multipart(error: axum::extract::multipart::MultipartError) -> Self {
        tracing::warn!(error = %error, "Rejected multipart upload");
        Self::new(error.status(), error.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(error: StorageError) -> Self {
        tracing::error!(error = %error, "Storage request failed");
        match error {
            StorageError::DocumentNotFound(_) => Self::not_found("Document not found"),
            _ => Self::internal("Storage request failed"),
        }
    }
}

impl From<ChatError> for AppError {
    fn from(error: ChatError) -> Self {
        match error {
            ChatError::Validation(message) => Self::bad_request(message),
            other => {
                tracing::error!(error = %other, "Chat request failed");
                Self::internal(CHAT_FAILED_MESSAGE)
            }
        }
    }
}
