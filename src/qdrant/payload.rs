//! Mapping between chunk records and Qdrant payloads.

use serde_json::{Map, Value, json};

use super::types::ScoredPoint;
use crate::models::{ChunkMatch, DocumentChunk, NewChunk};

/// Build the payload object stored alongside each chunk vector.
pub(crate) fn build_chunk_payload(document_id: &str, chunk: &NewChunk, created_at: &str) -> Value {
    json!({
        "document_id": document_id,
        "content": chunk.content,
        "chunk_index": chunk.chunk_index,
        "created_at": created_at,
    })
}

/// Project a scored point onto a [`ChunkMatch`]. Points missing required fields are skipped.
pub(crate) fn chunk_match_from_point(point: ScoredPoint) -> Option<ChunkMatch> {
    let payload = point.payload?;
    Some(ChunkMatch {
        id: point.id,
        document_id: string_field(&payload, "document_id")?,
        content: string_field(&payload, "content")?,
        similarity: point.score,
    })
}

/// Rebuild a stored chunk from a scrolled point.
pub(crate) fn chunk_from_payload(
    id: String,
    payload: &Map<String, Value>,
    vector: Option<Value>,
) -> Option<DocumentChunk> {
    let chunk_index = payload.get("chunk_index")?.as_u64()?;
    Some(DocumentChunk {
        id,
        document_id: string_field(payload, "document_id")?,
        content: string_field(payload, "content")?,
        embedding: vector.map(parse_vector).unwrap_or_default(),
        chunk_index: usize::try_from(chunk_index).ok()?,
        created_at: string_field(payload, "created_at").unwrap_or_default(),
    })
}

fn string_field(payload: &Map<String, Value>, key: &str) -> Option<String> {
    match payload.get(key) {
        Some(Value::String(value)) => Some(value.clone()),
        _ => None,
    }
}

fn parse_vector(value: Value) -> Vec<f32> {
    match value {
        Value::Array(values) => values
            .iter()
            .filter_map(Value::as_f64)
            .map(|v| v as f32)
            .collect(),
        _ => Vec::new(),
    }
}
