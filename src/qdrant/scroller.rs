use async_stream::try_stream;
use futures_core::Stream;
use reqwest::Method;
use serde_json::{Value, json};

use super::client::{QdrantService, stringify_point_id};
use super::filters::document_filter;
use super::payload::chunk_from_payload;
use super::types::{QdrantError, ScrollResponse};
use crate::models::DocumentChunk;

const DEFAULT_SCROLL_LIMIT: usize = 256;

/// Stream every stored chunk of `document_id`, vectors included, page by page.
///
/// Points are yielded in Qdrant's storage order; callers sort by `chunk_index`.
pub fn stream_document_chunks<'a>(
    service: &'a QdrantService,
    document_id: &'a str,
) -> impl Stream<Item = Result<DocumentChunk, QdrantError>> + 'a {
    try_stream! {
        let mut offset: Option<Value> = None;
        let filter_body = document_filter(Some(document_id)).unwrap_or_else(|| json!({ "must": [] }));
        let path = format!("collections/{}/points/scroll", service.collection());

        loop {
            let body = json!({
                "with_payload": true,
                "with_vector": true,
                "limit": DEFAULT_SCROLL_LIMIT,
                "filter": filter_body.clone(),
                "offset": offset.clone().unwrap_or(Value::Null),
            });

            let response = service.request(Method::POST, &path).json(&body).send().await?;

            let status = response.status();
            if status.is_success() {
                let ScrollResponse { result } = response.json().await?;
                for point in result.points {
                    let (Some(id), Some(payload)) = (point.id, point.payload) else {
                        continue;
                    };
                    match chunk_from_payload(stringify_point_id(id), &payload, point.vector) {
                        Some(chunk) => yield chunk,
                        None => tracing::warn!(document_id, "Skipping malformed chunk payload"),
                    }
                }

                match result.next_page_offset {
                    Some(Value::Null) | None => break,
                    Some(next) => offset = Some(next),
                }
            } else {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(document_id, status = %status, "Failed to scroll document chunks");
                Err(QdrantError::UnexpectedStatus { status, body })?;
            }
        }
    }
}
