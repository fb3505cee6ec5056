//! Filter helpers for scoping Qdrant requests to a document.

use serde_json::{Value, json};

/// Match points whose `document_id` payload equals `document_id`.
///
/// Returns `None` when no usable identifier is supplied so callers can search the whole
/// collection.
pub fn document_filter(document_id: Option<&str>) -> Option<Value> {
    let document_id = document_id.and_then(non_empty)?;
    Some(json!({
        "must": [
            {
                "key": "document_id",
                "match": { "value": document_id }
            }
        ]
    }))
}

/// Match every point that belongs to some document.
pub fn any_document_filter() -> Value {
    json!({
        "must_not": [
            { "is_empty": { "key": "document_id" } }
        ]
    })
}

fn non_empty(input: &str) -> Option<&str> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
