//! Wire events for streamed answers.

use serde::{Deserialize, Serialize};

use crate::models::ChunkMatch;

/// One message of a streamed answer, tagged by `type` on the wire.
///
/// A successful stream is exactly one `sources`, zero or more `text`, then one `done`.
/// `error` replaces `done` when generation breaks off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatEvent {
    /// Chunks the answer is grounded on, in citation order.
    Sources {
        /// Matches numbered `[1]`, `[2]`, ... in the prompt.
        sources: Vec<ChunkMatch>,
    },
    /// Next fragment of answer text.
    Text {
        /// Non-empty fragment.
        content: String,
    },
    /// The answer is complete.
    Done,
    /// The answer was cut short.
    Error {
        /// Client-facing description.
        message: String,
    },
}
