//! Document ingestion: splitting, the ingestion pipeline, and its background queue.

pub mod ingestion;
pub mod queue;
pub mod splitter;
pub mod types;

pub use ingestion::IngestionPipeline;
pub use queue::{IngestionQueue, IngestionWorker, QueueError, StatusChange};
pub use splitter::{SplitterOptions, split};
pub use types::{ChunkingError, IngestionError, IngestionOutcome, IngestionSettings};
