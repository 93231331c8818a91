//! Priority Ingestion Queue (spec §4.2): accepts `LogEntry` values and
//! delivers them in priority-then-age order to a user-supplied batch
//! processor, under bounded memory, backpressure, and retry.

mod errors;
mod priority;
mod stats;

pub mod ingestion;

pub use errors::QueueError;
pub use ingestion::{BatchProcessor, EnqueueOutcome, ErrorHandler, IngestionQueue};
pub use stats::QueueStats;
