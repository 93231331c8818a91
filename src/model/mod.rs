//! Shared domain types used across the tailing engine, ingestion queue, and
//! fan-out bus. Kept deliberately small and serde-friendly: these are the
//! nouns every component agrees on, not a dumping ground for component-local
//! state (see `tailing::models`, `queue::stats`, `fanout::models` for that).

mod entry;
mod event;
mod source;

pub use entry::{EntryId, LogEntry, Priority, Status};
pub use event::EventUpdate;
pub use source::{LogSource, LogSourceKind, LogSourceRuntime, SourceStatus};
