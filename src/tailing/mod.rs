mod discovery;
mod errors;
mod models;
mod reader;
pub mod engine;
mod source_task;

pub use engine::TailingEngine;
pub use errors::TailingError;
pub use models::{EngineStatus, PerSourceStatus};
pub use source_task::{BoxFuture, Consumer, ConsumerOutcome};
