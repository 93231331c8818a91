//! ThreatLens real-time detection core.
//!
//! This crate implements the hard part of the ThreatLens pipeline: tailing
//! many log sources concurrently, queueing parsed entries under a priority
//! discipline, fanning structured events out to many subscribers, and
//! adaptively tuning the pipeline from observed health and system load.
//!
//! External collaborators (analyzer content, notification dispatch,
//! persistence of reports, HTTP config/report endpoints) are represented as
//! traits at the seams; wiring a concrete implementation is left to the
//! binary that embeds this crate.

pub mod cli;
pub mod controller;
pub mod fanout;
pub mod helpers;
pub mod instrumentation;
pub mod metrics;
pub mod model;
pub mod persistence;
pub mod queue;
pub mod runtime;
pub mod tailing;

pub mod analyzer;
pub mod notifier;

pub mod proto {
    pub mod fanout {
        tonic::include_proto!("fanout");
    }
}
