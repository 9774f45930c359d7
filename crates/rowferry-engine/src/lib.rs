//! Pipeline engine: reads a pipeline configuration, compiles it against a
//! dialect, and moves the data through extract, transform, and load phases
//! with every run tracked in the durable run log.

pub mod catalog;
pub mod chunked;
pub mod config;
mod errors;
pub mod loader;
pub mod orchestrator;
pub mod period;
pub mod reconcile;
pub mod staging;

pub use errors::PipelineError;
pub use orchestrator::{Orchestrator, RunSummary};
