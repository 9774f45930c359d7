//! Shared type definitions for the rowferry data mover.
//!
//! Everything that crosses a crate boundary lives here: the declarative
//! table descriptor model consumed by the SQL compiler, the dialect enum,
//! the pipeline configuration model, run-log state types, and the plain
//! value representation used when rows move through the chunked loader.

pub mod config;
pub mod descriptor;
pub mod dialect;
pub mod run;
pub mod value;

pub use config::{DuplicatePolicy, Mode, PipelineConfig};
pub use descriptor::{ColumnDescriptor, TableDescriptor};
pub use dialect::Dialect;
pub use run::{RunCounters, RunStatus};
pub use value::SqlValue;
