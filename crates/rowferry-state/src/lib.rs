//! Durable run tracking.
//!
//! Every pipeline run is one row in a log table; the row's status column
//! walks a strict forward state machine. The run id doubles as the data
//! lineage key: loaded rows carry it in their `load_id` column.

mod error;
mod run_log;

pub use error::StateError;
pub use run_log::RunLog;
