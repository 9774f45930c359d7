use thiserror::Error;

use rowferry_sql::CompileError;
use rowferry_state::StateError;
use rowferry_store::StoreError;
use rowferry_types::config::ConfigError;

use crate::catalog::ResolutionError;

/// Umbrella error the orchestrator propagates. Each variant maps to one
/// stage of the pipeline lifecycle.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("catalog resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("execution error: {0}")]
    Execution(#[from] StoreError),

    #[error("run log error: {0}")]
    State(#[from] StateError),

    #[error("reconciliation error: {0}")]
    Reconciliation(String),

    #[error("chunked load finished with {failed} failed chunk(s); first failure: {first}")]
    ChunkLoad { failed: u64, first: String },

    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}
