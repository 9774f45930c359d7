use rowferry_store::StoreError;
use rowferry_types::RunStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("run log store error: {0}")]
    Store(#[from] StoreError),

    #[error("illegal run status transition {from} -> {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    #[error("no run is open")]
    NotOpen,

    #[error("run log backend returned unexpected data: {0}")]
    Backend(String),
}
