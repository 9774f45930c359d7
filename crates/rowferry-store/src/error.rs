use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("statement failed: {0}")]
    Statement(String),

    #[error("store connection lock poisoned")]
    LockPoisoned,
}
