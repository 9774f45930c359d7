//! SQL execution for rowferry.
//!
//! The engine compiles everything to SQL text and hands it to a
//! [`SqlExecutor`]. The trait is sync and object-safe; async callers wrap
//! calls in `spawn_blocking`. The bundled implementation is SQLite.

mod error;
mod executor;
mod sqlite;

pub use error::{Result, StoreError};
pub use executor::{RowChunk, SqlExecutor};
pub use sqlite::SqliteExecutor;
