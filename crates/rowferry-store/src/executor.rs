use rowferry_types::SqlValue;

use crate::error::Result;

/// One page of rows pulled from a store by the chunked loader.
#[derive(Debug, Clone, PartialEq)]
pub struct RowChunk {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl RowChunk {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Executes compiled SQL text against one database.
///
/// Implementations are sync; the orchestrator wraps calls in
/// `spawn_blocking`. All statements arrive fully rendered, so the trait
/// carries no parameter binding.
pub trait SqlExecutor: Send + Sync {
    /// Run a statement, returning the affected row count (0 for DDL).
    fn execute(&self, sql: &str) -> Result<u64>;

    /// Run a query and collect every row.
    fn query_rows(&self, sql: &str) -> Result<Vec<Vec<SqlValue>>>;

    /// Run a query expected to yield at most one value. A row holding SQL
    /// NULL comes back as `Some(SqlValue::Null)`; no row at all as `None`.
    fn query_scalar(&self, sql: &str) -> Result<Option<SqlValue>>;

    /// Stream a query's result set in chunks of at most `chunk_rows` rows,
    /// invoking `sink` for each. The final chunk may be short; an empty
    /// result set produces no chunks.
    fn fetch_chunks(
        &self,
        sql: &str,
        chunk_rows: usize,
        sink: &mut dyn FnMut(RowChunk) -> Result<()>,
    ) -> Result<()>;

    /// Whether a table with the given name exists.
    fn table_exists(&self, table: &str) -> Result<bool>;
}
