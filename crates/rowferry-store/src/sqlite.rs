//! SQLite-backed executor.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::ValueRef;
use rusqlite::Connection;

use rowferry_types::SqlValue;

use crate::error::{Result, StoreError};
use crate::executor::{RowChunk, SqlExecutor};

/// [`SqlExecutor`] over a single rusqlite connection behind a mutex.
pub struct SqliteExecutor {
    conn: Mutex<Connection>,
}

impl SqliteExecutor {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        Ok(SqliteExecutor {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(SqliteExecutor {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

fn value_from_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
    }
}

impl SqlExecutor for SqliteExecutor {
    fn execute(&self, sql: &str) -> Result<u64> {
        let conn = self.lock()?;
        tracing::trace!(sql, "Executing statement");
        let affected = conn.execute(sql, [])?;
        Ok(affected as u64)
    }

    fn query_rows(&self, sql: &str) -> Result<Vec<Vec<SqlValue>>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(value_from_ref(row.get_ref(i)?));
            }
            out.push(values);
        }
        Ok(out)
    }

    fn query_scalar(&self, sql: &str) -> Result<Option<SqlValue>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(value_from_ref(row.get_ref(0)?))),
            None => Ok(None),
        }
    }

    fn fetch_chunks(
        &self,
        sql: &str,
        chunk_rows: usize,
        sink: &mut dyn FnMut(RowChunk) -> Result<()>,
    ) -> Result<()> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let column_count = columns.len();
        let mut rows = stmt.query([])?;
        let mut buffer: Vec<Vec<SqlValue>> = Vec::with_capacity(chunk_rows);
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(value_from_ref(row.get_ref(i)?));
            }
            buffer.push(values);
            if buffer.len() >= chunk_rows {
                sink(RowChunk {
                    columns: columns.clone(),
                    rows: std::mem::take(&mut buffer),
                })?;
            }
        }
        if !buffer.is_empty() {
            sink(RowChunk {
                columns,
                rows: buffer,
            })?;
        }
        Ok(())
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
        let exists = stmt.exists([table])?;
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> SqliteExecutor {
        let ex = SqliteExecutor::in_memory().unwrap();
        ex.execute("CREATE TABLE t (id INTEGER, name TEXT)").unwrap();
        for i in 0..5 {
            ex.execute(&format!("INSERT INTO t VALUES ({i}, 'row{i}')"))
                .unwrap();
        }
        ex
    }

    #[test]
    fn execute_reports_affected_rows() {
        let ex = seeded();
        let n = ex.execute("UPDATE t SET name = 'x' WHERE id < 2").unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn scalar_distinguishes_null_row_from_no_row() {
        let ex = seeded();
        assert_eq!(
            ex.query_scalar("SELECT MAX(id) FROM t").unwrap(),
            Some(SqlValue::Integer(4))
        );
        assert_eq!(
            ex.query_scalar("SELECT MAX(id) FROM t WHERE id > 90").unwrap(),
            Some(SqlValue::Null)
        );
        assert_eq!(
            ex.query_scalar("SELECT id FROM t WHERE id > 90").unwrap(),
            None
        );
    }

    #[test]
    fn fetch_chunks_pages_evenly() {
        let ex = seeded();
        let mut sizes = Vec::new();
        ex.fetch_chunks("SELECT id, name FROM t ORDER BY id", 2, &mut |chunk| {
            assert_eq!(chunk.columns, vec!["id", "name"]);
            sizes.push(chunk.len());
            Ok(())
        })
        .unwrap();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn fetch_chunks_empty_result_is_silent() {
        let ex = seeded();
        let mut called = false;
        ex.fetch_chunks("SELECT id FROM t WHERE id > 90", 2, &mut |_| {
            called = true;
            Ok(())
        })
        .unwrap();
        assert!(!called);
    }

    #[test]
    fn file_backed_store_persists_across_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let ex = SqliteExecutor::open(&path).unwrap();
            ex.execute("CREATE TABLE t (id INTEGER)").unwrap();
            ex.execute("INSERT INTO t VALUES (1)").unwrap();
        }
        let ex = SqliteExecutor::open(&path).unwrap();
        assert_eq!(
            ex.query_scalar("SELECT COUNT(*) FROM t").unwrap(),
            Some(SqlValue::Integer(1))
        );
    }

    #[test]
    fn table_existence_probe() {
        let ex = seeded();
        assert!(ex.table_exists("t").unwrap());
        assert!(!ex.table_exists("missing").unwrap());
    }
}
