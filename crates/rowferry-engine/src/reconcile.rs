//! Pre-write reconciliation: rows in staging that would collide with the
//! target are moved to the error-handler table instead of being written.
//!
//! Routing is delete-after-copy, so a second pass over the same staging
//! table finds nothing left to route and is a no-op.

use std::sync::Arc;

use rowferry_sql::ddl;
use rowferry_store::SqlExecutor;
use rowferry_types::descriptor::TableDescriptor;
use rowferry_types::{Dialect, SqlValue};

use crate::errors::PipelineError;

pub const ERROR_TYPE_DUPLICATE: &str = "duplicate";
pub const ERROR_TYPE_PK: &str = "pk_error";

#[derive(Clone)]
pub struct Reconciler {
    executor: Arc<dyn SqlExecutor>,
    #[allow(dead_code)]
    dialect: Dialect,
}

impl Reconciler {
    pub fn new(executor: Arc<dyn SqlExecutor>, dialect: Dialect) -> Self {
        Reconciler { executor, dialect }
    }

    /// Route staging rows whose full natural key already exists in the
    /// target. Returns the number of rows routed.
    pub fn process_duplicates(
        &self,
        staging: &str,
        target: &str,
        error_table: &str,
        source: &TableDescriptor,
        run_id: i64,
    ) -> Result<u64, PipelineError> {
        let keys = source.natural_key_columns();
        if keys.is_empty() {
            return Ok(0);
        }
        let staged: Vec<&str> = keys.iter().map(|c| c.staged_name()).collect();
        let target_cols: Vec<&str> = keys.iter().map(|c| c.name.as_str()).collect();
        self.route(
            staging,
            target,
            error_table,
            &staged,
            &target_cols,
            run_id,
            ERROR_TYPE_DUPLICATE,
        )
    }

    /// Route staging rows whose primary key value already exists in the
    /// target. Returns the number of rows routed.
    pub fn process_primary_key(
        &self,
        staging: &str,
        target: &str,
        error_table: &str,
        source: &TableDescriptor,
        run_id: i64,
    ) -> Result<u64, PipelineError> {
        if source.primary_key.is_empty() {
            return Ok(0);
        }
        let mut staged = Vec::new();
        let mut target_cols = Vec::new();
        for key in &source.primary_key.columns {
            let column = source.column(key).ok_or_else(|| {
                PipelineError::Reconciliation(format!(
                    "primary key column '{key}' is not declared"
                ))
            })?;
            staged.push(column.staged_name());
            target_cols.push(key.as_str());
        }
        self.route(
            staging,
            target,
            error_table,
            &staged,
            &target_cols,
            run_id,
            ERROR_TYPE_PK,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn route(
        &self,
        staging: &str,
        target: &str,
        error_table: &str,
        staged_keys: &[&str],
        target_keys: &[&str],
        run_id: i64,
        error_type: &str,
    ) -> Result<u64, PipelineError> {
        let predicate = in_predicate(staged_keys, target_keys, target);
        let count = match self.executor.query_scalar(&format!(
            "SELECT COUNT(*) FROM {staging} WHERE {predicate}"
        ))? {
            Some(SqlValue::Integer(n)) => n as u64,
            _ => 0,
        };
        if count == 0 {
            return Ok(0);
        }

        self.ensure_error_table(staging, error_table)?;
        self.executor.execute(&format!(
            "INSERT INTO {error_table}\n\
             SELECT s.*, {run_id}, '{error_type}' FROM {staging} s WHERE {qualified}",
            qualified = in_predicate_qualified(staged_keys, target_keys, target, "s")
        ))?;
        self.executor
            .execute(&format!("DELETE FROM {staging} WHERE {predicate}"))?;
        tracing::warn!(
            rows = count,
            error_type,
            table = error_table,
            "Routed colliding rows to error handler"
        );
        Ok(count)
    }

    /// The error-handler table mirrors the staging shape plus lineage
    /// columns; it is created once and reused across runs.
    fn ensure_error_table(&self, staging: &str, error_table: &str) -> Result<(), PipelineError> {
        if self.executor.table_exists(error_table)? {
            return Ok(());
        }
        let skeleton = format!(
            "SELECT s.*, 0 AS load_id, '' AS error_type\nFROM {staging} s"
        );
        self.executor
            .execute(&ddl::compile_create_as_select(error_table, &skeleton))?;
        tracing::info!(table = error_table, "Created error handler table");
        Ok(())
    }
}

fn in_predicate(staged_keys: &[&str], target_keys: &[&str], target: &str) -> String {
    in_predicate_with(staged_keys, target_keys, target, "")
}

fn in_predicate_qualified(
    staged_keys: &[&str],
    target_keys: &[&str],
    target: &str,
    prefix: &str,
) -> String {
    in_predicate_with(staged_keys, target_keys, target, &format!("{prefix}."))
}

fn in_predicate_with(
    staged_keys: &[&str],
    target_keys: &[&str],
    target: &str,
    prefix: &str,
) -> String {
    let sub = format!(
        "SELECT DISTINCT {} FROM {target}",
        target_keys.join(", ")
    );
    if staged_keys.len() == 1 {
        format!("{prefix}{} IN ({sub})", staged_keys[0])
    } else {
        let tuple = staged_keys
            .iter()
            .map(|k| format!("{prefix}{k}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("({tuple}) IN ({sub})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowferry_store::SqliteExecutor;
    use rowferry_types::descriptor::{ColumnDescriptor, PrimaryKey};

    fn setup() -> (Arc<dyn SqlExecutor>, Reconciler, TableDescriptor) {
        let executor: Arc<dyn SqlExecutor> = Arc::new(SqliteExecutor::in_memory().unwrap());
        executor
            .execute("CREATE TABLE ds_orders (order_id INTEGER, status TEXT)")
            .unwrap();
        executor
            .execute("CREATE TABLE raw_orders (order_id INTEGER, status TEXT, load_id INTEGER)")
            .unwrap();
        let reconciler = Reconciler::new(Arc::clone(&executor), Dialect::Sqlite);
        let mut t = TableDescriptor::new("orders");
        t.columns = vec![
            ColumnDescriptor::plain("order_id"),
            ColumnDescriptor::plain("status"),
        ];
        t.primary_key = PrimaryKey {
            name: None,
            columns: vec!["order_id".into()],
        };
        (executor, reconciler, t)
    }

    #[test]
    fn pk_collisions_are_routed_and_tagged() {
        let (executor, reconciler, t) = setup();
        executor
            .execute("INSERT INTO ds_orders VALUES (1, 'new'), (2, 'paid')")
            .unwrap();
        executor
            .execute("INSERT INTO raw_orders VALUES (1, 'old', 0)")
            .unwrap();

        let routed = reconciler
            .process_primary_key("ds_orders", "raw_orders", "eh_orders", &t, 5)
            .unwrap();
        assert_eq!(routed, 1);

        let eh = executor
            .query_rows("SELECT order_id, load_id, error_type FROM eh_orders")
            .unwrap();
        assert_eq!(
            eh[0],
            vec![
                SqlValue::Integer(1),
                SqlValue::Integer(5),
                SqlValue::Text("pk_error".into())
            ]
        );
        let staged = executor.query_rows("SELECT order_id FROM ds_orders").unwrap();
        assert_eq!(staged, vec![vec![SqlValue::Integer(2)]]);
    }

    #[test]
    fn routing_is_idempotent() {
        let (executor, reconciler, t) = setup();
        executor
            .execute("INSERT INTO ds_orders VALUES (1, 'new'), (2, 'paid')")
            .unwrap();
        executor
            .execute("INSERT INTO raw_orders VALUES (1, 'old', 0)")
            .unwrap();

        let first = reconciler
            .process_primary_key("ds_orders", "raw_orders", "eh_orders", &t, 5)
            .unwrap();
        let second = reconciler
            .process_primary_key("ds_orders", "raw_orders", "eh_orders", &t, 5)
            .unwrap();
        assert_eq!((first, second), (1, 0));
        let eh = executor
            .query_scalar("SELECT COUNT(*) FROM eh_orders")
            .unwrap();
        assert_eq!(eh, Some(SqlValue::Integer(1)));
    }

    #[test]
    fn duplicates_match_on_the_full_natural_key() {
        let (executor, reconciler, t) = setup();
        executor
            .execute("INSERT INTO ds_orders VALUES (1, 'new'), (1, 'changed')")
            .unwrap();
        executor
            .execute("INSERT INTO raw_orders VALUES (1, 'new', 0)")
            .unwrap();

        let routed = reconciler
            .process_duplicates("ds_orders", "raw_orders", "eh_orders", &t, 9)
            .unwrap();
        // Only the exact (1, 'new') copy collides; (1, 'changed') stays.
        assert_eq!(routed, 1);
        let staged = executor
            .query_rows("SELECT status FROM ds_orders")
            .unwrap();
        assert_eq!(staged, vec![vec![SqlValue::Text("changed".into())]]);
    }

    #[test]
    fn no_collisions_leaves_error_table_uncreated() {
        let (executor, reconciler, t) = setup();
        executor
            .execute("INSERT INTO ds_orders VALUES (3, 'new')")
            .unwrap();
        let routed = reconciler
            .process_primary_key("ds_orders", "raw_orders", "eh_orders", &t, 1)
            .unwrap();
        assert_eq!(routed, 0);
        assert!(!executor.table_exists("eh_orders").unwrap());
    }
}
