//! Write-side compilation: INSERT, MERGE/upsert, UPDATE-from-staging,
//! DELETE, and the multi-row chunk INSERT used by the cross-store loader.

use rowferry_types::descriptor::Parallelism;
use rowferry_types::{Dialect, SqlValue};

use crate::error::CompileError;
use crate::select::parallel_hint;

/// A target-column to staged-column mapping used in keys and SET lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPair {
    pub target: String,
    pub staged: String,
}

impl ColumnPair {
    pub fn same(name: &str) -> Self {
        ColumnPair {
            target: name.to_string(),
            staged: name.to_string(),
        }
    }

    pub fn new(target: &str, staged: &str) -> Self {
        ColumnPair {
            target: target.to_string(),
            staged: staged.to_string(),
        }
    }
}

/// `INSERT INTO target (cols) <select>`.
pub fn compile_insert_from_select(target: &str, columns: &[String], select: &str) -> String {
    format!(
        "INSERT INTO {target} ({})\n{select}",
        columns.join(", ")
    )
}

/// Multi-row VALUES insert for one chunk of rows.
pub fn compile_insert_chunk(
    target: &str,
    columns: &[String],
    rows: &[Vec<SqlValue>],
) -> String {
    let tuples = rows
        .iter()
        .map(|row| {
            let cells = row
                .iter()
                .map(SqlValue::to_sql_literal)
                .collect::<Vec<_>>()
                .join(", ");
            format!("({cells})")
        })
        .collect::<Vec<_>>()
        .join(",\n");
    format!(
        "INSERT INTO {target} ({})\nVALUES {tuples}",
        columns.join(", ")
    )
}

/// `DELETE FROM target`, with an Oracle parallel hint when requested.
pub fn compile_delete(target: &str, parallelism: Parallelism, dialect: Dialect) -> String {
    let hint = parallel_hint(parallelism, dialect);
    format!("DELETE {hint}FROM {target}")
}

/// Compile the dialect's upsert form.
///
/// `using` is a complete SELECT whose projection carries the staged column
/// names; `keys` match rows, `update_set` lists the non-key assignments,
/// `insert_columns` the full insert mapping.
pub fn compile_merge(
    dialect: Dialect,
    target: &str,
    using: &str,
    keys: &[ColumnPair],
    update_set: &[ColumnPair],
    insert_columns: &[ColumnPair],
    parallelism: Parallelism,
) -> Result<String, CompileError> {
    if keys.is_empty() {
        return Err(CompileError::EmptyKeys { statement: "MERGE" });
    }
    match dialect {
        Dialect::Oracle | Dialect::Postgres => Ok(merge_statement(
            dialect,
            target,
            using,
            keys,
            update_set,
            Some(insert_columns),
            parallelism,
        )),
        Dialect::Sqlite => {
            let insert_list = join_targets(insert_columns);
            let select_list = staged_projection(insert_columns);
            let conflict_keys = join_targets(keys);
            let set_list = update_set
                .iter()
                .map(|p| format!("{} = excluded.{}", p.target, p.target))
                .collect::<Vec<_>>()
                .join(", ");
            Ok(format!(
                "INSERT INTO {target} ({insert_list})\nSELECT {select_list} FROM (\n{using}\n) u WHERE TRUE\nON CONFLICT ({conflict_keys}) DO UPDATE SET {set_list}"
            ))
        }
        Dialect::MySql => {
            let insert_list = join_targets(insert_columns);
            let select_list = staged_projection(insert_columns);
            let set_list = update_set
                .iter()
                .map(|p| format!("{} = VALUES({})", p.target, p.target))
                .collect::<Vec<_>>()
                .join(", ");
            Ok(format!(
                "INSERT INTO {target} ({insert_list})\nSELECT {select_list} FROM (\n{using}\n) u\nON DUPLICATE KEY UPDATE {set_list}"
            ))
        }
    }
}

/// Compile an update-only write: matched rows change, unmatched rows are
/// left alone.
pub fn compile_update(
    dialect: Dialect,
    target: &str,
    using: &str,
    keys: &[ColumnPair],
    update_set: &[ColumnPair],
    parallelism: Parallelism,
) -> Result<String, CompileError> {
    if keys.is_empty() {
        return Err(CompileError::EmptyKeys {
            statement: "UPDATE",
        });
    }
    match dialect {
        Dialect::Oracle => Ok(merge_statement(
            dialect,
            target,
            using,
            keys,
            update_set,
            None,
            parallelism,
        )),
        Dialect::Postgres => {
            let set_list = bare_set_list(update_set);
            let on = key_conditions(keys);
            Ok(format!(
                "UPDATE {target} t\nSET {set_list}\nFROM (\n{using}\n) u\nWHERE {on}"
            ))
        }
        Dialect::Sqlite => {
            let set_list = bare_set_list(update_set);
            let on = key_conditions(keys);
            Ok(format!(
                "UPDATE {target} AS t\nSET {set_list}\nFROM (\n{using}\n) AS u\nWHERE {on}"
            ))
        }
        Dialect::MySql => {
            let set_list = update_set
                .iter()
                .map(|p| format!("t.{} = u.{}", p.target, p.staged))
                .collect::<Vec<_>>()
                .join(", ");
            let on = key_conditions(keys);
            Ok(format!(
                "UPDATE {target} t\nJOIN (\n{using}\n) u ON {on}\nSET {set_list}"
            ))
        }
    }
}

fn merge_statement(
    dialect: Dialect,
    target: &str,
    using: &str,
    keys: &[ColumnPair],
    update_set: &[ColumnPair],
    insert_columns: Option<&[ColumnPair]>,
    parallelism: Parallelism,
) -> String {
    let hint = parallel_hint(parallelism, dialect);
    let on = key_conditions(keys);
    let set_list = match dialect {
        // Postgres forbids qualifying the SET target inside MERGE.
        Dialect::Postgres => bare_set_list(update_set),
        _ => update_set
            .iter()
            .map(|p| format!("t.{} = u.{}", p.target, p.staged))
            .collect::<Vec<_>>()
            .join(", "),
    };
    let mut sql = format!(
        "MERGE {hint}INTO {target} t\nUSING (\n{using}\n) u\nON ({on})\nWHEN MATCHED THEN UPDATE SET {set_list}"
    );
    if let Some(insert_columns) = insert_columns {
        let insert_list = join_targets(insert_columns);
        let values_list = insert_columns
            .iter()
            .map(|p| format!("u.{}", p.staged))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(
            "\nWHEN NOT MATCHED THEN INSERT ({insert_list}) VALUES ({values_list})"
        ));
    }
    sql
}

fn key_conditions(keys: &[ColumnPair]) -> String {
    keys.iter()
        .map(|k| format!("t.{} = u.{}", k.target, k.staged))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn bare_set_list(update_set: &[ColumnPair]) -> String {
    update_set
        .iter()
        .map(|p| format!("{} = u.{}", p.target, p.staged))
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_targets(pairs: &[ColumnPair]) -> String {
    pairs
        .iter()
        .map(|p| p.target.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn staged_projection(pairs: &[ColumnPair]) -> String {
    pairs
        .iter()
        .map(|p| format!("u.{}", p.staged))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Vec<ColumnPair> {
        vec![ColumnPair::same("id")]
    }

    fn sets() -> Vec<ColumnPair> {
        vec![ColumnPair::same("amount"), ColumnPair::new("status", "state")]
    }

    fn inserts() -> Vec<ColumnPair> {
        vec![
            ColumnPair::same("id"),
            ColumnPair::same("amount"),
            ColumnPair::new("status", "state"),
        ]
    }

    #[test]
    fn oracle_merge_shape() {
        let sql = compile_merge(
            Dialect::Oracle,
            "raw_orders",
            "SELECT id, amount, state FROM ds_orders",
            &keys(),
            &sets(),
            &inserts(),
            Parallelism::Degree(2),
        )
        .unwrap();
        assert_eq!(
            sql,
            "MERGE /*+ PARALLEL(2) */ INTO raw_orders t\n\
             USING (\nSELECT id, amount, state FROM ds_orders\n) u\n\
             ON (t.id = u.id)\n\
             WHEN MATCHED THEN UPDATE SET t.amount = u.amount, t.status = u.state\n\
             WHEN NOT MATCHED THEN INSERT (id, amount, status) VALUES (u.id, u.amount, u.state)"
        );
    }

    #[test]
    fn postgres_merge_uses_bare_set_targets() {
        let sql = compile_merge(
            Dialect::Postgres,
            "raw_orders",
            "SELECT id FROM ds_orders",
            &keys(),
            &sets(),
            &inserts(),
            Parallelism::Off,
        )
        .unwrap();
        assert!(sql.contains("WHEN MATCHED THEN UPDATE SET amount = u.amount, status = u.state"));
        assert!(sql.starts_with("MERGE INTO raw_orders t"));
    }

    #[test]
    fn sqlite_merge_is_on_conflict() {
        let sql = compile_merge(
            Dialect::Sqlite,
            "raw_orders",
            "SELECT id, amount, state FROM ds_orders",
            &keys(),
            &sets(),
            &inserts(),
            Parallelism::Off,
        )
        .unwrap();
        assert!(sql.starts_with("INSERT INTO raw_orders (id, amount, status)"));
        assert!(sql.contains("SELECT u.id, u.amount, u.state FROM ("));
        assert!(sql.contains("ON CONFLICT (id) DO UPDATE SET amount = excluded.amount, status = excluded.status"));
    }

    #[test]
    fn mysql_merge_is_on_duplicate_key() {
        let sql = compile_merge(
            Dialect::MySql,
            "raw_orders",
            "SELECT id FROM ds_orders",
            &keys(),
            &sets(),
            &inserts(),
            Parallelism::Off,
        )
        .unwrap();
        assert!(sql.contains("ON DUPLICATE KEY UPDATE amount = VALUES(amount), status = VALUES(status)"));
    }

    #[test]
    fn empty_keys_rejected() {
        let err = compile_merge(
            Dialect::Sqlite,
            "t",
            "SELECT 1",
            &[],
            &sets(),
            &inserts(),
            Parallelism::Off,
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::EmptyKeys { statement: "MERGE" }));
    }

    #[test]
    fn oracle_update_is_matched_only_merge() {
        let sql = compile_update(
            Dialect::Oracle,
            "raw_orders",
            "SELECT id FROM ds_orders",
            &keys(),
            &sets(),
            Parallelism::Off,
        )
        .unwrap();
        assert!(sql.contains("WHEN MATCHED THEN UPDATE SET"));
        assert!(!sql.contains("WHEN NOT MATCHED"));
    }

    #[test]
    fn sqlite_update_from_shape() {
        let sql = compile_update(
            Dialect::Sqlite,
            "raw_orders",
            "SELECT id, amount, state FROM ds_orders",
            &keys(),
            &sets(),
            Parallelism::Off,
        )
        .unwrap();
        assert_eq!(
            sql,
            "UPDATE raw_orders AS t\n\
             SET amount = u.amount, status = u.state\n\
             FROM (\nSELECT id, amount, state FROM ds_orders\n) AS u\n\
             WHERE t.id = u.id"
        );
    }

    #[test]
    fn mysql_update_joins() {
        let sql = compile_update(
            Dialect::MySql,
            "raw_orders",
            "SELECT id FROM ds_orders",
            &keys(),
            &sets(),
            Parallelism::Off,
        )
        .unwrap();
        assert!(sql.contains("JOIN (\nSELECT id FROM ds_orders\n) u ON t.id = u.id"));
        assert!(sql.ends_with("SET t.amount = u.amount, t.status = u.state"));
    }

    #[test]
    fn chunk_insert_renders_value_tuples() {
        let rows = vec![
            vec![SqlValue::Integer(1), SqlValue::Text("a".into())],
            vec![SqlValue::Integer(2), SqlValue::Null],
        ];
        let sql = compile_insert_chunk("raw_t", &["id".into(), "name".into()], &rows);
        assert_eq!(
            sql,
            "INSERT INTO raw_t (id, name)\nVALUES (1, 'a'),\n(2, NULL)"
        );
    }

    #[test]
    fn delete_with_hint() {
        assert_eq!(
            compile_delete("raw_t", Parallelism::Auto, Dialect::Oracle),
            "DELETE /*+ PARALLEL(auto) */ FROM raw_t"
        );
        assert_eq!(
            compile_delete("raw_t", Parallelism::Auto, Dialect::Sqlite),
            "DELETE FROM raw_t"
        );
    }
}
