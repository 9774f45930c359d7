//! DDL compilation: target table creation, staging materialization, drops.

use rowferry_types::descriptor::{ColumnType, TableDescriptor, TypeClass};
use rowferry_types::Dialect;

use crate::error::CompileError;

/// Render a resolved column type in the target dialect's spelling.
pub fn render_type(ct: &ColumnType, dialect: Dialect) -> String {
    match ct.class {
        TypeClass::Integer => "INTEGER".to_string(),
        TypeClass::Numeric => {
            let base = if dialect == Dialect::Oracle {
                "NUMBER"
            } else {
                "NUMERIC"
            };
            match (ct.precision, ct.scale) {
                (Some(p), Some(s)) => format!("{base}({p}, {s})"),
                (Some(p), None) => format!("{base}({p})"),
                _ => base.to_string(),
            }
        }
        TypeClass::Float => match dialect {
            Dialect::Oracle => "BINARY_DOUBLE".to_string(),
            Dialect::Postgres => "DOUBLE PRECISION".to_string(),
            Dialect::MySql => "DOUBLE".to_string(),
            Dialect::Sqlite => "REAL".to_string(),
        },
        TypeClass::Text => match dialect {
            Dialect::Oracle => format!("VARCHAR2({})", ct.length.unwrap_or(4000)),
            Dialect::MySql => match ct.length {
                Some(n) => format!("VARCHAR({n})"),
                None => "TEXT".to_string(),
            },
            Dialect::Postgres | Dialect::Sqlite => match ct.length {
                Some(n) => format!("VARCHAR({n})"),
                None => "TEXT".to_string(),
            },
        },
        TypeClass::Date => "DATE".to_string(),
        TypeClass::DateTime => match dialect {
            Dialect::MySql => "DATETIME".to_string(),
            _ => "TIMESTAMP".to_string(),
        },
        TypeClass::Time => match dialect {
            Dialect::Oracle => "TIMESTAMP".to_string(),
            _ => "TIME".to_string(),
        },
        TypeClass::Boolean => match dialect {
            Dialect::Oracle => "NUMBER(1)".to_string(),
            Dialect::MySql => "TINYINT(1)".to_string(),
            _ => "BOOLEAN".to_string(),
        },
    }
}

/// Full CREATE TABLE for the target, with primary and foreign keys. Every
/// loaded column must carry a resolved type.
pub fn compile_create_table(
    target: &str,
    t: &TableDescriptor,
    dialect: Dialect,
) -> Result<String, CompileError> {
    let mut parts: Vec<String> = Vec::new();
    for column in t.loaded_columns() {
        let ct = column
            .column_type
            .as_ref()
            .ok_or_else(|| CompileError::UnresolvedType {
                column: column.name.clone(),
            })?;
        parts.push(format!("{} {}", column.name, render_type(ct, dialect)));
    }
    if parts.is_empty() {
        return Err(CompileError::NoColumns {
            table: t.table.clone(),
        });
    }
    if !t.primary_key.is_empty() {
        let cols = t.primary_key.columns.join(", ");
        parts.push(match &t.primary_key.name {
            Some(name) => format!("CONSTRAINT {name} PRIMARY KEY ({cols})"),
            None => format!("PRIMARY KEY ({cols})"),
        });
    }
    for fk in &t.foreign_keys {
        let cols = fk.columns.join(", ");
        let ref_cols = fk.ref_columns.join(", ");
        let body = format!(
            "FOREIGN KEY ({cols}) REFERENCES {} ({ref_cols})",
            fk.ref_table
        );
        parts.push(match &fk.name {
            Some(name) => format!("CONSTRAINT {name} {body}"),
            None => body,
        });
    }
    Ok(format!(
        "CREATE TABLE {target} (\n  {}\n)",
        parts.join(",\n  ")
    ))
}

/// Materialize an empty table with the shape of a SELECT. The skeleton must
/// not carry a WHERE clause of its own.
pub fn compile_create_as_select(target: &str, select_skeleton: &str) -> String {
    format!("CREATE TABLE {target} AS\n{select_skeleton}\nWHERE 1 = 0")
}

pub fn compile_drop_table(target: &str) -> String {
    format!("DROP TABLE {target}")
}
