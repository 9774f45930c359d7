//! Column type resolution against the source database catalog.
//!
//! Configured columns may omit their type; the resolver looks it up once
//! per column during prepare and memoizes it on the descriptor.

use std::sync::Arc;

use thiserror::Error;

use rowferry_store::{SqlExecutor, StoreError};
use rowferry_types::descriptor::{ColumnType, TableDescriptor, TypeClass};
use rowferry_types::{Dialect, SqlValue};

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("column '{column}' not found in catalog for table '{table}'")]
    ColumnNotFound { table: String, column: String },

    #[error("catalog reports unmappable type '{type_name}' for column '{column}'")]
    UnknownType { column: String, type_name: String },

    #[error("catalog query failed: {0}")]
    Store(#[from] StoreError),
}

/// Looks up column types in a source catalog.
pub trait CatalogResolver: Send + Sync {
    fn resolve_column_type(
        &self,
        schema: Option<&str>,
        table: &str,
        link: Option<&str>,
        column: &str,
    ) -> Result<ColumnType, ResolutionError>;
}

/// Resolver that queries the dialect's own catalog views through an
/// executor.
pub struct StoreCatalogResolver {
    executor: Arc<dyn SqlExecutor>,
    dialect: Dialect,
}

impl StoreCatalogResolver {
    pub fn new(executor: Arc<dyn SqlExecutor>, dialect: Dialect) -> Self {
        StoreCatalogResolver { executor, dialect }
    }
}

impl CatalogResolver for StoreCatalogResolver {
    fn resolve_column_type(
        &self,
        schema: Option<&str>,
        table: &str,
        link: Option<&str>,
        column: &str,
    ) -> Result<ColumnType, ResolutionError> {
        let not_found = || ResolutionError::ColumnNotFound {
            table: table.to_string(),
            column: column.to_string(),
        };
        match self.dialect {
            Dialect::Sqlite => {
                let sql = format!(
                    "SELECT type FROM pragma_table_info('{table}') WHERE name = '{column}'"
                );
                match self.executor.query_scalar(&sql)? {
                    Some(SqlValue::Text(type_name)) => parse_declared_type(column, &type_name),
                    _ => Err(not_found()),
                }
            }
            Dialect::Oracle => {
                let view = match link {
                    Some(l) => format!("all_tab_columns@{l}"),
                    None => "all_tab_columns".to_string(),
                };
                let owner = schema
                    .map(|s| format!(" AND owner = UPPER('{s}')"))
                    .unwrap_or_default();
                let sql = format!(
                    "SELECT data_type, data_length, data_precision, data_scale\n\
                     FROM {view}\n\
                     WHERE table_name = UPPER('{table}') AND column_name = UPPER('{column}'){owner}"
                );
                let rows = self.executor.query_rows(&sql)?;
                let row = rows.first().ok_or_else(not_found)?;
                from_catalog_row(column, row)
            }
            Dialect::Postgres | Dialect::MySql => {
                let schema_filter = schema
                    .map(|s| format!(" AND table_schema = '{s}'"))
                    .unwrap_or_default();
                let sql = format!(
                    "SELECT data_type, character_maximum_length, numeric_precision, numeric_scale\n\
                     FROM information_schema.columns\n\
                     WHERE table_name = '{table}' AND column_name = '{column}'{schema_filter}"
                );
                let rows = self.executor.query_rows(&sql)?;
                let row = rows.first().ok_or_else(not_found)?;
                from_catalog_row(column, row)
            }
        }
    }
}

/// Resolve every loaded column missing a type, in place.
pub fn resolve_descriptor(
    resolver: &dyn CatalogResolver,
    descriptor: &mut TableDescriptor,
) -> Result<(), ResolutionError> {
    let schema = descriptor.schema.clone();
    let table = descriptor.table.clone();
    let link = descriptor.link.clone();
    for column in &mut descriptor.columns {
        if column.column_type.is_some() || column.is_new || !column.is_loaded {
            continue;
        }
        column.column_type = Some(resolver.resolve_column_type(
            schema.as_deref(),
            &table,
            link.as_deref(),
            &column.source,
        )?);
    }
    Ok(())
}

fn from_catalog_row(column: &str, row: &[SqlValue]) -> Result<ColumnType, ResolutionError> {
    let type_name = row
        .first()
        .and_then(|v| v.as_str())
        .ok_or_else(|| ResolutionError::ColumnNotFound {
            table: String::new(),
            column: column.to_string(),
        })?;
    let class = TypeClass::parse(type_name).ok_or_else(|| ResolutionError::UnknownType {
        column: column.to_string(),
        type_name: type_name.to_string(),
    })?;
    let facet = |i: usize| row.get(i).and_then(|v| v.as_i64()).map(|v| v as u32);
    Ok(ColumnType {
        class,
        length: facet(1),
        precision: facet(2),
        scale: facet(3),
    })
}

/// Parse a declared type like `NUMERIC(10, 2)` or `VARCHAR(40)` into a
/// class plus facets.
fn parse_declared_type(column: &str, declared: &str) -> Result<ColumnType, ResolutionError> {
    let class = TypeClass::parse(declared).ok_or_else(|| ResolutionError::UnknownType {
        column: column.to_string(),
        type_name: declared.to_string(),
    })?;
    let facets: Vec<u32> = declared
        .split_once('(')
        .and_then(|(_, rest)| rest.strip_suffix(')'))
        .map(|inner| {
            inner
                .split(',')
                .filter_map(|p| p.trim().parse().ok())
                .collect()
        })
        .unwrap_or_default();
    let mut ct = ColumnType::new(class);
    match class {
        TypeClass::Text => ct.length = facets.first().copied(),
        TypeClass::Numeric => {
            ct.precision = facets.first().copied();
            ct.scale = facets.get(1).copied();
        }
        _ => {}
    }
    Ok(ct)
}
