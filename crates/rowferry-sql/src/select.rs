//! SELECT compilation: projection, FROM, JOIN, and WHERE rendering.

use rowferry_types::descriptor::{
    ColumnDescriptor, Connector, FilterDescriptor, Parallelism, TableDescriptor,
};
use rowferry_types::Dialect;
use serde_json::Value as Json;

use crate::error::CompileError;
use crate::literal;

/// Optimizer hint text, including a trailing space, for dialects that take
/// one. Empty otherwise.
pub fn parallel_hint(parallelism: Parallelism, dialect: Dialect) -> String {
    if !dialect.supports_parallel_hint() {
        return String::new();
    }
    match parallelism {
        Parallelism::Off => String::new(),
        Parallelism::Auto => "/*+ PARALLEL(auto) */ ".to_string(),
        Parallelism::Degree(n) => format!("/*+ PARALLEL({n}) */ "),
    }
}

/// Compile the full SELECT for a descriptor: projection, source, joins,
/// and every configured predicate.
pub fn compile_select(t: &TableDescriptor, dialect: Dialect) -> Result<String, CompileError> {
    let mut sql = compile_select_skeleton(t, dialect)?;
    if let Some(where_clause) = compile_where(t, dialect)? {
        sql.push('\n');
        sql.push_str(&where_clause);
    }
    Ok(sql)
}

/// Projection, FROM, and JOIN clauses without any WHERE. Staging
/// materialization appends its own `WHERE 1 = 0` to this.
///
/// The projection carries one expression per loaded source column.
/// Unloaded columns exist only for joins and filters; synthetic columns
/// are stamped as literals at write time, not extracted.
pub fn compile_select_skeleton(
    t: &TableDescriptor,
    dialect: Dialect,
) -> Result<String, CompileError> {
    let hint = parallel_hint(t.parallelism, dialect);
    let projection = if t.select_all {
        format!("{}.*", t.pointer())
    } else {
        let projected: Vec<&ColumnDescriptor> = t
            .columns
            .iter()
            .filter(|c| c.is_loaded && !c.is_new)
            .collect();
        if projected.is_empty() {
            return Err(CompileError::NoColumns {
                table: t.table.clone(),
            });
        }
        projected
            .iter()
            .map(|c| column_expr(t, c, dialect))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut sql = format!("SELECT {hint}{projection}\nFROM {}", from_clause(t));
    for join in &t.joins {
        let join_ptr = join.pointer();
        let mut conditions = String::new();
        for (i, cond) in join.conditions.iter().enumerate() {
            let lhs_ptr = cond.table.as_deref().unwrap_or_else(|| t.pointer());
            let lhs_col = cond.column.as_deref().unwrap_or(&cond.key);
            if lhs_ptr == t.pointer() && !t.declares_column(lhs_col) {
                return Err(CompileError::UnknownColumn {
                    column: lhs_col.to_string(),
                    table: t.table.clone(),
                    context: "join condition",
                });
            }
            if i > 0 {
                conditions.push(' ');
                conditions.push_str(cond.connector.keyword());
                conditions.push(' ');
            }
            conditions.push_str(&format!(
                "{join_ptr}.{} {} {lhs_ptr}.{lhs_col}",
                cond.key, cond.operator
            ));
        }
        let mut target = join.qualified_name();
        if join.alias.is_some() {
            target.push(' ');
            target.push_str(join_ptr);
        }
        sql.push_str(&format!("\n{} {target} ON {conditions}", join.kind.keyword()));
    }
    Ok(sql)
}

/// `SELECT COUNT(*)` over an already-compiled statement.
pub fn compile_count(select: &str) -> String {
    format!("SELECT COUNT(*) FROM (\n{select}\n) q")
}

fn from_clause(t: &TableDescriptor) -> String {
    let mut out = t.qualified_name();
    if t.alias.is_some() {
        out.push(' ');
        out.push_str(t.pointer());
    }
    out
}

/// Select expression for one column. A bare reference stays unaliased;
/// anything transformed or literal gets `AS source` so the projection name
/// is stable.
fn column_expr(t: &TableDescriptor, c: &ColumnDescriptor, dialect: Dialect) -> String {
    let mut expr = match &c.value {
        Some(v) => literal::render(v),
        None => {
            let pointer = c.table.as_deref().unwrap_or_else(|| t.pointer());
            format!("{pointer}.{}", c.source)
        }
    };
    if c.trim {
        expr = format!("TRIM({expr})");
    }
    if c.to_char {
        expr = match dialect {
            Dialect::Oracle => format!("TO_CHAR({expr})"),
            Dialect::MySql => format!("CAST({expr} AS CHAR)"),
            Dialect::Postgres | Dialect::Sqlite => format!("CAST({expr} AS TEXT)"),
        };
    }
    if c.is_transformed() {
        expr = format!("{expr} AS {}", c.source);
    }
    expr
}

/// Build the WHERE clause. Predicate order: period bound first, then
/// column-attached filters in declaration order, then table-level filters.
fn compile_where(t: &TableDescriptor, dialect: Dialect) -> Result<Option<String>, CompileError> {
    let mut parts: Vec<(Connector, String)> = Vec::new();

    if let Some(period) = &t.period {
        let pointer = period.table.as_deref().unwrap_or_else(|| t.pointer());
        parts.push((
            Connector::And,
            format!(
                "{pointer}.{} BETWEEN {} AND {}",
                period.column,
                literal::render_timestamp(&period.begin, dialect),
                literal::render_timestamp(&period.end, dialect)
            ),
        ));
    }

    for column in &t.columns {
        for filter in &column.filters {
            let pointer = filter
                .table
                .as_deref()
                .or(column.table.as_deref())
                .unwrap_or_else(|| t.pointer());
            parts.push((
                filter.connector,
                predicate_body(pointer, &column.source, filter),
            ));
        }
    }

    for filter in &t.filters {
        let column = filter
            .column
            .as_deref()
            .ok_or_else(|| CompileError::UnknownColumn {
                column: String::new(),
                table: t.table.clone(),
                context: "table filter",
            })?;
        if !t.declares_column(column) {
            return Err(CompileError::UnknownColumn {
                column: column.to_string(),
                table: t.table.clone(),
                context: "table filter",
            });
        }
        let source = t
            .column(column)
            .map(|c| c.source.as_str())
            .unwrap_or(column);
        let pointer = filter.table.as_deref().unwrap_or_else(|| t.pointer());
        parts.push((filter.connector, predicate_body(pointer, source, filter)));
    }

    if parts.is_empty() {
        return Ok(None);
    }

    let mut clause = String::from("WHERE ");
    for (i, (connector, body)) in parts.iter().enumerate() {
        if i == 0 {
            let opener = connector.opening_keyword();
            if !opener.is_empty() {
                clause.push_str(opener);
                clause.push(' ');
            }
        } else {
            clause.push(' ');
            clause.push_str(connector.keyword());
            clause.push(' ');
        }
        clause.push_str(body);
    }
    Ok(Some(clause))
}

/// Render one comparison. An absent value becomes an IS NULL test; a list
/// becomes IN (or BETWEEN when the operator says so).
fn predicate_body(pointer: &str, column: &str, filter: &FilterDescriptor) -> String {
    let column_ref = format!("{pointer}.{column}");
    match &filter.value {
        None | Some(Json::Null) => {
            let op = normalize_operator(filter.operator.as_deref(), "IS");
            format!("{column_ref} {op} NULL")
        }
        Some(Json::Array(values)) => {
            let op = normalize_operator(filter.operator.as_deref(), "IN");
            if op == "BETWEEN" && values.len() == 2 {
                format!(
                    "{column_ref} BETWEEN {} AND {}",
                    literal::render(&values[0]),
                    literal::render(&values[1])
                )
            } else {
                format!("{column_ref} {op} ({})", literal::render_list(values))
            }
        }
        Some(value) => {
            let op = normalize_operator(filter.operator.as_deref(), "=");
            format!("{column_ref} {op} {}", literal::render(value))
        }
    }
}

fn normalize_operator(operator: Option<&str>, default: &str) -> String {
    match operator {
        None => default.to_string(),
        Some(op) if op.chars().all(|c| c.is_alphabetic() || c == ' ') => op.to_uppercase(),
        Some(op) => op.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowferry_types::descriptor::{JoinCondition, JoinDescriptor, JoinType, PeriodBound};
    use serde_json::json;

    fn base() -> TableDescriptor {
        let mut t = TableDescriptor::new("orders");
        t.schema = Some("sales".into());
        t.alias = Some("o".into());
        t.columns = vec![
            ColumnDescriptor::plain("order_id"),
            ColumnDescriptor::plain("status"),
        ];
        t
    }

    #[test]
    fn plain_select() {
        let sql = compile_select(&base(), Dialect::Sqlite).unwrap();
        assert_eq!(sql, "SELECT o.order_id, o.status\nFROM sales.orders o");
    }

    #[test]
    fn link_composes_into_from() {
        let mut t = base();
        t.link = Some("dwh".into());
        let sql = compile_select(&t, Dialect::Oracle).unwrap();
        assert_eq!(sql, "SELECT o.order_id, o.status\nFROM sales.orders@dwh o");
    }

    #[test]
    fn transformed_columns_are_aliased() {
        let mut t = base();
        t.columns[1].trim = true;
        t.columns[1].to_char = true;
        let sql = compile_select(&t, Dialect::Oracle).unwrap();
        assert_eq!(
            sql,
            "SELECT o.order_id, TO_CHAR(TRIM(o.status)) AS status\nFROM sales.orders o"
        );
    }

    #[test]
    fn plain_columns_are_never_aliased() {
        let sql = compile_select(&base(), Dialect::Postgres).unwrap();
        assert!(!sql.contains(" AS "));
    }

    #[test]
    fn literal_column() {
        let mut t = base();
        let mut c = ColumnDescriptor::plain("origin");
        c.value = Some(json!("erp"));
        t.columns.push(c);
        let sql = compile_select(&t, Dialect::Sqlite).unwrap();
        assert!(sql.contains("'erp' AS origin"));
    }

    #[test]
    fn projection_covers_only_loaded_source_columns() {
        let mut t = base();
        let mut join_only = ColumnDescriptor::plain("join_only");
        join_only.is_loaded = false;
        let mut synthetic = ColumnDescriptor::plain("synthetic");
        synthetic.is_new = true;
        t.columns.push(join_only);
        t.columns.push(synthetic);
        let sql = compile_select(&t, Dialect::Sqlite).unwrap();
        assert_eq!(sql, "SELECT o.order_id, o.status\nFROM sales.orders o");
    }

    #[test]
    fn nothing_loaded_is_rejected() {
        let mut t = base();
        for c in &mut t.columns {
            c.is_loaded = false;
        }
        let err = compile_select(&t, Dialect::Sqlite).unwrap_err();
        assert!(matches!(err, CompileError::NoColumns { .. }));
    }

    #[test]
    fn oracle_parallel_hint() {
        let mut t = base();
        t.parallelism = Parallelism::Degree(8);
        let sql = compile_select(&t, Dialect::Oracle).unwrap();
        assert!(sql.starts_with("SELECT /*+ PARALLEL(8) */ o.order_id"));
        t.parallelism = Parallelism::Auto;
        let sql = compile_select(&t, Dialect::Oracle).unwrap();
        assert!(sql.starts_with("SELECT /*+ PARALLEL(auto) */ "));
    }

    #[test]
    fn hint_suppressed_off_oracle() {
        let mut t = base();
        t.parallelism = Parallelism::Degree(8);
        let sql = compile_select(&t, Dialect::Postgres).unwrap();
        assert!(sql.starts_with("SELECT o.order_id"));
    }

    #[test]
    fn join_rendering() {
        let mut t = base();
        t.columns.push(ColumnDescriptor::plain("customer_id"));
        t.joins.push(JoinDescriptor {
            table: "customers".into(),
            schema: Some("sales".into()),
            link: None,
            alias: Some("c".into()),
            kind: JoinType::Left,
            conditions: vec![JoinCondition::on_key("customer_id")],
        });
        let sql = compile_select(&t, Dialect::Sqlite).unwrap();
        assert!(sql.contains("LEFT JOIN sales.customers c ON c.customer_id = o.customer_id"));
    }

    #[test]
    fn join_on_undeclared_column_fails() {
        let mut t = base();
        t.joins.push(JoinDescriptor {
            table: "customers".into(),
            schema: None,
            link: None,
            alias: Some("c".into()),
            kind: JoinType::Inner,
            conditions: vec![JoinCondition::on_key("customer_id")],
        });
        let err = compile_select(&t, Dialect::Sqlite).unwrap_err();
        assert!(matches!(err, CompileError::UnknownColumn { .. }));
    }

    #[test]
    fn where_ordering_and_connectors() {
        let mut t = base();
        t.columns[1].filters.push(FilterDescriptor {
            column: None,
            table: None,
            connector: Connector::And,
            operator: Some(">=".into()),
            value: Some(json!(5)),
        });
        t.filters.push(FilterDescriptor {
            column: Some("order_id".into()),
            table: None,
            connector: Connector::Or,
            operator: None,
            value: Some(json!(7)),
        });
        let sql = compile_select(&t, Dialect::Sqlite).unwrap();
        assert!(sql.ends_with("WHERE o.status >= 5 OR o.order_id = 7"));
    }

    #[test]
    fn first_predicate_negation_keeps_not() {
        let mut t = base();
        t.filters.push(FilterDescriptor {
            column: Some("status".into()),
            table: None,
            connector: Connector::AndNot,
            operator: None,
            value: Some(json!("void")),
        });
        let sql = compile_select(&t, Dialect::Sqlite).unwrap();
        assert!(sql.ends_with("WHERE NOT o.status = 'void'"));
    }

    #[test]
    fn absent_value_renders_is_null() {
        let mut t = base();
        t.filters.push(FilterDescriptor {
            column: Some("status".into()),
            ..Default::default()
        });
        let sql = compile_select(&t, Dialect::Sqlite).unwrap();
        assert!(sql.ends_with("WHERE o.status IS NULL"));
    }

    #[test]
    fn list_value_defaults_to_in() {
        let mut t = base();
        t.filters.push(FilterDescriptor {
            column: Some("status".into()),
            value: Some(json!(["new", "paid"])),
            ..Default::default()
        });
        let sql = compile_select(&t, Dialect::Sqlite).unwrap();
        assert!(sql.ends_with("WHERE o.status IN ('new', 'paid')"));
    }

    #[test]
    fn between_takes_two_bounds() {
        let mut t = base();
        t.filters.push(FilterDescriptor {
            column: Some("order_id".into()),
            operator: Some("between".into()),
            value: Some(json!([10, 20])),
            ..Default::default()
        });
        let sql = compile_select(&t, Dialect::Sqlite).unwrap();
        assert!(sql.ends_with("WHERE o.order_id BETWEEN 10 AND 20"));
    }

    #[test]
    fn undeclared_filter_column_fails() {
        let mut t = base();
        t.filters.push(FilterDescriptor {
            column: Some("ghost".into()),
            value: Some(json!(1)),
            ..Default::default()
        });
        let err = compile_select(&t, Dialect::Sqlite).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnknownColumn { column, .. } if column == "ghost"
        ));
    }

    #[test]
    fn period_bound_leads_the_where_clause() {
        use chrono::NaiveDate;
        let mut t = base();
        t.period = Some(PeriodBound {
            column: "updated_at".into(),
            table: None,
            begin: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(23, 59, 59)
                .unwrap(),
        });
        t.filters.push(FilterDescriptor {
            column: Some("status".into()),
            value: Some(json!("new")),
            ..Default::default()
        });
        let sql = compile_select(&t, Dialect::Sqlite).unwrap();
        assert!(sql.contains(
            "WHERE o.updated_at BETWEEN '2024-03-01 00:00:00' AND '2024-03-01 23:59:59' AND o.status = 'new'"
        ));
    }

    #[test]
    fn count_wraps_the_select() {
        let sql = compile_count("SELECT a\nFROM t");
        assert_eq!(sql, "SELECT COUNT(*) FROM (\nSELECT a\nFROM t\n) q");
    }
}
