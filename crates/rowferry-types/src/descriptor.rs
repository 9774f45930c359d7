//! Declarative descriptors for source tables, columns, joins, and filters.
//!
//! A [`TableDescriptor`] is the fully-resolved input to the SQL compiler.
//! It is built from the pipeline configuration, then enriched in place by
//! the orchestrator (synthetic columns, resolved column types, resolved
//! period bounds) before any SQL is compiled from it.

use chrono::NaiveDateTime;
use serde_json::Value as Json;

/// Logical connector between rendered predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connector {
    #[default]
    And,
    Or,
    AndNot,
    OrNot,
}

impl Connector {
    pub fn keyword(self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
            Connector::AndNot => "AND NOT",
            Connector::OrNot => "OR NOT",
        }
    }

    /// Keyword used when the predicate opens the WHERE clause. The leading
    /// AND/OR is dropped; a negation survives as NOT.
    pub fn opening_keyword(self) -> &'static str {
        match self {
            Connector::And | Connector::Or => "",
            Connector::AndNot | Connector::OrNot => "NOT",
        }
    }
}

/// One comparison predicate against a column.
///
/// `column` is `None` when the filter is attached to a column descriptor
/// and the column is implied. An absent `value` renders as an IS NULL
/// test. A list value renders as IN (or the operator's list form, BETWEEN
/// taking two elements).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterDescriptor {
    pub column: Option<String>,
    pub table: Option<String>,
    pub connector: Connector,
    pub operator: Option<String>,
    pub value: Option<Json>,
}

/// Requested degree of parallelism for compiled statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parallelism {
    #[default]
    Off,
    Auto,
    Degree(u32),
}

impl Parallelism {
    pub fn is_off(self) -> bool {
        matches!(self, Parallelism::Off)
    }
}

/// Broad type classes recognized across dialects. Catalog type names are
/// normalized into one of these and re-rendered per target dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    Integer,
    Numeric,
    Float,
    Text,
    Date,
    DateTime,
    Time,
    Boolean,
}

impl TypeClass {
    /// Normalize a catalog or config type name. Returns `None` for names
    /// no dialect mapping exists for.
    pub fn parse(name: &str) -> Option<TypeClass> {
        let n = name.trim().to_lowercase();
        let base = n.split(['(', ' ']).next().unwrap_or(&n);
        match base {
            "int" | "int2" | "int4" | "int8" | "integer" | "smallint" | "bigint"
            | "mediumint" | "tinyint" | "serial" | "bigserial" => Some(TypeClass::Integer),
            "number" | "numeric" | "decimal" | "dec" => Some(TypeClass::Numeric),
            "float" | "float4" | "float8" | "real" | "double" | "binary_float"
            | "binary_double" => Some(TypeClass::Float),
            "varchar" | "varchar2" | "nvarchar2" | "char" | "nchar" | "character"
            | "text" | "clob" | "nclob" | "string" => Some(TypeClass::Text),
            "date" => Some(TypeClass::Date),
            "datetime" | "timestamp" | "timestamptz" => Some(TypeClass::DateTime),
            "time" | "timetz" => Some(TypeClass::Time),
            "bool" | "boolean" => Some(TypeClass::Boolean),
            _ => None,
        }
    }
}

/// A resolved column type: class plus the size facets the catalog reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnType {
    pub class: TypeClass,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

impl ColumnType {
    pub fn new(class: TypeClass) -> Self {
        ColumnType {
            class,
            length: None,
            precision: None,
            scale: None,
        }
    }

    pub fn with_length(class: TypeClass, length: u32) -> Self {
        ColumnType {
            class,
            length: Some(length),
            precision: None,
            scale: None,
        }
    }
}

/// One column of the moved dataset.
///
/// `source` is the name the column carries in the compiled SELECT and in
/// the staging table; `name` is the name it gets in the target table
/// (defaults to `source`). Transformed and literal columns are aliased
/// `AS source` so the staging projection stays stable.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub source: String,
    /// Pointer (alias or table name) the column is qualified with; defaults
    /// to the base table pointer.
    pub table: Option<String>,
    pub column_type: Option<ColumnType>,
    /// Column does not exist at the source; selected as a literal.
    pub is_new: bool,
    /// Column participates in the target write. Off for join-only columns.
    pub is_loaded: bool,
    pub trim: bool,
    pub to_char: bool,
    /// Constant literal selected instead of a source column.
    pub value: Option<Json>,
    pub filters: Vec<FilterDescriptor>,
}

impl ColumnDescriptor {
    pub fn plain(name: &str) -> Self {
        ColumnDescriptor {
            name: name.to_string(),
            source: name.to_string(),
            table: None,
            column_type: None,
            is_new: false,
            is_loaded: true,
            trim: false,
            to_char: false,
            value: None,
            filters: Vec::new(),
        }
    }

    /// Whether the select expression is anything other than a bare column
    /// reference. Transformed columns get an `AS` alias.
    pub fn is_transformed(&self) -> bool {
        self.trim || self.to_char || self.value.is_some() || self.is_new
    }

    /// Name the column carries in the staging table.
    pub fn staged_name(&self) -> &str {
        &self.source
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    pub fn keyword(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
        }
    }
}

/// One equality (or custom-operator) condition of a join's ON clause.
///
/// `key` names the column on the joined table; `column` the column on the
/// other side (defaults to `key`), qualified by `table` or the base table
/// pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinCondition {
    pub key: String,
    pub table: Option<String>,
    pub column: Option<String>,
    pub operator: String,
    pub connector: Connector,
}

impl JoinCondition {
    pub fn on_key(key: &str) -> Self {
        JoinCondition {
            key: key.to_string(),
            table: None,
            column: None,
            operator: "=".to_string(),
            connector: Connector::And,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinDescriptor {
    pub table: String,
    pub schema: Option<String>,
    pub link: Option<String>,
    pub alias: Option<String>,
    pub kind: JoinType,
    pub conditions: Vec<JoinCondition>,
}

impl JoinDescriptor {
    /// Alias if present, table name otherwise.
    pub fn pointer(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    /// `schema.table@link` composition, parts included as configured.
    pub fn qualified_name(&self) -> String {
        qualify(self.schema.as_deref(), &self.table, self.link.as_deref())
    }
}

/// Primary key of the target table. An empty column list means none.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrimaryKey {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

impl PrimaryKey {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Foreign key constraint rendered into CREATE TABLE.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyDescriptor {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
}

/// Resolved date-range bound applied ahead of all other filters.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodBound {
    pub column: String,
    pub table: Option<String>,
    pub begin: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Fully-resolved description of the dataset to move.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    pub table: String,
    pub schema: Option<String>,
    /// Database link the source is reached over, composed as `@link`.
    pub link: Option<String>,
    pub alias: Option<String>,
    pub columns: Vec<ColumnDescriptor>,
    pub select_all: bool,
    pub joins: Vec<JoinDescriptor>,
    pub filters: Vec<FilterDescriptor>,
    pub period: Option<PeriodBound>,
    pub primary_key: PrimaryKey,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    pub parallelism: Parallelism,
}

impl TableDescriptor {
    pub fn new(table: &str) -> Self {
        TableDescriptor {
            table: table.to_string(),
            schema: None,
            link: None,
            alias: None,
            columns: Vec::new(),
            select_all: false,
            joins: Vec::new(),
            filters: Vec::new(),
            period: None,
            primary_key: PrimaryKey::default(),
            foreign_keys: Vec::new(),
            parallelism: Parallelism::Off,
        }
    }

    /// Alias if present, table name otherwise. Used to qualify columns.
    pub fn pointer(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    /// `schema.table@link` composition, parts included as configured.
    pub fn qualified_name(&self) -> String {
        qualify(self.schema.as_deref(), &self.table, self.link.as_deref())
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name == name || c.source == name)
    }

    /// Whether a name refers to a declared column (by target or source name)
    /// or to a select-all projection.
    pub fn declares_column(&self, name: &str) -> bool {
        self.select_all || self.column(name).is_some()
    }

    /// Columns written to the target, in declaration order.
    pub fn loaded_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_loaded)
    }

    /// Loaded columns that exist at the source (the duplicate-detection key
    /// set when no primary key is declared).
    pub fn natural_key_columns(&self) -> Vec<&ColumnDescriptor> {
        self.loaded_columns().filter(|c| !c.is_new).collect()
    }
}

fn qualify(schema: Option<&str>, table: &str, link: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(s) = schema {
        out.push_str(s);
        out.push('.');
    }
    out.push_str(table);
    if let Some(l) = link {
        out.push('@');
        out.push_str(l);
    }
    out
}
