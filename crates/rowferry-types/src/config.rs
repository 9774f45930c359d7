//! Pipeline configuration model.
//!
//! This is the serde image of the YAML file a pipeline is declared in.
//! [`PipelineConfig::to_descriptor`] lowers it into the compiler-facing
//! [`TableDescriptor`], validating connector/join/type spellings on the way.

use serde::Deserialize;
use serde_json::Value as Json;
use thiserror::Error;

use crate::descriptor::{
    ColumnDescriptor, ColumnType, Connector, FilterDescriptor, ForeignKeyDescriptor,
    JoinCondition, JoinDescriptor, JoinType, Parallelism, PrimaryKey, TableDescriptor, TypeClass,
};
use crate::dialect::Dialect;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown connector '{0}' (expected and/or/and not/or not)")]
    UnknownConnector(String),
    #[error("unknown join type '{0}' (expected inner/left/right/outer)")]
    UnknownJoinType(String),
    #[error("unknown column type '{0}'")]
    UnknownColumnType(String),
    #[error("pipeline declares no columns and select_all is off")]
    NoColumns,
    #[error("staged pipelines cannot use select_all without declared columns")]
    SelectAllWithoutColumns,
    #[error("direct mode requires distinct source and target stores")]
    SharedStore,
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
    #[error("{section} key list is empty")]
    EmptyKeys { section: &'static str },
    #[error("unknown period value '{0}'")]
    UnknownPeriod(String),
    #[error("bad timestamp '{0}' (expected YYYY-MM-DD HH:MM:SS)")]
    BadTimestamp(String),
}

/// How the reconciler treats exact duplicate rows in staging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Rows already present in the target are routed to the error handler.
    #[serde(alias = "enforce", alias = "unique")]
    EnforceUnique,
    /// No duplicate pass runs.
    #[default]
    #[serde(alias = "allow")]
    AllowDuplicates,
}

/// Pipeline execution shape, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Same-database transfer through a staging table.
    #[default]
    Staged,
    /// Cross-store transfer through in-memory row chunks.
    Direct,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ParallelConfig {
    Flag(bool),
    Degree(u32),
    Word(String),
}

impl ParallelConfig {
    fn to_parallelism(&self) -> Parallelism {
        match self {
            ParallelConfig::Flag(false) => Parallelism::Off,
            ParallelConfig::Flag(true) => Parallelism::Auto,
            ParallelConfig::Degree(n) => Parallelism::Degree(*n),
            ParallelConfig::Word(w) if w.eq_ignore_ascii_case("auto") => Parallelism::Auto,
            ParallelConfig::Word(_) => Parallelism::Off,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub connector: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub value: Option<Json>,
}

impl FilterConfig {
    fn to_descriptor(&self) -> Result<FilterDescriptor, ConfigError> {
        Ok(FilterDescriptor {
            column: self.column.clone(),
            table: self.table.clone(),
            connector: parse_connector(self.connector.as_deref())?,
            operator: self.operator.clone(),
            value: self.value.clone(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ColumnConfig {
    /// Bare column name shorthand.
    Name(String),
    Spec(ColumnSpec),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    /// Name in the target table; defaults to `name`.
    #[serde(default)]
    pub rename: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(default)]
    pub precision: Option<u32>,
    #[serde(default)]
    pub scale: Option<u32>,
    #[serde(default, rename = "new")]
    pub is_new: bool,
    #[serde(default = "default_true", rename = "load")]
    pub is_loaded: bool,
    #[serde(default)]
    pub trim: bool,
    #[serde(default)]
    pub to_char: bool,
    #[serde(default)]
    pub value: Option<Json>,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

fn default_true() -> bool {
    true
}

impl ColumnConfig {
    fn to_descriptor(&self) -> Result<ColumnDescriptor, ConfigError> {
        match self {
            ColumnConfig::Name(name) => Ok(ColumnDescriptor::plain(name)),
            ColumnConfig::Spec(spec) => {
                let column_type = match &spec.type_name {
                    Some(t) => {
                        let class = TypeClass::parse(t)
                            .ok_or_else(|| ConfigError::UnknownColumnType(t.clone()))?;
                        Some(ColumnType {
                            class,
                            length: spec.length,
                            precision: spec.precision,
                            scale: spec.scale,
                        })
                    }
                    None => None,
                };
                let filters = spec
                    .filters
                    .iter()
                    .map(|f| f.to_descriptor())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ColumnDescriptor {
                    name: spec.rename.clone().unwrap_or_else(|| spec.name.clone()),
                    source: spec.name.clone(),
                    table: spec.table.clone(),
                    column_type,
                    is_new: spec.is_new,
                    is_loaded: spec.is_loaded,
                    trim: spec.trim,
                    to_char: spec.to_char,
                    value: spec.value.clone(),
                    filters,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JoinOnConfig {
    /// Shorthand: equality on the same column name both sides.
    Key(String),
    Spec {
        key: String,
        #[serde(default)]
        table: Option<String>,
        #[serde(default)]
        column: Option<String>,
        #[serde(default)]
        operator: Option<String>,
        #[serde(default)]
        connector: Option<String>,
    },
}

impl JoinOnConfig {
    fn to_condition(&self) -> Result<JoinCondition, ConfigError> {
        match self {
            JoinOnConfig::Key(key) => Ok(JoinCondition::on_key(key)),
            JoinOnConfig::Spec {
                key,
                table,
                column,
                operator,
                connector,
            } => Ok(JoinCondition {
                key: key.clone(),
                table: table.clone(),
                column: column.clone(),
                operator: operator.clone().unwrap_or_else(|| "=".to_string()),
                connector: parse_connector(connector.as_deref())?,
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinConfig {
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default, rename = "type")]
    pub join_type: Option<String>,
    #[serde(default, rename = "on")]
    pub conditions: Vec<JoinOnConfig>,
}

impl JoinConfig {
    fn to_descriptor(&self) -> Result<JoinDescriptor, ConfigError> {
        let kind = match self.join_type.as_deref() {
            None => JoinType::Inner,
            Some(t) => match t.to_lowercase().as_str() {
                "inner" => JoinType::Inner,
                "left" => JoinType::Left,
                "right" => JoinType::Right,
                "outer" | "full" => JoinType::Full,
                other => return Err(ConfigError::UnknownJoinType(other.to_string())),
            },
        };
        let conditions = self
            .conditions
            .iter()
            .map(|c| c.to_condition())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(JoinDescriptor {
            table: self.table.clone(),
            schema: self.schema.clone(),
            link: self.link.clone(),
            alias: self.alias.clone(),
            kind,
            conditions,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeriodConfig {
    pub column: String,
    #[serde(default)]
    pub table: Option<String>,
    /// Symbolic range: `@Today`, `@ThisMonth`, `@LastHour`, `@Yesterday`,
    /// `@LastMonth`.
    pub value: String,
    /// Override for the lower bound on the first-ever run, as
    /// `YYYY-MM-DD HH:MM:SS`.
    #[serde(default)]
    pub starting: Option<String>,
    #[serde(default)]
    pub utc: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub select_all: bool,
    #[serde(default)]
    pub joins: Vec<JoinConfig>,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
    #[serde(default)]
    pub period: Option<PeriodConfig>,
    #[serde(default)]
    pub parallel: Option<ParallelConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KeySpec {
    Columns(Vec<String>),
    Named {
        #[serde(default)]
        name: Option<String>,
        columns: Vec<String>,
    },
}

impl KeySpec {
    pub fn to_primary_key(&self) -> PrimaryKey {
        match self {
            KeySpec::Columns(columns) => PrimaryKey {
                name: None,
                columns: columns.clone(),
            },
            KeySpec::Named { name, columns } => PrimaryKey {
                name: name.clone(),
                columns: columns.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForeignKeyConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
}

/// One key mapping in a merge/update section: a plain name when both sides
/// match, or a `[target, staged]` pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KeyMap {
    Same(String),
    Pair((String, String)),
}

impl KeyMap {
    /// `(target column, staged column)`.
    pub fn as_pair(&self) -> (&str, &str) {
        match self {
            KeyMap::Same(k) => (k, k),
            KeyMap::Pair((t, s)) => (t, s),
        }
    }
}

/// Merge or update write declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct WriteConfig {
    pub keys: Vec<KeyMap>,
    /// Non-key columns to set; defaults to all loaded non-key columns.
    #[serde(default)]
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Namings {
    /// `{type}`, `{source}`, `{basename}` placeholder pattern overrides per
    /// generated-table kind.
    #[serde(default)]
    pub ds: Option<String>,
    #[serde(default)]
    pub eh: Option<String>,
    #[serde(default)]
    pub raw: Option<String>,
    #[serde(default)]
    pub log: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourcesConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_fetch_rows")]
    pub fetch_rows: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_workers() -> usize {
    4
}
fn default_fetch_rows() -> usize {
    1000
}
fn default_queue_capacity() -> usize {
    8
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        ResourcesConfig {
            workers: default_workers(),
            fetch_rows: default_fetch_rows(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Root of the pipeline YAML document.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name; the basename of all generated table names.
    pub pipeline: String,
    #[serde(default)]
    pub mode: Mode,
    pub dialect: Dialect,
    #[serde(default)]
    pub job_id: Option<i64>,
    #[serde(default)]
    pub initiator: Option<String>,
    pub query: QueryConfig,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub primary_key: Option<KeySpec>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyConfig>,
    #[serde(default)]
    pub merge: Option<WriteConfig>,
    #[serde(default)]
    pub update: Option<WriteConfig>,
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub duplicates: DuplicatePolicy,
    /// Target table override; defaults to a generated `raw_` name.
    #[serde(default)]
    pub target_table: Option<String>,
    #[serde(default)]
    pub log_table: Option<String>,
    #[serde(default)]
    pub namings: Namings,
    #[serde(default)]
    pub resources: ResourcesConfig,
}

impl PipelineConfig {
    /// Lower the configuration into the compiler-facing descriptor.
    ///
    /// Period bounds and unresolved column types stay empty here; the
    /// orchestrator fills them in during prepare.
    pub fn to_descriptor(&self) -> Result<TableDescriptor, ConfigError> {
        if self.columns.is_empty() {
            if !self.query.select_all {
                return Err(ConfigError::NoColumns);
            }
            // The staged load writes staging columns back by name, which a
            // bare star projection cannot provide.
            if self.mode == Mode::Staged {
                return Err(ConfigError::SelectAllWithoutColumns);
            }
        }
        let columns = self
            .columns
            .iter()
            .map(|c| c.to_descriptor())
            .collect::<Result<Vec<_>, _>>()?;
        for (i, c) in columns.iter().enumerate() {
            if columns[..i].iter().any(|other| other.name == c.name) {
                return Err(ConfigError::DuplicateColumn(c.name.clone()));
            }
        }
        let joins = self
            .query
            .joins
            .iter()
            .map(|j| j.to_descriptor())
            .collect::<Result<Vec<_>, _>>()?;
        let filters = self
            .query
            .filters
            .iter()
            .map(|f| f.to_descriptor())
            .collect::<Result<Vec<_>, _>>()?;
        let primary_key = self
            .primary_key
            .as_ref()
            .map(|k| k.to_primary_key())
            .unwrap_or_default();
        let foreign_keys = self
            .foreign_keys
            .iter()
            .map(|fk| ForeignKeyDescriptor {
                name: fk.name.clone(),
                columns: fk.columns.clone(),
                ref_table: fk.ref_table.clone(),
                ref_columns: fk.ref_columns.clone(),
            })
            .collect();
        if let Some(merge) = &self.merge {
            if merge.keys.is_empty() {
                return Err(ConfigError::EmptyKeys { section: "merge" });
            }
        }
        if let Some(update) = &self.update {
            if update.keys.is_empty() {
                return Err(ConfigError::EmptyKeys { section: "update" });
            }
        }
        Ok(TableDescriptor {
            table: self.query.table.clone(),
            schema: self.query.schema.clone(),
            link: self.query.link.clone(),
            alias: self.query.alias.clone(),
            columns,
            select_all: self.query.select_all,
            joins,
            filters,
            period: None,
            primary_key,
            foreign_keys,
            parallelism: self
                .query
                .parallel
                .as_ref()
                .map(|p| p.to_parallelism())
                .unwrap_or_default(),
        })
    }
}

fn parse_connector(s: Option<&str>) -> Result<Connector, ConfigError> {
    match s {
        None => Ok(Connector::And),
        Some(raw) => match raw.to_lowercase().replace('_', " ").as_str() {
            "and" => Ok(Connector::And),
            "or" => Ok(Connector::Or),
            "and not" => Ok(Connector::AndNot),
            "or not" => Ok(Connector::OrNot),
            other => Err(ConfigError::UnknownConnector(other.to_string())),
        },
    }
}
