//! Target SQL dialects and their compiler-relevant capabilities.

use serde::{Deserialize, Serialize};

/// SQL dialect a pipeline compiles against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Oracle,
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Maximum identifier length accepted by the dialect. Generated table
    /// names are truncated to fit.
    pub fn max_identifier_len(self) -> usize {
        match self {
            Dialect::Oracle => 30,
            Dialect::Postgres => 63,
            Dialect::MySql => 64,
            Dialect::Sqlite => 255,
        }
    }

    /// Whether `/*+ PARALLEL(...) */` optimizer hints are meaningful.
    pub fn supports_parallel_hint(self) -> bool {
        matches!(self, Dialect::Oracle)
    }

    /// Whether `INSERT ... RETURNING` can hand back generated values in a
    /// single statement.
    pub fn supports_returning(self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Sqlite)
    }

    /// Whether `MERGE INTO` is the native upsert form.
    pub fn supports_merge(self) -> bool {
        matches!(self, Dialect::Oracle | Dialect::Postgres)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Oracle => "oracle",
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
