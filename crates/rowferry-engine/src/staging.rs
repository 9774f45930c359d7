//! Staging table lifecycle: materialize empty, populate, count, drop.

use std::sync::Arc;

use rowferry_sql::{ddl, select};
use rowferry_store::SqlExecutor;
use rowferry_types::descriptor::TableDescriptor;
use rowferry_types::{Dialect, SqlValue};

use crate::errors::PipelineError;

#[derive(Clone)]
pub struct StagingManager {
    executor: Arc<dyn SqlExecutor>,
    dialect: Dialect,
}

impl StagingManager {
    pub fn new(executor: Arc<dyn SqlExecutor>, dialect: Dialect) -> Self {
        StagingManager { executor, dialect }
    }

    /// Create the staging table with the exact shape of the compiled
    /// projection and no rows. A leftover table from a previous run is
    /// dropped first.
    pub fn materialize(
        &self,
        staging: &str,
        source: &TableDescriptor,
    ) -> Result<(), PipelineError> {
        if self.executor.table_exists(staging)? {
            self.executor.execute(&ddl::compile_drop_table(staging))?;
        }
        let skeleton = select::compile_select_skeleton(source, self.dialect)?;
        self.executor
            .execute(&ddl::compile_create_as_select(staging, &skeleton))?;
        tracing::info!(table = staging, "Materialized staging table");
        Ok(())
    }

    /// Run the full compiled SELECT into the staging table.
    pub fn populate(&self, staging: &str, source: &TableDescriptor) -> Result<u64, PipelineError> {
        let select = select::compile_select(source, self.dialect)?;
        let inserted = self
            .executor
            .execute(&format!("INSERT INTO {staging}\n{select}"))?;
        tracing::info!(table = staging, rows = inserted, "Populated staging table");
        Ok(inserted)
    }

    pub fn count(&self, staging: &str) -> Result<i64, PipelineError> {
        match self
            .executor
            .query_scalar(&format!("SELECT COUNT(*) FROM {staging}"))?
        {
            Some(SqlValue::Integer(n)) => Ok(n),
            _ => Ok(0),
        }
    }

    pub fn drop(&self, staging: &str) -> Result<(), PipelineError> {
        if self.executor.table_exists(staging)? {
            self.executor.execute(&ddl::compile_drop_table(staging))?;
        }
        Ok(())
    }
}
