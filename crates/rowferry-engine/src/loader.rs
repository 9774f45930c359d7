//! Final write from staging into the target table.
//!
//! Write precedence: an explicit delete short-circuits everything, then
//! reconciliation runs, then exactly one of merge, update, or plain insert.
//! Loaded rows carry the run id in `load_id`; merge/update writes stamp
//! `update_id` as well.

use std::sync::Arc;

use rowferry_sql::dml::{self, ColumnPair};
use rowferry_sql::literal;
use rowferry_store::SqlExecutor;
use rowferry_types::config::{DuplicatePolicy, WriteConfig};
use rowferry_types::descriptor::TableDescriptor;
use rowferry_types::Dialect;

use crate::errors::PipelineError;
use crate::reconcile::Reconciler;

pub const LOAD_ID_COLUMN: &str = "load_id";
pub const UPDATE_ID_COLUMN: &str = "update_id";

/// What the load phase should do, distilled from configuration.
#[derive(Debug, Clone, Default)]
pub struct WritePlan {
    pub delete: bool,
    pub duplicates: DuplicatePolicy,
    pub merge: Option<WriteConfig>,
    pub update: Option<WriteConfig>,
}

/// What the load phase actually did.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOutcome {
    pub wrote_update: bool,
    pub routed_errors: u64,
}

#[derive(Clone)]
pub struct Loader {
    executor: Arc<dyn SqlExecutor>,
    dialect: Dialect,
}

impl Loader {
    pub fn new(executor: Arc<dyn SqlExecutor>, dialect: Dialect) -> Self {
        Loader { executor, dialect }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        source: &TableDescriptor,
        plan: &WritePlan,
        staging: &str,
        target: &str,
        error_table: &str,
        run_id: i64,
        reconciler: &Reconciler,
    ) -> Result<LoadOutcome, PipelineError> {
        if plan.delete {
            let deleted = self.executor.execute(&dml::compile_delete(
                target,
                source.parallelism,
                self.dialect,
            ))?;
            tracing::warn!(table = target, rows = deleted, "Delete-only load");
            return Ok(LoadOutcome::default());
        }

        let mut routed = 0;
        if plan.duplicates == DuplicatePolicy::EnforceUnique {
            routed +=
                reconciler.process_duplicates(staging, target, error_table, source, run_id)?;
        }
        // Merge and update resolve key matches themselves; pk routing only
        // protects plain inserts.
        if !source.primary_key.is_empty() && plan.merge.is_none() && plan.update.is_none() {
            routed +=
                reconciler.process_primary_key(staging, target, error_table, source, run_id)?;
        }

        let mut outcome = LoadOutcome {
            wrote_update: false,
            routed_errors: routed,
        };

        if let Some(merge) = &plan.merge {
            let using = self.staged_select(source, staging, run_id, true);
            let keys = self.key_pairs(source, merge)?;
            let update_set = self.update_set(source, merge, &keys);
            let insert_columns = self.insert_columns(source, true);
            let sql = dml::compile_merge(
                self.dialect,
                target,
                &using,
                &keys,
                &update_set,
                &insert_columns,
                source.parallelism,
            )?;
            self.executor.execute(&sql)?;
            outcome.wrote_update = true;
            tracing::info!(table = target, "Merged staging into target");
        } else if let Some(update) = &plan.update {
            let using = self.staged_select(source, staging, run_id, true);
            let keys = self.key_pairs(source, update)?;
            let update_set = self.update_set(source, update, &keys);
            let sql = dml::compile_update(
                self.dialect,
                target,
                &using,
                &keys,
                &update_set,
                source.parallelism,
            )?;
            self.executor.execute(&sql)?;
            outcome.wrote_update = true;
            tracing::info!(table = target, "Updated target from staging");
        } else {
            let columns: Vec<String> = self
                .insert_columns(source, false)
                .into_iter()
                .map(|p| p.target)
                .collect();
            let select = self.staged_select(source, staging, run_id, false);
            let sql = dml::compile_insert_from_select(target, &columns, &select);
            let inserted = self.executor.execute(&sql)?;
            tracing::info!(table = target, rows = inserted, "Inserted staging into target");
        }

        Ok(outcome)
    }

    /// SELECT over staging that appends the lineage literals. Staging only
    /// holds source columns, so synthetic columns render as literals here.
    fn staged_select(
        &self,
        source: &TableDescriptor,
        staging: &str,
        run_id: i64,
        with_update_id: bool,
    ) -> String {
        let mut parts: Vec<String> = source
            .loaded_columns()
            .map(|c| {
                if c.is_new {
                    let value = match &c.value {
                        Some(v) => literal::render(v),
                        None => "NULL".to_string(),
                    };
                    format!("{value} AS {}", c.staged_name())
                } else {
                    format!("s.{}", c.staged_name())
                }
            })
            .collect();
        parts.push(format!("{run_id} AS {LOAD_ID_COLUMN}"));
        if with_update_id {
            parts.push(format!("{run_id} AS {UPDATE_ID_COLUMN}"));
        }
        format!("SELECT {}\nFROM {staging} s", parts.join(", "))
    }

    fn key_pairs(
        &self,
        source: &TableDescriptor,
        write: &WriteConfig,
    ) -> Result<Vec<ColumnPair>, PipelineError> {
        write
            .keys
            .iter()
            .map(|key| {
                let (target, staged) = key.as_pair();
                let staged = match source.column(staged) {
                    Some(column) => column.staged_name().to_string(),
                    None => {
                        return Err(PipelineError::Reconciliation(format!(
                            "write key column '{staged}' is not declared"
                        )))
                    }
                };
                Ok(ColumnPair {
                    target: target.to_string(),
                    staged,
                })
            })
            .collect()
    }

    /// Non-key SET assignments plus the update lineage stamp.
    fn update_set(
        &self,
        source: &TableDescriptor,
        write: &WriteConfig,
        keys: &[ColumnPair],
    ) -> Vec<ColumnPair> {
        let mut set: Vec<ColumnPair> = if write.columns.is_empty() {
            source
                .loaded_columns()
                .filter(|c| !keys.iter().any(|k| k.target == c.name))
                .map(|c| ColumnPair::new(&c.name, c.staged_name()))
                .collect()
        } else {
            write
                .columns
                .iter()
                .map(|name| {
                    let staged = source
                        .column(name)
                        .map(|c| c.staged_name().to_string())
                        .unwrap_or_else(|| name.clone());
                    ColumnPair {
                        target: name.clone(),
                        staged,
                    }
                })
                .collect()
        };
        set.push(ColumnPair::same(UPDATE_ID_COLUMN));
        set
    }

    fn insert_columns(&self, source: &TableDescriptor, with_update_id: bool) -> Vec<ColumnPair> {
        let mut columns: Vec<ColumnPair> = source
            .loaded_columns()
            .map(|c| ColumnPair::new(&c.name, c.staged_name()))
            .collect();
        columns.push(ColumnPair::same(LOAD_ID_COLUMN));
        if with_update_id {
            columns.push(ColumnPair::same(UPDATE_ID_COLUMN));
        }
        columns
    }
}
