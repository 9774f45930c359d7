//! The run-log table and its state machine.

use std::sync::{Arc, Mutex};

use chrono::{NaiveDateTime, Utc};

use rowferry_sql::ddl::render_type;
use rowferry_store::SqlExecutor;
use rowferry_types::descriptor::{ColumnType, TypeClass};
use rowferry_types::{Dialect, RunCounters, RunStatus, SqlValue};

use crate::error::StateError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

struct RunMeta {
    run_id: Option<i64>,
    status: RunStatus,
}

/// Handle on the durable run log.
///
/// Interior mutability so one `Arc<RunLog>` can be shared across blocking
/// tasks; all state changes go through the transition check before they
/// touch the table.
pub struct RunLog {
    executor: Arc<dyn SqlExecutor>,
    dialect: Dialect,
    table: String,
    meta: Mutex<RunMeta>,
}

impl RunLog {
    pub fn new(executor: Arc<dyn SqlExecutor>, dialect: Dialect, table: &str) -> Self {
        RunLog {
            executor,
            dialect,
            table: table.to_string(),
            meta: Mutex::new(RunMeta {
                run_id: None,
                status: RunStatus::Open,
            }),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the log table on first use.
    pub fn ensure_table(&self) -> Result<(), StateError> {
        if self.executor.table_exists(&self.table)? {
            return Ok(());
        }
        let ts = render_type(&ColumnType::new(TypeClass::DateTime), self.dialect);
        let by = render_type(
            &ColumnType::with_length(TypeClass::Text, 40),
            self.dialect,
        );
        let ddl = format!(
            "CREATE TABLE {} (\n  \
             load_id INTEGER,\n  \
             run_timestamp {ts},\n  \
             run_by {by},\n  \
             job_id INTEGER,\n  \
             start_timestamp {ts},\n  \
             end_timestamp {ts},\n  \
             records_found INTEGER,\n  \
             records_loaded INTEGER,\n  \
             records_updated INTEGER,\n  \
             records_error INTEGER,\n  \
             status INTEGER,\n  \
             PRIMARY KEY (load_id)\n)",
            self.table
        );
        self.executor.execute(&ddl)?;
        tracing::info!(table = %self.table, "Created run log table");
        Ok(())
    }

    /// Open a new run and allocate its id.
    ///
    /// On dialects with RETURNING the max+1 read and the insert are one
    /// statement, so concurrent opens cannot allocate the same id. The
    /// fallback path reads the max first and inserts second.
    pub fn open(
        &self,
        initiator: &str,
        job_id: Option<i64>,
        run_timestamp: NaiveDateTime,
    ) -> Result<i64, StateError> {
        let ts = run_timestamp.format(TIMESTAMP_FORMAT).to_string();
        let now = Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string();
        let by = initiator.replace('\'', "''");
        let job = match job_id {
            Some(id) => id.to_string(),
            None => "NULL".to_string(),
        };

        let run_id = if self.dialect.supports_returning() {
            let sql = format!(
                "INSERT INTO {t} (load_id, run_timestamp, run_by, job_id, start_timestamp, status)\n\
                 SELECT COALESCE(MAX(load_id) + 1, 0), '{ts}', '{by}', {job}, '{now}', 0 FROM {t}\n\
                 RETURNING load_id",
                t = self.table
            );
            match self.executor.query_scalar(&sql)? {
                Some(SqlValue::Integer(id)) => id,
                other => {
                    return Err(StateError::Backend(format!(
                        "run id allocation returned {other:?}"
                    )))
                }
            }
        } else {
            let next = match self
                .executor
                .query_scalar(&format!("SELECT MAX(load_id) FROM {}", self.table))?
            {
                Some(SqlValue::Integer(max)) => max + 1,
                _ => 0,
            };
            let sql = format!(
                "INSERT INTO {} (load_id, run_timestamp, run_by, job_id, start_timestamp, status)\n\
                 VALUES ({next}, '{ts}', '{by}', {job}, '{now}', 0)",
                self.table
            );
            self.executor.execute(&sql)?;
            next
        };

        let mut meta = self.lock_meta();
        meta.run_id = Some(run_id);
        meta.status = RunStatus::Open;
        tracing::info!(run_id, initiator, "Opened run");
        Ok(run_id)
    }

    pub fn run_id(&self) -> Result<i64, StateError> {
        self.lock_meta().run_id.ok_or(StateError::NotOpen)
    }

    pub fn status(&self) -> Result<RunStatus, StateError> {
        let meta = self.lock_meta();
        if meta.run_id.is_none() {
            return Err(StateError::NotOpen);
        }
        Ok(meta.status)
    }

    pub fn process_extract_finished(&self, records_found: i64) -> Result<(), StateError> {
        self.advance(
            RunStatus::Extracted,
            &[("records_found", records_found.to_string())],
        )
    }

    pub fn process_transform_finished(&self) -> Result<(), StateError> {
        self.advance(RunStatus::Transformed, &[])
    }

    pub fn process_load_finished(&self, counters: RunCounters) -> Result<(), StateError> {
        let mut extra = vec![("records_loaded", counters.records_loaded.to_string())];
        if let Some(updated) = counters.records_updated {
            extra.push(("records_updated", updated.to_string()));
        }
        if let Some(errors) = counters.records_error {
            extra.push(("records_error", errors.to_string()));
        }
        self.advance(RunStatus::Loaded, &extra)
    }

    /// Mark the run failed. Idempotent once the run is in `Error`.
    pub fn process_error(&self) -> Result<(), StateError> {
        if self.status()? == RunStatus::Error {
            return Ok(());
        }
        self.advance(RunStatus::Error, &[])
    }

    /// Stamp the end timestamp, leaving the status untouched.
    pub fn close(&self) -> Result<(), StateError> {
        let run_id = self.run_id()?;
        let now = Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string();
        self.executor.execute(&format!(
            "UPDATE {} SET end_timestamp = '{now}' WHERE load_id = {run_id}",
            self.table
        ))?;
        Ok(())
    }

    fn advance(&self, to: RunStatus, extra: &[(&str, String)]) -> Result<(), StateError> {
        let run_id;
        {
            let meta = self.lock_meta();
            run_id = meta.run_id.ok_or(StateError::NotOpen)?;
            if !meta.status.can_transition(to) {
                return Err(StateError::InvalidTransition {
                    from: meta.status,
                    to,
                });
            }
        }
        let mut assignments = vec![format!("status = {}", to.code())];
        for (column, value) in extra {
            assignments.push(format!("{column} = {value}"));
        }
        self.executor.execute(&format!(
            "UPDATE {} SET {} WHERE load_id = {run_id}",
            self.table,
            assignments.join(", ")
        ))?;
        self.lock_meta().status = to;
        tracing::debug!(run_id, status = %to, "Run status advanced");
        Ok(())
    }

    fn lock_meta(&self) -> std::sync::MutexGuard<'_, RunMeta> {
        match self.meta.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
