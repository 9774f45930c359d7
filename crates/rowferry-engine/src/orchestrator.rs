//! Run coordination: prepare, extract, transform, load, finalize.
//!
//! Each phase wraps its body; a fault marks the run `Error` in the run log
//! and propagates. The pipeline kind (staged same-store transfer vs direct
//! cross-store transfer) is resolved once from the configured mode.

use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use chrono::{Local, NaiveDateTime, Utc};

use rowferry_sql::naming::{generated_name, TableKind};
use rowferry_sql::{ddl, select};
use rowferry_state::RunLog;
use rowferry_store::SqlExecutor;
use rowferry_types::config::{ConfigError, Mode};
use rowferry_types::descriptor::{
    ColumnDescriptor, ColumnType, ForeignKeyDescriptor, TableDescriptor, TypeClass,
};
use rowferry_types::{Dialect, PipelineConfig, RunCounters, RunStatus, SqlValue};

use crate::catalog::{self, CatalogResolver, StoreCatalogResolver};
use crate::chunked::ChunkedLoader;
use crate::errors::PipelineError;
use crate::loader::{Loader, WritePlan, LOAD_ID_COLUMN, UPDATE_ID_COLUMN};
use crate::period;
use crate::reconcile::Reconciler;
use crate::staging::StagingManager;

/// Outcome of a finished run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: i64,
    pub status: RunStatus,
    pub records_found: i64,
    pub records_loaded: i64,
    pub records_updated: Option<i64>,
    pub records_error: Option<i64>,
    pub duration_secs: f64,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("target_table", &self.target_table)
            .finish_non_exhaustive()
    }
}

pub struct Orchestrator {
    config: PipelineConfig,
    descriptor: TableDescriptor,
    dialect: Dialect,
    source_executor: Arc<dyn SqlExecutor>,
    target_executor: Arc<dyn SqlExecutor>,
    catalog: Arc<dyn CatalogResolver>,
    run_log: Arc<RunLog>,
    staging: StagingManager,
    reconciler: Reconciler,
    loader: Loader,
    target_table: String,
    staging_table: String,
    error_table: String,
    run_timestamp: NaiveDateTime,
    first_ever: bool,
}

impl Orchestrator {
    /// Build an orchestrator for a staged pipeline, where source and target
    /// live in the same store.
    pub fn new(
        config: PipelineConfig,
        executor: Arc<dyn SqlExecutor>,
    ) -> Result<Self, PipelineError> {
        Self::with_source(config, Arc::clone(&executor), executor)
    }

    /// Build an orchestrator with distinct source and target stores, as a
    /// direct pipeline uses.
    pub fn with_source(
        config: PipelineConfig,
        source_executor: Arc<dyn SqlExecutor>,
        target_executor: Arc<dyn SqlExecutor>,
    ) -> Result<Self, PipelineError> {
        // The chunk producer holds the source connection for the whole
        // fetch; workers inserting through the same executor would wait on
        // that lock forever.
        if config.mode == Mode::Direct && Arc::ptr_eq(&source_executor, &target_executor) {
            return Err(ConfigError::SharedStore.into());
        }
        let descriptor = config.to_descriptor()?;
        let dialect = config.dialect;
        let source_label = config
            .query
            .link
            .clone()
            .unwrap_or_else(|| dialect.as_str().to_string());

        let target_table = config.target_table.clone().unwrap_or_else(|| {
            generated_name(
                TableKind::Raw,
                &source_label,
                &config.pipeline,
                config.namings.raw.as_deref(),
                dialect,
            )
        });
        let staging_table = generated_name(
            TableKind::Staging,
            &source_label,
            &config.pipeline,
            config.namings.ds.as_deref(),
            dialect,
        );
        let error_table = generated_name(
            TableKind::ErrorHandler,
            &source_label,
            &config.pipeline,
            config.namings.eh.as_deref(),
            dialect,
        );
        let log_table = config.log_table.clone().unwrap_or_else(|| {
            generated_name(
                TableKind::Log,
                &source_label,
                &config.pipeline,
                config.namings.log.as_deref(),
                dialect,
            )
        });

        let catalog: Arc<dyn CatalogResolver> = Arc::new(StoreCatalogResolver::new(
            Arc::clone(&source_executor),
            dialect,
        ));
        let run_log = Arc::new(RunLog::new(
            Arc::clone(&target_executor),
            dialect,
            &log_table,
        ));
        let staging = StagingManager::new(Arc::clone(&target_executor), dialect);
        let reconciler = Reconciler::new(Arc::clone(&target_executor), dialect);
        let loader = Loader::new(Arc::clone(&target_executor), dialect);

        Ok(Orchestrator {
            config,
            descriptor,
            dialect,
            source_executor,
            target_executor,
            catalog,
            run_log,
            staging,
            reconciler,
            loader,
            target_table,
            staging_table,
            error_table,
            run_timestamp: Utc::now().naive_utc(),
            first_ever: false,
        })
    }

    /// Swap in a different catalog resolver, for sources whose catalog the
    /// executor cannot answer for.
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogResolver>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn target_table(&self) -> &str {
        &self.target_table
    }

    pub fn run_log(&self) -> &Arc<RunLog> {
        &self.run_log
    }

    /// Execute the whole pipeline once.
    pub async fn run(&mut self) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();
        self.prepare().await?;
        let run_id = self.run_log.run_id()?;
        tracing::info!(
            pipeline = %self.config.pipeline,
            run_id,
            mode = ?self.config.mode,
            "Pipeline run started"
        );

        let records_found = match self.extract().await {
            Ok(found) => {
                let log = Arc::clone(&self.run_log);
                blocking(move || Ok(log.process_extract_finished(found)?)).await?;
                found
            }
            Err(err) => return self.fail(err).await,
        };

        match self.transform().await {
            Ok(()) => {
                let log = Arc::clone(&self.run_log);
                blocking(move || Ok(log.process_transform_finished()?)).await?;
            }
            Err(err) => return self.fail(err).await,
        }

        let counters = match self.load().await {
            Ok(counters) => {
                let log = Arc::clone(&self.run_log);
                blocking(move || Ok(log.process_load_finished(counters)?)).await?;
                counters
            }
            Err(err) => return self.fail(err).await,
        };

        let log = Arc::clone(&self.run_log);
        blocking(move || Ok(log.close()?)).await?;

        let summary = RunSummary {
            run_id,
            status: RunStatus::Loaded,
            records_found,
            records_loaded: counters.records_loaded,
            records_updated: counters.records_updated,
            records_error: counters.records_error,
            duration_secs: started.elapsed().as_secs_f64(),
        };
        tracing::info!(
            run_id,
            records_found = summary.records_found,
            records_loaded = summary.records_loaded,
            duration_secs = summary.duration_secs,
            "Pipeline run finished"
        );
        Ok(summary)
    }

    async fn prepare(&mut self) -> Result<(), PipelineError> {
        let now = match &self.config.query.period {
            Some(p) if p.utc => Utc::now().naive_utc(),
            Some(_) => Local::now().naive_local(),
            None => Utc::now().naive_utc(),
        };
        self.run_timestamp = now;

        let log = Arc::clone(&self.run_log);
        let initiator = self
            .config
            .initiator
            .clone()
            .unwrap_or_else(whoami::username);
        let job_id = self.config.job_id;
        blocking(move || {
            log.ensure_table()?;
            log.open(&initiator, job_id, now)?;
            Ok(())
        })
        .await?;

        let target_executor = Arc::clone(&self.target_executor);
        let target_table = self.target_table.clone();
        self.first_ever =
            !blocking(move || Ok(target_executor.table_exists(&target_table)?)).await?;

        if let Some(period_config) = &self.config.query.period {
            self.descriptor.period = Some(period::resolve(period_config, now, self.first_ever)?);
        }

        if self.first_ever {
            let catalog = Arc::clone(&self.catalog);
            let mut descriptor = self.descriptor.clone();
            self.descriptor = blocking(move || {
                catalog::resolve_descriptor(catalog.as_ref(), &mut descriptor)?;
                Ok(descriptor)
            })
            .await?;
            self.create_target().await?;
        }

        if self.config.mode == Mode::Staged {
            let staging = self.staging.clone();
            let staging_table = self.staging_table.clone();
            let descriptor = self.descriptor.clone();
            blocking(move || staging.materialize(&staging_table, &descriptor)).await?;
        }
        Ok(())
    }

    /// CREATE TABLE for the target: the loaded columns plus the lineage
    /// columns, with foreign keys back to the run log.
    async fn create_target(&self) -> Result<(), PipelineError> {
        let mut target = self.descriptor.clone();
        target.columns = target
            .columns
            .iter()
            .filter(|c| c.is_loaded)
            .cloned()
            .collect();

        let mut lineage = vec![LOAD_ID_COLUMN];
        if self.config.merge.is_some() || self.config.update.is_some() {
            lineage.push(UPDATE_ID_COLUMN);
        }
        for name in lineage {
            let mut column = ColumnDescriptor::plain(name);
            column.is_new = true;
            column.column_type = Some(ColumnType::new(TypeClass::Integer));
            target.columns.push(column);
            target.foreign_keys.push(ForeignKeyDescriptor {
                name: None,
                columns: vec![name.to_string()],
                ref_table: self.run_log.table().to_string(),
                ref_columns: vec![LOAD_ID_COLUMN.to_string()],
            });
        }

        let sql = ddl::compile_create_table(&self.target_table, &target, self.dialect)?;
        let executor = Arc::clone(&self.target_executor);
        blocking(move || Ok(executor.execute(&sql).map(|_| ())?)).await?;
        tracing::info!(table = %self.target_table, "Created target table");
        Ok(())
    }

    async fn extract(&self) -> Result<i64, PipelineError> {
        match self.config.mode {
            Mode::Staged => {
                let staging = self.staging.clone();
                let staging_table = self.staging_table.clone();
                let descriptor = self.descriptor.clone();
                blocking(move || {
                    staging.populate(&staging_table, &descriptor)?;
                    staging.count(&staging_table)
                })
                .await
            }
            Mode::Direct => {
                let count_sql =
                    select::compile_count(&select::compile_select(&self.descriptor, self.dialect)?);
                let executor = Arc::clone(&self.source_executor);
                blocking(move || match executor.query_scalar(&count_sql)? {
                    Some(SqlValue::Integer(n)) => Ok(n),
                    _ => Ok(0),
                })
                .await
            }
        }
    }

    /// Checkpoint between extract and load. Row shaping happens inside the
    /// compiled SQL, so there is no in-flight transform work here.
    async fn transform(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn load(&self) -> Result<RunCounters, PipelineError> {
        let run_id = self.run_log.run_id()?;
        match self.config.mode {
            Mode::Staged => {
                let plan = WritePlan {
                    delete: self.config.delete,
                    duplicates: self.config.duplicates,
                    merge: self.config.merge.clone(),
                    update: self.config.update.clone(),
                };
                let loader = self.loader.clone();
                let reconciler = self.reconciler.clone();
                let descriptor = self.descriptor.clone();
                let staging_table = self.staging_table.clone();
                let target_table = self.target_table.clone();
                let error_table = self.error_table.clone();
                let outcome = blocking(move || {
                    loader.run(
                        &descriptor,
                        &plan,
                        &staging_table,
                        &target_table,
                        &error_table,
                        run_id,
                        &reconciler,
                    )
                })
                .await?;

                let executor = Arc::clone(&self.target_executor);
                let target_table = self.target_table.clone();
                let wrote_update = outcome.wrote_update;
                blocking(move || {
                    let loaded = count_scalar(
                        executor.as_ref(),
                        &format!(
                            "SELECT COUNT(*) FROM {target_table} WHERE {LOAD_ID_COLUMN} = {run_id}"
                        ),
                    )?;
                    let updated = if wrote_update {
                        Some(count_scalar(
                            executor.as_ref(),
                            &format!(
                                "SELECT COUNT(*) FROM {target_table} WHERE {UPDATE_ID_COLUMN} = {run_id}"
                            ),
                        )?)
                    } else {
                        None
                    };
                    Ok(RunCounters {
                        records_loaded: loaded,
                        records_updated: updated,
                        records_error: if outcome.routed_errors > 0 {
                            Some(outcome.routed_errors as i64)
                        } else {
                            None
                        },
                    })
                })
                .await
            }
            Mode::Direct => {
                let chunked = ChunkedLoader::new(
                    Arc::clone(&self.source_executor),
                    Arc::clone(&self.target_executor),
                    self.config.resources.workers,
                    self.config.resources.fetch_rows,
                    self.config.resources.queue_capacity,
                );
                let select = select::compile_select(&self.descriptor, self.dialect)?;
                let summary = chunked.run(&select, &self.target_table, run_id).await?;
                Ok(RunCounters {
                    records_loaded: summary.rows_inserted as i64,
                    records_updated: None,
                    records_error: None,
                })
            }
        }
    }

    /// Mark the run failed, stamp the end timestamp, and propagate.
    async fn fail(&self, err: PipelineError) -> Result<RunSummary, PipelineError> {
        tracing::error!(error = %err, pipeline = %self.config.pipeline, "Pipeline run failed");
        let log = Arc::clone(&self.run_log);
        let marked: Result<(), PipelineError> = blocking(move || {
            log.process_error()?;
            log.close()?;
            Ok(())
        })
        .await;
        if let Err(mark_err) = marked {
            tracing::error!(error = %mark_err, "Failed to record run error state");
        }
        Err(err)
    }
}

fn count_scalar(executor: &dyn SqlExecutor, sql: &str) -> Result<i64, PipelineError> {
    match executor.query_scalar(sql)? {
        Some(SqlValue::Integer(n)) => Ok(n),
        _ => Ok(0),
    }
}

async fn blocking<T, F>(f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Infrastructure(anyhow!(e)))?
}
