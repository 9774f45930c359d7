use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use rowferry_engine::config::load_pipeline;
use rowferry_engine::Orchestrator;
use rowferry_store::{SqlExecutor, SqliteExecutor};

pub async fn run(
    pipeline: &Path,
    database: &Path,
    source_database: Option<&Path>,
) -> Result<()> {
    let config = load_pipeline(pipeline)?;
    let target: Arc<dyn SqlExecutor> = Arc::new(
        SqliteExecutor::open(database)
            .with_context(|| format!("failed to open database {}", database.display()))?,
    );
    let source: Arc<dyn SqlExecutor> = match source_database {
        Some(path) => Arc::new(
            SqliteExecutor::open(path)
                .with_context(|| format!("failed to open source database {}", path.display()))?,
        ),
        None => Arc::clone(&target),
    };

    let mut orchestrator = Orchestrator::with_source(config, source, target)
        .context("failed to build pipeline")?;
    let summary = orchestrator.run().await.context("pipeline run failed")?;

    println!("run {} finished: {}", summary.run_id, summary.status);
    println!("  records found:   {}", summary.records_found);
    println!("  records loaded:  {}", summary.records_loaded);
    if let Some(updated) = summary.records_updated {
        println!("  records updated: {updated}");
    }
    if let Some(errors) = summary.records_error {
        println!("  records in error handler: {errors}");
    }
    println!("  duration: {:.2}s", summary.duration_secs);
    Ok(())
}
