//! Cross-store transfer through in-memory row chunks.
//!
//! One producer pages rows out of the source into a bounded channel; a
//! small pool of workers drains it and issues independent chunk INSERTs
//! against the target. A failed chunk is counted and logged but does not
//! stop the queue; the first failure is surfaced once everything drains.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use rowferry_sql::dml;
use rowferry_store::{RowChunk, SqlExecutor};
use rowferry_types::SqlValue;

use crate::errors::PipelineError;
use crate::loader::LOAD_ID_COLUMN;

#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkLoadSummary {
    pub chunks_produced: u64,
    pub rows_produced: u64,
    pub rows_inserted: u64,
    pub chunks_failed: u64,
}

pub struct ChunkedLoader {
    source: Arc<dyn SqlExecutor>,
    target: Arc<dyn SqlExecutor>,
    workers: usize,
    fetch_rows: usize,
    queue_capacity: usize,
}

impl ChunkedLoader {
    pub fn new(
        source: Arc<dyn SqlExecutor>,
        target: Arc<dyn SqlExecutor>,
        workers: usize,
        fetch_rows: usize,
        queue_capacity: usize,
    ) -> Self {
        ChunkedLoader {
            source,
            target,
            workers: workers.max(1),
            fetch_rows: fetch_rows.max(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Run `select` against the source and write every chunk into
    /// `target_table`, stamping each row with the run id.
    pub async fn run(
        &self,
        select: &str,
        target_table: &str,
        run_id: i64,
    ) -> Result<ChunkLoadSummary, PipelineError> {
        let (tx, rx) = mpsc::channel::<RowChunk>(self.queue_capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let source = Arc::clone(&self.source);
        let select = select.to_string();
        let fetch_rows = self.fetch_rows;
        let producer = tokio::task::spawn_blocking(move || {
            let mut produced = (0u64, 0u64);
            let result = source.fetch_chunks(&select, fetch_rows, &mut |chunk| {
                produced.0 += 1;
                produced.1 += chunk.len() as u64;
                tx.blocking_send(chunk)
                    .map_err(|_| rowferry_store::StoreError::Statement(
                        "chunk queue closed before the fetch finished".to_string(),
                    ))
            });
            result.map(|_| produced)
        });

        let mut workers: JoinSet<(u64, u64, Option<String>)> = JoinSet::new();
        for worker_id in 0..self.workers {
            let rx = Arc::clone(&rx);
            let target = Arc::clone(&self.target);
            let table = target_table.to_string();
            workers.spawn(async move {
                let mut inserted = 0u64;
                let mut failed = 0u64;
                let mut first_error: Option<String> = None;
                loop {
                    let chunk = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(chunk) = chunk else { break };
                    let rows = chunk.len() as u64;
                    let target = Arc::clone(&target);
                    let table = table.clone();
                    let outcome = tokio::task::spawn_blocking(move || {
                        insert_chunk(target.as_ref(), &table, chunk, run_id)
                    })
                    .await;
                    match outcome {
                        Ok(Ok(())) => inserted += rows,
                        Ok(Err(err)) => {
                            failed += 1;
                            tracing::error!(worker_id, error = %err, "Chunk insert failed");
                            first_error.get_or_insert(err.to_string());
                        }
                        Err(join_err) => {
                            failed += 1;
                            first_error.get_or_insert(join_err.to_string());
                        }
                    }
                }
                (inserted, failed, first_error)
            });
        }

        let produced = producer
            .await
            .map_err(|e| PipelineError::Infrastructure(anyhow::anyhow!(e)))?;

        let mut summary = ChunkLoadSummary::default();
        let mut first_error: Option<String> = None;
        while let Some(joined) = workers.join_next().await {
            let (inserted, failed, error) =
                joined.map_err(|e| PipelineError::Infrastructure(anyhow::anyhow!(e)))?;
            summary.rows_inserted += inserted;
            summary.chunks_failed += failed;
            if first_error.is_none() {
                first_error = error;
            }
        }

        let (chunks, rows) = produced?;
        summary.chunks_produced = chunks;
        summary.rows_produced = rows;

        if summary.chunks_failed > 0 {
            return Err(PipelineError::ChunkLoad {
                failed: summary.chunks_failed,
                first: first_error.unwrap_or_else(|| "unknown".to_string()),
            });
        }
        tracing::info!(
            chunks = summary.chunks_produced,
            rows = summary.rows_inserted,
            table = target_table,
            "Chunked load finished"
        );
        Ok(summary)
    }
}

fn insert_chunk(
    target: &dyn SqlExecutor,
    table: &str,
    mut chunk: RowChunk,
    run_id: i64,
) -> Result<(), rowferry_store::StoreError> {
    chunk.columns.push(LOAD_ID_COLUMN.to_string());
    for row in &mut chunk.rows {
        row.push(SqlValue::Integer(run_id));
    }
    let sql = dml::compile_insert_chunk(table, &chunk.columns, &chunk.rows);
    target.execute(&sql)?;
    Ok(())
}
