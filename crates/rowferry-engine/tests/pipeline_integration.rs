//! End-to-end pipeline runs against in-memory SQLite.

use std::sync::Arc;

use rowferry_engine::config::parse_pipeline_str;
use rowferry_engine::{Orchestrator, PipelineError};
use rowferry_store::{SqlExecutor, SqliteExecutor};
use rowferry_types::SqlValue;

fn store() -> Arc<dyn SqlExecutor> {
    Arc::new(SqliteExecutor::in_memory().unwrap())
}

fn seed_orders(store: &Arc<dyn SqlExecutor>) {
    store
        .execute("CREATE TABLE orders (order_id INTEGER, status TEXT)")
        .unwrap();
    store
        .execute("INSERT INTO orders VALUES (1, 'new'), (2, 'paid'), (3, 'void')")
        .unwrap();
}

const STAGED_PIPELINE: &str = r#"
pipeline: orders
mode: staged
dialect: sqlite
initiator: tester
query:
  table: orders
  alias: o
columns:
  - order_id
  - status
primary_key: [order_id]
target_table: raw_orders
log_table: log_orders
"#;

fn scalar(store: &Arc<dyn SqlExecutor>, sql: &str) -> i64 {
    match store.query_scalar(sql).unwrap() {
        Some(SqlValue::Integer(n)) => n,
        other => panic!("expected integer, got {other:?}"),
    }
}

#[tokio::test]
async fn staged_pipeline_moves_every_row() {
    let db = store();
    seed_orders(&db);

    let config = parse_pipeline_str(STAGED_PIPELINE).unwrap();
    let mut orchestrator = Orchestrator::new(config, Arc::clone(&db)).unwrap();
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.run_id, 0);
    assert_eq!(summary.records_found, 3);
    assert_eq!(summary.records_loaded, 3);
    assert_eq!(summary.records_error, None);

    // Source and target row counts match.
    assert_eq!(scalar(&db, "SELECT COUNT(*) FROM raw_orders"), 3);
    assert_eq!(
        scalar(&db, "SELECT COUNT(*) FROM raw_orders WHERE load_id = 0"),
        3
    );
    // Run log row reached Loaded with the counters stamped.
    assert_eq!(
        scalar(&db, "SELECT status FROM log_orders WHERE load_id = 0"),
        3
    );
    assert_eq!(
        scalar(
            &db,
            "SELECT records_found FROM log_orders WHERE load_id = 0"
        ),
        3
    );
}

#[tokio::test]
async fn second_run_routes_pk_collisions_and_continues_run_ids() {
    let db = store();
    seed_orders(&db);

    let config = parse_pipeline_str(STAGED_PIPELINE).unwrap();
    let mut orchestrator = Orchestrator::new(config, Arc::clone(&db)).unwrap();
    orchestrator.run().await.unwrap();

    // One genuinely new row next to three that already landed.
    db.execute("INSERT INTO orders VALUES (4, 'new')").unwrap();

    let config = parse_pipeline_str(STAGED_PIPELINE).unwrap();
    let mut orchestrator = Orchestrator::new(config, Arc::clone(&db)).unwrap();
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.run_id, 1);
    assert_eq!(summary.records_found, 4);
    assert_eq!(summary.records_loaded, 1);
    assert_eq!(summary.records_error, Some(3));

    // Colliding rows sit in the error handler tagged with run and cause.
    assert_eq!(
        scalar(
            &db,
            "SELECT COUNT(*) FROM eh_sqlite_orders WHERE load_id = 1 AND error_type = 'pk_error'"
        ),
        3
    );
    // The target gained only the new row.
    assert_eq!(scalar(&db, "SELECT COUNT(*) FROM raw_orders"), 4);
    assert_eq!(
        scalar(&db, "SELECT records_error FROM log_orders WHERE load_id = 1"),
        3
    );
}

#[tokio::test]
async fn merge_pipeline_updates_in_place() {
    let db = store();
    seed_orders(&db);

    let yaml = r#"
pipeline: orders
mode: staged
dialect: sqlite
initiator: tester
query:
  table: orders
columns: [order_id, status]
primary_key: [order_id]
merge:
  keys: [order_id]
target_table: raw_orders
log_table: log_orders
"#;
    let config = parse_pipeline_str(yaml).unwrap();
    let mut orchestrator = Orchestrator::new(config, Arc::clone(&db)).unwrap();
    orchestrator.run().await.unwrap();

    db.execute("UPDATE orders SET status = 'shipped' WHERE order_id = 2")
        .unwrap();

    let config = parse_pipeline_str(yaml).unwrap();
    let mut orchestrator = Orchestrator::new(config, Arc::clone(&db)).unwrap();
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.records_updated, Some(3));
    assert_eq!(scalar(&db, "SELECT COUNT(*) FROM raw_orders"), 3);
    let status = db
        .query_scalar("SELECT status FROM raw_orders WHERE order_id = 2")
        .unwrap();
    assert_eq!(status, Some(SqlValue::Text("shipped".into())));
    assert_eq!(
        scalar(&db, "SELECT update_id FROM raw_orders WHERE order_id = 2"),
        1
    );
}

#[tokio::test]
async fn direct_pipeline_moves_rows_across_stores() {
    let source = store();
    seed_orders(&source);
    let target = store();

    let yaml = r#"
pipeline: orders
mode: direct
dialect: sqlite
initiator: tester
query:
  table: orders
columns:
  - { name: order_id, type: integer }
  - { name: status, type: text }
target_table: raw_orders
log_table: log_orders
resources:
  workers: 2
  fetch_rows: 2
  queue_capacity: 2
"#;
    let config = parse_pipeline_str(yaml).unwrap();
    let mut orchestrator =
        Orchestrator::with_source(config, Arc::clone(&source), Arc::clone(&target)).unwrap();
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.records_found, 3);
    assert_eq!(summary.records_loaded, 3);
    assert_eq!(
        scalar(&target, "SELECT COUNT(*) FROM raw_orders WHERE load_id = 0"),
        3
    );
    assert_eq!(
        scalar(&target, "SELECT status FROM log_orders WHERE load_id = 0"),
        3
    );
}

#[tokio::test]
async fn staged_select_all_without_columns_fails_loudly() {
    let db = store();
    seed_orders(&db);

    // The staged write needs column names; a star extract would land no
    // data columns while the run log claims a clean load.
    let yaml = r#"
pipeline: orders
mode: staged
dialect: sqlite
initiator: tester
query:
  table: orders
  select_all: true
target_table: raw_orders
log_table: log_orders
"#;
    let config = parse_pipeline_str(yaml).unwrap();
    let err = Orchestrator::new(config, Arc::clone(&db)).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
    assert!(!db.table_exists("raw_orders").unwrap());
}

#[tokio::test]
async fn direct_mode_rejects_a_shared_store() {
    let db = store();
    seed_orders(&db);

    // The chunk producer would hold the only connection while workers wait
    // for it, so this must fail up front instead of hanging.
    let yaml = r#"
pipeline: orders
mode: direct
dialect: sqlite
initiator: tester
query:
  table: orders
columns:
  - { name: order_id, type: integer }
  - { name: status, type: text }
target_table: raw_orders
log_table: log_orders
"#;
    let config = parse_pipeline_str(yaml).unwrap();
    let err = Orchestrator::new(config, Arc::clone(&db)).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[tokio::test]
async fn extract_failure_marks_the_run_errored() {
    let source = store();
    let target = store();

    // Source table never created, so the extract count query fails.
    let yaml = r#"
pipeline: orders
mode: direct
dialect: sqlite
initiator: tester
query:
  table: orders
columns:
  - { name: order_id, type: integer }
target_table: raw_orders
log_table: log_orders
"#;
    let config = parse_pipeline_str(yaml).unwrap();
    let mut orchestrator =
        Orchestrator::with_source(config, Arc::clone(&source), Arc::clone(&target)).unwrap();
    let err = orchestrator.run().await.unwrap_err();
    assert!(matches!(err, PipelineError::Execution(_)));

    // Status 4 with the end timestamp stamped.
    assert_eq!(
        scalar(&target, "SELECT status FROM log_orders WHERE load_id = 0"),
        4
    );
    let end = target
        .query_scalar("SELECT end_timestamp FROM log_orders WHERE load_id = 0")
        .unwrap();
    assert!(matches!(end, Some(SqlValue::Text(_))));
}

#[tokio::test]
async fn filters_narrow_the_extract() {
    let db = store();
    seed_orders(&db);

    let yaml = r#"
pipeline: orders
mode: staged
dialect: sqlite
initiator: tester
query:
  table: orders
  alias: o
  filters:
    - { column: status, operator: "!=", value: void }
columns: [order_id, status]
target_table: raw_orders
log_table: log_orders
"#;
    let config = parse_pipeline_str(yaml).unwrap();
    let mut orchestrator = Orchestrator::new(config, Arc::clone(&db)).unwrap();
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.records_found, 2);
    assert_eq!(scalar(&db, "SELECT COUNT(*) FROM raw_orders"), 2);
    assert_eq!(
        scalar(&db, "SELECT COUNT(*) FROM raw_orders WHERE status = 'void'"),
        0
    );
}
