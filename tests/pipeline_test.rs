//! Integration tests for the execution pipeline against a SQLite file.
//!
//! These cover the request lifecycle end to end: gating, execution, row
//! limits, affected-row counts, schema tools and reconnect behavior.

use serde_json::json;
use sql_gateway_mcp::db::ExecutionLimits;
use sql_gateway_mcp::error::ErrorKind;
use sql_gateway_mcp::models::{
    ColumnSpec, ConnectionSettings, ExecutionOutcome, KeyKind, OperationRequest, TruncationReason,
};
use sql_gateway_mcp::pipeline::{ExecutionPipeline, PipelineHandle};
use std::time::Duration;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

/// Spawn a pipeline on a fresh SQLite database in a temp dir.
fn setup_pipeline(limits: ExecutionLimits) -> (TempDir, PipelineHandle) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let settings = ConnectionSettings::sqlite(dir.path().join("gateway.db"), Duration::from_secs(5));
    (dir, ExecutionPipeline::spawn(settings, limits))
}

fn query(sql: &str, limit: Option<u32>) -> OperationRequest {
    OperationRequest::Query {
        sql: sql.to_string(),
        limit,
    }
}

fn execute(sql: &str) -> OperationRequest {
    OperationRequest::Execute {
        sql: sql.to_string(),
    }
}

async fn create_users(pipeline: &PipelineHandle) {
    let request = OperationRequest::CreateTable {
        table_name: "users".to_string(),
        columns: vec![
            ColumnSpec::new("id", "INTEGER")
                .not_null()
                .with_extra("PRIMARY KEY"),
            ColumnSpec::new("name", "TEXT").not_null(),
            ColumnSpec::new("status", "TEXT").with_default("'active'"),
        ],
    };
    assert_ok!(pipeline.execute(request).await);
}

async fn insert_numbers(pipeline: &PipelineHandle, count: u32) {
    assert_ok!(
        pipeline
            .execute(OperationRequest::CreateTable {
                table_name: "nums".to_string(),
                columns: vec![ColumnSpec::new("n", "INTEGER")],
            })
            .await
    );
    for n in 1..=count {
        assert_ok!(
            pipeline
                .execute(execute(&format!("INSERT INTO nums (n) VALUES ({})", n)))
                .await
        );
    }
}

type RowsParts = (
    Vec<String>,
    Vec<serde_json::Value>,
    bool,
    Option<u64>,
    Option<TruncationReason>,
);

fn rows_of(outcome: ExecutionOutcome) -> RowsParts {
    match outcome {
        ExecutionOutcome::Rows {
            columns,
            rows,
            truncated,
            total_available,
            truncated_by,
        } => (
            columns,
            rows.into_iter().map(serde_json::Value::Object).collect(),
            truncated,
            total_available,
            truncated_by,
        ),
        other => panic!("expected rows, got {:?}", other),
    }
}

// =========================================================================
// Reads and writes
// =========================================================================

#[tokio::test]
async fn test_insert_then_select_three_rows() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());
    create_users(&pipeline).await;

    let outcome = assert_ok!(
        pipeline
            .execute(execute(
                "INSERT INTO users (id, name) VALUES (1, 'ada'), (2, 'brian'), (3, 'chen')"
            ))
            .await
    );
    assert_eq!(outcome, ExecutionOutcome::AffectedCount { count: 3 });

    let outcome = assert_ok!(
        pipeline
            .execute(query("SELECT id, name, status FROM users ORDER BY id", None))
            .await
    );
    let (columns, rows, truncated, total, truncated_by) = rows_of(outcome);
    assert_eq!(columns, vec!["id", "name", "status"]);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], json!({"id": 1, "name": "ada", "status": "active"}));
    assert_eq!(rows[2]["name"], "chen");
    assert!(!truncated);
    assert_eq!(total, Some(3));
    assert!(truncated_by.is_none());
}

#[tokio::test]
async fn test_empty_result_keeps_column_names() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());
    create_users(&pipeline).await;

    let outcome = assert_ok!(
        pipeline
            .execute(query("SELECT id, name FROM users WHERE id = 42", None))
            .await
    );
    let (columns, rows, truncated, total, _) = rows_of(outcome);
    assert_eq!(columns, vec!["id", "name"]);
    assert!(rows.is_empty());
    assert!(!truncated);
    assert_eq!(total, Some(0));
}

#[tokio::test]
async fn test_update_reports_affected_rows() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());
    create_users(&pipeline).await;
    assert_ok!(
        pipeline
            .execute(execute("INSERT INTO users (id, name) VALUES (1, 'ada')"))
            .await
    );

    let first = assert_ok!(
        pipeline
            .execute(execute("UPDATE users SET status = 'gone' WHERE id = 1"))
            .await
    );
    assert_eq!(first, ExecutionOutcome::AffectedCount { count: 1 });

    let second = assert_ok!(
        pipeline
            .execute(execute("UPDATE users SET status = 'gone' WHERE id = 99"))
            .await
    );
    assert_eq!(second, ExecutionOutcome::AffectedCount { count: 0 });
}

#[tokio::test]
async fn test_null_and_float_values() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());
    assert_ok!(
        pipeline
            .execute(OperationRequest::CreateTable {
                table_name: "readings".to_string(),
                columns: vec![
                    ColumnSpec::new("label", "TEXT"),
                    ColumnSpec::new("value", "REAL"),
                ],
            })
            .await
    );
    assert_ok!(
        pipeline
            .execute(execute(
                "INSERT INTO readings (label, value) VALUES ('a', 1.5), (NULL, NULL)"
            ))
            .await
    );

    let outcome = assert_ok!(
        pipeline
            .execute(query("SELECT label, value FROM readings ORDER BY rowid", None))
            .await
    );
    let (_, rows, _, _, _) = rows_of(outcome);
    assert_eq!(rows[0], json!({"label": "a", "value": 1.5}));
    assert_eq!(rows[1], json!({"label": null, "value": null}));
}

#[tokio::test]
async fn test_duplicate_column_names_keep_every_value() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());

    let outcome = assert_ok!(pipeline.execute(query("SELECT 1 AS id, 2 AS id", None)).await);
    let (columns, rows, _, total, _) = rows_of(outcome);
    assert_eq!(columns, vec!["id", "id_2"]);
    assert_eq!(rows, vec![json!({"id": 1, "id_2": 2})]);
    assert_eq!(total, Some(1));
}

#[tokio::test]
async fn test_join_with_shared_column_names() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());
    create_users(&pipeline).await;
    assert_ok!(
        pipeline
            .execute(OperationRequest::CreateTable {
                table_name: "orders".to_string(),
                columns: vec![
                    ColumnSpec::new("id", "INTEGER").with_extra("PRIMARY KEY"),
                    ColumnSpec::new("user_id", "INTEGER").not_null(),
                    ColumnSpec::new("status", "TEXT"),
                ],
            })
            .await
    );
    assert_ok!(
        pipeline
            .execute(execute("INSERT INTO users (id, name) VALUES (1, 'ada')"))
            .await
    );
    assert_ok!(
        pipeline
            .execute(execute(
                "INSERT INTO orders (id, user_id, status) VALUES (10, 1, 'shipped')"
            ))
            .await
    );

    let outcome = assert_ok!(
        pipeline
            .execute(query(
                "SELECT * FROM users JOIN orders ON orders.user_id = users.id",
                None
            ))
            .await
    );
    let (columns, rows, _, _, _) = rows_of(outcome);
    assert_eq!(
        columns,
        vec!["id", "name", "status", "id_2", "user_id", "status_2"]
    );
    assert_eq!(
        rows[0],
        json!({
            "id": 1,
            "name": "ada",
            "status": "active",
            "id_2": 10,
            "user_id": 1,
            "status_2": "shipped"
        })
    );
}

#[tokio::test]
async fn test_empty_join_result_uses_the_same_names() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());
    create_users(&pipeline).await;

    let outcome = assert_ok!(
        pipeline
            .execute(query("SELECT a.id, b.id FROM users a JOIN users b ON a.id = b.id", None))
            .await
    );
    let (columns, rows, _, _, _) = rows_of(outcome);
    assert!(rows.is_empty());
    assert_eq!(columns, vec!["id", "id_2"]);
}

#[tokio::test]
async fn test_database_error_is_query_failed() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());
    let err = assert_err!(
        pipeline
            .execute(query("SELECT * FROM missing_table", None))
            .await
    );
    assert_eq!(err.kind(), ErrorKind::QueryFailed);
    assert!(err.to_string().contains("missing_table"));
}

// =========================================================================
// Row limits
// =========================================================================

#[tokio::test]
async fn test_result_truncated_at_max_rows() {
    let limits = ExecutionLimits {
        max_rows: 5,
        ..ExecutionLimits::default()
    };
    let (_dir, pipeline) = setup_pipeline(limits);
    insert_numbers(&pipeline, 10).await;

    let outcome = assert_ok!(
        pipeline
            .execute(query("SELECT n FROM nums ORDER BY n", None))
            .await
    );
    let (_, rows, truncated, total, truncated_by) = rows_of(outcome);
    assert_eq!(rows.len(), 5);
    assert!(truncated);
    assert_eq!(total, None);
    assert_eq!(truncated_by, Some(TruncationReason::RowLimit));
    assert_eq!(rows[4]["n"], 5);
}

#[tokio::test]
async fn test_exactly_max_rows_is_not_truncated() {
    let limits = ExecutionLimits {
        max_rows: 5,
        ..ExecutionLimits::default()
    };
    let (_dir, pipeline) = setup_pipeline(limits);
    insert_numbers(&pipeline, 5).await;

    let outcome = assert_ok!(pipeline.execute(query("SELECT n FROM nums", None)).await);
    let (_, rows, truncated, total, _) = rows_of(outcome);
    assert_eq!(rows.len(), 5);
    assert!(!truncated);
    assert_eq!(total, Some(5));
}

#[tokio::test]
async fn test_request_limit_is_capped_by_max_rows() {
    let limits = ExecutionLimits {
        max_rows: 5,
        ..ExecutionLimits::default()
    };
    let (_dir, pipeline) = setup_pipeline(limits);
    insert_numbers(&pipeline, 10).await;

    let smaller = assert_ok!(pipeline.execute(query("SELECT n FROM nums", Some(3))).await);
    let (_, rows, truncated, _, _) = rows_of(smaller);
    assert_eq!(rows.len(), 3);
    assert!(truncated);

    let larger = assert_ok!(pipeline.execute(query("SELECT n FROM nums", Some(500))).await);
    let (_, rows, truncated, _, _) = rows_of(larger);
    assert_eq!(rows.len(), 5);
    assert!(truncated);
}

#[tokio::test]
async fn test_byte_limit_truncates_result() {
    let limits = ExecutionLimits {
        max_result_bytes: 200,
        ..ExecutionLimits::default()
    };
    let (_dir, pipeline) = setup_pipeline(limits);
    assert_ok!(
        pipeline
            .execute(OperationRequest::CreateTable {
                table_name: "docs".to_string(),
                columns: vec![ColumnSpec::new("body", "TEXT")],
            })
            .await
    );
    for _ in 0..5 {
        assert_ok!(
            pipeline
                .execute(execute(&format!(
                    "INSERT INTO docs (body) VALUES ('{}')",
                    "x".repeat(80)
                )))
                .await
        );
    }

    let outcome = assert_ok!(pipeline.execute(query("SELECT body FROM docs", None)).await);
    let (_, rows, truncated, total, truncated_by) = rows_of(outcome);
    assert!(rows.len() < 5);
    assert!(truncated);
    assert_eq!(total, None);
    assert_eq!(truncated_by, Some(TruncationReason::ByteLimit));
}

// =========================================================================
// Gating
// =========================================================================

#[tokio::test]
async fn test_select_through_execute_is_mismatch() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());
    let err = assert_err!(pipeline.execute(execute("SELECT 1")).await);
    assert_eq!(err.kind(), ErrorKind::Mismatch);
    assert!(err.suggestion().unwrap_or_default().contains("query_database"));
}

#[tokio::test]
async fn test_delete_through_query_is_mismatch() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());
    create_users(&pipeline).await;
    assert_ok!(
        pipeline
            .execute(execute("INSERT INTO users (id, name) VALUES (1, 'ada')"))
            .await
    );

    let err = assert_err!(pipeline.execute(query("DELETE FROM users", None)).await);
    assert_eq!(err.kind(), ErrorKind::Mismatch);

    // Nothing was deleted
    let outcome = assert_ok!(pipeline.execute(query("SELECT id FROM users", None)).await);
    let (_, rows, _, _, _) = rows_of(outcome);
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_forbidden_statements_never_run() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());
    create_users(&pipeline).await;

    for sql in [
        "DROP TABLE users",
        "SELECT 1; DROP TABLE users",
        "TRUNCATE TABLE users",
        "CREATE TABLE other (id INTEGER)",
    ] {
        let err = assert_err!(pipeline.execute(execute(sql)).await);
        assert!(
            matches!(err.kind(), ErrorKind::Forbidden | ErrorKind::Mismatch),
            "unexpected kind {} for {}",
            err.kind(),
            sql
        );
    }

    let tables = assert_ok!(pipeline.execute(OperationRequest::ListTables).await);
    assert_eq!(
        tables,
        ExecutionOutcome::NameList {
            names: vec!["users".to_string()],
            current: None,
        }
    );
}

#[tokio::test]
async fn test_injected_table_name_is_invalid_identifier() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());
    let err = assert_err!(
        pipeline
            .execute(OperationRequest::CreateTable {
                table_name: "users; DROP TABLE x".to_string(),
                columns: vec![ColumnSpec::new("id", "INTEGER")],
            })
            .await
    );
    assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);

    let stats = assert_ok!(pipeline.stats().await);
    assert_eq!(stats.requests_handled, 0);
}

// =========================================================================
// Schema tools
// =========================================================================

#[tokio::test]
async fn test_create_add_describe_flow() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());
    create_users(&pipeline).await;

    let added = assert_ok!(
        pipeline
            .execute(OperationRequest::AddColumn {
                table_name: "users".to_string(),
                column: ColumnSpec::new("email", "VARCHAR(255)"),
            })
            .await
    );
    assert_eq!(
        added,
        ExecutionOutcome::Success {
            message: "Column 'email' added to table 'users'".to_string()
        }
    );

    let described = assert_ok!(
        pipeline
            .execute(OperationRequest::DescribeTable {
                table_name: "users".to_string(),
            })
            .await
    );
    let ExecutionOutcome::SchemaInfo { columns } = described else {
        panic!("expected schema info");
    };
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "status", "email"]);
    assert_eq!(columns[0].key, KeyKind::Primary);
    assert!(!columns[1].nullable);
    assert_eq!(columns[2].default.as_deref(), Some("'active'"));
    assert_eq!(columns[3].data_type, "VARCHAR(255)");
    assert!(columns[3].nullable);
}

#[tokio::test]
async fn test_describe_missing_table() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());
    let err = assert_err!(
        pipeline
            .execute(OperationRequest::DescribeTable {
                table_name: "ghost".to_string(),
            })
            .await
    );
    assert_eq!(err.kind(), ErrorKind::QueryFailed);
    assert!(err.suggestion().unwrap_or_default().contains("show_tables"));
}

#[tokio::test]
async fn test_show_databases_lists_main() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());
    let outcome = assert_ok!(pipeline.execute(OperationRequest::ListDatabases).await);
    let ExecutionOutcome::NameList { names, current } = outcome else {
        panic!("expected name list");
    };
    assert!(names.contains(&"main".to_string()));
    assert_eq!(current.as_deref(), Some("main"));
}

#[tokio::test]
async fn test_create_existing_table_is_query_failed() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());
    create_users(&pipeline).await;
    let err = assert_err!(
        pipeline
            .execute(OperationRequest::CreateTable {
                table_name: "users".to_string(),
                columns: vec![ColumnSpec::new("id", "INTEGER")],
            })
            .await
    );
    assert_eq!(err.kind(), ErrorKind::QueryFailed);
}

// =========================================================================
// Connection lifecycle
// =========================================================================

#[tokio::test]
async fn test_connection_is_lazy_and_reused() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());
    let stats = assert_ok!(pipeline.stats().await);
    assert!(!stats.connected);
    assert_eq!(stats.connect_count, 0);

    assert_ok!(pipeline.execute(query("SELECT 1", None)).await);
    assert_ok!(pipeline.execute(query("SELECT 2", None)).await);

    let stats = assert_ok!(pipeline.stats().await);
    assert!(stats.connected);
    assert_eq!(stats.connect_count, 1);
    assert_eq!(stats.requests_handled, 2);
}

#[tokio::test]
async fn test_reconnect_after_reset_keeps_data() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());
    create_users(&pipeline).await;
    assert_ok!(
        pipeline
            .execute(execute("INSERT INTO users (id, name) VALUES (1, 'ada')"))
            .await
    );

    assert_ok!(pipeline.reset_connection().await);
    let stats = assert_ok!(pipeline.stats().await);
    assert!(!stats.connected);

    let outcome = assert_ok!(pipeline.execute(query("SELECT name FROM users", None)).await);
    let (_, rows, _, _, _) = rows_of(outcome);
    assert_eq!(rows, vec![json!({"name": "ada"})]);

    let stats = assert_ok!(pipeline.stats().await);
    assert_eq!(stats.connect_count, 2);
}

#[tokio::test]
async fn test_timeout_drops_connection_and_next_request_reconnects() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits {
        query_timeout: Duration::from_secs(1),
        ..ExecutionLimits::default()
    });
    assert_ok!(pipeline.ping().await);

    let endless = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                   SELECT count(*) FROM c";
    let err = assert_err!(pipeline.execute(query(endless, None)).await);
    assert_eq!(err.kind(), ErrorKind::Timeout);

    let stats = assert_ok!(pipeline.stats().await);
    assert!(!stats.connected);

    let outcome = assert_ok!(pipeline.execute(query("SELECT 1 AS one", None)).await);
    let (_, rows, _, _, _) = rows_of(outcome);
    assert_eq!(rows, vec![json!({"one": 1})]);

    let stats = assert_ok!(pipeline.stats().await);
    assert!(stats.connected);
    assert_eq!(stats.connect_count, 2);
}

#[tokio::test]
async fn test_concurrent_requests_are_serialized() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());
    insert_numbers(&pipeline, 0).await;

    let mut tasks = Vec::new();
    for n in 0..20 {
        let pipeline = pipeline.clone();
        tasks.push(tokio::spawn(async move {
            pipeline
                .execute(execute(&format!("INSERT INTO nums (n) VALUES ({})", n)))
                .await
        }));
    }
    for task in tasks {
        let result = task.await.expect("task panicked");
        assert_ok!(result);
    }

    let outcome = assert_ok!(
        pipeline
            .execute(query("SELECT COUNT(*) AS total FROM nums", None))
            .await
    );
    let (_, rows, _, _, _) = rows_of(outcome);
    assert_eq!(rows[0]["total"], 20);

    let stats = assert_ok!(pipeline.stats().await);
    assert_eq!(stats.connect_count, 1);
}

#[tokio::test]
async fn test_requests_after_shutdown_fail() {
    let (_dir, pipeline) = setup_pipeline(ExecutionLimits::default());
    assert_ok!(pipeline.ping().await);
    assert_ok!(pipeline.shutdown().await);

    let err = assert_err!(pipeline.execute(query("SELECT 1", None)).await);
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[tokio::test]
async fn test_unreachable_database_is_connection_failed() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let settings = ConnectionSettings::sqlite(
        dir.path().join("missing").join("gateway.db"),
        Duration::from_secs(2),
    );
    let pipeline = ExecutionPipeline::spawn(settings, ExecutionLimits::default());

    let err = assert_err!(pipeline.execute(query("SELECT 1", None)).await);
    assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
    assert!(err.suggestion().is_some());
}
