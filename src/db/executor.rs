//! Query execution engine.
//!
//! This module provides query execution functionality with support for:
//! - Row limits (enforced via streaming - only fetches needed rows plus one probe row)
//! - Result byte caps
//! - Query timeouts
//! - Column metadata for empty result sets
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific fetch and write operations
//! - `sqlite`: SQLite-specific fetch and write operations
//!
//! Each submodule provides identical functionality adapted to the database's type system.

use crate::db::connection::DbConnection;
use crate::db::types::{RowToJson, unique_column_names};
use crate::error::{DbError, DbResult};
use crate::models::{ExecutionOutcome, Row, TruncationReason};
use futures_util::StreamExt;
use humansize::{BINARY, format_size};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default maximum rows returned by a read.
pub const DEFAULT_MAX_ROWS: u32 = 1000;

/// Default per-statement timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Default cap on the serialized size of a row set (4 MiB).
pub const DEFAULT_MAX_RESULT_BYTES: usize = 4 * 1024 * 1024;

/// Resource bounds applied to every statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub max_rows: u32,
    pub query_timeout: Duration,
    pub max_result_bytes: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
        }
    }
}

/// Query executor that runs single statements on the provider's connection.
#[derive(Debug, Clone, Default)]
pub struct QueryExecutor {
    limits: ExecutionLimits,
}

impl QueryExecutor {
    /// Create a new query executor with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new query executor with custom limits.
    pub fn with_limits(limits: ExecutionLimits) -> Self {
        Self {
            limits: ExecutionLimits {
                max_rows: limits.max_rows.max(1),
                ..limits
            },
        }
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Effective row cap for a request: clamped to `[1, max_rows]`.
    pub fn row_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .map(|l| l.clamp(1, self.limits.max_rows))
            .unwrap_or(self.limits.max_rows)
    }

    /// Run a read statement and normalize its rows.
    pub async fn fetch(
        &self,
        conn: &mut DbConnection,
        sql: &str,
        limit: Option<u32>,
    ) -> DbResult<ExecutionOutcome> {
        let row_limit = self.row_limit(limit);
        let query_timeout = self.limits.query_timeout;

        debug!(
            sql = %sql,
            limit = row_limit,
            timeout_secs = query_timeout.as_secs(),
            "Executing query"
        );

        match conn {
            DbConnection::MySql(c) => {
                let rows = mysql::fetch_rows(c, sql, row_limit, query_timeout).await?;
                let columns = match rows.first() {
                    Some(first) => first.column_names(),
                    None => mysql::prepared_columns(c, sql, query_timeout).await,
                };
                let columns = unique_column_names(columns);
                Ok(shape_rows(columns, &rows, row_limit, self.limits.max_result_bytes))
            }
            DbConnection::SQLite(c) => {
                let rows = sqlite::fetch_rows(c, sql, row_limit, query_timeout).await?;
                let columns = match rows.first() {
                    Some(first) => first.column_names(),
                    None => sqlite::prepared_columns(c, sql, query_timeout).await,
                };
                let columns = unique_column_names(columns);
                Ok(shape_rows(columns, &rows, row_limit, self.limits.max_result_bytes))
            }
        }
    }

    /// Run a write or DDL statement and return the affected-row count.
    pub async fn execute(&self, conn: &mut DbConnection, sql: &str) -> DbResult<u64> {
        let query_timeout = self.limits.query_timeout;

        debug!(
            sql = %sql,
            timeout_secs = query_timeout.as_secs(),
            "Executing write operation"
        );

        match conn {
            DbConnection::MySql(c) => mysql::execute_write(c, sql, query_timeout).await,
            DbConnection::SQLite(c) => sqlite::execute_write(c, sql, query_timeout).await,
        }
    }
}

/// Turn fetched rows into a `Rows` outcome, applying the row and byte caps.
///
/// `rows` may hold one probe row past `row_limit`; its presence is what marks
/// the result as truncated by the row limit. `columns` must already be unique;
/// they are the keys of every row map.
fn shape_rows<R: RowToJson>(
    columns: Vec<String>,
    rows: &[R],
    row_limit: u32,
    max_result_bytes: usize,
) -> ExecutionOutcome {
    let more_available = rows.len() > row_limit as usize;

    let mut json_rows: Vec<Row> = Vec::with_capacity(rows.len().min(row_limit as usize));
    let mut total_bytes = 0usize;
    let mut truncated_by = None;

    for row in rows.iter().take(row_limit as usize) {
        let map = row.to_json_row(&columns);
        let size = serialized_size(&map);
        if total_bytes + size > max_result_bytes {
            warn!(
                rows_kept = json_rows.len(),
                limit = %format_size(max_result_bytes, BINARY),
                "Query result exceeded byte limit"
            );
            truncated_by = Some(TruncationReason::ByteLimit);
            break;
        }
        total_bytes += size;
        json_rows.push(map);
    }

    if truncated_by.is_none() && more_available {
        warn!(limit = row_limit, "Query result truncated");
        truncated_by = Some(TruncationReason::RowLimit);
    }

    let truncated = truncated_by.is_some();
    ExecutionOutcome::Rows {
        columns,
        total_available: (!truncated).then_some(json_rows.len() as u64),
        rows: json_rows,
        truncated,
        truncated_by,
    }
}

fn serialized_size(row: &Row) -> usize {
    serde_json::to_vec(row).map(|v| v.len()).unwrap_or(0)
}

// =============================================================================
// Common Helper Functions
// =============================================================================

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> DbResult<Vec<R>> {
    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        rows.push(result.map_err(DbError::from)?);
    }
    Ok(rows)
}

fn timeout_error(operation: &str, timeout: Duration) -> DbError {
    DbError::timeout(operation, timeout.as_secs())
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Raw SQL without arguments goes over each driver's simple-query path, so
// statements such as SHOW work on MySQL.

mod mysql {
    use super::*;
    use sqlx::mysql::{MySqlConnection, MySqlRow};
    use sqlx::{Column, Executor, Statement};

    pub async fn fetch_rows(
        conn: &mut MySqlConnection,
        sql: &str,
        row_limit: u32,
        query_timeout: Duration,
    ) -> DbResult<Vec<MySqlRow>> {
        let fetch_limit = row_limit as usize + 1;
        let rows_future = (&mut *conn)
            .fetch(sql)
            .take(fetch_limit)
            .collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn prepared_columns(
        conn: &mut MySqlConnection,
        sql: &str,
        query_timeout: Duration,
    ) -> Vec<String> {
        match timeout(query_timeout, (&mut *conn).prepare(sql)).await {
            Ok(Ok(stmt)) => stmt.columns().iter().map(|c| c.name().to_string()).collect(),
            Ok(Err(e)) => {
                debug!(error = %e, "Could not prepare statement for column metadata");
                Vec::new()
            }
            Err(_) => Vec::new(),
        }
    }

    pub async fn execute_write(
        conn: &mut MySqlConnection,
        sql: &str,
        query_timeout: Duration,
    ) -> DbResult<u64> {
        match timeout(query_timeout, (&mut *conn).execute(sql)).await {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("write operation", query_timeout)),
        }
    }
}

mod sqlite {
    use super::*;
    use sqlx::sqlite::{SqliteConnection, SqliteRow};
    use sqlx::{Column, Executor, Statement};

    pub async fn fetch_rows(
        conn: &mut SqliteConnection,
        sql: &str,
        row_limit: u32,
        query_timeout: Duration,
    ) -> DbResult<Vec<SqliteRow>> {
        let fetch_limit = row_limit as usize + 1;
        let rows_future = (&mut *conn)
            .fetch(sql)
            .take(fetch_limit)
            .collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn prepared_columns(
        conn: &mut SqliteConnection,
        sql: &str,
        query_timeout: Duration,
    ) -> Vec<String> {
        match timeout(query_timeout, (&mut *conn).prepare(sql)).await {
            Ok(Ok(stmt)) => stmt.columns().iter().map(|c| c.name().to_string()).collect(),
            Ok(Err(e)) => {
                debug!(error = %e, "Could not prepare statement for column metadata");
                Vec::new()
            }
            Err(_) => Vec::new(),
        }
    }

    pub async fn execute_write(
        conn: &mut SqliteConnection,
        sql: &str,
        query_timeout: Duration,
    ) -> DbResult<u64> {
        match timeout(query_timeout, (&mut *conn).execute(sql)).await {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("write operation", query_timeout)),
        }
    }
}
