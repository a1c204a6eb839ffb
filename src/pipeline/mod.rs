//! Execution pipeline.
//!
//! Every tool call becomes an [`OperationRequest`] and flows through here:
//!
//! 1. [`prepare`] runs on the caller's task. It gates raw SQL through the
//!    classifier, builds DDL from structured input, and validates identifiers.
//!    Rejected requests never reach the queue.
//! 2. The prepared operation is queued to the single worker that owns the
//!    database connection ([`worker`]). Requests complete in submission order.
//! 3. The worker executes, normalizes the result and replies on a oneshot
//!    channel.

mod worker;

pub use worker::{ExecutionPipeline, PipelineStats};

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, ExecutionOutcome, OperationKind, OperationRequest};
use crate::tools::classifier::gate;
use crate::tools::ddl::{build_add_column, build_create_table};
use crate::tools::identifier::validate_identifier;
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use worker::Op;

/// Bound on queued requests waiting for the worker.
pub const QUEUE_CAPACITY: usize = 64;

/// A request that passed validation and is ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedOperation {
    Fetch { sql: String, limit: Option<u32> },
    Write { sql: String },
    /// `message` is reported back on success
    Ddl { sql: String, message: String },
    ListTables,
    ListDatabases,
    DescribeTable { table_name: String },
}

impl PreparedOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Fetch { .. } => OperationKind::Read,
            Self::Write { .. } => OperationKind::Write,
            Self::Ddl { .. } => OperationKind::SchemaDdl,
            Self::ListTables | Self::ListDatabases | Self::DescribeTable { .. } => {
                OperationKind::Metadata
            }
        }
    }
}

/// Validate and gate a request without touching the database.
pub fn prepare(request: &OperationRequest, db_type: DatabaseType) -> DbResult<PreparedOperation> {
    let tool = request.tool_name();
    let declared = request.declared_kind();

    match request {
        OperationRequest::Query { sql, limit } => {
            let gated = gate(sql, declared, tool, db_type)?;
            Ok(PreparedOperation::Fetch {
                sql: gated.sql,
                limit: *limit,
            })
        }
        OperationRequest::Execute { sql } => {
            let gated = gate(sql, declared, tool, db_type)?;
            Ok(PreparedOperation::Write { sql: gated.sql })
        }
        OperationRequest::CreateTable {
            table_name,
            columns,
        } => {
            let sql = build_create_table(table_name, columns, db_type)?;
            Ok(PreparedOperation::Ddl {
                sql: self_check(&sql, declared, tool, db_type)?,
                message: format!(
                    "Table '{}' created with {} column(s)",
                    table_name,
                    columns.len()
                ),
            })
        }
        OperationRequest::AddColumn { table_name, column } => {
            let sql = build_add_column(table_name, column, db_type)?;
            Ok(PreparedOperation::Ddl {
                sql: self_check(&sql, declared, tool, db_type)?,
                message: format!("Column '{}' added to table '{}'", column.name, table_name),
            })
        }
        OperationRequest::ListTables => Ok(PreparedOperation::ListTables),
        OperationRequest::ListDatabases => Ok(PreparedOperation::ListDatabases),
        OperationRequest::DescribeTable { table_name } => {
            validate_identifier(table_name)?;
            Ok(PreparedOperation::DescribeTable {
                table_name: table_name.clone(),
            })
        }
    }
}

/// Built DDL must classify as schema DDL before it may run.
fn self_check(
    sql: &str,
    declared: OperationKind,
    tool: &str,
    db_type: DatabaseType,
) -> DbResult<String> {
    gate(sql, declared, tool, db_type)
        .map(|gated| gated.sql)
        .map_err(|e| {
            DbError::invalid_input(format!("generated statement was rejected: {}", e))
        })
}

/// Cloneable client side of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    sender: mpsc::Sender<Op>,
    db_type: DatabaseType,
}

impl PipelineHandle {
    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Validate, queue and await one request.
    pub async fn execute(&self, request: OperationRequest) -> DbResult<ExecutionOutcome> {
        let request_id = Uuid::new_v4();
        let span = info_span!("request", %request_id, tool = request.tool_name());

        async move {
            let operation = prepare(&request, self.db_type).inspect_err(|e| {
                warn!(kind = %e.kind(), error = %e, "Request rejected before execution");
            })?;
            debug!(kind = %operation.kind(), "Request accepted");

            self.call(|respond_to| Op::Run {
                request_id,
                operation,
                respond_to,
            })
            .await?
        }
        .instrument(span)
        .await
    }

    /// Make sure a live connection exists, connecting if needed.
    pub async fn ping(&self) -> DbResult<()> {
        self.call(|respond_to| Op::Ping { respond_to }).await?
    }

    /// Drop the current connection; the next request reconnects.
    pub async fn reset_connection(&self) -> DbResult<()> {
        self.call(|respond_to| Op::Reset { respond_to }).await
    }

    pub async fn stats(&self) -> DbResult<PipelineStats> {
        self.call(|respond_to| Op::Stats { respond_to }).await
    }

    /// Close the connection and stop the worker. Later calls fail with `Internal`.
    pub async fn shutdown(&self) -> DbResult<()> {
        self.call(|respond_to| Op::Shutdown { respond_to }).await
    }

    async fn call<T>(&self, op: impl FnOnce(oneshot::Sender<T>) -> Op) -> DbResult<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(op(tx))
            .await
            .map_err(|_| DbError::internal("execution pipeline is not running"))?;
        rx.await
            .map_err(|_| DbError::internal("execution pipeline stopped before replying"))
    }
}
