//! The single-owner worker behind [`PipelineHandle`](super::PipelineHandle).
//!
//! The worker is the only code that touches the database connection. It pulls
//! operations off the queue one at a time, so statements never interleave.

use super::{PipelineHandle, PreparedOperation, QUEUE_CAPACITY};
use crate::db::{ConnectionProvider, DbConnection, ExecutionLimits, QueryExecutor, SchemaInspector};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionSettings, ExecutionOutcome};
use serde::Serialize;
use std::future::Future;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Messages accepted by the worker.
#[derive(Debug)]
pub(crate) enum Op {
    Run {
        request_id: Uuid,
        operation: PreparedOperation,
        respond_to: oneshot::Sender<DbResult<ExecutionOutcome>>,
    },
    Ping {
        respond_to: oneshot::Sender<DbResult<()>>,
    },
    Reset {
        respond_to: oneshot::Sender<()>,
    },
    Stats {
        respond_to: oneshot::Sender<PipelineStats>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// Snapshot of the worker's connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub connected: bool,
    pub connect_count: u64,
    pub requests_handled: u64,
}

/// Runs one prepared operation on a live connection.
pub trait Dispatch: Send + Sync + 'static {
    fn dispatch(
        &self,
        conn: &mut DbConnection,
        operation: &PreparedOperation,
    ) -> impl Future<Output = DbResult<ExecutionOutcome>> + Send;
}

/// Routes statements to the executor and metadata lookups to the inspector.
pub struct Dispatcher {
    executor: QueryExecutor,
    inspector: SchemaInspector,
}

impl Dispatcher {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self {
            executor: QueryExecutor::with_limits(limits),
            inspector: SchemaInspector::new(limits.query_timeout),
        }
    }
}

impl Dispatch for Dispatcher {
    async fn dispatch(
        &self,
        conn: &mut DbConnection,
        operation: &PreparedOperation,
    ) -> DbResult<ExecutionOutcome> {
        let (executor, inspector) = (&self.executor, &self.inspector);
        match operation {
            PreparedOperation::Fetch { sql, limit } => executor.fetch(conn, sql, *limit).await,
            PreparedOperation::Write { sql } => executor
                .execute(conn, sql)
                .await
                .map(|count| ExecutionOutcome::AffectedCount { count }),
            PreparedOperation::Ddl { sql, message } => {
                executor.execute(conn, sql).await?;
                debug!(sql = %sql, "Schema change applied");
                Ok(ExecutionOutcome::Success {
                    message: message.clone(),
                })
            }
            PreparedOperation::ListTables => inspector
                .list_tables(conn)
                .await
                .map(|names| ExecutionOutcome::NameList {
                    names,
                    current: None,
                }),
            PreparedOperation::ListDatabases => {
                let names = inspector.list_databases(conn).await?;
                let current = inspector.current_database(conn).await?;
                Ok(ExecutionOutcome::NameList { names, current })
            }
            PreparedOperation::DescribeTable { table_name } => inspector
                .describe_table(conn, table_name)
                .await
                .map(|columns| ExecutionOutcome::SchemaInfo { columns }),
        }
    }
}

/// Owns the connection provider and executes queued operations.
pub struct ExecutionPipeline<D = Dispatcher> {
    provider: ConnectionProvider,
    dispatcher: D,
    receiver: mpsc::Receiver<Op>,
    requests_handled: u64,
}

impl ExecutionPipeline {
    /// Start the worker on the current tokio runtime and return its handle.
    ///
    /// No connection is opened until the first request (or [`PipelineHandle::ping`]).
    pub fn spawn(settings: ConnectionSettings, limits: ExecutionLimits) -> PipelineHandle {
        Self::spawn_with(settings, Dispatcher::new(limits))
    }
}

impl<D: Dispatch> ExecutionPipeline<D> {
    pub(crate) fn spawn_with(settings: ConnectionSettings, dispatcher: D) -> PipelineHandle {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let db_type = settings.db_type();

        let worker = Self {
            provider: ConnectionProvider::new(settings),
            dispatcher,
            receiver,
            requests_handled: 0,
        };
        tokio::spawn(worker.run());

        PipelineHandle { sender, db_type }
    }

    async fn run(mut self) {
        info!(db_type = %self.provider.db_type(), "Execution pipeline started");

        while let Some(op) = self.receiver.recv().await {
            match op {
                Op::Run {
                    request_id,
                    operation,
                    respond_to,
                } => {
                    let span = info_span!("execute", %request_id, kind = %operation.kind());
                    let start = Instant::now();
                    let result = self.handle(&operation).instrument(span.clone()).await;
                    self.requests_handled += 1;

                    span.in_scope(|| match &result {
                        Ok(outcome) => debug!(
                            items = outcome.item_count(),
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "Request completed"
                        ),
                        Err(e) => warn!(kind = %e.kind(), error = %e, "Request failed"),
                    });

                    if respond_to.send(result).is_err() {
                        debug!(%request_id, "Caller went away before the reply was ready");
                    }
                }
                Op::Ping { respond_to } => {
                    let result = self.provider.get_connection().await.map(|_| ());
                    let _ = respond_to.send(result);
                }
                Op::Reset { respond_to } => {
                    self.provider.invalidate();
                    let _ = respond_to.send(());
                }
                Op::Stats { respond_to } => {
                    let _ = respond_to.send(self.stats());
                }
                Op::Shutdown { respond_to } => {
                    self.provider.close().await;
                    let _ = respond_to.send(());
                    break;
                }
            }
        }

        // Also reached when every handle has been dropped
        self.provider.close().await;
        info!(
            requests_handled = self.requests_handled,
            "Execution pipeline stopped"
        );
    }

    fn stats(&self) -> PipelineStats {
        PipelineStats {
            connected: self.provider.is_connected(),
            connect_count: self.provider.connect_count(),
            requests_handled: self.requests_handled,
        }
    }

    /// Execute one operation, applying the reconnect policy.
    ///
    /// Reads and metadata lookups that lose their connection are re-run once
    /// on a fresh one. Writes and DDL are never replayed: their effect is
    /// unknown once the connection drops mid-statement.
    async fn handle(&mut self, operation: &PreparedOperation) -> DbResult<ExecutionOutcome> {
        let kind = operation.kind();

        let conn = self.provider.get_connection().await?;
        let first = self.dispatcher.dispatch(conn, operation).await;

        match first {
            Err(e) if e.is_connection_failure() => {
                self.provider.invalidate();
                if !kind.is_replayable() {
                    warn!(%kind, error = %e, "Connection lost during statement; not replaying");
                    return Err(DbError::connection(
                        format!("Connection lost while running a {} statement: {}", kind, e),
                        "The statement may or may not have been applied; check before retrying",
                    ));
                }

                warn!(%kind, error = %e, "Connection lost; reconnecting and retrying once");
                let conn = self.provider.get_connection().await?;
                let retried = self.dispatcher.dispatch(conn, operation).await;
                self.after_failure(&retried);
                retried
            }
            other => {
                self.after_failure(&other);
                other
            }
        }
    }

    /// A timed-out or broken handle is in an unknown protocol state; drop it.
    fn after_failure(&mut self, result: &DbResult<ExecutionOutcome>) {
        let broken = match result {
            Err(e) => e.is_connection_failure() || matches!(e, DbError::Timeout { .. }),
            Ok(_) => false,
        };
        if broken {
            self.provider.invalidate();
        }
    }
}
