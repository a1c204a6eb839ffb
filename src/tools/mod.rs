//! MCP tool implementations.
//!
//! This module contains the gateway's tool handlers and the checks behind them:
//! - `query`: `query_database` and `execute_sql`
//! - `schema`: `create_table`, `add_column`, `show_tables`, `show_databases`, `describe_table`
//! - `classifier`: statement classification and gating
//! - `identifier`: identifier and column fragment validation
//! - `ddl`: deterministic DDL construction
//! - `format`: table and markdown rendering of outcomes

pub mod classifier;
pub mod ddl;
pub mod format;
pub mod identifier;
pub mod query;
pub mod schema;

pub use format::OutputFormat;
pub use query::{ExecuteInput, QueryInput, QueryToolHandler};
pub use schema::{
    AddColumnInput, CreateTableInput, DescribeTableInput, ListInput, SchemaToolHandler,
};

use crate::models::{OperationRequest, ToolResponse};
use crate::pipeline::PipelineHandle;
use std::time::Instant;
use tracing::info;

/// Run one request through the pipeline and wrap the result in the response envelope.
pub(crate) async fn run_tool(
    pipeline: &PipelineHandle,
    request: OperationRequest,
    format: OutputFormat,
) -> ToolResponse {
    let tool = request.tool_name();
    let start = Instant::now();
    let result = pipeline.execute(request).await;
    let execution_time_ms = start.elapsed().as_millis() as u64;

    info!(
        tool,
        ok = result.is_ok(),
        execution_time_ms,
        "Tool call finished"
    );

    let formatted = result
        .as_ref()
        .ok()
        .and_then(|outcome| format::render(outcome, format, execution_time_ms));
    ToolResponse::from_result(&result, execution_time_ms).with_formatted(formatted)
}
