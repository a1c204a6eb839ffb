//! Raw SQL tools.
//!
//! This module implements `query_database` (reads) and `execute_sql` (writes).
//! Both hand the statement to the execution pipeline, which gates it through
//! the classifier before anything reaches the database.

use crate::models::{OperationRequest, ToolResponse};
use crate::pipeline::PipelineHandle;
use crate::tools::format::OutputFormat;
use crate::tools::run_tool;
use schemars::JsonSchema;
use serde::Deserialize;

/// Input for the query_database tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryInput {
    /// A single SELECT, SHOW, DESCRIBE or EXPLAIN statement.
    pub sql: String,
    /// Maximum rows to return. Capped at the server's row limit.
    #[serde(default)]
    pub limit: Option<u32>,
    /// Output format: "json" returns structured data only, "table" adds an ASCII table, "markdown" adds a markdown table
    #[serde(default)]
    pub format: OutputFormat,
}

/// Input for the execute_sql tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteInput {
    /// A single INSERT, UPDATE or DELETE statement.
    pub sql: String,
}

/// Handler for raw SQL tool operations.
#[derive(Debug, Clone)]
pub struct QueryToolHandler {
    pipeline: PipelineHandle,
}

impl QueryToolHandler {
    pub fn new(pipeline: PipelineHandle) -> Self {
        Self { pipeline }
    }

    /// Run a read statement.
    pub async fn query(&self, input: QueryInput) -> ToolResponse {
        let request = OperationRequest::Query {
            sql: input.sql,
            limit: input.limit,
        };
        run_tool(&self.pipeline, request, input.format).await
    }

    /// Run a write statement and report the affected-row count.
    pub async fn execute(&self, input: ExecuteInput) -> ToolResponse {
        let request = OperationRequest::Execute { sql: input.sql };
        run_tool(&self.pipeline, request, OutputFormat::Json).await
    }
}
