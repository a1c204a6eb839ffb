//! MCP service implementation using rmcp.
//!
//! `GatewayService` exposes the seven gateway tools. Every tool returns the
//! same [`ToolResponse`] envelope; database and validation failures are
//! reported inside it rather than as protocol errors.

use crate::db::ExecutionLimits;
use crate::models::ToolResponse;
use crate::pipeline::PipelineHandle;
use crate::tools::{
    AddColumnInput, CreateTableInput, DescribeTableInput, ExecuteInput, ListInput, QueryInput,
    QueryToolHandler, SchemaToolHandler,
};
use rmcp::Json;
use rmcp::{
    ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};

#[derive(Clone)]
pub struct GatewayService {
    query_handler: QueryToolHandler,
    schema_handler: SchemaToolHandler,
    instructions: String,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl GatewayService {
    /// Create a service that sends every tool call through `pipeline`.
    pub fn new(pipeline: PipelineHandle, limits: ExecutionLimits) -> Self {
        let instructions = build_instructions(&pipeline, &limits);
        Self {
            query_handler: QueryToolHandler::new(pipeline.clone()),
            schema_handler: SchemaToolHandler::new(pipeline),
            instructions,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl GatewayService {
    #[tool(
        description = "Run a single read-only statement (SELECT, SHOW, DESCRIBE, EXPLAIN) and return rows.\nResults are capped by `limit` and the server's row and size limits; `truncated` tells you when rows were left out.\nOutput format: json (default), table, or markdown."
    )]
    async fn query_database(&self, Parameters(input): Parameters<QueryInput>) -> Json<ToolResponse> {
        Json(self.query_handler.query(input).await)
    }

    #[tool(
        description = "Run a single INSERT, UPDATE or DELETE statement and return the number of affected rows.\nReads and schema changes are rejected; use query_database or the schema tools instead."
    )]
    async fn execute_sql(&self, Parameters(input): Parameters<ExecuteInput>) -> Json<ToolResponse> {
        Json(self.query_handler.execute(input).await)
    }

    #[tool(
        description = "Create a table from structured column definitions.\nEach column has a name, a type (e.g. INT, VARCHAR(255)), and optional nullable, default and extra (e.g. AUTO_INCREMENT PRIMARY KEY)."
    )]
    async fn create_table(
        &self,
        Parameters(input): Parameters<CreateTableInput>,
    ) -> Json<ToolResponse> {
        Json(self.schema_handler.create_table(input).await)
    }

    #[tool(description = "Add one column to an existing table.")]
    async fn add_column(&self, Parameters(input): Parameters<AddColumnInput>) -> Json<ToolResponse> {
        Json(self.schema_handler.add_column(input).await)
    }

    #[tool(description = "List the tables in the current database.")]
    async fn show_tables(&self, Parameters(input): Parameters<ListInput>) -> Json<ToolResponse> {
        Json(self.schema_handler.show_tables(input).await)
    }

    #[tool(
        description = "List the databases visible to this connection.\nFor SQLite these are the attached database names (usually just `main`)."
    )]
    async fn show_databases(&self, Parameters(input): Parameters<ListInput>) -> Json<ToolResponse> {
        Json(self.schema_handler.show_databases(input).await)
    }

    #[tool(
        description = "Describe a table's columns: name, type, nullability, key, default and extra."
    )]
    async fn describe_table(
        &self,
        Parameters(input): Parameters<DescribeTableInput>,
    ) -> Json<ToolResponse> {
        Json(self.schema_handler.describe_table(input).await)
    }
}

#[tool_handler]
impl ServerHandler for GatewayService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "sql-gateway-mcp".to_owned(),
                title: Some("SQL Gateway MCP".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(self.instructions.clone()),
        }
    }
}

fn build_instructions(pipeline: &PipelineHandle, limits: &ExecutionLimits) -> String {
    format!(
        "Tools for one {db} database.\n\
        \n\
        ## Tools\n\
        - `query_database`: reads only (SELECT, SHOW, DESCRIBE, EXPLAIN)\n\
        - `execute_sql`: INSERT, UPDATE, DELETE only\n\
        - `create_table` / `add_column`: schema changes from structured column definitions\n\
        - `show_tables`, `show_databases`, `describe_table`: metadata\n\
        \n\
        ## Rules\n\
        - One statement per call. Multiple statements, DROP, TRUNCATE, GRANT and similar are refused.\n\
        - Reads return at most {max_rows} rows and about {max_bytes} of data; check `truncated`.\n\
        - Statements time out after {timeout}s.\n\
        \n\
        ## Responses\n\
        Every tool returns `ok`, `outcome` or `error`, and `execution_time_ms`.\n\
        Errors carry a `kind` (forbidden, mismatch, invalid_identifier, invalid_input, connection_failed, query_failed, timeout, internal) and often a `suggestion`.",
        db = pipeline.db_type(),
        max_rows = limits.max_rows,
        max_bytes = humansize::format_size(limits.max_result_bytes, humansize::BINARY),
        timeout = limits.query_timeout.as_secs(),
    )
}
