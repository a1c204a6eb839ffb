//! Schema tools.
//!
//! Structured DDL (`create_table`, `add_column`) and metadata lookups
//! (`show_tables`, `show_databases`, `describe_table`).

use crate::models::{ColumnSpec, OperationRequest, ToolResponse};
use crate::pipeline::PipelineHandle;
use crate::tools::format::OutputFormat;
use crate::tools::run_tool;
use schemars::JsonSchema;
use serde::Deserialize;

/// Input for the create_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateTableInput {
    /// Table name: letters, digits and underscores, 1-64 characters
    pub table_name: String,
    /// Column definitions, in table order
    pub columns: Vec<ColumnSpec>,
}

/// Input for the add_column tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AddColumnInput {
    /// Existing table to alter
    pub table_name: String,
    /// The column to add
    pub column: ColumnSpec,
}

/// Input for the show_tables and show_databases tools.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListInput {
    /// Output format: json (default), table or markdown
    #[serde(default)]
    pub format: OutputFormat,
}

/// Input for the describe_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DescribeTableInput {
    /// Table to describe
    pub table_name: String,
    /// Output format: json (default), table or markdown
    #[serde(default)]
    pub format: OutputFormat,
}

/// Handler for schema tool operations.
#[derive(Debug, Clone)]
pub struct SchemaToolHandler {
    pipeline: PipelineHandle,
}

impl SchemaToolHandler {
    pub fn new(pipeline: PipelineHandle) -> Self {
        Self { pipeline }
    }

    pub async fn create_table(&self, input: CreateTableInput) -> ToolResponse {
        let request = OperationRequest::CreateTable {
            table_name: input.table_name,
            columns: input.columns,
        };
        run_tool(&self.pipeline, request, OutputFormat::Json).await
    }

    pub async fn add_column(&self, input: AddColumnInput) -> ToolResponse {
        let request = OperationRequest::AddColumn {
            table_name: input.table_name,
            column: input.column,
        };
        run_tool(&self.pipeline, request, OutputFormat::Json).await
    }

    pub async fn show_tables(&self, input: ListInput) -> ToolResponse {
        run_tool(&self.pipeline, OperationRequest::ListTables, input.format).await
    }

    pub async fn show_databases(&self, input: ListInput) -> ToolResponse {
        run_tool(&self.pipeline, OperationRequest::ListDatabases, input.format).await
    }

    pub async fn describe_table(&self, input: DescribeTableInput) -> ToolResponse {
        let request = OperationRequest::DescribeTable {
            table_name: input.table_name,
        };
        run_tool(&self.pipeline, request, input.format).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_input() {
        let json = r#"{
            "table_name": "users",
            "columns": [
                {"name": "id", "type": "INT", "nullable": false, "extra": "AUTO_INCREMENT PRIMARY KEY"},
                {"name": "email", "type": "VARCHAR(255)"}
            ]
        }"#;
        let input: CreateTableInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.table_name, "users");
        assert_eq!(input.columns.len(), 2);
        assert!(!input.columns[0].nullable);
        assert!(input.columns[1].nullable);
    }

    #[test]
    fn test_list_input_defaults() {
        let input: ListInput = serde_json::from_str("{}").unwrap();
        assert_eq!(input.format, OutputFormat::Json);
    }

    #[test]
    fn test_describe_table_input() {
        let input: DescribeTableInput =
            serde_json::from_str(r#"{"table_name": "users", "format": "table"}"#).unwrap();
        assert_eq!(input.table_name, "users");
        assert_eq!(input.format, OutputFormat::Table);
    }
}
