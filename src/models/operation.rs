//! Operation request models.
//!
//! Every tool call is turned into exactly one [`OperationRequest`] before it
//! reaches the execution pipeline.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of statement the pipeline is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// SELECT, SHOW, DESCRIBE, EXPLAIN
    Read,
    /// INSERT, UPDATE, DELETE
    Write,
    /// CREATE TABLE or ALTER TABLE ... ADD COLUMN
    SchemaDdl,
    /// Catalog lookups issued by the gateway itself
    Metadata,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::SchemaDdl => "schema DDL",
            Self::Metadata => "metadata",
        }
    }

    /// Whether a statement of this kind can be re-run after a lost connection.
    pub fn is_replayable(&self) -> bool {
        matches!(self, Self::Read | Self::Metadata)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_nullable() -> bool {
    true
}

/// Structured column definition used by `create_table` and `add_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnSpec {
    /// Column name: letters, digits and underscores, 1-64 characters, not purely numeric
    pub name: String,
    /// SQL column type, e.g. "VARCHAR(255)", "INT UNSIGNED", "DECIMAL(10,2)"
    #[serde(rename = "type")]
    pub data_type: String,
    /// Whether the column accepts NULL. Default: true
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Default value expression, inserted verbatim (quote string literals yourself)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Extra column attributes, e.g. "AUTO_INCREMENT PRIMARY KEY"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl ColumnSpec {
    /// Create a nullable column with no default or extra attributes.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            default: None,
            extra: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }
}

/// A single gateway operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationRequest {
    /// Intended read; `limit` lowers the row cap for this request
    Query { sql: String, limit: Option<u32> },
    /// Intended write (INSERT/UPDATE/DELETE)
    Execute { sql: String },
    CreateTable {
        table_name: String,
        columns: Vec<ColumnSpec>,
    },
    AddColumn {
        table_name: String,
        column: ColumnSpec,
    },
    ListTables,
    ListDatabases,
    DescribeTable { table_name: String },
}

impl OperationRequest {
    /// Name of the tool this request originates from.
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Query { .. } => "query_database",
            Self::Execute { .. } => "execute_sql",
            Self::CreateTable { .. } => "create_table",
            Self::AddColumn { .. } => "add_column",
            Self::ListTables => "show_tables",
            Self::ListDatabases => "show_databases",
            Self::DescribeTable { .. } => "describe_table",
        }
    }

    /// Statement kind this request is declared to run.
    pub fn declared_kind(&self) -> OperationKind {
        match self {
            Self::Query { .. } => OperationKind::Read,
            Self::Execute { .. } => OperationKind::Write,
            Self::CreateTable { .. } | Self::AddColumn { .. } => OperationKind::SchemaDdl,
            Self::ListTables | Self::ListDatabases | Self::DescribeTable { .. } => {
                OperationKind::Metadata
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_spec_deserialization_defaults() {
        let json = r#"{"name": "email", "type": "VARCHAR(255)"}"#;
        let spec: ColumnSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.name, "email");
        assert_eq!(spec.data_type, "VARCHAR(255)");
        assert!(spec.nullable);
        assert!(spec.default.is_none());
        assert!(spec.extra.is_none());
    }

    #[test]
    fn test_column_spec_full() {
        let json = r#"{
            "name": "id",
            "type": "INT",
            "nullable": false,
            "extra": "AUTO_INCREMENT PRIMARY KEY"
        }"#;
        let spec: ColumnSpec = serde_json::from_str(json).unwrap();
        assert_eq!(
            spec,
            ColumnSpec::new("id", "INT")
                .not_null()
                .with_extra("AUTO_INCREMENT PRIMARY KEY")
        );
    }

    #[test]
    fn test_declared_kinds() {
        let query = OperationRequest::Query {
            sql: "SELECT 1".to_string(),
            limit: None,
        };
        assert_eq!(query.declared_kind(), OperationKind::Read);
        assert_eq!(query.tool_name(), "query_database");
        assert_eq!(
            OperationRequest::ListDatabases.declared_kind(),
            OperationKind::Metadata
        );
        assert_eq!(
            OperationRequest::AddColumn {
                table_name: "t".to_string(),
                column: ColumnSpec::new("c", "INT"),
            }
            .declared_kind(),
            OperationKind::SchemaDdl
        );
    }

    #[test]
    fn test_replayable_kinds() {
        assert!(OperationKind::Read.is_replayable());
        assert!(OperationKind::Metadata.is_replayable());
        assert!(!OperationKind::Write.is_replayable());
        assert!(!OperationKind::SchemaDdl.is_replayable());
    }
}
