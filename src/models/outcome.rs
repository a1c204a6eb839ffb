//! Execution outcome and response envelope models.

use crate::error::{DbError, ErrorKind};
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// One result row: column name to value, in column order.
pub type Row = serde_json::Map<String, JsonValue>;

/// Why a row set was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TruncationReason {
    RowLimit,
    ByteLimit,
}

/// Key participation of a described column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Primary,
    Unique,
    /// Non-unique index (MySQL `MUL`)
    Index,
    #[default]
    None,
}

impl KeyKind {
    /// Map a MySQL `COLUMN_KEY` value.
    pub fn from_mysql(column_key: &str) -> Self {
        match column_key.to_uppercase().as_str() {
            "PRI" => Self::Primary,
            "UNI" => Self::Unique,
            "MUL" => Self::Index,
            _ => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Unique => "unique",
            Self::Index => "index",
            Self::None => "none",
        }
    }
}

/// Column description returned by `describe_table`.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ColumnDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub key: KeyKind,
    pub default: Option<String>,
    pub extra: Option<String>,
}

/// Uniform result of a successful operation.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Rows {
        columns: Vec<String>,
        rows: Vec<Row>,
        truncated: bool,
        /// Exact row count when known (never when truncated)
        total_available: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        truncated_by: Option<TruncationReason>,
    },
    AffectedCount {
        count: u64,
    },
    SchemaInfo {
        columns: Vec<ColumnDescription>,
    },
    NameList {
        names: Vec<String>,
        /// Database that unqualified names resolve to (`show_databases` only)
        #[serde(skip_serializing_if = "Option::is_none")]
        current: Option<String>,
    },
    Success {
        message: String,
    },
}

impl ExecutionOutcome {
    /// Number of items carried by the outcome, for logging.
    pub fn item_count(&self) -> usize {
        match self {
            Self::Rows { rows, .. } => rows.len(),
            Self::AffectedCount { count } => *count as usize,
            Self::SchemaInfo { columns } => columns.len(),
            Self::NameList { names, .. } => names.len(),
            Self::Success { .. } => 0,
        }
    }
}

/// Error body of the response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl From<&DbError> for ErrorBody {
    fn from(err: &DbError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            suggestion: err.suggestion().map(String::from),
        }
    }
}

/// Response envelope returned by every tool. Exactly one of `outcome`/`error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ToolResponse {
    /// True when the operation succeeded
    pub ok: bool,
    /// Structured result, null on failure
    pub outcome: Option<ExecutionOutcome>,
    /// Error details, null on success
    pub error: Option<ErrorBody>,
    /// Wall-clock time spent on the operation in milliseconds
    pub execution_time_ms: u64,
    /// Pre-rendered ASCII or Markdown table when a text format was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
}

impl ToolResponse {
    pub fn success(outcome: ExecutionOutcome, execution_time_ms: u64) -> Self {
        Self {
            ok: true,
            outcome: Some(outcome),
            error: None,
            execution_time_ms,
            formatted: None,
        }
    }

    pub fn failure(err: &DbError, execution_time_ms: u64) -> Self {
        Self {
            ok: false,
            outcome: None,
            error: Some(ErrorBody::from(err)),
            execution_time_ms,
            formatted: None,
        }
    }

    /// Build an envelope from a pipeline result.
    pub fn from_result(result: &Result<ExecutionOutcome, DbError>, execution_time_ms: u64) -> Self {
        match result {
            Ok(outcome) => Self::success(outcome.clone(), execution_time_ms),
            Err(err) => Self::failure(err, execution_time_ms),
        }
    }

    pub fn with_formatted(mut self, formatted: Option<String>) -> Self {
        self.formatted = formatted;
        self
    }
}
