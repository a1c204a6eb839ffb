//! Data models for the SQL gateway.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod operation;
pub mod outcome;

// Re-export commonly used types
pub use connection::{
    ConnectionConfigError, ConnectionSettings, ConnectionTarget, DatabaseType, MySqlSettings,
};
pub use operation::{ColumnSpec, OperationKind, OperationRequest};
pub use outcome::{
    ColumnDescription, ErrorBody, ExecutionOutcome, KeyKind, Row, ToolResponse, TruncationReason,
};
