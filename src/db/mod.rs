//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Single-connection management with liveness checks and reconnects
//! - Statement execution with row, byte and time limits
//! - Schema introspection
//! - Type mappings from driver rows to JSON

pub mod connection;
pub mod executor;
pub mod schema;
pub mod types;

pub use connection::{ConnectionProvider, DbConnection};
pub use executor::{ExecutionLimits, QueryExecutor};
pub use schema::SchemaInspector;
