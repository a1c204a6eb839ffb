//! SQL Gateway MCP Library
//!
//! MCP tools that let AI assistants read, write and evolve a single SQL
//! database. Every statement is classified and gated before it runs, and all
//! statements go through one serialized execution pipeline.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod pipeline;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{DbError, DbResult};
pub use mcp::GatewayService;
pub use pipeline::{ExecutionPipeline, PipelineHandle};
