//! MCP server integration module.
//!
//! Binds the gateway's tool handlers to the MCP protocol using the rmcp framework.

pub mod service;

pub use service::GatewayService;
