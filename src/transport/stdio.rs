//! Stdio transport for the MCP server.
//!
//! Reads JSON-RPC messages from stdin and writes responses to stdout.
//! Logs go to stderr so they never corrupt the protocol stream.

use crate::db::ExecutionLimits;
use crate::error::{DbError, DbResult};
use crate::mcp::GatewayService;
use crate::pipeline::PipelineHandle;
use crate::transport::{Transport, close_pipeline, wait_for_signal};
use rmcp::{ServiceExt, transport::stdio};
use tracing::{info, warn};

/// Stdio transport implementation.
pub struct StdioTransport {
    pipeline: PipelineHandle,
    limits: ExecutionLimits,
}

impl StdioTransport {
    pub fn new(pipeline: PipelineHandle, limits: ExecutionLimits) -> Self {
        Self { pipeline, limits }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> DbResult<()> {
        info!("Starting MCP server with stdio transport");

        let service = GatewayService::new(self.pipeline.clone(), self.limits);
        let running_service = service
            .serve(stdio())
            .await
            .map_err(|e| DbError::internal(format!("Failed to start stdio transport: {}", e)))?;

        let shutdown_requested = tokio::select! {
            result = running_service.waiting() => {
                match result {
                    Ok(quit_reason) => info!(?quit_reason, "Stdio transport completed"),
                    Err(e) => {
                        warn!(error = %e, "Stdio transport error");
                        close_pipeline(&self.pipeline).await;
                        return Err(DbError::internal(format!("Stdio transport error: {}", e)));
                    }
                }
                false
            }
            _ = wait_for_signal() => {
                info!("Shutdown signal received (send again to force exit)");
                true
            }
        };

        if shutdown_requested {
            tokio::spawn(async {
                wait_for_signal().await;
                warn!("Received second signal, forcing immediate exit");
                std::process::exit(1);
            });
        }

        close_pipeline(&self.pipeline).await;

        if shutdown_requested {
            // A blocking stdin read cannot be interrupted by select!
            info!("Exiting process");
            std::process::exit(0);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}
