//! SQL Gateway MCP - Main entry point.
//!
//! Serves the gateway tools over stdio or Streamable HTTP against a single
//! MySQL (or SQLite) connection.

use sql_gateway_mcp::config::{Config, TransportMode, USAGE};
use sql_gateway_mcp::pipeline::ExecutionPipeline;
use sql_gateway_mcp::transport::{HttpTransport, StdioTransport, Transport};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs always go to stderr; stdout belongs to the stdio transport.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();
    init_tracing(&config);

    let settings = match config.connection_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    };
    let limits = config.execution_limits();

    info!(
        transport = %config.transport,
        db = %settings.label,
        max_rows = limits.max_rows,
        query_timeout_secs = limits.query_timeout.as_secs(),
        "Starting SQL Gateway MCP v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pipeline = ExecutionPipeline::spawn(settings, limits);

    // The server still starts when the database is down; tools report the failure
    match pipeline.ping().await {
        Ok(()) => info!("Database connection established"),
        Err(e) => warn!(
            error = %e,
            suggestion = e.suggestion().unwrap_or_default(),
            "Database is not reachable yet; will retry on the first request"
        ),
    }

    let result = match config.transport {
        TransportMode::Stdio => StdioTransport::new(pipeline, limits).run().await,
        TransportMode::Http => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            HttpTransport::new(
                pipeline,
                limits,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            )
            .run()
            .await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
