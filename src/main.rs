//! Iceberg MCP Server - Main entry point.
//!
//! Serves read-only Impala access over MCP, on stdio or Streamable HTTP.

use clap::Parser;
use iceberg_mcp_server::config::{Config, TransportMode};
use iceberg_mcp_server::db::{ConnectionManager, ImpalaConnector};
use iceberg_mcp_server::error::DbResult;
use iceberg_mcp_server::logging::init_logging;
use iceberg_mcp_server::transport::{HttpTransport, StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    let _log_guard = init_logging(&config);

    let settings = config.connection_settings();
    info!(
        transport = %config.transport,
        impala = %settings.describe(),
        max_rows = config.max_rows,
        strict_readonly = config.strict_readonly,
        "iceberg-mcp-server {} starting",
        env!("CARGO_PKG_VERSION")
    );

    // The session is opened lazily by the first tool call
    let connector = Arc::new(ImpalaConnector::new(settings));
    let connection_manager = Arc::new(ConnectionManager::with_max_rows(
        connector,
        config.max_rows,
    ));
    let policy = config.admission_policy();

    let outcome = match config.transport {
        TransportMode::Stdio => serve(StdioTransport::new(connection_manager, policy)).await,
        TransportMode::Http => {
            serve(HttpTransport::new(
                connection_manager,
                policy,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            ))
            .await
        }
    };

    outcome.inspect_err(|e| error!(error = %e, "Exiting after transport failure"))?;
    info!("Stopped cleanly");
    Ok(())
}

async fn serve<T: Transport>(transport: T) -> DbResult<()> {
    info!(transport = transport.name(), "Transport ready");
    transport.run().await
}
