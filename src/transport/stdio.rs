//! Stdio transport.
//!
//! JSON-RPC arrives on stdin and replies leave on stdout, so nothing else in
//! the process may write to stdout.

use crate::db::ConnectionManager;
use crate::error::{DbError, DbResult};
use crate::mcp::ImpalaService;
use crate::tools::sql_validator::AdmissionPolicy;
use crate::transport::{Transport, exit_on_second_signal, wait_for_signal};
use rmcp::{ServiceExt, transport::stdio};
use std::sync::Arc;
use tracing::{info, warn};

pub struct StdioTransport {
    connection_manager: Arc<ConnectionManager>,
    policy: AdmissionPolicy,
}

impl StdioTransport {
    pub fn new(connection_manager: Arc<ConnectionManager>, policy: AdmissionPolicy) -> Self {
        Self {
            connection_manager,
            policy,
        }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> DbResult<()> {
        let service = ImpalaService::new(self.connection_manager.clone(), self.policy);
        let running = service
            .serve(stdio())
            .await
            .map_err(|e| DbError::internal(format!("Cannot start stdio transport: {}", e)))?;
        info!("Serving MCP over stdio");

        let (signalled, outcome) = tokio::select! {
            result = running.waiting() => match result {
                Ok(reason) => {
                    info!(reason = ?reason, "Client disconnected");
                    (false, Ok(()))
                }
                Err(e) => {
                    warn!(error = %e, "Stdio session ended with an error");
                    (false, Err(DbError::internal(format!("Stdio transport error: {}", e))))
                }
            },
            _ = wait_for_signal() => (true, Ok(())),
        };

        if signalled {
            exit_on_second_signal();
        }

        self.connection_manager.close().await;

        if signalled {
            // A pending stdin read would keep the runtime alive.
            std::process::exit(0);
        }
        outcome
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::ImpalaConnector;

    #[test]
    fn test_stdio_transport_name() {
        let connector = ImpalaConnector::new(Config::default().connection_settings());
        let manager = Arc::new(ConnectionManager::new(Arc::new(connector)));
        let transport = StdioTransport::new(manager, AdmissionPolicy::default());
        assert_eq!(transport.name(), "stdio");
    }
}
