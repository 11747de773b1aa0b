//! Streamable HTTP transport.
//!
//! Every MCP session gets its own `ImpalaService`, but all of them share the
//! single Impala connection held by the `ConnectionManager`.

use crate::db::ConnectionManager;
use crate::error::{DbError, DbResult};
use crate::mcp::ImpalaService;
use crate::tools::sql_validator::AdmissionPolicy;
use crate::transport::{Transport, drain_or_force, wait_for_signal};
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{error, info};

/// How long open SSE streams may delay shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    connection_manager: Arc<ConnectionManager>,
    policy: AdmissionPolicy,
    host: String,
    port: u16,
    /// Path the MCP service is mounted on, e.g. "/mcp"
    endpoint: String,
}

impl HttpTransport {
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        policy: AdmissionPolicy,
        host: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            connection_manager,
            policy,
            host: host.into(),
            port,
            endpoint: endpoint.into(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Axum router serving one `ImpalaService` per MCP session at the endpoint.
    pub fn router(&self) -> axum::Router {
        let connection_manager = self.connection_manager.clone();
        let policy = self.policy;
        let service = StreamableHttpService::new(
            move || Ok(ImpalaService::new(connection_manager.clone(), policy)),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        // nest_service rejects "/"
        match self.endpoint.as_str() {
            "" | "/" => axum::Router::new().fallback_service(service),
            path => axum::Router::new().nest_service(path, service),
        }
    }

    async fn serve(&self, listener: TcpListener) -> DbResult<()> {
        let stop_requested = Arc::new(Notify::new());
        let notify = stop_requested.clone();
        let server = axum::serve(listener, self.router()).with_graceful_shutdown(async move {
            wait_for_signal().await;
            notify.notify_one();
        });

        tokio::select! {
            result = server => result.map_err(|e| {
                error!(error = %e, "HTTP server failed");
                DbError::internal(format!("HTTP server error: {}", e))
            }),
            _ = async {
                stop_requested.notified().await;
                drain_or_force(DRAIN_TIMEOUT).await;
            } => Ok(()),
        }
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::connection(
                format!("Cannot listen on {}: {}", bind_addr, e),
                "Pick a free MCP_HTTP_PORT or another MCP_HTTP_HOST",
            )
        })?;
        info!(addr = %bind_addr, endpoint = %self.endpoint, "Serving MCP over streamable HTTP");

        let outcome = self.serve(listener).await;
        if outcome.is_ok() {
            info!("HTTP server stopped");
        }

        self.connection_manager.close().await;
        outcome
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
