//! MCP transports.
//!
//! Both transports serve [`crate::mcp::ImpalaService`] and close the shared
//! Impala connection before `run` returns.

pub mod http;
pub mod stdio;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

use crate::error::DbResult;
use std::future::Future;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

pub trait Transport: Send + Sync {
    /// Serve until the client goes away or a shutdown signal arrives.
    fn run(&self) -> impl Future<Output = DbResult<()>> + Send;

    fn name(&self) -> &'static str;
}

/// Resolves on SIGINT or SIGTERM. A handler that cannot be installed never fires.
pub(crate) async fn wait_for_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "SIGINT handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("SIGINT received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}

/// After shutdown starts, give open streams `grace` to finish. A second
/// signal cuts the wait short.
pub(crate) async fn drain_or_force(grace: Duration) {
    info!(grace_secs = grace.as_secs(), "Draining connections (signal again to stop now)");
    tokio::select! {
        _ = tokio::time::sleep(grace) => warn!("Drain timeout reached"),
        _ = wait_for_signal() => warn!("Second signal, stopping now"),
    }
}

/// Exit immediately if another signal arrives while cleanup runs.
pub(crate) fn exit_on_second_signal() {
    tokio::spawn(async {
        wait_for_signal().await;
        warn!("Second signal, exiting without cleanup");
        std::process::exit(1);
    });
}
