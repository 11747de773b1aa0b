//! Logging setup.
//!
//! Logs go to `<LOG_DIR>/iceberg_mcp_server.log` through a non-blocking
//! writer. Stdout carries the stdio transport and is never written; when the
//! log directory cannot be created, output falls back to stderr.

use crate::config::Config;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const LOG_FILE_PREFIX: &str = "iceberg_mcp_server";

/// Guard that must be held for the lifetime of the application.
///
/// Dropping it flushes pending log entries.
pub struct LoggingGuard {
    _worker_guard: Option<WorkerGuard>,
}

/// Path of the log file inside `log_dir`.
pub fn log_file_path(log_dir: impl AsRef<Path>) -> PathBuf {
    log_dir.as_ref().join(format!("{}.log", LOG_FILE_PREFIX))
}

/// Filter directives built from the configured levels.
pub fn default_directives(config: &Config) -> String {
    format!(
        "{},iceberg_mcp_server::hs2={},rmcp={}",
        config.log_level, config.impala_log_level, config.mcp_log_level
    )
}

/// `RUST_LOG` wins over the configured levels.
fn build_env_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(default_directives(config)).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Initialize logging, falling back to stderr if the file cannot be opened.
pub fn init_logging(config: &Config) -> LoggingGuard {
    match open_log_file(Path::new(&config.log_dir)) {
        Ok(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            install(config, non_blocking, false);
            LoggingGuard {
                _worker_guard: Some(guard),
            }
        }
        Err(e) => {
            eprintln!(
                "Warning: Failed to initialize file logging in {}: {}. Using stderr.",
                config.log_dir, e
            );
            install(config, std::io::stderr, true);
            LoggingGuard {
                _worker_guard: None,
            }
        }
    }
}

fn open_log_file(log_dir: &Path) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(log_dir)?;
    Ok(appender)
}

fn install<W>(config: &Config, writer: W, ansi: bool)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::registry().with(build_env_filter(config));

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(writer))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(ansi)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    }
}
