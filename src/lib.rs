//! Iceberg MCP Server Library
//!
//! This library provides MCP (Model Context Protocol) tools for AI assistants
//! to browse and query Apache Iceberg tables through a Cloudera Impala
//! coordinator, speaking HiveServer2 over HTTP or a raw socket.

pub mod config;
pub mod db;
pub mod error;
pub mod hs2;
pub mod logging;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::DbError;
pub use mcp::ImpalaService;
