//! Data models for the Iceberg MCP Server.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{AuthMechanism, ConnectionSettings};
pub use query::{
    ColumnMetadata, DEFAULT_MAX_ROWS, QueryOutcome, QueryResult, STATUS_MESSAGE, StatementResult,
    value_text,
};
