//! MCP tool implementations.
//!
//! This module contains all tool handlers:
//! - `execute_query`: Run a read-only SQL statement
//! - `get_schema`: List tables in the current database
//! - `list_dbs`: List databases
//! - `use_db`: Switch the current database
//! - `database://{db_name}`: Describe a database (resource)
//! - `sql_validator`: Read-only admission check

pub mod catalog;
pub mod database;
pub mod format;
pub mod query;
pub mod sql_validator;

pub use catalog::{CatalogToolHandler, GetSchemaOutput, ListDatabasesOutput};
pub use database::{DatabaseToolHandler, UseDbInput, UseDbOutput};
pub use format::OutputFormat;
pub use query::{ExecuteQueryInput, ExecuteQueryOutput, QueryToolHandler};
pub use sql_validator::AdmissionPolicy;
