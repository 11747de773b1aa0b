//! Database selection tool.
//!
//! `use_db` points the shared connection at another database. Every later
//! statement that does not qualify names resolves against it.

use crate::db::ConnectionManager;
use crate::error::{DbError, DbResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Input for the use_db tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UseDbInput {
    /// name of a valid database that will be used for all requests where a database is not provided
    pub db_name: String,
}

/// Output from the use_db tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct UseDbOutput {
    /// Database now in use
    pub database: String,
    pub message: String,
}

/// Reject names that are not plain Impala identifiers.
///
/// Names are interpolated into `USE` and `DESCRIBE DATABASE`, so only ASCII
/// letters, digits and underscores are accepted.
pub fn validate_database_name(name: &str) -> DbResult<()> {
    if name.is_empty() {
        return Err(DbError::invalid_input("Database name cannot be empty"));
    }
    if name.len() > 128 {
        return Err(DbError::invalid_input(
            "Database name exceeds 128 characters",
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DbError::invalid_input(format!(
            "Invalid database name '{}': only letters, digits and underscores are allowed",
            name
        )));
    }
    Ok(())
}

/// Handler for database selection.
pub struct DatabaseToolHandler {
    connection_manager: Arc<ConnectionManager>,
}

impl DatabaseToolHandler {
    pub fn new(connection_manager: Arc<ConnectionManager>) -> Self {
        Self { connection_manager }
    }

    /// Switch the shared connection to `name`, creating the connection if needed.
    pub async fn switch_db(&self, name: &str) -> DbResult<String> {
        validate_database_name(name)?;

        self.connection_manager
            .switch_database(&format!("USE {}", name), name.to_string())
            .await?;

        info!(database = %name, "Switched database");
        Ok(format!("Switched to database {}", name))
    }

    /// Handle the use_db tool call.
    pub async fn use_db(&self, input: UseDbInput) -> DbResult<UseDbOutput> {
        let message = self.switch_db(&input.db_name).await?;
        Ok(UseDbOutput {
            database: input.db_name,
            message,
        })
    }
}
