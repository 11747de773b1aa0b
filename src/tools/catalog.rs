//! Catalog tools.
//!
//! This module implements catalog browsing:
//! - `list_dbs`: databases visible to the session
//! - `get_schema`: tables in the current database
//! - `database://{db_name}`: description of one database

use crate::db::ConnectionManager;
use crate::error::{DbError, DbResult};
use crate::models::value_text;
use crate::tools::database::validate_database_name;
use schemars::JsonSchema;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Output from the list_dbs tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListDatabasesOutput {
    /// Database names in the order Impala returns them
    pub databases: Vec<String>,
    pub count: usize,
}

/// Output from the get_schema tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GetSchemaOutput {
    /// Table names in the current database
    pub tables: Vec<String>,
    pub count: usize,
    /// Database the tables belong to, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

/// Handler for catalog operations.
pub struct CatalogToolHandler {
    connection_manager: Arc<ConnectionManager>,
}

impl CatalogToolHandler {
    pub fn new(connection_manager: Arc<ConnectionManager>) -> Self {
        Self { connection_manager }
    }

    /// All database names, first column of `SHOW DATABASES`.
    pub async fn list_databases(&self) -> DbResult<Vec<String>> {
        let result = self.connection_manager.execute("SHOW DATABASES").await?;
        let databases = result.column_text(0);
        debug!(count = databases.len(), "Listed databases");
        Ok(databases)
    }

    /// Table names in the connection's current database.
    pub async fn get_schema(&self) -> DbResult<GetSchemaOutput> {
        let (result, database) = self
            .connection_manager
            .execute_in_current("SHOW TABLES")
            .await?;
        let tables = result.column_text(0);
        debug!(count = tables.len(), database = ?database, "Listed tables");
        Ok(GetSchemaOutput {
            count: tables.len(),
            tables,
            database,
        })
    }

    /// Three-line description of `name`: location and comment.
    pub async fn describe_database(&self, name: &str) -> DbResult<String> {
        validate_database_name(name)?;
        info!(database = %name, "Describing database");

        let result = self
            .connection_manager
            .execute(&format!("DESCRIBE DATABASE {}", name))
            .await
            .map_err(|e| match e {
                DbError::Database { ref message, .. } if message.contains("does not exist") => {
                    DbError::database_not_found(name, "Use list_dbs to see available databases")
                }
                other => other,
            })?;

        let row = result.rows.first().ok_or_else(|| {
            DbError::database_not_found(name, "Use list_dbs to see available databases")
        })?;
        let location = row.get(1).map(value_text).unwrap_or_default();
        let comment = row.get(2).map(value_text).unwrap_or_default();
        Ok(format_description(name, &location, &comment))
    }

    /// Handle the list_dbs tool call.
    pub async fn list_dbs(&self) -> DbResult<ListDatabasesOutput> {
        let databases = self.list_databases().await?;
        Ok(ListDatabasesOutput {
            count: databases.len(),
            databases,
        })
    }
}

pub fn format_description(name: &str, location: &str, comment: &str) -> String {
    format!(
        "Database: {}\nStorage Location: {}\nComment: {}\n",
        name, location, comment
    )
}
