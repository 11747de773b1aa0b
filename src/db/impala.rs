//! Impala connections over HiveServer2.

use crate::db::connection::{Connection, Connector};
use crate::error::{DbError, DbResult};
use crate::hs2::{Hs2Error, Session};
use crate::models::{ColumnMetadata, ConnectionSettings, StatementResult};
use async_trait::async_trait;
use tracing::{debug, info};

/// Opens HS2 sessions against the configured coordinator.
#[derive(Debug, Clone)]
pub struct ImpalaConnector {
    settings: ConnectionSettings,
}

impl ImpalaConnector {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }
}

#[async_trait]
impl Connector for ImpalaConnector {
    async fn connect(&self) -> DbResult<Box<dyn Connection>> {
        info!(endpoint = %self.settings.describe(), "Connecting to Impala");
        let session = Session::open(&self.settings).await.map_err(|e| {
            let describe = self.settings.describe();
            match e {
                // Timeouts keep their own category.
                Hs2Error::Timeout { .. } => DbError::from(e),
                Hs2Error::Server { message, .. } => DbError::connection(
                    format!("Failed to open session on {}: {}", describe, message),
                    "Check IMPALA_USER, IMPALA_PASSWORD, IMPALA_AUTH_MECHANISM and IMPALA_DATABASE",
                ),
                other => match DbError::from(other) {
                    DbError::Connection { message, suggestion } => DbError::connection(
                        format!("Failed to connect to {}: {}", describe, message),
                        suggestion,
                    ),
                    mapped => mapped,
                },
            }
        })?;

        Ok(Box::new(ImpalaConnection {
            session,
            current_database: self.settings.database.clone(),
        }))
    }

    fn describe(&self) -> String {
        self.settings.describe()
    }
}

/// One HS2 session plus the database it is pointed at.
#[derive(Debug)]
pub struct ImpalaConnection {
    session: Session,
    current_database: Option<String>,
}

#[async_trait]
impl Connection for ImpalaConnection {
    async fn execute(&mut self, statement: &str, max_rows: usize) -> DbResult<StatementResult> {
        debug!(statement, max_rows, "Executing statement");
        let output = self.session.execute(statement, max_rows).await?;
        let columns = output
            .columns
            .into_iter()
            .map(|c| ColumnMetadata::new(c.name, c.type_name))
            .collect();
        Ok(StatementResult {
            columns,
            rows: output.rows,
            truncated: output.truncated,
        })
    }

    fn current_database(&self) -> Option<&str> {
        self.current_database.as_deref()
    }

    fn set_current_database(&mut self, database: String) {
        self.current_database = Some(database);
    }

    async fn close(&mut self) -> DbResult<()> {
        self.session.close().await.map_err(DbError::from)
    }
}
