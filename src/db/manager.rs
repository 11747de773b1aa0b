//! Single-connection manager.
//!
//! Holds at most one backend connection, created lazily on first use and
//! reused until [`ConnectionManager::close`]. A connection that fails a
//! statement is kept; only an explicit close empties the slot.

use crate::db::connection::{Connection, Connector};
use crate::error::{DbError, DbResult};
use crate::models::{DEFAULT_MAX_ROWS, StatementResult};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    slot: Mutex<Option<Box<dyn Connection>>>,
    max_rows: usize,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connector", &self.connector.describe())
            .field("max_rows", &self.max_rows)
            .finish()
    }
}

impl ConnectionManager {
    /// Create a manager with the default row cap.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self::with_max_rows(connector, DEFAULT_MAX_ROWS)
    }

    pub fn with_max_rows(connector: Arc<dyn Connector>, max_rows: usize) -> Self {
        Self {
            connector,
            slot: Mutex::new(None),
            max_rows,
        }
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// The held connection, created first if the slot is empty.
    ///
    /// Callers keep the slot locked for the whole operation, which
    /// serializes every statement on the shared session.
    async fn acquire<'s>(
        &self,
        slot: &'s mut Option<Box<dyn Connection>>,
    ) -> DbResult<&'s mut (dyn Connection + 'static)> {
        if slot.is_none() {
            info!(endpoint = %self.connector.describe(), "Creating connection");
            // On failure the slot stays empty and the next call retries.
            *slot = Some(self.connector.connect().await?);
        }
        slot.as_deref_mut()
            .ok_or_else(|| DbError::internal("connection slot empty after creation"))
    }

    /// Run `statement` on the shared connection with the configured row cap.
    pub async fn execute(&self, statement: &str) -> DbResult<StatementResult> {
        let mut slot = self.slot.lock().await;
        let connection = self.acquire(&mut *slot).await?;
        connection.execute(statement, self.max_rows).await
    }

    /// Run `statement` and report the database the session is in afterwards.
    pub async fn execute_in_current(
        &self,
        statement: &str,
    ) -> DbResult<(StatementResult, Option<String>)> {
        let mut slot = self.slot.lock().await;
        let connection = self.acquire(&mut *slot).await?;
        let result = connection.execute(statement, self.max_rows).await?;
        Ok((result, connection.current_database().map(str::to_string)))
    }

    /// Run a `USE` statement and, once it succeeds, record `database` as current.
    pub async fn switch_database(
        &self,
        statement: &str,
        database: String,
    ) -> DbResult<StatementResult> {
        let mut slot = self.slot.lock().await;
        let connection = self.acquire(&mut *slot).await?;
        let result = connection.execute(statement, self.max_rows).await?;
        connection.set_current_database(database);
        Ok(result)
    }

    /// Release the connection if one is held. Release errors are logged only.
    pub async fn close(&self) {
        let taken = self.slot.lock().await.take();
        match taken {
            Some(mut connection) => {
                if let Err(e) = connection.close().await {
                    warn!(error = %e, "Error while closing connection");
                } else {
                    info!("Connection closed");
                }
            }
            None => debug!("No connection to close"),
        }
    }

    pub async fn has_connection(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}
