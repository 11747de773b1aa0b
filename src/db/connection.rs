//! Connection seam between the tools and the backend driver.

use crate::error::DbResult;
use crate::models::StatementResult;
use async_trait::async_trait;

/// A live backend connection.
#[async_trait]
pub trait Connection: Send {
    /// Run one statement, returning at most `max_rows` rows.
    async fn execute(&mut self, statement: &str, max_rows: usize) -> DbResult<StatementResult>;

    /// Database recorded by the last successful switch, if any.
    fn current_database(&self) -> Option<&str>;

    fn set_current_database(&mut self, database: String);

    /// Release server-side resources. Called at most once.
    async fn close(&mut self) -> DbResult<()>;
}

/// Factory for connections; invoked whenever the manager holds none.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> DbResult<Box<dyn Connection>>;

    /// Where connections go, for logs. Must not include credentials.
    fn describe(&self) -> String;
}
