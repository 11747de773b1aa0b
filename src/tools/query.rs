//! Query execution tool.
//!
//! `execute_query` is the only free-form SQL entry point. Every statement passes
//! the read-only admission check before the backend is contacted; admitted
//! statements come back as rows or as a completion status.

use crate::db::ConnectionManager;
use crate::error::{DbError, DbResult};
use crate::models::{ColumnMetadata, QueryOutcome, QueryResult};
use crate::tools::format::{OutputFormat, format_as_markdown, format_as_table};
use crate::tools::sql_validator::{AdmissionPolicy, first_token};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Input for the execute_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteQueryInput {
    /// SQL to run. Must start with SELECT, SHOW, DESCRIBE, WITH, USE or SET.
    pub query: String,
    /// "json" (default) for columns and rows, "table" or "markdown" for rendered text
    #[serde(default)]
    pub format: OutputFormat,
}

/// Output from the execute_query tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ExecuteQueryOutput {
    /// Column names and Impala types. Empty if format is table/markdown or there is no result set.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnMetadata>,
    /// Result rows, one array per row in column order. Empty if format is table/markdown.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<Vec<JsonValue>>,
    /// Rendered result for the table and markdown formats
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
    /// Rows in the result set
    pub row_count: usize,
    /// True if rows were dropped to stay under the configured row cap
    pub truncated: bool,
    /// Wall-clock time of the statement, in milliseconds
    pub execution_time_ms: u64,
    /// Completion message for statements without a result set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExecuteQueryOutput {
    fn empty(execution_time_ms: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            formatted: None,
            row_count: 0,
            truncated: false,
            execution_time_ms,
            message: None,
        }
    }

    /// Render a row set. Text formats replace `columns` and `rows` with `formatted`.
    pub fn from_result(result: QueryResult, format: OutputFormat) -> Self {
        let mut output = Self {
            row_count: result.row_count(),
            truncated: result.truncated,
            ..Self::empty(result.execution_time_ms)
        };

        match format {
            OutputFormat::Json => {
                output.columns = result.columns;
                output.rows = result.rows;
            }
            OutputFormat::Table => {
                output.formatted = Some(format_as_table(
                    &result.columns,
                    &result.rows,
                    result.truncated,
                    result.execution_time_ms,
                ));
            }
            OutputFormat::Markdown => {
                output.formatted = Some(format_as_markdown(
                    &result.columns,
                    &result.rows,
                    result.truncated,
                ));
            }
        }
        output
    }

    /// Output for a statement without a result set.
    pub fn status(message: String, execution_time_ms: u64) -> Self {
        Self {
            message: Some(message),
            ..Self::empty(execution_time_ms)
        }
    }
}

/// Runs `execute_query` against the shared connection.
pub struct QueryToolHandler {
    connection_manager: Arc<ConnectionManager>,
    policy: AdmissionPolicy,
}

impl QueryToolHandler {
    pub fn new(connection_manager: Arc<ConnectionManager>, policy: AdmissionPolicy) -> Self {
        Self {
            connection_manager,
            policy,
        }
    }

    /// Admit, run and classify one statement.
    ///
    /// Rejected statements never reach the connection manager, so no
    /// connection is created for them.
    pub async fn execute(&self, query: &str) -> DbResult<QueryOutcome> {
        if let Err(e) = self.policy.check(query) {
            if let DbError::ReadOnly { reason } = &e {
                info!(reason = %reason, "Query rejected");
            }
            return Err(e);
        }

        let start = Instant::now();
        // A USE keeps the tracked database in step with the session.
        let switch_to = match first_token(query).as_deref() {
            Some("use") => use_target(query),
            _ => None,
        };
        let result = match switch_to {
            Some(database) => {
                self.connection_manager
                    .switch_database(query, database)
                    .await?
            }
            None => self.connection_manager.execute(query).await?,
        };
        let execution_time_ms = start.elapsed().as_millis() as u64;

        if result.has_result_set() {
            info!(
                row_count = result.rows.len(),
                truncated = result.truncated,
                execution_time_ms = execution_time_ms,
                "Query executed"
            );
            Ok(QueryOutcome::Rows(QueryResult::from_statement(
                result,
                execution_time_ms,
            )))
        } else {
            debug!(execution_time_ms = execution_time_ms, "Statement completed without rows");
            Ok(QueryOutcome::status())
        }
    }

    /// Handle the execute_query tool call.
    pub async fn execute_query(&self, input: ExecuteQueryInput) -> DbResult<ExecuteQueryOutput> {
        let start = Instant::now();
        match self.execute(&input.query).await? {
            QueryOutcome::Rows(result) => Ok(ExecuteQueryOutput::from_result(result, input.format)),
            QueryOutcome::Status(message) => Ok(ExecuteQueryOutput::status(
                message,
                start.elapsed().as_millis() as u64,
            )),
        }
    }
}

/// Database named by a `USE <db>` statement.
fn use_target(query: &str) -> Option<String> {
    query
        .split_whitespace()
        .nth(1)
        .map(|name| name.trim_end_matches(';').trim_matches('`').to_string())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result() -> QueryResult {
        QueryResult {
            columns: vec![ColumnMetadata::new("id", "INT")],
            rows: vec![vec![json!(1)], vec![json!(2)]],
            truncated: false,
            execution_time_ms: 10,
        }
    }

    #[test]
    fn test_input_deserialization_defaults_to_json() {
        let input: ExecuteQueryInput =
            serde_json::from_str(r#"{"query": "SELECT 1"}"#).unwrap();
        assert_eq!(input.query, "SELECT 1");
        assert_eq!(input.format, OutputFormat::Json);

        let input: ExecuteQueryInput =
            serde_json::from_str(r#"{"query": "SELECT 1", "format": "markdown"}"#).unwrap();
        assert_eq!(input.format, OutputFormat::Markdown);
    }

    #[test]
    fn test_json_output_serialization() {
        let output = ExecuteQueryOutput::from_result(result(), OutputFormat::Json);
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"row_count\":2"));
        assert!(json.contains("\"rows\":[[1],[2]]"));
        assert!(!json.contains("formatted"));
        assert!(!json.contains("message"));
    }

    #[test]
    fn test_table_output_drops_structured_rows() {
        let output = ExecuteQueryOutput::from_result(result(), OutputFormat::Table);
        assert!(output.rows.is_empty());
        assert!(output.columns.is_empty());
        assert!(output.formatted.unwrap().contains("Fetched 2 rows"));
        assert_eq!(output.row_count, 2);
    }

    #[test]
    fn test_use_target() {
        assert_eq!(use_target("USE sales").as_deref(), Some("sales"));
        assert_eq!(use_target("use `sales`;").as_deref(), Some("sales"));
        assert_eq!(use_target("USE"), None);
    }

    #[test]
    fn test_status_output() {
        let output = ExecuteQueryOutput::status("Query executed successfully.".to_string(), 3);
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["message"], "Query executed successfully.");
        assert_eq!(json["row_count"], 0);
        assert!(json.get("rows").is_none());
    }
}
