//! Query-related data models.
//!
//! A statement either yields rows (`QueryOutcome::Rows`) or just completes
//! (`QueryOutcome::Status`); failures travel separately as `DbError`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default cap on rows returned by a single statement.
pub const DEFAULT_MAX_ROWS: usize = 10_000;

/// Message returned for statements without a result set.
pub const STATUS_MESSAGE: &str = "Query executed successfully.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnMetadata {
    pub name: String,
    /// Impala type name (e.g., "BIGINT", "STRING", "DECIMAL")
    pub type_name: String,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Raw output of one statement as seen by a connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementResult {
    /// Empty when the statement produced no result set
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<Vec<JsonValue>>,
    pub truncated: bool,
}

impl StatementResult {
    /// A statement that completed without producing rows or columns.
    pub fn status_only() -> Self {
        Self::default()
    }

    pub fn with_rows(columns: Vec<ColumnMetadata>, rows: Vec<Vec<JsonValue>>) -> Self {
        Self {
            columns,
            rows,
            truncated: false,
        }
    }

    pub fn has_result_set(&self) -> bool {
        !self.columns.is_empty()
    }

    /// Text of column `index` for every row; nulls become empty strings.
    pub fn column_text(&self, index: usize) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.get(index).map(value_text).unwrap_or_default())
            .collect()
    }
}

/// Render a cell as plain text.
pub fn value_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QueryResult {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<Vec<JsonValue>>,
    pub truncated: bool,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn from_statement(result: StatementResult, execution_time_ms: u64) -> Self {
        Self {
            columns: result.columns,
            rows: result.rows,
            truncated: result.truncated,
            execution_time_ms,
        }
    }

    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Tagged result of an admitted statement.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(QueryResult),
    Status(String),
}

impl QueryOutcome {
    pub fn status() -> Self {
        Self::Status(STATUS_MESSAGE.to_string())
    }

    pub fn rows(&self) -> Option<&QueryResult> {
        match self {
            Self::Rows(result) => Some(result),
            Self::Status(_) => None,
        }
    }
}
