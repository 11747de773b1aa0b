//! Errors surfaced by the Impala tools.
//!
//! Every operation returns [`DbResult`]. At the MCP boundary a [`DbError`]
//! becomes an `rmcp::ErrorData` whose code tells the client whether to fix
//! its arguments or look at the server, with a `suggestion` in `data`.

use crate::hs2::Hs2Error;
use thiserror::Error;

/// Exact message returned when a statement fails the read-only admission check.
pub const READ_ONLY_REJECTION: &str = "Only read-only queries are allowed.";

#[derive(Error, Debug)]
pub enum DbError {
    /// The coordinator could not be reached or refused the session.
    #[error("Impala connection failed: {message}")]
    Connection { message: String, suggestion: String },

    /// The coordinator rejected a statement.
    #[error("Impala error: {message}")]
    Database {
        message: String,
        sql_state: Option<String>,
        suggestion: String,
    },

    /// The message is returned verbatim to callers; `reason` is only logged.
    #[error("Only read-only queries are allowed.")]
    ReadOnly { reason: String },

    #[error("{operation} timed out after {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid argument: {message}")]
    InvalidInput { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Database {database} does not exist. {hint}")]
    DatabaseNotFound { database: String, hint: String },
}

impl DbError {
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Statement failure reported by the coordinator, with its SQLSTATE when sent.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn read_only(reason: impl Into<String>) -> Self {
        Self::ReadOnly {
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn database_not_found(database: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::DatabaseNotFound {
            database: database.into(),
            hint: hint.into(),
        }
    }

    /// Next step for the caller, if there is one.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } | Self::Database { suggestion, .. } => {
                Some(suggestion)
            }
            Self::ReadOnly { reason } => Some(reason),
            Self::DatabaseNotFound { hint, .. } => Some(hint),
            Self::Timeout { .. } => {
                Some("Raise IMPALA_QUERY_TIMEOUT or narrow the query with filters or LIMIT")
            }
            Self::InvalidInput { .. } | Self::Internal { .. } => None,
        }
    }
}

/// Driver failures, sorted by whether the coordinator or the path to it failed.
impl From<Hs2Error> for DbError {
    fn from(err: Hs2Error) -> Self {
        match err {
            Hs2Error::Server { message, sql_state } => DbError::database(
                message,
                sql_state,
                "Check the SQL syntax and referenced objects",
            ),
            Hs2Error::Application { message, kind } => DbError::database(
                format!("Coordinator rejected the call (type {}): {}", kind, message),
                None,
                "Check that the coordinator speaks HiveServer2",
            ),
            Hs2Error::Timeout { operation, secs } => DbError::timeout(operation, secs),
            Hs2Error::HttpStatus { status, body } if status == 401 || status == 403 => {
                DbError::connection(
                    format!("HTTP {} from coordinator: {}", status, body),
                    "Check IMPALA_USER, IMPALA_PASSWORD and IMPALA_AUTH_MECHANISM",
                )
            }
            Hs2Error::HttpStatus { status, body } => DbError::connection(
                format!("HTTP {} from coordinator: {}", status, body),
                "Check IMPALA_HTTP_PATH and that the coordinator exposes the HTTP endpoint",
            ),
            Hs2Error::Http(e) => DbError::connection(
                format!("HTTP transport error: {}", e),
                "Check network connectivity, IMPALA_HOST, IMPALA_PORT and IMPALA_USE_SSL",
            ),
            Hs2Error::Io(e) => DbError::connection(
                format!("I/O error: {}", e),
                "Check network connectivity and coordinator status",
            ),
            Hs2Error::Sasl(message) => DbError::connection(
                format!("SASL negotiation failed: {}", message),
                "Check IMPALA_USER, IMPALA_PASSWORD and IMPALA_AUTH_MECHANISM",
            ),
            Hs2Error::Codec(e) => DbError::connection(
                format!("Malformed reply from coordinator: {}", e),
                "Check that IMPALA_USE_HTTP_TRANSPORT and IMPALA_PORT match the coordinator",
            ),
            Hs2Error::Protocol(message) => DbError::connection(
                format!("Protocol error: {}", message),
                "Check coordinator compatibility",
            ),
            Hs2Error::Unsupported(message) => DbError::connection(
                message,
                "Adjust the connection settings",
            ),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

fn error_data(err: &DbError) -> Option<serde_json::Value> {
    err.suggestion()
        .map(|suggestion| serde_json::json!({ "suggestion": suggestion }))
}

/// Caller mistakes map to `invalid_params`, a missing database to
/// `resource_not_found`, and failures on the server side to `internal_error`.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let data = error_data(&err);
        match err {
            DbError::InvalidInput { .. } | DbError::ReadOnly { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), data)
            }
            DbError::Database {
                message,
                sql_state: Some(code),
                ..
            } => rmcp::ErrorData::invalid_params(format!("{} (SQLSTATE: {})", message, code), data),
            DbError::Database { message, .. } => rmcp::ErrorData::invalid_params(message, data),
            DbError::DatabaseNotFound { .. } => {
                rmcp::ErrorData::resource_not_found(err.to_string(), data)
            }
            DbError::Connection { .. } | DbError::Timeout { .. } | DbError::Internal { .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), data)
            }
        }
    }
}
