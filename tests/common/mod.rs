//! Scripted in-memory backend shared by the integration tests.
//!
//! `FakeBackend` answers the handful of statements the tools issue
//! (`SHOW DATABASES`, `SHOW TABLES`, `USE`, `DESCRIBE DATABASE`, `SET`,
//! `SELECT`) and counts connects and closes so tests can assert when the
//! backend was contacted.

#![allow(dead_code)]

use async_trait::async_trait;
use iceberg_mcp_server::db::{Connection, ConnectionManager, Connector};
use iceberg_mcp_server::error::{DbError, DbResult};
use iceberg_mcp_server::models::{ColumnMetadata, StatementResult};
use serde_json::json;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct FakeDatabase {
    name: String,
    location: String,
    comment: String,
    tables: Vec<String>,
}

#[derive(Debug, Default)]
struct BackendState {
    databases: Vec<FakeDatabase>,
    connects: usize,
    closes: usize,
    fail_connects: usize,
    fail_close: bool,
    select_rows: usize,
    statements: Vec<String>,
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Backend with `default` (tables `a`, `b`) and `sales` (table `orders`).
    pub fn standard() -> Arc<Self> {
        let backend = Self::new();
        backend.add_database("default", &["a", "b"]);
        backend.add_database("sales", &["orders"]);
        backend
    }

    pub fn add_database(&self, name: &str, tables: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.databases.push(FakeDatabase {
            name: name.to_string(),
            location: format!("hdfs://namenode:8020/warehouse/{}.db", name),
            comment: format!("{} database", name),
            tables: tables.iter().map(|t| t.to_string()).collect(),
        });
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.state.lock().unwrap().fail_connects = count;
    }

    pub fn fail_close(&self, fail: bool) {
        self.state.lock().unwrap().fail_close = fail;
    }

    /// Rows produced by any `SELECT`.
    pub fn set_select_rows(&self, count: usize) {
        self.state.lock().unwrap().select_rows = count;
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    fn database(&self, name: &str) -> Option<FakeDatabase> {
        self.state
            .lock()
            .unwrap()
            .databases
            .iter()
            .find(|db| db.name.eq_ignore_ascii_case(name))
            .cloned()
    }
}

pub struct FakeConnector {
    backend: Arc<FakeBackend>,
    initial_database: Option<String>,
}

impl FakeConnector {
    pub fn new(backend: Arc<FakeBackend>) -> Self {
        Self {
            backend,
            initial_database: Some("default".to_string()),
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> DbResult<Box<dyn Connection>> {
        let mut state = self.backend.state.lock().unwrap();
        state.connects += 1;
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(DbError::connection(
                "Failed to connect to fake:21050: connection refused",
                "Check IMPALA_HOST and IMPALA_PORT",
            ));
        }
        Ok(Box::new(FakeConnection {
            backend: self.backend.clone(),
            session_database: self.initial_database.clone(),
            tracked_database: self.initial_database.clone(),
        }))
    }

    fn describe(&self) -> String {
        "fake:21050".to_string()
    }
}

pub struct FakeConnection {
    backend: Arc<FakeBackend>,
    /// Database the fake server resolves unqualified names against
    session_database: Option<String>,
    /// Database recorded through the `Connection` trait
    tracked_database: Option<String>,
}

fn not_found(name: &str) -> DbError {
    DbError::database(
        format!("AnalysisException: Database does not exist: {}", name),
        Some("HY000".to_string()),
        "Use list_dbs to see available databases",
    )
}

fn single_column(name: &str, values: Vec<String>) -> StatementResult {
    StatementResult::with_rows(
        vec![ColumnMetadata::new(name, "STRING")],
        values.into_iter().map(|v| vec![json!(v)]).collect(),
    )
}

#[async_trait]
impl Connection for FakeConnection {
    async fn execute(&mut self, statement: &str, max_rows: usize) -> DbResult<StatementResult> {
        self.backend
            .state
            .lock()
            .unwrap()
            .statements
            .push(statement.to_string());

        let normalized = statement.trim().trim_end_matches(';');
        let words: Vec<&str> = normalized.split_whitespace().collect();
        let upper: Vec<String> = words.iter().map(|w| w.to_uppercase()).collect();
        let upper: Vec<&str> = upper.iter().map(String::as_str).collect();

        match upper.as_slice() {
            ["SHOW", "DATABASES"] => {
                let state = self.backend.state.lock().unwrap();
                let names = state.databases.iter().map(|db| db.name.clone()).collect();
                Ok(single_column("name", names))
            }
            ["SHOW", "TABLES"] => {
                let name = self.session_database.clone().unwrap_or_default();
                let db = self.backend.database(&name).ok_or_else(|| not_found(&name))?;
                Ok(single_column("name", db.tables))
            }
            ["USE", _] => {
                let name = words[1].trim_matches('`');
                self.backend.database(name).ok_or_else(|| not_found(name))?;
                self.session_database = Some(name.to_string());
                Ok(StatementResult::status_only())
            }
            ["DESCRIBE", "DATABASE", _] => {
                let name = words[2];
                let db = self.backend.database(name).ok_or_else(|| not_found(name))?;
                Ok(StatementResult::with_rows(
                    vec![
                        ColumnMetadata::new("name", "STRING"),
                        ColumnMetadata::new("location", "STRING"),
                        ColumnMetadata::new("comment", "STRING"),
                    ],
                    vec![vec![json!(db.name), json!(db.location), json!(db.comment)]],
                ))
            }
            ["SET", ..] => Ok(StatementResult::status_only()),
            ["SELECT", ..] | ["WITH", ..] => {
                let available = self.backend.state.lock().unwrap().select_rows;
                let rows = (1..=available.min(max_rows))
                    .map(|i| vec![json!(i), json!(format!("row {}", i))])
                    .collect();
                let mut result = StatementResult::with_rows(
                    vec![
                        ColumnMetadata::new("id", "INT"),
                        ColumnMetadata::new("label", "STRING"),
                    ],
                    rows,
                );
                result.truncated = available > max_rows;
                Ok(result)
            }
            _ => Err(DbError::database(
                format!("ParseException: unsupported statement: {}", statement),
                None,
                "Check the SQL syntax",
            )),
        }
    }

    fn current_database(&self) -> Option<&str> {
        self.tracked_database.as_deref()
    }

    fn set_current_database(&mut self, database: String) {
        self.tracked_database = Some(database);
    }

    async fn close(&mut self) -> DbResult<()> {
        let mut state = self.backend.state.lock().unwrap();
        state.closes += 1;
        if state.fail_close {
            return Err(DbError::connection(
                "Failed to close session: broken pipe",
                "None; the session is discarded",
            ));
        }
        Ok(())
    }
}

/// Manager backed by `backend`, with the default row cap.
pub fn manager(backend: &Arc<FakeBackend>) -> Arc<ConnectionManager> {
    Arc::new(ConnectionManager::new(Arc::new(FakeConnector::new(
        backend.clone(),
    ))))
}

/// Manager backed by `backend` with a custom row cap.
pub fn manager_with_max_rows(backend: &Arc<FakeBackend>, max_rows: usize) -> Arc<ConnectionManager> {
    Arc::new(ConnectionManager::with_max_rows(
        Arc::new(FakeConnector::new(backend.clone())),
        max_rows,
    ))
}
