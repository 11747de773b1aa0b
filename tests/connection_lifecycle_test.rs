//! Integration tests for the connection manager lifecycle.

mod common;

use common::{FakeBackend, manager};
use iceberg_mcp_server::error::DbError;
use iceberg_mcp_server::tools::catalog::CatalogToolHandler;
use iceberg_mcp_server::tools::database::DatabaseToolHandler;
use std::sync::Arc;

#[tokio::test]
async fn test_connection_is_lazy_and_reused() {
    let backend = FakeBackend::standard();
    let manager = manager(&backend);
    assert!(!manager.has_connection().await);
    assert_eq!(backend.connects(), 0);

    manager.execute("SHOW DATABASES").await.unwrap();
    manager.execute("SHOW TABLES").await.unwrap();

    assert!(manager.has_connection().await);
    assert_eq!(backend.connects(), 1);
}

#[tokio::test]
async fn test_connect_failure_leaves_slot_empty_and_retries() {
    let backend = FakeBackend::standard();
    backend.fail_next_connects(1);
    let manager = manager(&backend);
    let catalog = CatalogToolHandler::new(manager.clone());

    let err = catalog.list_dbs().await.unwrap_err();
    assert!(matches!(err, DbError::Connection { .. }));
    assert!(!manager.has_connection().await);

    let output = catalog.list_dbs().await.unwrap();
    assert_eq!(output.count, 2);
    assert_eq!(backend.connects(), 2);
}

#[tokio::test]
async fn test_close_empties_slot() {
    let backend = FakeBackend::standard();
    let manager = manager(&backend);

    manager.execute("SHOW DATABASES").await.unwrap();
    manager.close().await;

    assert!(!manager.has_connection().await);
    assert_eq!(backend.closes(), 1);

    // A later call opens a fresh connection.
    manager.execute("SHOW DATABASES").await.unwrap();
    assert_eq!(backend.connects(), 2);
}

#[tokio::test]
async fn test_close_empties_slot_when_release_fails() {
    let backend = FakeBackend::standard();
    backend.fail_close(true);
    let manager = manager(&backend);

    manager.execute("SHOW DATABASES").await.unwrap();
    manager.close().await;

    assert!(!manager.has_connection().await);
    assert_eq!(backend.closes(), 1);
}

#[tokio::test]
async fn test_close_without_connection_is_noop() {
    let backend = FakeBackend::standard();
    let manager = manager(&backend);

    manager.close().await;
    manager.close().await;

    assert_eq!(backend.closes(), 0);
    assert_eq!(backend.connects(), 0);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_connection() {
    let backend = FakeBackend::standard();
    let manager = manager(&backend);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let manager = Arc::clone(&manager);
        tasks.push(tokio::spawn(async move {
            manager.execute("SHOW DATABASES").await.map(|r| r.rows.len())
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 2);
    }

    assert_eq!(backend.connects(), 1);
    assert_eq!(backend.statements().len(), 8);
}

/// Tool calls on different tasks go through every manager operation at once.
#[tokio::test]
async fn test_tool_calls_run_on_spawned_tasks() {
    let backend = FakeBackend::standard();
    let manager = manager(&backend);
    let catalog = Arc::new(CatalogToolHandler::new(Arc::clone(&manager)));
    let selector = Arc::new(DatabaseToolHandler::new(Arc::clone(&manager)));

    let switch = tokio::spawn({
        let selector = Arc::clone(&selector);
        async move { selector.switch_db("sales").await }
    });
    let schema = tokio::spawn({
        let catalog = Arc::clone(&catalog);
        async move { catalog.get_schema().await }
    });
    let describe = tokio::spawn({
        let catalog = Arc::clone(&catalog);
        async move { catalog.describe_database("default").await }
    });

    switch.await.unwrap().unwrap();
    schema.await.unwrap().unwrap();
    assert!(describe.await.unwrap().unwrap().starts_with("Database: default\n"));
    assert_eq!(backend.connects(), 1);

    let after = catalog.get_schema().await.unwrap();
    assert_eq!(after.database.as_deref(), Some("sales"));
    assert_eq!(after.tables, vec!["orders"]);
}
