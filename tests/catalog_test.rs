//! Integration tests for catalog browsing and database selection.

mod common;

use common::{FakeBackend, manager};
use iceberg_mcp_server::error::DbError;
use iceberg_mcp_server::mcp::ImpalaService;
use iceberg_mcp_server::tools::catalog::CatalogToolHandler;
use iceberg_mcp_server::tools::database::{DatabaseToolHandler, UseDbInput};

#[tokio::test]
async fn test_list_dbs() {
    let backend = FakeBackend::standard();
    let catalog = CatalogToolHandler::new(manager(&backend));

    let output = catalog.list_dbs().await.unwrap();
    assert_eq!(output.databases, vec!["default", "sales"]);
    assert_eq!(output.count, 2);
}

#[tokio::test]
async fn test_list_dbs_empty() {
    let backend = FakeBackend::new();
    let catalog = CatalogToolHandler::new(manager(&backend));

    let output = catalog.list_dbs().await.unwrap();
    assert!(output.databases.is_empty());
    assert_eq!(output.count, 0);
}

#[tokio::test]
async fn test_get_schema_is_stable_without_use_db() {
    let backend = FakeBackend::standard();
    let catalog = CatalogToolHandler::new(manager(&backend));

    let first = catalog.get_schema().await.unwrap();
    let second = catalog.get_schema().await.unwrap();
    assert_eq!(first.tables, vec!["a", "b"]);
    assert_eq!(first.tables, second.tables);
    assert_eq!(first.database.as_deref(), Some("default"));
    assert_eq!(backend.connects(), 1);
}

#[tokio::test]
async fn test_get_schema_after_use_db() {
    let backend = FakeBackend::standard();
    let manager = manager(&backend);
    let selector = DatabaseToolHandler::new(manager.clone());
    let catalog = CatalogToolHandler::new(manager);

    let output = selector
        .use_db(UseDbInput {
            db_name: "sales".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(output.database, "sales");
    assert_eq!(output.message, "Switched to database sales");

    let schema = catalog.get_schema().await.unwrap();
    assert_eq!(schema.tables, vec!["orders"]);
    assert_eq!(schema.database.as_deref(), Some("sales"));
    assert!(backend.statements().contains(&"USE sales".to_string()));
}

#[tokio::test]
async fn test_use_db_unknown_database_keeps_selection() {
    let backend = FakeBackend::standard();
    let manager = manager(&backend);
    let selector = DatabaseToolHandler::new(manager.clone());
    let catalog = CatalogToolHandler::new(manager);

    assert!(selector.switch_db("nope").await.is_err());

    let schema = catalog.get_schema().await.unwrap();
    assert_eq!(schema.database.as_deref(), Some("default"));
    assert_eq!(schema.tables, vec!["a", "b"]);
}

#[tokio::test]
async fn test_use_db_rejects_malformed_name_before_connecting() {
    let backend = FakeBackend::standard();
    let selector = DatabaseToolHandler::new(manager(&backend));

    let err = selector.switch_db("sales; DROP TABLE orders").await.unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));
    assert_eq!(backend.connects(), 0);
}

#[tokio::test]
async fn test_describe_database() {
    let backend = FakeBackend::standard();
    let catalog = CatalogToolHandler::new(manager(&backend));

    let text = catalog.describe_database("sales").await.unwrap();
    assert_eq!(
        text,
        "Database: sales\nStorage Location: hdfs://namenode:8020/warehouse/sales.db\nComment: sales database\n"
    );
}

#[tokio::test]
async fn test_describe_nonexistent_database() {
    let backend = FakeBackend::standard();
    let catalog = CatalogToolHandler::new(manager(&backend));

    let err = catalog.describe_database("ghost").await.unwrap_err();
    assert!(matches!(err, DbError::DatabaseNotFound { ref database, .. } if database == "ghost"));

    let mcp: rmcp::ErrorData = err.into();
    assert_eq!(mcp.code, rmcp::model::ErrorCode::RESOURCE_NOT_FOUND);
}

#[tokio::test]
async fn test_describe_resource_uri() {
    let backend = FakeBackend::standard();
    let catalog = CatalogToolHandler::new(manager(&backend));

    let name = ImpalaService::parse_database_uri("database://default").unwrap();
    let text = catalog.describe_database(name).await.unwrap();
    assert!(text.starts_with("Database: default\n"));
}
