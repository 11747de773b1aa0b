//! Integration tests for query validation.
//!
//! These tests verify that the admission policy rejects statements that could
//! modify data and admits the read-only ones.

use iceberg_mcp_server::error::{DbError, READ_ONLY_REJECTION};
use iceberg_mcp_server::tools::sql_validator::{AdmissionPolicy, READ_ONLY_PREFIXES, first_token};

fn assert_rejected(policy: AdmissionPolicy, sql: &str) {
    let err = policy.check(sql).unwrap_err();
    assert!(
        matches!(err, DbError::ReadOnly { .. }),
        "Should be ReadOnly error for {sql:?}, got: {err:?}"
    );
    assert_eq!(err.to_string(), READ_ONLY_REJECTION);
}

/// Test that write statements are rejected by the first-token check.
#[test]
fn test_rejects_write_statements() {
    for policy in [AdmissionPolicy::strict(), AdmissionPolicy::prefix_only()] {
        for sql in [
            "INSERT INTO users (name) VALUES ('test')",
            "UPDATE users SET name = 'changed' WHERE id = 1",
            "DELETE FROM users WHERE id = 1",
            "DROP TABLE users",
            "CREATE TABLE t (id INT)",
            "ALTER TABLE t RENAME TO u",
            "TRUNCATE TABLE t",
            "INVALIDATE METADATA t",
            "REFRESH t",
            "COMPUTE STATS t",
            "GRANT SELECT ON TABLE t TO ROLE r",
            "UPSERT INTO t VALUES (1)",
        ] {
            assert_rejected(policy, sql);
        }
    }
}

/// Test that read-only statements are admitted.
#[test]
fn test_admits_read_statements() {
    for policy in [AdmissionPolicy::strict(), AdmissionPolicy::prefix_only()] {
        for sql in [
            "SELECT * FROM users",
            "select count(*) from users where id > 10",
            "WITH recent AS (SELECT * FROM orders) SELECT * FROM recent",
            "SHOW TABLES",
            "SHOW DATABASES",
            "DESCRIBE orders",
            "USE sales",
            "SET MEM_LIMIT=2g",
            "  \n\tSELECT 1",
        ] {
            assert!(policy.check(sql).is_ok(), "{sql:?} should be admitted");
        }
    }
}

/// Test that empty input is rejected.
#[test]
fn test_rejects_empty() {
    assert_rejected(AdmissionPolicy::default(), "");
    assert_rejected(AdmissionPolicy::default(), "   \n ");
}

/// Test that a keyword prefix is not enough: `selection` is not `select`.
#[test]
fn test_prefix_is_a_whole_token() {
    assert_rejected(AdmissionPolicy::default(), "selection FROM t");
    assert_rejected(AdmissionPolicy::default(), "showdown");
}

/// Test that strict mode rejects stacked statements.
#[test]
fn test_strict_rejects_stacked_statements() {
    assert_rejected(AdmissionPolicy::strict(), "SELECT 1; DROP TABLE users");
    assert_rejected(AdmissionPolicy::strict(), "SELECT 1; SELECT 2");
    assert!(AdmissionPolicy::prefix_only().check("SELECT 1; DROP TABLE users").is_ok());
}

/// Test that unparseable statements fall back to the first-token decision.
#[test]
fn test_strict_falls_back_when_unparseable() {
    assert!(AdmissionPolicy::strict().check("SHOW CREATE TABLE weird$$name").is_ok());
}

#[test]
fn test_first_token() {
    assert_eq!(first_token("  SELECT 1").as_deref(), Some("select"));
    assert_eq!(first_token("With x"), Some("with".to_string()));
    assert_eq!(first_token(""), None);
    assert_eq!(READ_ONLY_PREFIXES.len(), 6);
}
