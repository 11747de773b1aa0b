//! Read-only admission check for `execute_query`.
//!
//! Two layers:
//! 1. The first whitespace-delimited token, lower-cased, must be one of
//!    `select`, `show`, `describe`, `with`, `use`, `set`.
//! 2. In strict mode the statement is also parsed with
//!    [sqlparser](https://docs.rs/sqlparser/)'s Hive dialect. A parsed input
//!    must be exactly one read-only statement. Input the parser cannot handle
//!    (much of Impala's dialect) falls back to the first-token decision.
//!
//! Neither layer is a security boundary; grant the Impala user read-only
//! privileges for that.

use crate::error::{DbError, DbResult};
use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::HiveDialect;
use sqlparser::parser::Parser;
use tracing::debug;

/// First tokens admitted without contacting the backend.
pub const READ_ONLY_PREFIXES: [&str; 6] = ["select", "show", "describe", "with", "use", "set"];

/// How thoroughly statements are checked before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    /// Also require the parsed AST to be read-only when parsing succeeds.
    pub strict: bool,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self { strict: true }
    }
}

impl AdmissionPolicy {
    pub fn prefix_only() -> Self {
        Self { strict: false }
    }

    pub fn strict() -> Self {
        Self { strict: true }
    }

    /// Admit or reject `sql`. Rejections always carry the read-only message.
    pub fn check(&self, sql: &str) -> DbResult<()> {
        let token = first_token(sql).ok_or_else(|| DbError::read_only("Query is empty"))?;
        if !READ_ONLY_PREFIXES.contains(&token.as_str()) {
            return Err(DbError::read_only(format!(
                "Statements starting with '{}' are not admitted. Allowed: {}",
                token,
                READ_ONLY_PREFIXES.join(", ")
            )));
        }

        if self.strict {
            check_parsed(sql)?;
        }
        Ok(())
    }
}

/// First whitespace-delimited token, lower-cased.
pub fn first_token(sql: &str) -> Option<String> {
    sql.split_whitespace().next().map(str::to_lowercase)
}

fn check_parsed(sql: &str) -> DbResult<()> {
    let statements = match Parser::parse_sql(&HiveDialect {}, sql) {
        Ok(statements) => statements,
        Err(e) => {
            debug!(error = %e, "Statement not parseable, using first-token decision");
            return Ok(());
        }
    };

    match statements.as_slice() {
        [] => Ok(()),
        [statement] => match classify_statement(statement) {
            Ok(()) => Ok(()),
            Err(operation) => Err(DbError::read_only(format!(
                "{} statements modify data or metadata",
                operation
            ))),
        },
        _ => Err(DbError::read_only(
            "Submit one statement at a time; multiple statements are not admitted",
        )),
    }
}

/// `Ok` for read-only statements, otherwise the name of the operation.
fn classify_statement(stmt: &Statement) -> Result<(), &'static str> {
    match stmt {
        Statement::Query(query) => {
            if set_expr_is_read_only(&query.body) {
                Ok(())
            } else {
                Err("Data-modifying WITH")
            }
        }
        Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowDatabases { .. }
        | Statement::ShowSchemas { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowVariables { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. }
        | Statement::ExplainTable { .. } => Ok(()),

        // EXPLAIN is as safe as the statement it explains
        Statement::Explain { statement, .. } => classify_statement(statement),

        // Session-scoped; these change query options or the current database only.
        Statement::Set(_) | Statement::Use(_) => Ok(()),

        Statement::Insert(_) => Err("INSERT"),
        Statement::Update { .. } => Err("UPDATE"),
        Statement::Delete(_) => Err("DELETE"),
        Statement::Merge { .. } => Err("MERGE"),
        Statement::CreateTable { .. } => Err("CREATE TABLE"),
        Statement::CreateView { .. } => Err("CREATE VIEW"),
        Statement::CreateDatabase { .. } | Statement::CreateSchema { .. } => Err("CREATE DATABASE"),
        Statement::CreateFunction { .. } => Err("CREATE FUNCTION"),
        Statement::AlterTable { .. } => Err("ALTER TABLE"),
        Statement::AlterView { .. } => Err("ALTER VIEW"),
        Statement::Drop { .. } | Statement::DropFunction { .. } => Err("DROP"),
        Statement::Truncate { .. } => Err("TRUNCATE"),
        Statement::Grant { .. } => Err("GRANT"),
        Statement::Revoke { .. } => Err("REVOKE"),
        Statement::Analyze { .. } => Err("COMPUTE STATS"),
        _ => Err("This kind of"),
    }
}

fn set_expr_is_read_only(expr: &SetExpr) -> bool {
    match expr {
        SetExpr::Insert(_) | SetExpr::Update(_) | SetExpr::Delete(_) | SetExpr::Merge(_) => false,
        SetExpr::Query(query) => set_expr_is_read_only(&query.body),
        SetExpr::SetOperation { left, right, .. } => {
            set_expr_is_read_only(left) && set_expr_is_read_only(right)
        }
        _ => true,
    }
}
