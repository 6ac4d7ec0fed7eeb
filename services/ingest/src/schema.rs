//! Schema bootstrap
//!
//! The DDL is generated from the pipeline catalog and applied at startup
//! with CREATE TABLE IF NOT EXISTS, so one idempotent command both creates
//! the store and loads it.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::catalog;

/// Split generated DDL into single executable statements.
fn statements(ddl: &str) -> Vec<&str> {
    ddl.split(';')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Apply the full schema: ledger, dimension tables, fact tables.
pub async fn create_all(pool: &PgPool) -> Result<()> {
    for block in catalog::schema_ddl() {
        for statement in statements(&block) {
            sqlx::query(statement)
                .execute(pool)
                .await
                .with_context(|| format!("DB_FAILURE: applying schema: {}", first_line(statement)))?;
        }
    }
    Ok(())
}

fn first_line(statement: &str) -> &str {
    statement.lines().next().unwrap_or(statement)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_split_and_trim() {
        let ddl = "CREATE TABLE a (\n  x int\n);\nCREATE INDEX b ON a (x);";
        let stmts = statements(ddl);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].starts_with("CREATE TABLE"));
        assert!(stmts[1].starts_with("CREATE INDEX"));
    }

    #[test]
    fn test_statements_skip_trailing_empty() {
        assert_eq!(statements("A;;  ;B;").len(), 2);
    }

    #[test]
    fn test_full_schema_has_no_empty_statements() {
        for block in catalog::schema_ddl() {
            for s in statements(&block) {
                assert!(s.starts_with("CREATE"), "unexpected statement: {}", s);
            }
        }
    }
}
