//! Startup schema migration
//!
//! The schema ships as one SQL batch. Statements are split on `;` and run
//! in order; the first failure aborts startup.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use configmirror_common::kube_utils::with_timeout;
use configmirror_common::Error;

/// Schema for the replica audit table
pub const IMPORT_SQL: &str = include_str!("../sql/import.sql");

/// Runs one SQL statement
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Execute `statement`, discarding any result rows
    async fn execute(&self, statement: &str) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl StatementExecutor for PgPool {
    async fn execute(&self, statement: &str) -> Result<(), sqlx::Error> {
        sqlx::query(statement).execute(self).await.map(|_| ())
    }
}

/// Split a SQL batch into its non-empty statements
pub fn split_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .collect()
}

/// Execute every statement of `sql` in sequence
pub async fn run_migration(executor: &dyn StatementExecutor, sql: &str) -> Result<(), Error> {
    let statements = split_statements(sql);
    let total = statements.len();

    for (index, statement) in statements.into_iter().enumerate() {
        debug!(statement = index + 1, total, "applying migration statement");
        with_timeout("migration", async {
            executor.execute(statement).await.map_err(|e| {
                Error::config(format!(
                    "migration statement {} of {total} failed: {e}",
                    index + 1
                ))
            })
        })
        .await?;
    }

    info!(statements = total, "database migration completed");
    Ok(())
}
