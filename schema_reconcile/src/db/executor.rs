//! SQL executor
//!
//! Runs rendered statements against the physical database.

use sqlx::Executor;

use crate::db::connection::DatabaseConnection;
use crate::error::Result;

/// SQL executor for running rendered statements
#[derive(Debug, Clone)]
pub struct SqlExecutor {
    connection: DatabaseConnection,
}

impl SqlExecutor {
    /// Create a new SQL executor
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }

    /// Execute statements in order on a single connection.
    ///
    /// One connection is used for the whole batch since `USE` only affects
    /// the session that runs it. MySQL commits DDL implicitly, so a failure
    /// leaves earlier statements applied; execution stops at the first error.
    pub async fn execute_batch(&self, statements: &[String]) -> Result<usize> {
        match &self.connection {
            DatabaseConnection::MySql(pool) => {
                let mut conn = pool.acquire().await?;

                for (index, statement) in statements.iter().enumerate() {
                    tracing::info!(statement = index + 1, sql = %statement, "Executing statement");
                    // Plain text protocol: USE and CREATE DATABASE cannot be prepared
                    (&mut *conn).execute(statement.as_str()).await.map_err(|error| {
                        tracing::error!(statement = index + 1, %error, "Statement failed");
                        error
                    })?;
                }
            }
        }

        Ok(statements.len())
    }

    /// Get database connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}
