use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tracing::warn;

use claimflow_core::WorkflowError;

use crate::repositories::RepositoryError;

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let timeout = Duration::from_secs(timeout_secs.max(1));
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(timeout);

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(timeout)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await
}

/// Opens a write transaction that holds SQLite's reserved lock from the first
/// statement, so reads taken inside it cannot be invalidated by a concurrent
/// writer. Dropping the returned transaction uncommitted rolls it back before
/// the connection is reused.
pub(crate) async fn begin_immediate(
    pool: &DbPool,
) -> Result<Transaction<'static, Sqlite>, WorkflowError> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await.map_err(RepositoryError::from)?)
}

/// Commits `tx` when `result` is `Ok`; otherwise rolls it back and returns the error.
pub(crate) async fn commit<T>(
    tx: Transaction<'static, Sqlite>,
    result: Result<T, WorkflowError>,
) -> Result<T, WorkflowError> {
    match result {
        Ok(value) => {
            tx.commit().await.map_err(RepositoryError::from)?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = tx.rollback().await {
                warn!(
                    event_name = "store.transaction.rollback_failed",
                    error = %rollback_error,
                    "explicit rollback failed; connection rolls back on release"
                );
            }
            Err(error)
        }
    }
}
