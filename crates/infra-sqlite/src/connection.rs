// SQLite Connection Pool Setup

use crate::error::map_sqlx_error;
use bookdigest_core::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const MAX_FILE_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create SQLite connection pool from a URL (`sqlite::memory:`, `sqlite://path`)
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url).map_err(map_sqlx_error)?;
    let in_memory = database_url.contains(":memory:");
    connect(options, in_memory).await
}

/// Create SQLite connection pool for a database file (created if missing)
pub async fn create_file_pool(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new().filename(path);
    connect(options, false).await
}

async fn connect(options: SqliteConnectOptions, in_memory: bool) -> Result<SqlitePool> {
    let options = options
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
        .create_if_missing(true);

    // Every in-memory connection is its own database, so keep exactly one alive
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(MAX_FILE_CONNECTIONS)
    };

    pool_options
        .connect_with(options)
        .await
        .map_err(map_sqlx_error)
}
