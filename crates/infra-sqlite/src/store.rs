//! Explicitly constructed store handle
//!
//! Owns the pool for the process lifetime and hands out repository adapters
//! that share it. Resetting the database consumes the handle and returns a
//! fresh one.

use crate::connection::{create_file_pool, create_pool};
use crate::migration::run_migrations;
use crate::{
    SqliteApiUsageRepository, SqliteBookRepository, SqliteJobStateRepository, SqliteMaintenance,
};
use bookdigest_core::error::{AppError, Result};
use bookdigest_core::port::TimeProvider;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
enum Location {
    Memory,
    File(PathBuf),
}

pub struct SqliteStore {
    pool: SqlitePool,
    location: Location,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteStore {
    /// Open (and migrate) the database file, creating parent directories
    pub async fn open(path: impl AsRef<Path>, time_provider: Arc<dyn TimeProvider>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let pool = create_file_pool(&path).await?;
        run_migrations(&pool).await?;
        info!(path = %path.display(), "Store opened");

        Ok(Self {
            pool,
            location: Location::File(path),
            time_provider,
        })
    }

    pub async fn open_in_memory(time_provider: Arc<dyn TimeProvider>) -> Result<Self> {
        let pool = create_pool("sqlite::memory:").await?;
        run_migrations(&pool).await?;

        Ok(Self {
            pool,
            location: Location::Memory,
            time_provider,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Database file path, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            Location::File(path) => Some(path),
            Location::Memory => None,
        }
    }

    pub fn books(&self) -> Arc<SqliteBookRepository> {
        Arc::new(SqliteBookRepository::new(
            self.pool.clone(),
            Arc::clone(&self.time_provider),
        ))
    }

    pub fn job_states(&self) -> Arc<SqliteJobStateRepository> {
        Arc::new(SqliteJobStateRepository::new(self.pool.clone()))
    }

    pub fn api_usage(&self) -> Arc<SqliteApiUsageRepository> {
        Arc::new(SqliteApiUsageRepository::new(self.pool.clone()))
    }

    pub fn maintenance(&self) -> Arc<SqliteMaintenance> {
        Arc::new(SqliteMaintenance::new(self.pool.clone()))
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Drop every row by recreating the database.
    ///
    /// File stores are copied to `<path>.bak.<timestamp>` first, then the
    /// database and its `-wal`/`-shm` companions are removed and a fresh
    /// migrated database is opened. Returns the new store and the backup path.
    pub async fn reset_database(self) -> Result<(Self, Option<PathBuf>)> {
        let Self {
            pool,
            location,
            time_provider,
        } = self;

        // Checkpoint so the copy holds everything committed so far
        if let Err(e) = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&pool)
            .await
        {
            warn!(error = %e, "WAL checkpoint before reset failed");
        }
        pool.close().await;

        match location {
            Location::Memory => {
                let store = Self::open_in_memory(time_provider).await?;
                info!("In-memory store reset");
                Ok((store, None))
            }
            Location::File(path) => {
                let backup = backup_path(&path, time_provider.now_millis())?;

                if tokio::fs::try_exists(&path).await? {
                    tokio::fs::copy(&path, &backup).await?;
                    info!(backup = %backup.display(), "Database backed up");
                }

                for file in [path.clone(), sidecar(&path, "-wal"), sidecar(&path, "-shm")] {
                    match tokio::fs::remove_file(&file).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }

                let store = Self::open(&path, time_provider).await?;
                info!(path = %path.display(), "Database reset");
                Ok((store, Some(backup)))
            }
        }
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn backup_path(path: &Path, now_millis: i64) -> Result<PathBuf> {
    let stamp = chrono::DateTime::from_timestamp_millis(now_millis)
        .ok_or_else(|| AppError::Internal(format!("Invalid timestamp: {}", now_millis)))?
        .format("%Y-%m-%dT%H-%M-%S");
    Ok(sidecar(path, &format!(".bak.{}", stamp)))
}
