// SQLite JobStateRepository Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use bookdigest_core::domain::JobRunState;
use bookdigest_core::error::Result;
use bookdigest_core::port::JobStateRepository;
use sqlx::SqlitePool;

pub struct SqliteJobStateRepository {
    pool: SqlitePool,
}

impl SqliteJobStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStateRepository for SqliteJobStateRepository {
    async fn find(&self, job_name: &str) -> Result<Option<JobRunState>> {
        let row: Option<(String, Option<i64>, Option<i64>)> = sqlx::query_as(
            "SELECT job_name, last_run_at, last_success_at FROM job_state WHERE job_name = ?",
        )
        .bind(job_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|(job_name, last_run_at, last_success_at)| JobRunState {
            job_name,
            last_run_at,
            last_success_at,
        }))
    }

    async fn set_last_run(&self, job_name: &str, at_millis: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO job_state (job_name, last_run_at) VALUES (?, ?)
            ON CONFLICT(job_name) DO UPDATE SET last_run_at = excluded.last_run_at
            "#,
        )
        .bind(job_name)
        .bind(at_millis)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn set_last_success(&self, job_name: &str, at_millis: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO job_state (job_name, last_success_at) VALUES (?, ?)
            ON CONFLICT(job_name) DO UPDATE SET last_success_at = excluded.last_success_at
            "#,
        )
        .bind(job_name)
        .bind(at_millis)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
