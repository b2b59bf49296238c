// SQLite ApiUsageRepository Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use bookdigest_core::error::Result;
use bookdigest_core::port::ApiUsageRepository;
use sqlx::SqlitePool;

pub struct SqliteApiUsageRepository {
    pool: SqlitePool,
}

impl SqliteApiUsageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiUsageRepository for SqliteApiUsageRepository {
    async fn get_usage(&self, date: &str, provider: &str) -> Result<i64> {
        let count: Option<i64> =
            sqlx::query_scalar("SELECT count FROM api_usage WHERE date = ? AND provider = ?")
                .bind(date)
                .bind(provider)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(count.unwrap_or(0))
    }

    async fn increment_usage(&self, date: &str, provider: &str) -> Result<i64> {
        sqlx::query_scalar(
            r#"
            INSERT INTO api_usage (date, provider, count) VALUES (?, ?, 1)
            ON CONFLICT(date, provider) DO UPDATE SET count = count + 1
            RETURNING count
            "#,
        )
        .bind(date)
        .bind(provider)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    #[tokio::test]
    async fn test_increment_per_date_and_provider() {
        let pool = create_pool(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let repo = SqliteApiUsageRepository::new(pool);

        assert_eq!(repo.get_usage("2024-05-01", "google_books").await.unwrap(), 0);

        assert_eq!(repo.increment_usage("2024-05-01", "google_books").await.unwrap(), 1);
        assert_eq!(repo.increment_usage("2024-05-01", "google_books").await.unwrap(), 2);
        assert_eq!(repo.increment_usage("2024-05-02", "google_books").await.unwrap(), 1);

        assert_eq!(repo.get_usage("2024-05-01", "google_books").await.unwrap(), 2);
        assert_eq!(repo.get_usage("2024-05-01", "other").await.unwrap(), 0);
    }
}
