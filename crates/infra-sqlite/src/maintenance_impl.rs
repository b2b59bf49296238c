// SQLite Maintenance Implementation
use crate::error::map_sqlx_error;
use async_trait::async_trait;
use bookdigest_core::error::{AppError, Result};
use bookdigest_core::port::{Maintenance, StoreStats};
use sqlx::SqlitePool;
use tracing::debug;

/// Store statistics and health probe
pub struct SqliteMaintenance {
    pool: SqlitePool,
}

impl SqliteMaintenance {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// DB size in bytes from page accounting
    async fn get_db_size(&self) -> Result<i64> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get page count: {}", e)))?;

        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get page size: {}", e)))?;

        Ok(page_count * page_size)
    }

    async fn count(&self, sql: &str) -> Result<i64> {
        sqlx::query_scalar(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl Maintenance for SqliteMaintenance {
    async fn get_stats(&self) -> Result<StoreStats> {
        let total_books = self.count("SELECT COUNT(*) FROM books").await?;
        let undelivered_books = self
            .count("SELECT COUNT(*) FROM books WHERE last_delivered_at IS NULL")
            .await?;
        let delivery_count = self.count("SELECT COUNT(*) FROM book_deliveries").await?;
        let job_count = self.count("SELECT COUNT(*) FROM job_state").await?;
        let db_size_bytes = self.get_db_size().await?;

        Ok(StoreStats {
            total_books,
            undelivered_books,
            delivered_books: total_books - undelivered_books,
            delivery_count,
            job_count,
            db_size_bytes,
        })
    }

    async fn health_check(&self) -> Result<()> {
        let one: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        debug!(result = one, "Store health check");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations, SqliteBookRepository};
    use bookdigest_core::domain::{BookInput, Isbn13};
    use bookdigest_core::port::time_provider::SystemTimeProvider;
    use bookdigest_core::port::BookRepository;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_stats_on_empty_store() {
        let pool = create_pool(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let maintenance = SqliteMaintenance::new(pool);

        let stats = maintenance.get_stats().await.unwrap();
        assert_eq!(stats.total_books, 0);
        assert_eq!(stats.delivery_count, 0);
        assert!(stats.db_size_bytes > 0);
        maintenance.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_stats_split_delivered_and_undelivered() {
        let pool = create_pool(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let repo = SqliteBookRepository::new(pool.clone(), Arc::new(SystemTimeProvider));
        let maintenance = SqliteMaintenance::new(pool);

        repo.upsert(BookInput::new("9780000000001", "A", "test")).await.unwrap();
        repo.upsert(BookInput::new("9780000000002", "B", "test")).await.unwrap();
        let a = Isbn13::parse("9780000000001").unwrap();
        repo.record_delivery("combined", &[a.clone()]).await.unwrap();
        repo.mark_delivered(&[a]).await.unwrap();

        let stats = maintenance.get_stats().await.unwrap();
        assert_eq!(stats.total_books, 2);
        assert_eq!(stats.undelivered_books, 1);
        assert_eq!(stats.delivered_books, 1);
        assert_eq!(stats.delivery_count, 1);
    }
}
