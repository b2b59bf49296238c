// Store maintenance port
use crate::error::Result;
use async_trait::async_trait;

/// Store statistics
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total_books: i64,
    pub undelivered_books: i64,
    pub delivered_books: i64,
    pub delivery_count: i64,
    pub job_count: i64,
    pub db_size_bytes: i64,
}

/// Read-only administrative queries over the store
#[async_trait]
pub trait Maintenance: Send + Sync {
    /// Get store statistics
    async fn get_stats(&self) -> Result<StoreStats>;

    /// Verify the store answers queries
    async fn health_check(&self) -> Result<()>;
}
