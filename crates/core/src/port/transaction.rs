// Transaction port for atomic operations

use crate::domain::{DeliveryRecord, Isbn13};
use crate::error::Result;
use async_trait::async_trait;

/// Transaction trait for atomic multi-step operations
#[async_trait]
pub trait Transaction: Send {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Transactional BookRepository operations
#[async_trait]
pub trait TransactionalBookRepository: Send + Sync {
    /// Begin a new transaction
    async fn begin_transaction(&self) -> Result<Box<dyn BookRepositoryTransaction>>;
}

/// Delivery bookkeeping within a transaction
#[async_trait]
pub trait BookRepositoryTransaction: Transaction {
    /// Append delivery audit row (within transaction)
    async fn record_delivery(&mut self, job_name: &str, isbns: &[Isbn13])
        -> Result<DeliveryRecord>;

    /// Mark books delivered (within transaction)
    async fn mark_delivered(&mut self, isbns: &[Isbn13]) -> Result<u64>;
}
