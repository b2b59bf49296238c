// SQLite Transaction Implementation

use crate::book_repository::{insert_delivery, mark_delivered_in};
use crate::error::map_sqlx_error;
use async_trait::async_trait;
use bookdigest_core::domain::{DeliveryRecord, Isbn13};
use bookdigest_core::error::Result;
use bookdigest_core::port::{BookRepositoryTransaction, TimeProvider, Transaction};
use sqlx::{Sqlite, Transaction as SqlxTransaction};
use std::sync::Arc;

/// Delivery bookkeeping inside one SQLite transaction.
/// Dropping without commit rolls back.
pub struct SqliteBookTransaction {
    tx: SqlxTransaction<'static, Sqlite>,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteBookTransaction {
    pub fn new(tx: SqlxTransaction<'static, Sqlite>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self { tx, time_provider }
    }
}

#[async_trait]
impl Transaction for SqliteBookTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}

#[async_trait]
impl BookRepositoryTransaction for SqliteBookTransaction {
    async fn record_delivery(
        &mut self,
        job_name: &str,
        isbns: &[Isbn13],
    ) -> Result<DeliveryRecord> {
        let now = self.time_provider.now_millis();
        insert_delivery(&mut self.tx, job_name, isbns, now).await
    }

    async fn mark_delivered(&mut self, isbns: &[Isbn13]) -> Result<u64> {
        let now = self.time_provider.now_millis();
        mark_delivered_in(&mut self.tx, isbns, now).await
    }
}
