//! Reset engine - returns delivered books to the undelivered pool

use crate::domain::ResetScope;
use crate::error::Result;
use crate::port::BookRepository;
use std::sync::Arc;
use tracing::info;

/// Outcome of one reset
#[derive(Debug, Clone)]
pub struct ResetReport {
    pub scope: ResetScope,
    pub reset_count: u64,
    pub undelivered_before: i64,
    pub undelivered_after: i64,
    pub total_books: i64,
}

pub struct ResetService {
    books: Arc<dyn BookRepository>,
}

impl ResetService {
    pub fn new(books: Arc<dyn BookRepository>) -> Self {
        Self { books }
    }

    /// Clear delivery status for the books the scope selects
    pub async fn reset(&self, scope: ResetScope) -> Result<ResetReport> {
        let total_books = self.books.count_all().await?;
        let undelivered_before = self.books.count_undelivered().await?;

        let reset_count = self.books.reset_delivered(&scope).await?;
        let undelivered_after = self.books.count_undelivered().await?;

        info!(
            scope = %scope,
            reset = reset_count,
            undelivered_before = undelivered_before,
            undelivered_after = undelivered_after,
            "Delivery status reset"
        );

        Ok(ResetReport {
            scope,
            reset_count,
            undelivered_before,
            undelivered_after,
            total_books,
        })
    }
}
