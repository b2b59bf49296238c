//! Delivery recorder
//!
//! Sends a digest and, only once the transport confirmed the send, writes the
//! audit row and marks the batch delivered in a single store transaction.

use crate::domain::{Book, DeliveryRecord, Isbn13};
use crate::error::{AppError, Result};
use crate::port::{MailTransport, TransactionalBookRepository};
use std::sync::Arc;
use tracing::{error, info};

/// What a delivery attempt did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Empty batch without force: nothing sent, nothing recorded
    Skipped,
    /// Forced send of an empty batch: nothing to record
    SentEmpty,
    /// Sent and recorded
    Delivered { record: DeliveryRecord, marked: u64 },
}

/// Delivery service (transport + bookkeeping)
pub struct DeliveryService {
    transport: Arc<dyn MailTransport>,
    book_repo: Arc<dyn TransactionalBookRepository>,
}

impl DeliveryService {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        book_repo: Arc<dyn TransactionalBookRepository>,
    ) -> Self {
        Self {
            transport,
            book_repo,
        }
    }

    /// Send the batch and record it as delivered
    ///
    /// # Errors
    /// - AppError::Mailer if the transport fails; store state is untouched
    /// - AppError::DeliveryInconsistency if the send succeeded but the
    ///   bookkeeping did not commit
    pub async fn commit_delivery(
        &self,
        job_label: &str,
        batch: &[Book],
        force: bool,
    ) -> Result<DeliveryOutcome> {
        if batch.is_empty() && !force {
            info!(job = %job_label, "No books to send, skipping digest");
            return Ok(DeliveryOutcome::Skipped);
        }

        self.transport.send(batch, job_label).await?;

        if batch.is_empty() {
            info!(job = %job_label, "Forced empty digest sent");
            return Ok(DeliveryOutcome::SentEmpty);
        }

        let isbns: Vec<Isbn13> = batch.iter().map(|b| b.isbn13.clone()).collect();

        match self.record(job_label, &isbns).await {
            Ok((record, marked)) => {
                info!(
                    job = %job_label,
                    delivery_id = record.id,
                    books = isbns.len(),
                    marked = marked,
                    "Digest delivered and recorded"
                );
                Ok(DeliveryOutcome::Delivered { record, marked })
            }
            Err(e) => {
                error!(
                    job = %job_label,
                    books = isbns.len(),
                    error = %e,
                    "Digest sent but delivery bookkeeping failed"
                );
                Err(AppError::DeliveryInconsistency {
                    job: job_label.to_string(),
                    count: isbns.len(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn record(&self, job_label: &str, isbns: &[Isbn13]) -> Result<(DeliveryRecord, u64)> {
        let mut tx = self.book_repo.begin_transaction().await?;

        let record = tx.record_delivery(job_label, isbns).await?;
        let marked = tx.mark_delivered(isbns).await?;

        tx.commit().await?;

        Ok((record, marked))
    }
}
