//! Delivery atomicity and reset scopes

use async_trait::async_trait;
use bookdigest_core::application::{DeliveryOutcome, DeliveryService, ResetService};
use bookdigest_core::domain::{BookInput, Isbn13, ResetScope};
use bookdigest_core::error::{AppError, Result};
use bookdigest_core::port::mail_transport::mocks::{MockBehavior, MockMailTransport};
use bookdigest_core::port::time_provider::mocks::MockTimeProvider;
use bookdigest_core::port::{
    BookRepository, BookRepositoryTransaction, MailerError, TransactionalBookRepository,
};
use bookdigest_infra_sqlite::{SqliteBookRepository, SqliteStore};
use std::sync::Arc;

const T0: i64 = 1_714_566_645_000;
const DAY: i64 = 24 * 60 * 60 * 1000;

async fn seeded(n: usize) -> (SqliteStore, Arc<SqliteBookRepository>, Arc<MockTimeProvider>) {
    let clock = Arc::new(MockTimeProvider::new(T0));
    let store = SqliteStore::open_in_memory(clock.clone()).await.unwrap();
    let books = store.books();
    for i in 0..n {
        books
            .upsert(BookInput::new(format!("97800000000{:02}", i), format!("Book {}", i), "test"))
            .await
            .unwrap();
    }
    (store, books, clock)
}

#[tokio::test]
async fn test_transport_failure_leaves_store_untouched() {
    let (_store, books, _) = seeded(3).await;
    let batch = books.list_undelivered(10).await.unwrap();

    let transport = Arc::new(MockMailTransport::new_fail("SMTP down"));
    let delivery = DeliveryService::new(transport, books.clone());

    let err = delivery
        .commit_delivery("combined", &batch, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Mailer(MailerError::SendFailed(_))));

    assert_eq!(books.count_undelivered().await.unwrap(), 3);
    assert!(books.find_deliveries_by_job("combined").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_successful_delivery_writes_one_record() {
    let (_store, books, _) = seeded(3).await;
    let batch = books.list_undelivered(2).await.unwrap();

    let transport = Arc::new(MockMailTransport::new_success());
    let delivery = DeliveryService::new(transport.clone(), books.clone());
    let outcome = delivery.commit_delivery("combined", &batch, false).await.unwrap();

    let DeliveryOutcome::Delivered { record, marked } = outcome else {
        panic!("expected a recorded delivery");
    };
    assert_eq!(marked, 2);
    assert_eq!(record.delivered_at, T0);
    assert_eq!(record.isbn13_list.len(), 2);

    let remaining = books.list_undelivered(10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(batch.iter().all(|b| !remaining.contains(b)));

    let records = books.find_deliveries_by_job("combined").await.unwrap();
    assert_eq!(records, vec![record]);
    assert_eq!(transport.sent()[0].0, "combined");
}

#[tokio::test]
async fn test_empty_batch_skipped_unless_forced() {
    let (_store, books, _) = seeded(0).await;
    let transport = Arc::new(MockMailTransport::new_success());
    let delivery = DeliveryService::new(transport.clone(), books.clone());

    let outcome = delivery.commit_delivery("combined", &[], false).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::Skipped);
    assert_eq!(transport.send_count(), 0);

    let outcome = delivery.commit_delivery("combined", &[], true).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::SentEmpty);
    assert_eq!(transport.send_count(), 1);
    assert!(books.find_deliveries_by_job("combined").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_not_configured_transport_is_mailer_error() {
    let (_store, books, _) = seeded(1).await;
    let batch = books.list_undelivered(10).await.unwrap();
    let transport = Arc::new(MockMailTransport::new_success());
    transport.set_behavior(MockBehavior::NotConfigured);

    let err = DeliveryService::new(transport, books.clone())
        .commit_delivery("combined", &batch, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Mailer(MailerError::NotConfigured(_))));
    assert_eq!(books.count_undelivered().await.unwrap(), 1);
}

/// Bookkeeping store that can never open a transaction
struct BrokenBookkeeping;

#[async_trait]
impl TransactionalBookRepository for BrokenBookkeeping {
    async fn begin_transaction(&self) -> Result<Box<dyn BookRepositoryTransaction>> {
        Err(AppError::Database("disk I/O error".to_string()))
    }
}

#[tokio::test]
async fn test_bookkeeping_failure_after_send_is_inconsistency() {
    let (_store, books, _) = seeded(2).await;
    let batch = books.list_undelivered(10).await.unwrap();
    let transport = Arc::new(MockMailTransport::new_success());

    let err = DeliveryService::new(transport.clone(), Arc::new(BrokenBookkeeping))
        .commit_delivery("combined", &batch, false)
        .await
        .unwrap_err();

    match err {
        AppError::DeliveryInconsistency { job, count, reason } => {
            assert_eq!(job, "combined");
            assert_eq!(count, 2);
            assert!(reason.contains("disk I/O error"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(transport.send_count(), 1);
}

#[tokio::test]
async fn test_reset_by_job_restores_prior_count() {
    let (_store, books, _) = seeded(4).await;
    let transport = Arc::new(MockMailTransport::new_success());
    let delivery = DeliveryService::new(transport, books.clone());

    let morning = books.list_undelivered(2).await.unwrap();
    delivery.commit_delivery("morning", &morning, false).await.unwrap();
    let before_evening = books.count_undelivered().await.unwrap();
    assert_eq!(before_evening, 2);

    let evening = books.list_undelivered(2).await.unwrap();
    delivery.commit_delivery("evening", &evening, false).await.unwrap();
    assert_eq!(books.count_undelivered().await.unwrap(), 0);

    let report = ResetService::new(books.clone())
        .reset(ResetScope::Job("evening".to_string()))
        .await
        .unwrap();
    assert_eq!(report.reset_count, 2);
    assert_eq!(report.undelivered_after, before_evening);

    for book in &morning {
        let stored = books.find_by_isbn(&book.isbn13).await.unwrap().unwrap();
        assert!(stored.is_delivered());
    }
}

#[tokio::test]
async fn test_reset_within_days_and_all() {
    let (_store, books, clock) = seeded(3).await;
    let isbn = |raw: &str| Isbn13::parse(raw).unwrap();

    books.mark_delivered(&[isbn("9780000000000")]).await.unwrap();
    clock.advance(20 * DAY);
    books
        .mark_delivered(&[isbn("9780000000001"), isbn("9780000000002")])
        .await
        .unwrap();
    clock.advance(DAY);

    let service = ResetService::new(books.clone());

    let recent = service.reset(ResetScope::WithinDays(7)).await.unwrap();
    assert_eq!(recent.reset_count, 2);
    assert_eq!(recent.undelivered_after, 2);

    let all = service.reset(ResetScope::All).await.unwrap();
    assert_eq!(all.reset_count, 1);
    assert_eq!(all.undelivered_after, all.total_books);

    // Nothing left to reset
    let again = service.reset(ResetScope::All).await.unwrap();
    assert_eq!(again.reset_count, 0);
}
