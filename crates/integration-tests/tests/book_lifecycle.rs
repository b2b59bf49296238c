//! Book lifecycle end to end
//!
//! collect -> normalize -> upsert -> select -> deliver -> reset, against an
//! in-memory store.

use bookdigest_core::application::{select_for_delivery, DeliveryOutcome, DeliveryService, ResetService};
use bookdigest_core::domain::{BookInput, Isbn13, ResetScope};
use bookdigest_core::port::mail_transport::mocks::MockMailTransport;
use bookdigest_core::port::time_provider::mocks::MockTimeProvider;
use bookdigest_core::port::BookRepository;
use bookdigest_infra_sqlite::SqliteStore;
use std::sync::Arc;

const T0: i64 = 1_714_566_645_000;

async fn store() -> (SqliteStore, Arc<MockTimeProvider>) {
    let clock = Arc::new(MockTimeProvider::new(T0));
    let store = SqliteStore::open_in_memory(clock.clone()).await.unwrap();
    (store, clock)
}

#[tokio::test]
async fn test_full_cycle_with_duplicate_observation() {
    let (store, clock) = store().await;
    let books = store.books();

    // Three observations, the third re-observes the first under its ISBN-10 form
    books
        .upsert(BookInput::new("9780306406157", "First Edition", "google_books"))
        .await
        .unwrap();
    clock.advance(1_000);
    books
        .upsert(BookInput::new("978-4-06-519981-7", "Another Book", "google_books"))
        .await
        .unwrap();
    clock.advance(1_000);
    books
        .upsert(BookInput::new("0-306-40615-2", "Second Edition", "google_books"))
        .await
        .unwrap();

    assert_eq!(books.count_all().await.unwrap(), 2);
    let first = books
        .find_by_isbn(&Isbn13::parse("9780306406157").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.title, "Second Edition");
    assert_eq!(first.first_seen_at, T0);
    assert_eq!(first.last_seen_at, T0 + 2_000);

    let selection = select_for_delivery(books.as_ref(), 10, 5).await.unwrap();
    assert_eq!(selection.books.len(), 2);
    assert!(!selection.is_fallback);
    // Newest first_seen first
    assert_eq!(selection.books[0].isbn13.as_str(), "9784065199817");

    let transport = Arc::new(MockMailTransport::new_success());
    let delivery = DeliveryService::new(transport.clone(), books.clone());
    let outcome = delivery
        .commit_delivery("combined", &selection.books, false)
        .await
        .unwrap();
    assert!(matches!(outcome, DeliveryOutcome::Delivered { marked: 2, .. }));
    assert_eq!(books.count_undelivered().await.unwrap(), 0);
    assert_eq!(transport.send_count(), 1);

    let report = ResetService::new(books.clone())
        .reset(ResetScope::All)
        .await
        .unwrap();
    assert_eq!(report.reset_count, 2);
    assert_eq!(report.undelivered_before, 0);
    assert_eq!(report.undelivered_after, 2);
    assert_eq!(report.total_books, 2);
}

#[tokio::test]
async fn test_fallback_after_everything_delivered() {
    let (store, clock) = store().await;
    let books = store.books();

    for i in 0..7 {
        books
            .upsert(BookInput::new(format!("978000000000{}", i), format!("Book {}", i), "test"))
            .await
            .unwrap();
        clock.advance(1_000);
    }

    let all: Vec<Isbn13> = books
        .list_recent(100)
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.isbn13)
        .collect();
    books.mark_delivered(&all).await.unwrap();

    let selection = select_for_delivery(books.as_ref(), 10, 5).await.unwrap();
    assert!(selection.is_fallback);
    assert_eq!(selection.books.len(), 5);
    assert_eq!(selection.books[0].title, "Book 6");
    assert!(selection.books.iter().all(|b| b.is_delivered()));
}

#[tokio::test]
async fn test_empty_store_selects_nothing() {
    let (store, _) = store().await;
    let books = store.books();

    let selection = select_for_delivery(books.as_ref(), 10, 5).await.unwrap();
    assert!(selection.is_empty());
    assert!(selection.is_fallback);
}

#[tokio::test]
async fn test_merge_preserves_metadata_absent_in_new_observation() {
    let (store, _) = store().await;
    let books = store.books();

    let mut rich = BookInput::new("9780306406157", "Title", "google_books");
    rich.authors = vec!["A. Author".to_string()];
    rich.publisher = Some("Publisher".to_string());
    rich.cover_url = Some("https://example.com/cover.jpg".to_string());
    books.upsert(rich).await.unwrap();

    let mut sparse = BookInput::new("9780306406157", "Title (Revised)", "other");
    sparse.publisher = Some("New Publisher".to_string());
    let merged = books.upsert(sparse).await.unwrap();

    assert_eq!(merged.title, "Title (Revised)");
    assert_eq!(merged.authors, vec!["A. Author".to_string()]);
    assert_eq!(merged.publisher.as_deref(), Some("New Publisher"));
    assert_eq!(merged.cover_url.as_deref(), Some("https://example.com/cover.jpg"));
    assert_eq!(merged.source, "google_books");
}
