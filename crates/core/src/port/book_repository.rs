// Book Repository Port (Interface)

use crate::domain::{Book, BookInput, DeliveryRecord, Isbn13, ResetScope};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for book persistence.
///
/// Every method is atomic: it either applies fully or not at all.
#[async_trait]
pub trait BookRepository: Send + Sync {
    /// Insert a new book or merge into the existing one with the same ISBN-13.
    ///
    /// # Errors
    /// - `DomainError::InvalidIsbn` if the identifier does not normalize
    /// - `DomainError::EmptyTitle` if the title is blank
    async fn upsert(&self, input: BookInput) -> Result<Book>;

    /// Find book by canonical ISBN
    async fn find_by_isbn(&self, isbn13: &Isbn13) -> Result<Option<Book>>;

    /// Undelivered books, most recently first-seen first
    async fn list_undelivered(&self, limit: u32) -> Result<Vec<Book>>;

    /// All books, most recently last-seen first
    async fn list_recent(&self, limit: u32) -> Result<Vec<Book>>;

    /// Set `last_delivered_at = now` on the given books. Unknown ISBNs are ignored.
    ///
    /// # Returns
    /// Number of books updated
    async fn mark_delivered(&self, isbns: &[Isbn13]) -> Result<u64>;

    /// Append one delivery audit row
    async fn record_delivery(&self, job_name: &str, isbns: &[Isbn13]) -> Result<DeliveryRecord>;

    /// Delivery audit rows written under a job, oldest first
    async fn find_deliveries_by_job(&self, job_name: &str) -> Result<Vec<DeliveryRecord>>;

    /// Clear `last_delivered_at` for the books the scope selects
    ///
    /// # Returns
    /// Number of books that actually changed state
    async fn reset_delivered(&self, scope: &ResetScope) -> Result<u64>;

    /// Total number of books
    async fn count_all(&self) -> Result<i64>;

    /// Number of books not yet delivered
    async fn count_undelivered(&self) -> Result<i64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::application::constants::MILLIS_PER_DAY;
    use crate::error::AppError;
    use crate::port::transaction::{
        BookRepositoryTransaction, Transaction, TransactionalBookRepository,
    };
    use crate::port::TimeProvider;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct State {
        // Insertion order doubles as the tie-break for equal timestamps
        books: Vec<Book>,
        deliveries: Vec<DeliveryRecord>,
    }

    impl State {
        fn mark(&mut self, isbns: &[Isbn13], now: i64) -> u64 {
            let mut marked = 0;
            for book in self.books.iter_mut().filter(|b| isbns.contains(&b.isbn13)) {
                book.last_delivered_at = Some(now);
                marked += 1;
            }
            marked
        }

        fn record(&mut self, job_name: &str, isbns: &[Isbn13], now: i64) -> DeliveryRecord {
            let record = DeliveryRecord {
                id: self.deliveries.len() as i64 + 1,
                job_name: job_name.to_string(),
                delivered_at: now,
                isbn13_list: isbns.to_vec(),
            };
            self.deliveries.push(record.clone());
            record
        }
    }

    /// In-memory book store with the same ordering rules as the SQLite adapter
    pub struct InMemoryBookRepository {
        state: Arc<Mutex<State>>,
        time_provider: Arc<dyn TimeProvider>,
        fail_commit: Arc<AtomicBool>,
    }

    impl InMemoryBookRepository {
        pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
            Self {
                state: Arc::new(Mutex::new(State::default())),
                time_provider,
                fail_commit: Arc::new(AtomicBool::new(false)),
            }
        }

        /// Make every transaction commit fail
        pub fn set_fail_commit(&self, fail: bool) {
            self.fail_commit.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl BookRepository for InMemoryBookRepository {
        async fn upsert(&self, input: BookInput) -> Result<Book> {
            let isbn13 = input.canonical_isbn()?;
            let now = self.time_provider.now_millis();
            let mut state = self.state.lock().unwrap();

            match state.books.iter().position(|b| b.isbn13 == isbn13) {
                Some(index) => {
                    let merged = state.books[index].clone().merged_with(input, now);
                    state.books[index] = merged.clone();
                    Ok(merged)
                }
                None => {
                    let book = Book::first_seen(isbn13, input, now);
                    state.books.push(book.clone());
                    Ok(book)
                }
            }
        }

        async fn find_by_isbn(&self, isbn13: &Isbn13) -> Result<Option<Book>> {
            let state = self.state.lock().unwrap();
            Ok(state.books.iter().find(|b| &b.isbn13 == isbn13).cloned())
        }

        async fn list_undelivered(&self, limit: u32) -> Result<Vec<Book>> {
            let state = self.state.lock().unwrap();
            let mut books: Vec<Book> = state
                .books
                .iter()
                .filter(|b| !b.is_delivered())
                .cloned()
                .collect();
            books.sort_by(|a, b| b.first_seen_at.cmp(&a.first_seen_at));
            books.truncate(limit as usize);
            Ok(books)
        }

        async fn list_recent(&self, limit: u32) -> Result<Vec<Book>> {
            let state = self.state.lock().unwrap();
            let mut books = state.books.clone();
            books.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
            books.truncate(limit as usize);
            Ok(books)
        }

        async fn mark_delivered(&self, isbns: &[Isbn13]) -> Result<u64> {
            let now = self.time_provider.now_millis();
            Ok(self.state.lock().unwrap().mark(isbns, now))
        }

        async fn record_delivery(&self, job_name: &str, isbns: &[Isbn13]) -> Result<DeliveryRecord> {
            let now = self.time_provider.now_millis();
            Ok(self.state.lock().unwrap().record(job_name, isbns, now))
        }

        async fn find_deliveries_by_job(&self, job_name: &str) -> Result<Vec<DeliveryRecord>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .deliveries
                .iter()
                .filter(|d| d.job_name == job_name)
                .cloned()
                .collect())
        }

        async fn reset_delivered(&self, scope: &ResetScope) -> Result<u64> {
            let now = self.time_provider.now_millis();
            let mut state = self.state.lock().unwrap();

            let job_isbns: HashSet<Isbn13> = match scope {
                ResetScope::Job(job) => state
                    .deliveries
                    .iter()
                    .filter(|d| &d.job_name == job)
                    .flat_map(|d| d.isbn13_list.iter().cloned())
                    .collect(),
                _ => HashSet::new(),
            };

            let mut changed = 0;
            for book in state.books.iter_mut() {
                let Some(delivered_at) = book.last_delivered_at else {
                    continue;
                };
                let selected = match scope {
                    ResetScope::Job(_) => job_isbns.contains(&book.isbn13),
                    ResetScope::WithinDays(days) => {
                        delivered_at >= now - i64::from(*days) * MILLIS_PER_DAY
                    }
                    ResetScope::All => true,
                };
                if selected {
                    book.last_delivered_at = None;
                    changed += 1;
                }
            }
            Ok(changed)
        }

        async fn count_all(&self) -> Result<i64> {
            Ok(self.state.lock().unwrap().books.len() as i64)
        }

        async fn count_undelivered(&self) -> Result<i64> {
            let state = self.state.lock().unwrap();
            Ok(state.books.iter().filter(|b| !b.is_delivered()).count() as i64)
        }
    }

    #[async_trait]
    impl TransactionalBookRepository for InMemoryBookRepository {
        async fn begin_transaction(&self) -> Result<Box<dyn BookRepositoryTransaction>> {
            Ok(Box::new(InMemoryBookTransaction {
                state: Arc::clone(&self.state),
                now: self.time_provider.now_millis(),
                fail_commit: self.fail_commit.load(Ordering::SeqCst),
                records: Vec::new(),
                marks: Vec::new(),
            }))
        }
    }

    /// Buffers writes until commit
    pub struct InMemoryBookTransaction {
        state: Arc<Mutex<State>>,
        now: i64,
        fail_commit: bool,
        records: Vec<(String, Vec<Isbn13>)>,
        marks: Vec<Isbn13>,
    }

    #[async_trait]
    impl Transaction for InMemoryBookTransaction {
        async fn commit(self: Box<Self>) -> Result<()> {
            if self.fail_commit {
                return Err(AppError::Database("commit failed".to_string()));
            }
            let mut state = self.state.lock().unwrap();
            for (job_name, isbns) in &self.records {
                state.record(job_name, isbns, self.now);
            }
            state.mark(&self.marks, self.now);
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl BookRepositoryTransaction for InMemoryBookTransaction {
        async fn record_delivery(
            &mut self,
            job_name: &str,
            isbns: &[Isbn13],
        ) -> Result<DeliveryRecord> {
            let pending = self.records.len();
            self.records.push((job_name.to_string(), isbns.to_vec()));
            let committed = self.state.lock().unwrap().deliveries.len();
            Ok(DeliveryRecord {
                id: (committed + pending) as i64 + 1,
                job_name: job_name.to_string(),
                delivered_at: self.now,
                isbn13_list: isbns.to_vec(),
            })
        }

        async fn mark_delivered(&mut self, isbns: &[Isbn13]) -> Result<u64> {
            self.marks.extend_from_slice(isbns);
            let state = self.state.lock().unwrap();
            Ok(state
                .books
                .iter()
                .filter(|b| isbns.contains(&b.isbn13))
                .count() as u64)
        }
    }
}
