// Collector Port (catalog data source)

use crate::domain::BookInput;
use async_trait::async_trait;
use thiserror::Error;

/// Books gathered for one search query
#[derive(Debug, Clone, Default)]
pub struct CollectorQueryResult {
    pub query: String,
    pub books: Vec<BookInput>,
    /// Items dropped by the collector (no ISBN, etc.)
    pub skipped: usize,
}

/// Result of one collector run
#[derive(Debug, Clone, Default)]
pub struct CollectorResult {
    pub source: String,
    pub results: Vec<CollectorQueryResult>,
    pub total_books: usize,
    pub total_skipped: usize,
}

impl CollectorResult {
    /// Build a result and compute the totals from the per-query entries
    pub fn new(source: impl Into<String>, results: Vec<CollectorQueryResult>) -> Self {
        let total_books = results.iter().map(|r| r.books.len()).sum();
        let total_skipped = results.iter().map(|r| r.skipped).sum();
        Self {
            source: source.into(),
            results,
            total_books,
            total_skipped,
        }
    }
}

/// Upstream fault reported by a collector
#[derive(Error, Debug)]
#[error("[{source_name}] {message}")]
pub struct CollectorError {
    pub source_name: String,
    pub message: String,
}

impl CollectorError {
    pub fn new(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

/// Collector trait
///
/// Implementations:
/// - GoogleBooksCollector: Google Books volumes API (infra-http)
#[async_trait]
pub trait Collector: Send + Sync {
    /// Source tag stored on every book this collector produces
    fn source(&self) -> &str;

    /// Collect books for the given queries, at most `max_per_run` in total
    ///
    /// # Errors
    /// - CollectorError if the upstream source is unavailable or rejects the request
    async fn collect(
        &self,
        queries: &[String],
        max_per_run: usize,
    ) -> Result<CollectorResult, CollectorError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock collector behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Return these books for the first query, nothing for the rest
        Books(Vec<BookInput>),
        /// Always fail with message
        Fail(String),
    }

    /// Mock Collector for testing
    pub struct MockCollector {
        behavior: Arc<Mutex<MockBehavior>>,
        call_count: Arc<Mutex<usize>>,
    }

    impl MockCollector {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Arc::new(Mutex::new(behavior)),
                call_count: Arc::new(Mutex::new(0)),
            }
        }
        pub fn with_books(books: Vec<BookInput>) -> Self {
            Self::new(MockBehavior::Books(books))
        }
        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }
        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }
        pub fn call_count(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl Collector for MockCollector {
        fn source(&self) -> &str {
            "mock"
        }

        async fn collect(
            &self,
            queries: &[String],
            max_per_run: usize,
        ) -> Result<CollectorResult, CollectorError> {
            *self.call_count.lock().unwrap() += 1;

            let behavior = self.behavior.lock().unwrap().clone();

            match behavior {
                MockBehavior::Books(mut books) => {
                    books.truncate(max_per_run);
                    let results = queries
                        .iter()
                        .enumerate()
                        .map(|(i, query)| CollectorQueryResult {
                            query: query.clone(),
                            books: if i == 0 { std::mem::take(&mut books) } else { Vec::new() },
                            skipped: 0,
                        })
                        .collect();
                    Ok(CollectorResult::new("mock", results))
                }
                MockBehavior::Fail(msg) => Err(CollectorError::new("mock", msg)),
            }
        }
    }
}
