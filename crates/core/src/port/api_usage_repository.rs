// API Usage Repository Port

use crate::error::Result;
use async_trait::async_trait;

/// Daily request counters keyed by (date, provider)
#[async_trait]
pub trait ApiUsageRepository: Send + Sync {
    /// Current count, 0 when no row exists
    async fn get_usage(&self, date: &str, provider: &str) -> Result<i64>;

    /// Increment and return the new count
    async fn increment_usage(&self, date: &str, provider: &str) -> Result<i64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryApiUsageRepository {
        counts: Mutex<HashMap<(String, String), i64>>,
    }

    impl InMemoryApiUsageRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl ApiUsageRepository for InMemoryApiUsageRepository {
        async fn get_usage(&self, date: &str, provider: &str) -> Result<i64> {
            let counts = self.counts.lock().unwrap();
            Ok(counts
                .get(&(date.to_string(), provider.to_string()))
                .copied()
                .unwrap_or(0))
        }

        async fn increment_usage(&self, date: &str, provider: &str) -> Result<i64> {
            let mut counts = self.counts.lock().unwrap();
            let count = counts
                .entry((date.to_string(), provider.to_string()))
                .or_insert(0);
            *count += 1;
            Ok(*count)
        }
    }
}
