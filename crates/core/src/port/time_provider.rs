// Time Provider Port (for testability)

/// Time provider interface (allows mocking in tests)
pub trait TimeProvider: Send + Sync {
    /// Get current time in milliseconds since epoch
    fn now_millis(&self) -> i64;
}

/// System time provider (production)
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Manually driven clock
    pub struct MockTimeProvider {
        current_time: AtomicI64,
    }

    impl MockTimeProvider {
        pub fn new(current_time: i64) -> Self {
            Self {
                current_time: AtomicI64::new(current_time),
            }
        }
        pub fn set(&self, millis: i64) {
            self.current_time.store(millis, Ordering::SeqCst);
        }
        pub fn advance(&self, millis: i64) {
            self.current_time.fetch_add(millis, Ordering::SeqCst);
        }
    }

    impl TimeProvider for MockTimeProvider {
        fn now_millis(&self) -> i64 {
            self.current_time.load(Ordering::SeqCst)
        }
    }
}
