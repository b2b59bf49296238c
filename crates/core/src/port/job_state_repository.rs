// Job State Repository Port

use crate::domain::JobRunState;
use crate::error::Result;
use async_trait::async_trait;

/// Per-job run bookkeeping used by the due scheduler.
/// Rows are created lazily on first touch.
#[async_trait]
pub trait JobStateRepository: Send + Sync {
    async fn find(&self, job_name: &str) -> Result<Option<JobRunState>>;

    /// Record the start of an attempt
    async fn set_last_run(&self, job_name: &str, at_millis: i64) -> Result<()>;

    /// Record a completed collection phase
    async fn set_last_success(&self, job_name: &str, at_millis: i64) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory job state store
    #[derive(Default)]
    pub struct InMemoryJobStateRepository {
        rows: Mutex<HashMap<String, JobRunState>>,
    }

    impl InMemoryJobStateRepository {
        pub fn new() -> Self {
            Self::default()
        }

        fn touch<F: FnOnce(&mut JobRunState)>(&self, job_name: &str, f: F) {
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .entry(job_name.to_string())
                .or_insert_with(|| JobRunState {
                    job_name: job_name.to_string(),
                    last_run_at: None,
                    last_success_at: None,
                });
            f(row);
        }
    }

    #[async_trait]
    impl JobStateRepository for InMemoryJobStateRepository {
        async fn find(&self, job_name: &str) -> Result<Option<JobRunState>> {
            Ok(self.rows.lock().unwrap().get(job_name).cloned())
        }

        async fn set_last_run(&self, job_name: &str, at_millis: i64) -> Result<()> {
            self.touch(job_name, |row| row.last_run_at = Some(at_millis));
            Ok(())
        }

        async fn set_last_success(&self, job_name: &str, at_millis: i64) -> Result<()> {
            self.touch(job_name, |row| row.last_success_at = Some(at_millis));
            Ok(())
        }
    }
}
