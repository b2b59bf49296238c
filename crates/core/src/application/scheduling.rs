//! Due scheduler - decides whether a named job should run again
//!
//! A job is due when it has never succeeded, or when at least the configured
//! interval has passed since its last success. Failed attempts only move
//! `last_run_at`, so a failing job stays due.

use crate::error::Result;
use crate::port::{JobStateRepository, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Per-job due check backed by the job state table
pub struct DueScheduler {
    job_states: Arc<dyn JobStateRepository>,
    time_provider: Arc<dyn TimeProvider>,
    interval_ms: i64,
}

impl DueScheduler {
    pub fn new(
        job_states: Arc<dyn JobStateRepository>,
        time_provider: Arc<dyn TimeProvider>,
        interval: Duration,
    ) -> Self {
        Self {
            job_states,
            time_provider,
            interval_ms: i64::try_from(interval.as_millis()).unwrap_or(i64::MAX),
        }
    }

    /// Check if the job is due
    pub async fn is_due(&self, job_name: &str) -> Result<bool> {
        let last_success = self
            .job_states
            .find(job_name)
            .await?
            .and_then(|state| state.last_success_at);

        let Some(last_success) = last_success else {
            debug!(job = %job_name, "Job due: never succeeded");
            return Ok(true);
        };

        let now = self.time_provider.now_millis();
        let elapsed = now - last_success;
        let due = elapsed >= self.interval_ms;

        debug!(
            job = %job_name,
            elapsed_ms = elapsed,
            interval_ms = self.interval_ms,
            due = due,
            "Checked job due status"
        );
        Ok(due)
    }

    /// Record the start of an attempt
    pub async fn mark_run_started(&self, job_name: &str) -> Result<()> {
        let now = self.time_provider.now_millis();
        self.job_states.set_last_run(job_name, now).await
    }

    /// Record a completed collection phase
    pub async fn mark_run_succeeded(&self, job_name: &str) -> Result<()> {
        let now = self.time_provider.now_millis();
        self.job_states.set_last_success(job_name, now).await
    }
}
