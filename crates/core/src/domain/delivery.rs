// Delivery Domain Model

use super::isbn::Isbn13;
use serde::{Deserialize, Serialize};

/// Append-only audit entry written once a digest has been sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: i64,
    pub job_name: String,
    pub delivered_at: i64, // epoch ms
    pub isbn13_list: Vec<Isbn13>,
}

/// Which delivered books a reset returns to the undelivered pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetScope {
    /// Every book ever delivered under the named job
    Job(String),
    /// Books delivered within the trailing window of N days
    WithinDays(u32),
    /// Every delivered book
    All,
}

impl ResetScope {
    /// Build a scope from the mutually exclusive CLI selectors.
    /// The job name wins when both are given.
    pub fn from_selectors(job: Option<String>, since_days: Option<u32>) -> Self {
        match (job, since_days) {
            (Some(job), _) => ResetScope::Job(job),
            (None, Some(days)) => ResetScope::WithinDays(days),
            (None, None) => ResetScope::All,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ResetScope::Job(job) => format!("books delivered by job \"{}\"", job),
            ResetScope::WithinDays(days) => format!("books delivered in the last {} day(s)", days),
            ResetScope::All => "ALL delivered books".to_string(),
        }
    }
}

impl std::fmt::Display for ResetScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResetScope::Job(job) => write!(f, "job:{}", job),
            ResetScope::WithinDays(days) => write!(f, "since:{}d", days),
            ResetScope::All => write!(f, "all"),
        }
    }
}
