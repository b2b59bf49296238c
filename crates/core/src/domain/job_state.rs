// Job Run State (scheduling bookkeeping)

use serde::{Deserialize, Serialize};

/// One row per named collection job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRunState {
    pub job_name: String,
    pub last_run_at: Option<i64>,     // epoch ms, set at every attempt
    pub last_success_at: Option<i64>, // epoch ms, set only on success
}
