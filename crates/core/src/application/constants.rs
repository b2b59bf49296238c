// Application constants (no magic values)
use std::time::Duration;

/// Minimum time between successful runs of the same job (3 hours)
pub const DEFAULT_DUE_INTERVAL: Duration = Duration::from_secs(3 * 60 * 60);

/// Maximum undelivered books per digest
pub const DEFAULT_MAIL_LIMIT: u32 = 10;

/// Maximum recent books in a fallback digest
pub const DEFAULT_FALLBACK_LIMIT: u32 = 5;

/// Maximum books a job collects per run
pub const DEFAULT_MAX_PER_RUN: usize = 20;

/// Job label recorded for the digest sent after all due jobs ran
pub const COMBINED_JOB_LABEL: &str = "combined";

/// Provider key for the Google Books quota counter
pub const GOOGLE_BOOKS_PROVIDER: &str = "google_books";

/// Default daily Google Books request budget
pub const DEFAULT_DAILY_BOOKS_LIMIT: i64 = 100;

/// Default display/quota timezone offset (UTC+9)
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 9;

pub const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;
