//! Daily API quota
//!
//! Counts requests per (date, provider). Dates are calendar days in the
//! configured UTC offset so the budget rolls over at local midnight.

use crate::error::{AppError, Result};
use crate::port::{ApiUsageRepository, TimeProvider};
use chrono::{DateTime, FixedOffset};
use std::sync::Arc;
use tracing::warn;

/// Quota check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaStatus {
    pub allowed: bool,
    pub current: i64,
    pub limit: i64,
    pub date: String,
}

/// Quota consume result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaConsumption {
    pub success: bool,
    pub current: i64,
    pub limit: i64,
}

pub struct QuotaService {
    usage: Arc<dyn ApiUsageRepository>,
    time_provider: Arc<dyn TimeProvider>,
    offset: FixedOffset,
    daily_limit: i64,
}

impl QuotaService {
    /// # Errors
    /// - AppError::Config if the offset is outside ±23 hours or the limit is not positive
    pub fn new(
        usage: Arc<dyn ApiUsageRepository>,
        time_provider: Arc<dyn TimeProvider>,
        utc_offset_hours: i32,
        daily_limit: i64,
    ) -> Result<Self> {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600).ok_or_else(|| {
            AppError::Config(format!("Invalid UTC offset: {} hours", utc_offset_hours))
        })?;
        if daily_limit <= 0 {
            return Err(AppError::Config(format!(
                "Daily quota must be positive, got {}",
                daily_limit
            )));
        }

        Ok(Self {
            usage,
            time_provider,
            offset,
            daily_limit,
        })
    }

    /// Today's date (YYYY-MM-DD) in the configured offset
    pub fn today(&self) -> String {
        let now = self.time_provider.now_millis();
        DateTime::from_timestamp_millis(now)
            .unwrap_or_default()
            .with_timezone(&self.offset)
            .format("%Y-%m-%d")
            .to_string()
    }

    pub async fn check(&self, provider: &str) -> Result<QuotaStatus> {
        let date = self.today();
        let current = self.usage.get_usage(&date, provider).await?;

        Ok(QuotaStatus {
            allowed: current < self.daily_limit,
            current,
            limit: self.daily_limit,
            date,
        })
    }

    /// Take one unit of quota if any is left
    pub async fn consume(&self, provider: &str) -> Result<QuotaConsumption> {
        let date = self.today();
        let before = self.usage.get_usage(&date, provider).await?;

        if before >= self.daily_limit {
            warn!(
                provider = %provider,
                current = before,
                limit = self.daily_limit,
                "Daily quota exhausted"
            );
            return Ok(QuotaConsumption {
                success: false,
                current: before,
                limit: self.daily_limit,
            });
        }

        let current = self.usage.increment_usage(&date, provider).await?;

        Ok(QuotaConsumption {
            success: true,
            current,
            limit: self.daily_limit,
        })
    }

    /// One-line human readable summary
    pub async fn status_line(&self, provider: &str) -> Result<String> {
        let status = self.check(provider).await?;
        let remaining = (status.limit - status.current).max(0);
        Ok(format!(
            "Google Books Quota: {}/{} used ({} remaining) [{}]",
            status.current, status.limit, remaining, status.date
        ))
    }
}
