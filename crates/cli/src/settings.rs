//! Layered configuration
//!
//! Sources, later ones winning: built-in defaults, an optional TOML file
//! (`bookdigest.toml` in the working directory or `--config`), then
//! `BOOKDIGEST_*` environment variables (`__` separates nested keys, e.g.
//! `BOOKDIGEST_MAIL__TO` or `BOOKDIGEST_MAIL__SMTP__PASS`).

use anyhow::{bail, Context, Result};
use bookdigest_core::application::constants::{
    DEFAULT_DAILY_BOOKS_LIMIT, DEFAULT_FALLBACK_LIMIT, DEFAULT_MAIL_LIMIT, DEFAULT_MAX_PER_RUN,
    DEFAULT_UTC_OFFSET_HOURS,
};
use bookdigest_core::application::{JobSpec, RunDefaults};
use bookdigest_core::{AppError, Result as CoreResult};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "~/.bookdigest/app.db";
const DEFAULT_CONFIG_NAME: &str = "bookdigest";
const ENV_PREFIX: &str = "BOOKDIGEST";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: String,
    pub utc_offset_hours: i32,
    pub due_interval_hours: u64,
    pub defaults: DefaultSettings,
    pub jobs: Vec<JobSpec>,
    pub quota: QuotaSettings,
    pub google_books: GoogleBooksSettings,
    pub mail: MailSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DefaultSettings {
    pub mail_limit: u32,
    pub max_per_run: usize,
    pub fallback_limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotaSettings {
    pub daily_limit: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoogleBooksSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

/// Where digests go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailTransportKind {
    /// Authenticated SMTP relay
    #[default]
    Smtp,
    /// Message files in `mail.outbox_dir`
    Outbox,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    pub transport: MailTransportKind,
    pub outbox_dir: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub smtp: SmtpSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
            due_interval_hours: 3,
            defaults: DefaultSettings::default(),
            jobs: Vec::new(),
            quota: QuotaSettings::default(),
            google_books: GoogleBooksSettings::default(),
            mail: MailSettings::default(),
        }
    }
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            mail_limit: DEFAULT_MAIL_LIMIT,
            max_per_run: DEFAULT_MAX_PER_RUN,
            fallback_limit: DEFAULT_FALLBACK_LIMIT,
        }
    }
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            daily_limit: DEFAULT_DAILY_BOOKS_LIMIT,
        }
    }
}

impl Default for GoogleBooksSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://www.googleapis.com/books/v1".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 587,
            user: None,
            pass: None,
            timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Load and validate settings. An explicit `path` must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from TOML text (no environment layer)
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for job in &self.jobs {
            if job.name.trim().is_empty() {
                bail!("Job names must not be empty");
            }
            if !seen.insert(job.name.as_str()) {
                bail!("Duplicate job name: {}", job.name);
            }
            if job.max_per_run == Some(0) {
                bail!("jobs.{}.max_per_run must be positive", job.name);
            }
        }

        if self.defaults.mail_limit == 0 {
            bail!("defaults.mail_limit must be positive");
        }
        if self.defaults.max_per_run == 0 {
            bail!("defaults.max_per_run must be positive");
        }
        if self.defaults.fallback_limit == 0 {
            bail!("defaults.fallback_limit must be positive");
        }
        if self.quota.daily_limit <= 0 {
            bail!("quota.daily_limit must be positive");
        }
        if self.due_interval_hours == 0 {
            bail!("due_interval_hours must be positive");
        }
        self.due_interval()?;
        if self.mail.smtp.port == 0 {
            bail!("mail.smtp.port must be positive");
        }
        if !(-23..=23).contains(&self.utc_offset_hours) {
            bail!("utc_offset_hours must be between -23 and 23");
        }

        Ok(())
    }

    /// Database path with `~` expanded
    pub fn db_path(&self) -> PathBuf {
        expand(&self.db_path)
    }

    pub fn outbox_dir(&self) -> Option<PathBuf> {
        self.mail.outbox_dir.as_deref().map(expand)
    }

    pub fn due_interval(&self) -> CoreResult<Duration> {
        self.due_interval_hours
            .checked_mul(60 * 60)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                AppError::Config(format!(
                    "due_interval_hours is too large: {}",
                    self.due_interval_hours
                ))
            })
    }

    pub fn run_defaults(&self) -> RunDefaults {
        RunDefaults {
            mail_limit: self.defaults.mail_limit,
            fallback_limit: self.defaults.fallback_limit,
            max_per_run: self.defaults.max_per_run,
        }
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
