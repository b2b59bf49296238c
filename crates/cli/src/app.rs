//! Composition root: builds the store, adapters and services from settings

use crate::settings::{MailTransportKind, Settings};
use anyhow::{Context, Result};
use bookdigest_core::application::{DeliveryService, DueScheduler, QuotaService, RunDueService};
use bookdigest_core::port::time_provider::SystemTimeProvider;
use bookdigest_core::port::{MailTransport, MailerError, TimeProvider};
use bookdigest_infra_http::{
    GoogleBooksCollector, GoogleBooksConfig, OutboxConfig, OutboxMailTransport, SmtpConfig,
    SmtpMailTransport,
};
use bookdigest_infra_sqlite::SqliteStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct App {
    pub settings: Settings,
    pub store: SqliteStore,
    pub time_provider: Arc<dyn TimeProvider>,
}

impl App {
    pub async fn open(settings: Settings) -> Result<Self> {
        Self::open_with_clock(settings, Arc::new(SystemTimeProvider)).await
    }

    pub async fn open_with_clock(
        settings: Settings,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        let db_path = settings.db_path();
        debug!(db_path = %db_path.display(), "Opening store");

        let store = SqliteStore::open(&db_path, Arc::clone(&time_provider))
            .await
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

        Ok(Self {
            settings,
            store,
            time_provider,
        })
    }

    pub fn quota(&self) -> Result<Arc<QuotaService>> {
        let quota = QuotaService::new(
            self.store.api_usage(),
            Arc::clone(&self.time_provider),
            self.settings.utc_offset_hours,
            self.settings.quota.daily_limit,
        )
        .context("Invalid quota settings")?;
        Ok(Arc::new(quota))
    }

    pub fn mail_backend(&self) -> MailBackend {
        MailBackend::from_settings(&self.settings, Arc::clone(&self.time_provider))
    }

    pub fn run_due_service(&self) -> Result<RunDueService> {
        let google = &self.settings.google_books;
        let collector = GoogleBooksCollector::new(
            GoogleBooksConfig {
                base_url: google.base_url.clone(),
                api_key: google.api_key.clone(),
                timeout: Duration::from_secs(google.timeout_secs),
            },
            self.quota()?,
        )?;

        let books = self.store.books();
        let scheduler = Arc::new(DueScheduler::new(
            self.store.job_states(),
            Arc::clone(&self.time_provider),
            self.settings.due_interval()?,
        ));
        let delivery = Arc::new(DeliveryService::new(
            self.mail_backend().into_transport(),
            books.clone(),
        ));

        Ok(RunDueService::new(
            books,
            scheduler,
            Arc::new(collector),
            delivery,
            self.settings.run_defaults(),
        ))
    }
}

/// Mail transport chosen by `mail.transport`
pub enum MailBackend {
    Smtp(SmtpMailTransport),
    Outbox(OutboxMailTransport),
}

impl MailBackend {
    pub fn from_settings(settings: &Settings, time_provider: Arc<dyn TimeProvider>) -> Self {
        let mail = &settings.mail;
        match mail.transport {
            MailTransportKind::Smtp => Self::Smtp(SmtpMailTransport::new(
                SmtpConfig {
                    host: mail.smtp.host.clone(),
                    port: mail.smtp.port,
                    user: mail.smtp.user.clone(),
                    pass: mail.smtp.pass.clone(),
                    from: mail.from.clone(),
                    to: mail.to.clone(),
                    timeout: Duration::from_secs(mail.smtp.timeout_secs),
                    utc_offset_hours: settings.utc_offset_hours,
                },
                time_provider,
            )),
            MailTransportKind::Outbox => Self::Outbox(OutboxMailTransport::new(
                OutboxConfig {
                    outbox_dir: settings.outbox_dir(),
                    from: mail.from.clone(),
                    to: mail.to.clone(),
                    utc_offset_hours: settings.utc_offset_hours,
                },
                time_provider,
            )),
        }
    }

    /// Where digests will go, or why they cannot be sent
    pub fn check(&self) -> Result<String, MailerError> {
        match self {
            Self::Smtp(smtp) => smtp.validate().map(|account| {
                format!(
                    "mail to {} via SMTP {}:{}",
                    account.to,
                    smtp.host(),
                    smtp.port()
                )
            }),
            Self::Outbox(outbox) => outbox
                .validate()
                .map(|(dir, to)| format!("mail to {} via outbox {}", to, dir.display())),
        }
    }

    pub fn into_transport(self) -> Arc<dyn MailTransport> {
        match self {
            Self::Smtp(smtp) => Arc::new(smtp),
            Self::Outbox(outbox) => Arc::new(outbox),
        }
    }
}
