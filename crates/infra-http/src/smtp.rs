//! SMTP mail transport
//!
//! Sends the rendered digest through an authenticated relay. Port 465 uses
//! implicit TLS, every other port upgrades with STARTTLS.

use crate::render::{local_time, render_digest};
use async_trait::async_trait;
use bookdigest_core::application::constants::DEFAULT_UTC_OFFSET_HOURS;
use bookdigest_core::domain::Book;
use bookdigest_core::port::{MailTransport, MailerError, TimeProvider};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tracing::{debug, info};

const DEFAULT_HOST: &str = "smtp.gmail.com";
const DEFAULT_PORT: u16 = 587;
const IMPLICIT_TLS_PORT: u16 = 465;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    /// Sender address, the SMTP user when unset
    pub from: Option<String>,
    /// One or more comma separated recipients
    pub to: Option<String>,
    pub timeout: Duration,
    pub utc_offset_hours: i32,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: None,
            pass: None,
            from: None,
            to: None,
            timeout: DEFAULT_TIMEOUT,
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
        }
    }
}

/// Credentials and recipients of a validated configuration
#[derive(Debug, Clone, Copy)]
pub struct SmtpAccount<'a> {
    pub user: &'a str,
    pub pass: &'a str,
    pub to: &'a str,
}

pub struct SmtpMailTransport {
    config: SmtpConfig,
    time_provider: Arc<dyn TimeProvider>,
}

impl SmtpMailTransport {
    pub fn new(config: SmtpConfig, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            config,
            time_provider,
        }
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Check that user, password and recipient are all set
    pub fn validate(&self) -> Result<SmtpAccount<'_>, MailerError> {
        let user = present(self.config.user.as_deref());
        let pass = present(self.config.pass.as_deref());
        let to = present(self.config.to.as_deref());

        match (user, pass, to) {
            (Some(user), Some(pass), Some(to)) => Ok(SmtpAccount { user, pass, to }),
            _ => Err(MailerError::NotConfigured(
                "mail.smtp.user, mail.smtp.pass and mail.to must be set".to_string(),
            )),
        }
    }

    fn build_message(
        &self,
        books: &[Book],
        account: SmtpAccount<'_>,
    ) -> Result<Message, MailerError> {
        let millis = self.time_provider.now_millis();
        let now = local_time(millis, self.config.utc_offset_hours)?;
        let digest = render_digest(books, &now.format("%Y-%m-%d").to_string());

        let from = self.config.from.as_deref().unwrap_or(account.user);
        let mut builder = Message::builder()
            .from(parse_mailbox(from)?)
            .subject(digest.subject)
            .date(UNIX_EPOCH + Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
            .header(ContentType::TEXT_HTML);

        let mut recipients = 0;
        for address in account.to.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            builder = builder.to(parse_mailbox(address)?);
            recipients += 1;
        }
        if recipients == 0 {
            return Err(MailerError::NotConfigured("mail.to has no recipients".to_string()));
        }

        builder
            .body(digest.html)
            .map_err(|e| MailerError::SendFailed(format!("Cannot build message: {}", e)))
    }

    fn relay(
        &self,
        account: SmtpAccount<'_>,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailerError> {
        let builder = if self.config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
        }
        .map_err(|e| {
            MailerError::NotConfigured(format!("Invalid SMTP host {}: {}", self.config.host, e))
        })?;

        Ok(builder
            .port(self.config.port)
            .credentials(Credentials::new(
                account.user.to_string(),
                account.pass.to_string(),
            ))
            .timeout(Some(self.config.timeout))
            .build())
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, books: &[Book], job_label: &str) -> Result<(), MailerError> {
        let account = self.validate()?;
        let message = self.build_message(books, account)?;
        let relay = self.relay(account)?;

        debug!(
            host = %self.config.host,
            port = self.config.port,
            job = %job_label,
            "Sending digest over SMTP"
        );

        relay.send(message).await.map_err(|e| {
            MailerError::SendFailed(format!(
                "SMTP relay {}:{} failed: {}",
                self.config.host, self.config.port, e
            ))
        })?;

        info!(
            to = %account.to,
            books = books.len(),
            job = %job_label,
            "Digest sent"
        );
        Ok(())
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailerError> {
    address
        .parse()
        .map_err(|e| MailerError::NotConfigured(format!("Invalid address {}: {}", address, e)))
}
