//! Outbox mail transport
//!
//! Renders the digest and writes it as a standalone RFC 822 style message
//! file into a directory, one file per send. A relay or the operator picks
//! the files up from there.

use crate::render::{local_time, render_digest};
use async_trait::async_trait;
use bookdigest_core::domain::Book;
use bookdigest_core::port::{MailTransport, MailerError, TimeProvider};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

const DEFAULT_FROM: &str = "bookdigest@localhost";

#[derive(Debug, Clone, Default)]
pub struct OutboxConfig {
    pub outbox_dir: Option<PathBuf>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub utc_offset_hours: i32,
}

pub struct OutboxMailTransport {
    config: OutboxConfig,
    time_provider: Arc<dyn TimeProvider>,
}

impl OutboxMailTransport {
    pub fn new(config: OutboxConfig, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            config,
            time_provider,
        }
    }

    /// Check that every required setting is present
    pub fn validate(&self) -> Result<(&Path, &str), MailerError> {
        let dir = self
            .config
            .outbox_dir
            .as_deref()
            .ok_or_else(|| MailerError::NotConfigured("mail.outbox_dir must be set".to_string()))?;
        let to = self
            .config
            .to
            .as_deref()
            .filter(|to| !to.trim().is_empty())
            .ok_or_else(|| MailerError::NotConfigured("mail.to must be set".to_string()))?;
        Ok((dir, to))
    }
}

#[async_trait]
impl MailTransport for OutboxMailTransport {
    async fn send(&self, books: &[Book], job_label: &str) -> Result<(), MailerError> {
        let (dir, to) = self.validate()?;
        let from = self.config.from.as_deref().unwrap_or(DEFAULT_FROM);
        let now = local_time(self.time_provider.now_millis(), self.config.utc_offset_hours)?;

        let digest = render_digest(books, &now.format("%Y-%m-%d").to_string());
        let message = format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\nMIME-Version: 1.0\r\n\
             Content-Type: text/html; charset=UTF-8\r\n\r\n{}",
            from,
            to,
            digest.subject,
            now.to_rfc2822(),
            digest.html
        );

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| MailerError::SendFailed(format!("Cannot create outbox: {}", e)))?;

        let stem = format!(
            "digest-{}-{}",
            now.format("%Y%m%dT%H%M%S%3f"),
            sanitize(job_label)
        );
        let path = write_new(dir, &stem, message.as_bytes()).await?;

        info!(
            path = %path.display(),
            to = %to,
            books = books.len(),
            "Digest written to outbox"
        );
        Ok(())
    }
}

/// Write to `<stem>.eml`, adding a counter when that name is taken
async fn write_new(dir: &Path, stem: &str, contents: &[u8]) -> Result<PathBuf, MailerError> {
    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            format!("{}.eml", stem)
        } else {
            format!("{}-{}.eml", stem, attempt)
        };
        let path = dir.join(name);

        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => {
                finish_message(file, &path, contents).await?;
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => {
                return Err(MailerError::SendFailed(format!(
                    "Cannot create {}: {}",
                    path.display(),
                    e
                )))
            }
        }
    }
}

/// Write the whole message or remove the file again
async fn finish_message<W>(mut file: W, path: &Path, contents: &[u8]) -> Result<(), MailerError>
where
    W: AsyncWrite + Unpin,
{
    let written = match file.write_all(contents).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    drop(file);

    if let Err(e) = written {
        if let Err(remove_err) = tokio::fs::remove_file(path).await {
            warn!(
                path = %path.display(),
                error = %remove_err,
                "Failed to remove partial outbox message"
            );
        }
        return Err(MailerError::SendFailed(format!("Write failed: {}", e)));
    }
    Ok(())
}

fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
