// Mail Transport Port (digest rendering + delivery)

use crate::domain::Book;
use async_trait::async_trait;
use thiserror::Error;

/// Mailer errors
#[derive(Error, Debug)]
pub enum MailerError {
    /// Required delivery settings are missing
    #[error("Mailer not configured: {0}")]
    NotConfigured(String),

    /// The transport refused or failed the send
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Mail transport trait
///
/// Renders the batch and hands it to the underlying transport.
/// Implementations:
/// - SmtpMailTransport: authenticated SMTP relay (infra-http)
/// - OutboxMailTransport: writes rendered messages to a directory (infra-http)
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Send one digest for the given batch
    ///
    /// # Errors
    /// - MailerError::NotConfigured if required settings are absent
    /// - MailerError::SendFailed if the transport rejects the message
    async fn send(&self, books: &[Book], job_label: &str) -> Result<(), MailerError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::Isbn13;
    use std::sync::{Arc, Mutex};

    /// Mock transport behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed
        Success,
        /// Always fail with message
        Fail(String),
        /// Report missing configuration
        NotConfigured,
    }

    /// Mock MailTransport that records what it was asked to send
    pub struct MockMailTransport {
        behavior: Arc<Mutex<MockBehavior>>,
        sent: Arc<Mutex<Vec<(String, Vec<Isbn13>)>>>,
    }

    impl MockMailTransport {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Arc::new(Mutex::new(behavior)),
                sent: Arc::new(Mutex::new(Vec::new())),
            }
        }
        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }
        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }
        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }
        /// (job label, ISBNs) for every successful send
        pub fn sent(&self) -> Vec<(String, Vec<Isbn13>)> {
            self.sent.lock().unwrap().clone()
        }
        pub fn send_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MailTransport for MockMailTransport {
        async fn send(&self, books: &[Book], job_label: &str) -> Result<(), MailerError> {
            let behavior = self.behavior.lock().unwrap().clone();

            match behavior {
                MockBehavior::Success => {
                    let isbns = books.iter().map(|b| b.isbn13.clone()).collect();
                    self.sent
                        .lock()
                        .unwrap()
                        .push((job_label.to_string(), isbns));
                    Ok(())
                }
                MockBehavior::Fail(msg) => Err(MailerError::SendFailed(msg)),
                MockBehavior::NotConfigured => {
                    Err(MailerError::NotConfigured("MAIL_TO must be set".to_string()))
                }
            }
        }
    }
}
