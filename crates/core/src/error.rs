// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Collector error: {0}")]
    Collector(#[from] crate::port::CollectorError),

    #[error("Mailer error: {0}")]
    Mailer(#[from] crate::port::MailerError),

    /// The digest went out but the delivery bookkeeping did not commit.
    /// Nothing rolls back a sent mail, so an operator has to reconcile.
    #[error("Delivery inconsistency for job {job} ({count} books sent but not recorded): {reason}")]
    DeliveryInconsistency {
        job: String,
        count: usize,
        reason: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True when the error is a rejected identifier rather than a fault
    pub fn is_invalid_identifier(&self) -> bool {
        matches!(
            self,
            AppError::Domain(crate::domain::DomainError::InvalidIsbn(_))
        )
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

