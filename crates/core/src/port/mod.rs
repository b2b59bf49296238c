// Port Layer - Interfaces for external dependencies

pub mod api_usage_repository;
pub mod book_repository;
pub mod collector;
pub mod job_state_repository;
pub mod mail_transport;
pub mod maintenance;
pub mod time_provider;
pub mod transaction;

// Re-exports
pub use api_usage_repository::ApiUsageRepository;
pub use book_repository::BookRepository;
pub use collector::{Collector, CollectorError, CollectorQueryResult, CollectorResult};
pub use job_state_repository::JobStateRepository;
pub use mail_transport::{MailTransport, MailerError};
pub use maintenance::{Maintenance, StoreStats};
pub use time_provider::TimeProvider;
pub use transaction::{BookRepositoryTransaction, Transaction, TransactionalBookRepository};
