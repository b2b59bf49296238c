// Book Digest Infrastructure - SQLite Adapter
// Implements: BookRepository, TransactionalBookRepository, JobStateRepository,
// ApiUsageRepository, Maintenance

mod api_usage_repository;
mod book_repository;
mod connection;
mod error;
mod job_state_repository;
mod maintenance_impl;
mod migration;
mod store;
mod transaction;

pub use api_usage_repository::SqliteApiUsageRepository;
pub use book_repository::SqliteBookRepository;
pub use connection::{create_file_pool, create_pool};
pub use job_state_repository::SqliteJobStateRepository;
pub use maintenance_impl::SqliteMaintenance;
pub use migration::run_migrations;
pub use store::SqliteStore;
pub use transaction::SqliteBookTransaction;

// Note: sqlx::Error conversion is handled by `error::map_sqlx_error`
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
