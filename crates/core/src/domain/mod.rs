// Domain Layer - Pure business logic and entities

pub mod book;
pub mod delivery;
pub mod error;
pub mod isbn;
pub mod job_state;

// Re-exports
pub use book::{Book, BookInput, BookLink};
pub use delivery::{DeliveryRecord, ResetScope};
pub use error::DomainError;
pub use isbn::Isbn13;
pub use job_state::JobRunState;
