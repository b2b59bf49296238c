// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid ISBN: {0}")]
    InvalidIsbn(String),

    #[error("Book {isbn13} has an empty title")]
    EmptyTitle { isbn13: String },
}

pub type Result<T> = std::result::Result<T, DomainError>;
