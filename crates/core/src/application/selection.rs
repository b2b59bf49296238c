//! Selection policy - picks the books for the next digest
//!
//! Undelivered books come first. When none are left, the most recently seen
//! books are offered again so a digest is never empty while the store has data.

use crate::domain::Book;
use crate::error::Result;
use crate::port::BookRepository;
use tracing::{debug, info};

/// Books chosen for one digest
#[derive(Debug, Clone)]
pub struct Selection {
    pub books: Vec<Book>,
    /// True when the batch is a recap of recent books rather than new ones
    pub is_fallback: bool,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

/// Select books for delivery
///
/// # Arguments
/// * `books` - Book repository
/// * `mail_limit` - Cap on undelivered books
/// * `fallback_limit` - Cap on recent books when nothing is undelivered
pub async fn select_for_delivery(
    books: &dyn BookRepository,
    mail_limit: u32,
    fallback_limit: u32,
) -> Result<Selection> {
    let undelivered = books.list_undelivered(mail_limit).await?;

    if !undelivered.is_empty() {
        info!(count = undelivered.len(), "Selected undelivered books");
        return Ok(Selection {
            books: undelivered,
            is_fallback: false,
        });
    }

    debug!(fallback_limit = fallback_limit, "No undelivered books, using fallback");
    let recent = books.list_recent(fallback_limit).await?;
    info!(count = recent.len(), "Selected recent books (fallback)");

    Ok(Selection {
        books: recent,
        is_fallback: true,
    })
}
