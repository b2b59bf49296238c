// Book Digest Infrastructure - External Adapters
// Implements: Collector (Google Books), MailTransport (SMTP relay, outbox directory)

mod google_books;
mod outbox;
mod render;
mod smtp;

pub use google_books::{GoogleBooksCollector, GoogleBooksConfig, GOOGLE_BOOKS_SOURCE};
pub use outbox::{OutboxConfig, OutboxMailTransport};
pub use render::{escape_html, render_digest, RenderedDigest};
pub use smtp::{SmtpAccount, SmtpConfig, SmtpMailTransport};
