// Book Domain Model

use super::error::{DomainError, Result};
use super::isbn::Isbn13;
use serde::{Deserialize, Serialize};

/// Reference link attached to a book (e.g. catalog page, preview)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLink {
    pub label: String,
    pub url: String,
}

impl BookLink {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// Book as observed by a collector, before normalization
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookInput {
    /// Raw identifier as the source reported it (ISBN-10 or ISBN-13, any separators)
    pub isbn: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    #[serde(default)]
    pub links: Vec<BookLink>,
    pub source: String,
}

impl BookInput {
    pub fn new(isbn: impl Into<String>, title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            isbn: isbn.into(),
            title: title.into(),
            source: source.into(),
            ..Default::default()
        }
    }

    /// Validate the input and return its canonical key
    pub fn canonical_isbn(&self) -> Result<Isbn13> {
        let isbn13 =
            Isbn13::parse(&self.isbn).ok_or_else(|| DomainError::InvalidIsbn(self.isbn.clone()))?;

        if self.title.trim().is_empty() {
            return Err(DomainError::EmptyTitle {
                isbn13: isbn13.to_string(),
            });
        }

        Ok(isbn13)
    }
}

/// Persisted book record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub isbn13: Isbn13,
    pub title: String,
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub links: Vec<BookLink>,
    pub source: String,

    pub first_seen_at: i64, // epoch ms, immutable
    pub last_seen_at: i64,  // epoch ms
    /// None means the book is eligible for the next digest
    pub last_delivered_at: Option<i64>,
}

impl Book {
    /// Build a record for a book seen for the first time
    pub fn first_seen(isbn13: Isbn13, input: BookInput, now_millis: i64) -> Self {
        Self {
            isbn13,
            title: input.title,
            authors: input.authors,
            publisher: present(input.publisher),
            published_date: present(input.published_date),
            description: present(input.description),
            cover_url: present(input.cover_url),
            links: input.links,
            source: input.source,
            first_seen_at: now_millis,
            last_seen_at: now_millis,
            last_delivered_at: None,
        }
    }

    /// Merge a re-observation into an existing record.
    ///
    /// Present incoming values overwrite, absent or empty ones keep the
    /// existing value. The title is required on input and always wins.
    /// `first_seen_at`, `source` and `last_delivered_at` are never touched here.
    pub fn merged_with(self, incoming: BookInput, now_millis: i64) -> Self {
        Self {
            isbn13: self.isbn13,
            title: incoming.title,
            authors: non_empty(incoming.authors).unwrap_or(self.authors),
            publisher: present(incoming.publisher).or(self.publisher),
            published_date: present(incoming.published_date).or(self.published_date),
            description: present(incoming.description).or(self.description),
            cover_url: present(incoming.cover_url).or(self.cover_url),
            links: non_empty(incoming.links).unwrap_or(self.links),
            source: self.source,
            first_seen_at: self.first_seen_at,
            last_seen_at: now_millis,
            last_delivered_at: self.last_delivered_at,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.last_delivered_at.is_some()
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn non_empty<T>(values: Vec<T>) -> Option<Vec<T>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}
