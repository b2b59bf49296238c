//! HTML digest rendering

use bookdigest_core::domain::Book;
use bookdigest_core::port::MailerError;
use chrono::{DateTime, FixedOffset, Utc};

const DESCRIPTION_PREVIEW_CHARS: usize = 300;
const UNKNOWN: &str = "Unknown";

/// Subject line plus HTML body of one digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDigest {
    pub subject: String,
    pub html: String,
}

/// Render the digest for `books`. `date_label` is the local calendar date
/// shown in the subject and header.
pub fn render_digest(books: &[Book], date_label: &str) -> RenderedDigest {
    let subject = format!(
        "[BookDigest] Book Digest for {} ({} books)",
        date_label,
        books.len()
    );

    let cards = if books.is_empty() {
        "<p style=\"text-align:center;color:#666;\">No books to report.</p>".to_string()
    } else {
        books.iter().map(render_card).collect::<String>()
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
</head>
<body style="margin:0;padding:0;font-family:-apple-system,'Segoe UI',Roboto,Arial,sans-serif;background:#f5f5f5;">
  <div style="max-width:640px;margin:0 auto;padding:20px;">
    <div style="background:#fff;border-radius:12px;padding:24px;">
      <header style="margin-bottom:24px;text-align:center;">
        <h1 style="margin:0;color:#1a73e8;font-size:26px;">Book Digest</h1>
        <p style="margin:8px 0 0 0;color:#5f6368;font-size:14px;">{date}</p>
        <p style="margin:4px 0 0 0;color:#5f6368;font-size:13px;">{count} books</p>
      </header>
      <main>
{cards}
      </main>
      <footer style="margin-top:32px;padding-top:20px;border-top:2px solid #e8eaed;text-align:center;">
        <p style="margin:0;font-size:12px;color:#3c4043;">Copy a research prompt into your assistant to get a detailed report.</p>
        <p style="margin:8px 0 0 0;font-size:11px;color:#9aa0a6;">Generated by bookdigest {version}</p>
      </footer>
    </div>
  </div>
</body>
</html>
"#,
        date = escape_html(date_label),
        count = books.len(),
        cards = cards,
        version = bookdigest_core::VERSION,
    );

    RenderedDigest { subject, html }
}

/// Epoch ms in the digest's configured UTC offset
pub(crate) fn local_time(
    millis: i64,
    utc_offset_hours: i32,
) -> Result<DateTime<FixedOffset>, MailerError> {
    let offset = FixedOffset::east_opt(utc_offset_hours * 3600).ok_or_else(|| {
        MailerError::NotConfigured(format!("Invalid UTC offset: {} hours", utc_offset_hours))
    })?;
    let now = DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default();
    Ok(now.with_timezone(&offset))
}

fn render_card(book: &Book) -> String {
    let authors = if book.authors.is_empty() {
        UNKNOWN.to_string()
    } else {
        book.authors.join(", ")
    };
    let publisher = book.publisher.as_deref().unwrap_or(UNKNOWN);
    let published_date = book.published_date.as_deref().unwrap_or(UNKNOWN);

    let mut card = String::new();
    card.push_str(
        "<div style=\"margin-bottom:24px;padding:18px;border:2px solid #e8eaed;border-radius:8px;\">\n",
    );

    if let Some(cover) = &book.cover_url {
        card.push_str(&format!(
            "<img src=\"{}\" alt=\"cover\" style=\"width:80px;height:auto;float:left;margin-right:16px;\">\n",
            escape_html(cover)
        ));
    }

    card.push_str(&format!(
        "<h3 style=\"margin:0 0 8px 0;color:#1a73e8;font-size:16px;\">{}</h3>\n",
        escape_html(&book.title)
    ));
    card.push_str(&format!(
        "<p style=\"margin:0 0 4px 0;font-size:13px;\"><strong>Authors:</strong> {}</p>\n",
        escape_html(&authors)
    ));
    card.push_str(&format!(
        "<p style=\"margin:0 0 4px 0;font-size:13px;\"><strong>Publisher:</strong> {} ({})</p>\n",
        escape_html(publisher),
        escape_html(published_date)
    ));
    card.push_str(&format!(
        "<p style=\"margin:0;font-size:12px;color:#5f6368;\"><strong>ISBN:</strong> {}</p>\n",
        book.isbn13
    ));

    if let Some(description) = book.description.as_deref().filter(|d| !d.is_empty()) {
        card.push_str(&format!(
            "<p style=\"clear:both;margin:12px 0 0 0;font-size:14px;line-height:1.6;\">{}</p>\n",
            escape_html(&truncate_description(description))
        ));
    }

    if !book.links.is_empty() {
        card.push_str("<div style=\"margin-top:12px;\">\n");
        for link in &book.links {
            card.push_str(&format!(
                "<a href=\"{}\" style=\"margin-right:12px;color:#1a73e8;font-size:12px;\">{}</a>\n",
                escape_html(&link.url),
                escape_html(&link.label)
            ));
        }
        card.push_str("</div>\n");
    }

    card.push_str(&format!(
        "<div style=\"margin-top:16px;padding:14px;background:#f5f5f5;border-radius:6px;\">\n\
         <p style=\"margin:0 0 8px 0;font-size:12px;font-weight:600;\">Research prompt:</p>\n\
         <pre style=\"margin:0;white-space:pre-wrap;font-size:11px;\">{}</pre>\n</div>\n",
        escape_html(&research_prompt(book, &authors, publisher, published_date))
    ));

    card.push_str("</div>\n");
    card
}

fn research_prompt(book: &Book, authors: &str, publisher: &str, published_date: &str) -> String {
    format!(
        "Write a summary report on the following book.\n\n\
         Title: {}\nAuthors: {}\nPublisher: {}\nPublished: {}\nISBN: {}\nDescription: {}",
        book.title,
        authors,
        publisher,
        published_date,
        book.isbn13,
        book.description.as_deref().unwrap_or("None"),
    )
}

/// First 300 characters, with "..." when anything was cut
fn truncate_description(description: &str) -> String {
    match description.char_indices().nth(DESCRIPTION_PREVIEW_CHARS) {
        Some((end, _)) => format!("{}...", &description[..end]),
        None => description.to_string(),
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookdigest_core::domain::{BookInput, BookLink, Isbn13};

    fn book(title: &str) -> Book {
        let mut input = BookInput::new("9780306406157", title, "test");
        input.links = vec![BookLink::new("Google Books", "https://example.com/?a=1&b=2")];
        Book::first_seen(Isbn13::parse("9780306406157").unwrap(), input, 0)
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#039;s&lt;/a&gt;"
        );
    }

    #[test]
    fn test_subject_and_escaped_card() {
        let digest = render_digest(&[book("<script>alert(1)</script>")], "2024-05-01");

        assert_eq!(digest.subject, "[BookDigest] Book Digest for 2024-05-01 (1 books)");
        assert!(digest.html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!digest.html.contains("<script>"));
        assert!(digest.html.contains("<strong>Authors:</strong> Unknown"));
        assert!(digest.html.contains("https://example.com/?a=1&amp;b=2"));
        assert!(digest.html.contains("ISBN:</strong> 9780306406157"));
        assert!(digest.html.contains("Research prompt:"));
    }

    #[test]
    fn test_empty_digest() {
        let digest = render_digest(&[], "2024-05-01");
        assert_eq!(digest.subject, "[BookDigest] Book Digest for 2024-05-01 (0 books)");
        assert!(digest.html.contains("No books to report."));
    }

    #[test]
    fn test_description_truncated_on_char_boundary() {
        let long = "é".repeat(350);
        let truncated = truncate_description(&long);
        assert_eq!(truncated.chars().count(), 303);
        assert!(truncated.ends_with("..."));

        assert_eq!(truncate_description("short"), "short");
        let exact = "a".repeat(300);
        assert_eq!(truncate_description(&exact), exact);
    }

    #[test]
    fn test_card_renders_every_field_in_order() {
        let mut input = BookInput::new("9780306406157", "Full", "test");
        input.authors = vec!["Ann".to_string(), "Bo".to_string()];
        input.publisher = Some("Press".to_string());
        input.published_date = Some("2020".to_string());
        input.description = Some("About things".to_string());
        input.cover_url = Some("https://example.com/c.jpg".to_string());
        input.links = vec![
            BookLink::new("Google Books", "https://example.com/info"),
            BookLink::new("Preview", "https://example.com/preview"),
        ];
        let book = Book::first_seen(Isbn13::parse("9780306406157").unwrap(), input, 0);

        let card = render_card(&book);
        let positions: Vec<usize> = [
            "<img src=\"https://example.com/c.jpg\"",
            ">Full</h3>",
            "<strong>Authors:</strong> Ann, Bo</p>",
            "<strong>Publisher:</strong> Press (2020)</p>",
            "<strong>ISBN:</strong> 9780306406157</p>",
            ">About things</p>",
            ">Google Books</a>",
            ">Preview</a>",
            "Research prompt:",
        ]
        .iter()
        .map(|needle| card.find(needle).unwrap_or_else(|| panic!("missing {needle}")))
        .collect();

        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{card}");
        assert!(card.ends_with("</div>\n</div>\n"));
    }
}
