// SQLite BookRepository Implementation

use crate::error::map_sqlx_error;
use crate::SqliteBookTransaction;
use async_trait::async_trait;
use bookdigest_core::application::constants::MILLIS_PER_DAY;
use bookdigest_core::domain::{Book, BookInput, BookLink, DeliveryRecord, Isbn13, ResetScope};
use bookdigest_core::error::{AppError, Result};
use bookdigest_core::port::{
    BookRepository, BookRepositoryTransaction, TimeProvider, TransactionalBookRepository,
};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Keeps IN (...) lists well under SQLite's bound-parameter limit
const RESET_CHUNK_SIZE: usize = 500;

pub struct SqliteBookRepository {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteBookRepository {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl BookRepository for SqliteBookRepository {
    async fn upsert(&self, input: BookInput) -> Result<Book> {
        let isbn13 = input.canonical_isbn()?;
        let now = self.time_provider.now_millis();

        // Existence check and write share one transaction
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let existing = sqlx::query_as::<_, BookRow>("SELECT * FROM books WHERE isbn13 = ?")
            .bind(isbn13.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let book = match existing {
            Some(row) => {
                let merged = row.into_book()?.merged_with(input, now);
                update_book(&mut tx, &merged).await?;
                debug!(isbn13 = %merged.isbn13, "Merged existing book");
                merged
            }
            None => {
                let book = Book::first_seen(isbn13, input, now);
                insert_book(&mut tx, &book).await?;
                debug!(isbn13 = %book.isbn13, "Inserted new book");
                book
            }
        };

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(book)
    }

    async fn find_by_isbn(&self, isbn13: &Isbn13) -> Result<Option<Book>> {
        let row = sqlx::query_as::<_, BookRow>("SELECT * FROM books WHERE isbn13 = ?")
            .bind(isbn13.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(BookRow::into_book).transpose()
    }

    async fn list_undelivered(&self, limit: u32) -> Result<Vec<Book>> {
        // rowid keeps insertion order for equal timestamps
        let rows: Vec<BookRow> = sqlx::query_as(
            r#"
            SELECT * FROM books
            WHERE last_delivered_at IS NULL
            ORDER BY first_seen_at DESC, rowid ASC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(BookRow::into_book).collect()
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<Book>> {
        let rows: Vec<BookRow> = sqlx::query_as(
            r#"
            SELECT * FROM books
            ORDER BY last_seen_at DESC, rowid ASC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(BookRow::into_book).collect()
    }

    async fn mark_delivered(&self, isbns: &[Isbn13]) -> Result<u64> {
        let now = self.time_provider.now_millis();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let marked = mark_delivered_in(&mut tx, isbns, now).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(marked)
    }

    async fn record_delivery(&self, job_name: &str, isbns: &[Isbn13]) -> Result<DeliveryRecord> {
        let now = self.time_provider.now_millis();
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        insert_delivery(&mut conn, job_name, isbns, now).await
    }

    async fn find_deliveries_by_job(&self, job_name: &str) -> Result<Vec<DeliveryRecord>> {
        let rows: Vec<DeliveryRow> = sqlx::query_as(
            r#"
            SELECT * FROM book_deliveries
            WHERE job_name = ?
            ORDER BY id ASC
            "#,
        )
        .bind(job_name)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(DeliveryRow::into_record).collect()
    }

    async fn reset_delivered(&self, scope: &ResetScope) -> Result<u64> {
        match scope {
            ResetScope::Job(job_name) => self.reset_by_job(job_name).await,
            ResetScope::WithinDays(days) => {
                // Window is measured in UTC epoch ms from the injected clock
                let cutoff = self.time_provider.now_millis() - i64::from(*days) * MILLIS_PER_DAY;
                let result = sqlx::query(
                    r#"
                    UPDATE books SET last_delivered_at = NULL
                    WHERE last_delivered_at IS NOT NULL AND last_delivered_at >= ?
                    "#,
                )
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

                Ok(result.rows_affected())
            }
            ResetScope::All => {
                let result = sqlx::query(
                    "UPDATE books SET last_delivered_at = NULL WHERE last_delivered_at IS NOT NULL",
                )
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

                Ok(result.rows_affected())
            }
        }
    }

    async fn count_all(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn count_undelivered(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM books WHERE last_delivered_at IS NULL")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

impl SqliteBookRepository {
    /// Union every ISBN ever delivered under the job and clear exactly that set
    async fn reset_by_job(&self, job_name: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let lists: Vec<String> =
            sqlx::query_scalar("SELECT isbn13_list_json FROM book_deliveries WHERE job_name = ?")
                .bind(job_name)
                .fetch_all(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

        let mut isbns = BTreeSet::new();
        for list in lists {
            let parsed: Vec<String> = serde_json::from_str(&list)?;
            isbns.extend(parsed);
        }

        if isbns.is_empty() {
            debug!(job = %job_name, "No deliveries recorded for job");
            return Ok(0);
        }

        let isbns: Vec<String> = isbns.into_iter().collect();
        let mut changed = 0;
        for chunk in isbns.chunks(RESET_CHUNK_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "UPDATE books SET last_delivered_at = NULL \
                 WHERE last_delivered_at IS NOT NULL AND isbn13 IN (",
            );
            let mut separated = qb.separated(", ");
            for isbn in chunk {
                separated.push_bind(isbn.clone());
            }
            separated.push_unseparated(")");

            let result = qb
                .build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            changed += result.rows_affected();
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(changed)
    }
}

#[async_trait]
impl TransactionalBookRepository for SqliteBookRepository {
    async fn begin_transaction(&self) -> Result<Box<dyn BookRepositoryTransaction>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(SqliteBookTransaction::new(
            tx,
            Arc::clone(&self.time_provider),
        )))
    }
}

// ============================================================================
// Statements shared with SqliteBookTransaction
// ============================================================================

async fn insert_book(conn: &mut SqliteConnection, book: &Book) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO books (
            isbn13, title, authors_json, publisher, published_date,
            description, cover_url, links_json, source,
            first_seen_at, last_seen_at, last_delivered_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(book.isbn13.as_str())
    .bind(&book.title)
    .bind(authors_json(book)?)
    .bind(&book.publisher)
    .bind(&book.published_date)
    .bind(&book.description)
    .bind(&book.cover_url)
    .bind(links_json(book)?)
    .bind(&book.source)
    .bind(book.first_seen_at)
    .bind(book.last_seen_at)
    .bind(book.last_delivered_at)
    .execute(conn)
    .await
    .map_err(map_sqlx_error)?;

    Ok(())
}

/// Writes the merged field set. `first_seen_at`, `source` and
/// `last_delivered_at` are not part of the statement.
async fn update_book(conn: &mut SqliteConnection, book: &Book) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE books
        SET title = ?, authors_json = ?, publisher = ?, published_date = ?,
            description = ?, cover_url = ?, links_json = ?, last_seen_at = ?
        WHERE isbn13 = ?
        "#,
    )
    .bind(&book.title)
    .bind(authors_json(book)?)
    .bind(&book.publisher)
    .bind(&book.published_date)
    .bind(&book.description)
    .bind(&book.cover_url)
    .bind(links_json(book)?)
    .bind(book.last_seen_at)
    .bind(book.isbn13.as_str())
    .execute(conn)
    .await
    .map_err(map_sqlx_error)?;

    Ok(())
}

pub(crate) async fn mark_delivered_in(
    conn: &mut SqliteConnection,
    isbns: &[Isbn13],
    now: i64,
) -> Result<u64> {
    let mut marked = 0;
    for isbn in isbns {
        let result = sqlx::query("UPDATE books SET last_delivered_at = ? WHERE isbn13 = ?")
            .bind(now)
            .bind(isbn.as_str())
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        marked += result.rows_affected();
    }
    Ok(marked)
}

pub(crate) async fn insert_delivery(
    conn: &mut SqliteConnection,
    job_name: &str,
    isbns: &[Isbn13],
    now: i64,
) -> Result<DeliveryRecord> {
    let list_json = serde_json::to_string(isbns)?;

    let result = sqlx::query(
        r#"
        INSERT INTO book_deliveries (job_name, delivered_at, isbn13_list_json)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(job_name)
    .bind(now)
    .bind(&list_json)
    .execute(conn)
    .await
    .map_err(map_sqlx_error)?;

    Ok(DeliveryRecord {
        id: result.last_insert_rowid(),
        job_name: job_name.to_string(),
        delivered_at: now,
        isbn13_list: isbns.to_vec(),
    })
}

fn authors_json(book: &Book) -> Result<Option<String>> {
    if book.authors.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(&book.authors)?))
}

fn links_json(book: &Book) -> Result<Option<String>> {
    if book.links.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(&book.links)?))
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct BookRow {
    isbn13: String,
    title: String,
    authors_json: Option<String>,
    publisher: Option<String>,
    published_date: Option<String>,
    description: Option<String>,
    cover_url: Option<String>,
    links_json: Option<String>,
    source: String,
    first_seen_at: i64,
    last_seen_at: i64,
    last_delivered_at: Option<i64>,
}

impl BookRow {
    fn into_book(self) -> Result<Book> {
        let isbn13 = Isbn13::parse(&self.isbn13).ok_or_else(|| {
            AppError::Database(format!("Stored ISBN is not canonical: {}", self.isbn13))
        })?;

        // Malformed JSON columns degrade to empty lists rather than hiding the book
        let authors: Vec<String> = self
            .authors_json
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        let links: Vec<BookLink> = self
            .links_json
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();

        Ok(Book {
            isbn13,
            title: self.title,
            authors,
            publisher: self.publisher,
            published_date: self.published_date,
            description: self.description,
            cover_url: self.cover_url,
            links,
            source: self.source,
            first_seen_at: self.first_seen_at,
            last_seen_at: self.last_seen_at,
            last_delivered_at: self.last_delivered_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeliveryRow {
    id: i64,
    job_name: String,
    delivered_at: i64,
    isbn13_list_json: String,
}

impl DeliveryRow {
    fn into_record(self) -> Result<DeliveryRecord> {
        let isbn13_list: Vec<Isbn13> = serde_json::from_str(&self.isbn13_list_json)?;
        Ok(DeliveryRecord {
            id: self.id,
            job_name: self.job_name,
            delivered_at: self.delivered_at,
            isbn13_list,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use bookdigest_core::domain::DomainError;
    use bookdigest_core::port::time_provider::mocks::MockTimeProvider;

    const T0: i64 = 1_700_000_000_000;

    async fn setup() -> (SqliteBookRepository, Arc<MockTimeProvider>) {
        let pool = create_pool(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let clock = Arc::new(MockTimeProvider::new(T0));
        (SqliteBookRepository::new(pool, clock.clone()), clock)
    }

    fn input(isbn: &str, title: &str) -> BookInput {
        BookInput::new(isbn, title, "google_books")
    }

    fn isbn(raw: &str) -> Isbn13 {
        Isbn13::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_inserts_new_book() {
        let (repo, _) = setup().await;

        let mut book = input("978-4-06-519981-7", "Title");
        book.authors = vec!["Author".to_string()];
        book.links = vec![BookLink::new("Google Books", "https://example.com/b")];

        let stored = repo.upsert(book).await.unwrap();
        assert_eq!(stored.isbn13.as_str(), "9784065199817");
        assert_eq!(stored.first_seen_at, T0);
        assert_eq!(stored.last_delivered_at, None);

        let found = repo.find_by_isbn(&stored.isbn13).await.unwrap().unwrap();
        assert_eq!(found, stored);
        assert_eq!(repo.count_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_isbn10_and_isbn13_are_same_book() {
        let (repo, _) = setup().await;

        repo.upsert(input("0306406152", "Ten")).await.unwrap();
        repo.upsert(input("9780306406157", "Thirteen")).await.unwrap();

        assert_eq!(repo.count_all().await.unwrap(), 1);
        let found = repo.find_by_isbn(&isbn("9780306406157")).await.unwrap().unwrap();
        assert_eq!(found.title, "Thirteen");
    }

    #[tokio::test]
    async fn test_upsert_merge_keeps_absent_fields_and_delivery() {
        let (repo, clock) = setup().await;

        let mut first = input("9780306406157", "Old");
        first.publisher = Some("Publisher".to_string());
        first.description = Some("Desc".to_string());
        repo.upsert(first).await.unwrap();
        repo.mark_delivered(&[isbn("9780306406157")]).await.unwrap();

        clock.advance(5_000);
        let mut second = BookInput::new("9780306406157", "New", "other_source");
        second.description = Some("".to_string());
        let merged = repo.upsert(second).await.unwrap();

        assert_eq!(merged.title, "New");
        assert_eq!(merged.publisher.as_deref(), Some("Publisher"));
        assert_eq!(merged.description.as_deref(), Some("Desc"));
        assert_eq!(merged.source, "google_books");
        assert_eq!(merged.first_seen_at, T0);
        assert_eq!(merged.last_seen_at, T0 + 5_000);
        assert_eq!(merged.last_delivered_at, Some(T0));

        let found = repo.find_by_isbn(&merged.isbn13).await.unwrap().unwrap();
        assert_eq!(found, merged);
    }

    #[tokio::test]
    async fn test_upsert_rejects_invalid_input() {
        let (repo, _) = setup().await;

        let err = repo.upsert(input("12345", "Title")).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InvalidIsbn(_))));

        let err = repo.upsert(input("9780306406157", "  ")).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::EmptyTitle { .. })));

        assert_eq!(repo.count_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_undelivered_newest_first_with_insertion_tiebreak() {
        let (repo, clock) = setup().await;

        repo.upsert(input("9780000000001", "A")).await.unwrap();
        repo.upsert(input("9780000000002", "B")).await.unwrap();
        clock.advance(1_000);
        repo.upsert(input("9780000000003", "C")).await.unwrap();

        let books = repo.list_undelivered(10).await.unwrap();
        let titles: Vec<&str> = books.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "A", "B"]);

        let limited = repo.list_undelivered(2).await.unwrap();
        assert_eq!(limited.len(), 2);

        repo.mark_delivered(&[isbn("9780000000003")]).await.unwrap();
        let books = repo.list_undelivered(10).await.unwrap();
        assert_eq!(books.len(), 2);
        assert!(books.iter().all(|b| !b.is_delivered()));
    }

    #[tokio::test]
    async fn test_list_recent_orders_by_last_seen() {
        let (repo, clock) = setup().await;

        repo.upsert(input("9780000000001", "A")).await.unwrap();
        clock.advance(1_000);
        repo.upsert(input("9780000000002", "B")).await.unwrap();
        clock.advance(1_000);
        // Re-observation moves A to the front
        repo.upsert(input("9780000000001", "A2")).await.unwrap();

        let books = repo.list_recent(5).await.unwrap();
        let titles: Vec<&str> = books.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["A2", "B"]);
    }

    #[tokio::test]
    async fn test_mark_delivered_ignores_unknown_isbn() {
        let (repo, _) = setup().await;
        repo.upsert(input("9780000000001", "A")).await.unwrap();

        let marked = repo
            .mark_delivered(&[isbn("9780000000001"), isbn("9789999999999")])
            .await
            .unwrap();
        assert_eq!(marked, 1);
        assert_eq!(repo.count_undelivered().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_record_delivery_round_trip() {
        let (repo, _) = setup().await;
        let list = vec![isbn("9780000000001"), isbn("9780000000002")];

        let first = repo.record_delivery("combined", &list).await.unwrap();
        let second = repo.record_delivery("combined", &list[..1]).await.unwrap();
        repo.record_delivery("other", &list).await.unwrap();

        assert!(second.id > first.id);
        let records = repo.find_deliveries_by_job("combined").await.unwrap();
        assert_eq!(records, vec![first, second]);
        assert!(repo.find_deliveries_by_job("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_by_job_only_touches_that_jobs_books() {
        let (repo, _) = setup().await;
        for (raw, title) in [("9780000000001", "A"), ("9780000000002", "B"), ("9780000000003", "C")] {
            repo.upsert(input(raw, title)).await.unwrap();
        }
        let a = isbn("9780000000001");
        let b = isbn("9780000000002");
        let c = isbn("9780000000003");

        repo.record_delivery("morning", &[a.clone(), b.clone()]).await.unwrap();
        repo.record_delivery("evening", &[c.clone()]).await.unwrap();
        repo.mark_delivered(&[a.clone(), b.clone(), c.clone()]).await.unwrap();

        let reset = repo
            .reset_delivered(&ResetScope::Job("morning".to_string()))
            .await
            .unwrap();
        assert_eq!(reset, 2);
        assert!(!repo.find_by_isbn(&a).await.unwrap().unwrap().is_delivered());
        assert!(repo.find_by_isbn(&c).await.unwrap().unwrap().is_delivered());

        // Already undelivered rows are not counted again
        let again = repo
            .reset_delivered(&ResetScope::Job("morning".to_string()))
            .await
            .unwrap();
        assert_eq!(again, 0);

        let unknown = repo
            .reset_delivered(&ResetScope::Job("missing".to_string()))
            .await
            .unwrap();
        assert_eq!(unknown, 0);
    }

    #[tokio::test]
    async fn test_reset_within_days_uses_injected_clock() {
        let (repo, clock) = setup().await;
        repo.upsert(input("9780000000001", "Old")).await.unwrap();
        repo.upsert(input("9780000000002", "Recent")).await.unwrap();

        repo.mark_delivered(&[isbn("9780000000001")]).await.unwrap();
        clock.advance(10 * MILLIS_PER_DAY);
        repo.mark_delivered(&[isbn("9780000000002")]).await.unwrap();
        clock.advance(MILLIS_PER_DAY);

        let reset = repo.reset_delivered(&ResetScope::WithinDays(7)).await.unwrap();
        assert_eq!(reset, 1);
        assert!(repo
            .find_by_isbn(&isbn("9780000000001"))
            .await
            .unwrap()
            .unwrap()
            .is_delivered());

        let reset_all = repo.reset_delivered(&ResetScope::All).await.unwrap();
        assert_eq!(reset_all, 1);
        assert_eq!(repo.count_undelivered().await.unwrap(), 2);
    }
}
