//! Google Books volumes API collector
//!
//! One request per search query, each paid for with one unit of the daily
//! quota. Collection stops once `max_per_run` books are gathered or the
//! quota runs out.

use async_trait::async_trait;
use bookdigest_core::application::constants::GOOGLE_BOOKS_PROVIDER;
use bookdigest_core::application::QuotaService;
use bookdigest_core::domain::{BookInput, BookLink, Isbn13};
use bookdigest_core::port::{Collector, CollectorError, CollectorQueryResult, CollectorResult};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source tag stored on collected books
pub const GOOGLE_BOOKS_SOURCE: &str = "google_books";

/// Upper bound the API accepts for `maxResults`
const MAX_RESULTS_PER_REQUEST: usize = 40;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/books/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct GoogleBooksConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for GoogleBooksConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct GoogleBooksCollector {
    client: reqwest::Client,
    config: GoogleBooksConfig,
    quota: Arc<QuotaService>,
}

impl GoogleBooksCollector {
    pub fn new(config: GoogleBooksConfig, quota: Arc<QuotaService>) -> Result<Self, CollectorError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                CollectorError::new(GOOGLE_BOOKS_SOURCE, format!("HTTP client setup failed: {}", e))
            })?;

        Ok(Self {
            client,
            config,
            quota,
        })
    }

    async fn fetch(&self, query: &str, max_results: usize) -> Result<VolumesResponse, CollectorError> {
        let url = format!("{}/volumes", self.config.base_url.trim_end_matches('/'));
        let max_results = max_results.to_string();

        let mut params = vec![
            ("q", query),
            ("maxResults", max_results.as_str()),
            ("printType", "books"),
        ];
        if let Some(key) = &self.config.api_key {
            params.push(("key", key.as_str()));
        }

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| self.error(format!("Request failed for \"{}\": {}", query, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.error(format!("HTTP {} for \"{}\"", status, query)));
        }

        response
            .json::<VolumesResponse>()
            .await
            .map_err(|e| self.error(format!("Invalid response for \"{}\": {}", query, e)))
    }

    fn error(&self, message: String) -> CollectorError {
        CollectorError::new(GOOGLE_BOOKS_SOURCE, message)
    }
}

#[async_trait]
impl Collector for GoogleBooksCollector {
    fn source(&self) -> &str {
        GOOGLE_BOOKS_SOURCE
    }

    async fn collect(
        &self,
        queries: &[String],
        max_per_run: usize,
    ) -> Result<CollectorResult, CollectorError> {
        let mut results = Vec::new();
        let mut collected = 0;

        for query in queries {
            if collected >= max_per_run {
                debug!(max_per_run = max_per_run, "Per-run limit reached");
                break;
            }

            let consumption = self
                .quota
                .consume(GOOGLE_BOOKS_PROVIDER)
                .await
                .map_err(|e| self.error(format!("Quota check failed: {}", e)))?;
            if !consumption.success {
                warn!(
                    current = consumption.current,
                    limit = consumption.limit,
                    "Google Books quota exhausted, stopping collection"
                );
                break;
            }

            let remaining = max_per_run - collected;
            let response = self
                .fetch(query, remaining.min(MAX_RESULTS_PER_REQUEST))
                .await?;

            let mut books = Vec::new();
            let mut skipped = 0;
            for volume in response.items.unwrap_or_default() {
                match volume_to_input(volume) {
                    Some(input) if books.len() < remaining => books.push(input),
                    Some(_) => {}
                    None => skipped += 1,
                }
            }

            info!(
                query = %query,
                books = books.len(),
                skipped = skipped,
                "Google Books query finished"
            );
            collected += books.len();
            results.push(CollectorQueryResult {
                query: query.clone(),
                books,
                skipped,
            });
        }

        Ok(CollectorResult::new(GOOGLE_BOOKS_SOURCE, results))
    }
}

// ============================================================================
// API payload
// ============================================================================

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    items: Option<Vec<Volume>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Volume {
    volume_info: Option<VolumeInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    subtitle: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    publisher: Option<String>,
    published_date: Option<String>,
    description: Option<String>,
    #[serde(default)]
    industry_identifiers: Vec<IndustryIdentifier>,
    image_links: Option<ImageLinks>,
    info_link: Option<String>,
    preview_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

#[derive(Debug, Deserialize)]
struct ImageLinks {
    thumbnail: Option<String>,
}

/// Map one volume to a book observation. Volumes without an ISBN or a
/// title are skipped.
fn volume_to_input(volume: Volume) -> Option<BookInput> {
    let info = volume.volume_info?;

    let isbn = pick_isbn(&info.industry_identifiers)?;
    let title = match (info.title, info.subtitle) {
        (Some(title), Some(subtitle)) if !subtitle.trim().is_empty() => {
            format!("{}: {}", title.trim(), subtitle.trim())
        }
        (Some(title), _) => title.trim().to_string(),
        (None, _) => return None,
    };
    if title.is_empty() {
        return None;
    }

    let mut links = Vec::new();
    if let Some(url) = info.info_link {
        links.push(BookLink::new("Google Books", url));
    }
    if let Some(url) = info.preview_link {
        links.push(BookLink::new("Preview", url));
    }

    Some(BookInput {
        isbn,
        title,
        authors: info.authors,
        publisher: info.publisher,
        published_date: info.published_date,
        description: info.description,
        cover_url: info.image_links.and_then(|l| l.thumbnail),
        links,
        source: GOOGLE_BOOKS_SOURCE.to_string(),
    })
}

/// First identifier that normalizes, ISBN_13 entries before ISBN_10
fn pick_isbn(identifiers: &[IndustryIdentifier]) -> Option<String> {
    ["ISBN_13", "ISBN_10"].iter().find_map(|kind| {
        identifiers
            .iter()
            .filter(|id| id.kind == *kind)
            .find(|id| Isbn13::parse(&id.identifier).is_some())
            .map(|id| id.identifier.clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookdigest_core::port::api_usage_repository::mocks::InMemoryApiUsageRepository;
    use bookdigest_core::port::time_provider::mocks::MockTimeProvider;
    use bookdigest_core::port::ApiUsageRepository;

    fn volume(json: serde_json::Value) -> Volume {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_volume_with_full_metadata() {
        let input = volume(serde_json::json!({
            "volumeInfo": {
                "title": "Designing Data-Intensive Applications",
                "authors": ["Martin Kleppmann"],
                "publisher": "O'Reilly",
                "publishedDate": "2017-03-16",
                "description": "Big ideas",
                "industryIdentifiers": [
                    {"type": "ISBN_10", "identifier": "1449373321"},
                    {"type": "ISBN_13", "identifier": "9781449373320"}
                ],
                "imageLinks": {"thumbnail": "http://books.example/thumb.jpg"},
                "infoLink": "http://books.example/info",
                "previewLink": "http://books.example/preview"
            }
        }));

        let input = volume_to_input(input).unwrap();
        assert_eq!(input.isbn, "9781449373320");
        assert_eq!(input.title, "Designing Data-Intensive Applications");
        assert_eq!(input.authors, vec!["Martin Kleppmann".to_string()]);
        assert_eq!(input.cover_url.as_deref(), Some("http://books.example/thumb.jpg"));
        assert_eq!(
            input.links,
            vec![
                BookLink::new("Google Books", "http://books.example/info"),
                BookLink::new("Preview", "http://books.example/preview"),
            ]
        );
        assert_eq!(input.source, GOOGLE_BOOKS_SOURCE);
    }

    #[test]
    fn test_volume_falls_back_to_isbn10_and_joins_subtitle() {
        let input = volume(serde_json::json!({
            "volumeInfo": {
                "title": "Rust",
                "subtitle": "The Book",
                "industryIdentifiers": [{"type": "ISBN_10", "identifier": "0306406152"}]
            }
        }));

        let input = volume_to_input(input).unwrap();
        assert_eq!(input.isbn, "0306406152");
        assert_eq!(input.title, "Rust: The Book");
        assert!(input.links.is_empty());
    }

    #[test]
    fn test_volume_without_isbn_or_title_is_skipped() {
        let no_isbn = volume(serde_json::json!({
            "volumeInfo": {
                "title": "Magazine",
                "industryIdentifiers": [{"type": "OTHER", "identifier": "X:123"}]
            }
        }));
        assert!(volume_to_input(no_isbn).is_none());

        let no_title = volume(serde_json::json!({
            "volumeInfo": {
                "industryIdentifiers": [{"type": "ISBN_13", "identifier": "9781449373320"}]
            }
        }));
        assert!(volume_to_input(no_title).is_none());

        assert!(volume_to_input(volume(serde_json::json!({}))).is_none());
    }

    #[test]
    fn test_malformed_isbn13_falls_back_to_valid_isbn10() {
        let input = volume(serde_json::json!({
            "volumeInfo": {
                "title": "Mixed identifiers",
                "industryIdentifiers": [
                    {"type": "ISBN_13", "identifier": "978BAD"},
                    {"type": "ISBN_10", "identifier": "0306406152"}
                ]
            }
        }));

        let input = volume_to_input(input).unwrap();
        assert_eq!(input.isbn, "0306406152");
        assert_eq!(
            input.canonical_isbn().unwrap().as_str(),
            "9780306406157"
        );
    }

    #[test]
    fn test_volume_with_only_malformed_identifiers_is_skipped() {
        let input = volume(serde_json::json!({
            "volumeInfo": {
                "title": "Broken",
                "industryIdentifiers": [
                    {"type": "ISBN_13", "identifier": "978BAD"},
                    {"type": "ISBN_10", "identifier": "12345"}
                ]
            }
        }));
        assert!(volume_to_input(input).is_none());
    }

    fn quota(usage: Arc<InMemoryApiUsageRepository>, limit: i64) -> Arc<QuotaService> {
        let clock = Arc::new(MockTimeProvider::new(1_714_566_645_000));
        Arc::new(QuotaService::new(usage, clock, 9, limit).unwrap())
    }

    fn unreachable_config() -> GoogleBooksConfig {
        GoogleBooksConfig {
            // Nothing listens on port 1
            base_url: "http://127.0.0.1:1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_exhausted_quota_stops_before_any_request() {
        let usage = Arc::new(InMemoryApiUsageRepository::new());
        let quota = quota(usage.clone(), 1);
        let today = quota.today();
        usage.increment_usage(&today, GOOGLE_BOOKS_PROVIDER).await.unwrap();

        let collector = GoogleBooksCollector::new(unreachable_config(), quota).unwrap();
        let result = collector
            .collect(&["rust".to_string(), "sqlite".to_string()], 20)
            .await
            .unwrap();

        assert!(result.results.is_empty());
        assert_eq!(result.total_books, 0);
    }

    #[tokio::test]
    async fn test_transport_failure_is_collector_error_and_costs_quota() {
        let usage = Arc::new(InMemoryApiUsageRepository::new());
        let quota = quota(usage.clone(), 10);
        let today = quota.today();

        let collector = GoogleBooksCollector::new(unreachable_config(), quota).unwrap();
        let err = collector.collect(&["rust".to_string()], 20).await.unwrap_err();

        assert_eq!(err.source_name, GOOGLE_BOOKS_SOURCE);
        assert_eq!(usage.get_usage(&today, GOOGLE_BOOKS_PROVIDER).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_zero_max_per_run_makes_no_requests() {
        let usage = Arc::new(InMemoryApiUsageRepository::new());
        let quota = quota(usage.clone(), 10);
        let today = quota.today();

        let collector = GoogleBooksCollector::new(unreachable_config(), quota).unwrap();
        let result = collector.collect(&["rust".to_string()], 0).await.unwrap();

        assert!(result.results.is_empty());
        assert_eq!(usage.get_usage(&today, GOOGLE_BOOKS_PROVIDER).await.unwrap(), 0);
    }
}
