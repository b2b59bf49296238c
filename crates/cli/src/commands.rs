//! Command handlers

use crate::app::{App, MailBackend};
use crate::settings::Settings;
use anyhow::{bail, Context, Result};
use bookdigest_core::application::constants::GOOGLE_BOOKS_PROVIDER;
use bookdigest_core::application::{
    DeliveryOutcome, JobOutcome, ResetService, RunOptions, RunReport,
};
use bookdigest_core::domain::{Book, ResetScope};
use bookdigest_core::port::time_provider::SystemTimeProvider;
use bookdigest_core::port::{BookRepository, Maintenance, TimeProvider};
use chrono::{DateTime, FixedOffset};
use colored::Colorize;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use tabled::{Table, Tabled};
use tracing::info;

pub async fn run_due(app: &App, options: RunOptions) -> Result<()> {
    let quota = app.quota()?;
    info!("{}", quota.status_line(GOOGLE_BOOKS_PROVIDER).await?);

    let service = app.run_due_service()?;
    let report = service
        .run(&app.settings.jobs, options)
        .await
        .context("Run failed (run 'bookdigest doctor' to diagnose configuration issues)")?;

    print_run_report(&report, options);
    info!("{}", quota.status_line(GOOGLE_BOOKS_PROVIDER).await?);

    if report.delivery_error.is_some() {
        bail!("Digest was not delivered");
    }
    Ok(())
}

fn print_run_report(report: &RunReport, options: RunOptions) {
    println!("{}", "Run Summary".cyan().bold());
    println!();
    println!("  {} {}", "Enabled jobs:".bold(), report.enabled_jobs);

    if report.due_jobs.is_empty() {
        println!("  {} none", "Due jobs:".bold());
        return;
    }
    println!("  {} {}", "Due jobs:".bold(), report.due_jobs.join(", "));

    if options.dry_run {
        println!("  {} not executing jobs", "Dry run:".bold());
        return;
    }

    for job in &report.jobs {
        match &job.outcome {
            JobOutcome::Succeeded {
                collected,
                upserted,
                rejected,
                skipped,
            } => println!(
                "  {} {}: collected {}, stored {}, rejected {}, skipped {}",
                "✓".green(),
                job.job_name,
                collected,
                upserted,
                rejected,
                skipped
            ),
            JobOutcome::Failed { reason } => {
                println!("  {} {}: {}", "✗".red(), job.job_name, reason)
            }
        }
    }

    if let Some((count, is_fallback)) = report.selection {
        if is_fallback {
            println!("  {} {} recent book(s) (fallback)", "Selected:".bold(), count);
        } else {
            println!("  {} {} undelivered book(s)", "Selected:".bold(), count);
        }
    }

    match (&report.delivery, &report.delivery_error) {
        (Some(DeliveryOutcome::Delivered { record, .. }), _) => println!(
            "  {} digest #{} with {} book(s)",
            "Delivered:".bold(),
            record.id,
            record.isbn13_list.len()
        ),
        (Some(DeliveryOutcome::SentEmpty), _) => {
            println!("  {} empty digest (forced)", "Delivered:".bold())
        }
        (Some(DeliveryOutcome::Skipped), _) | (None, None) => {
            println!("  {} no books to send", "Delivered:".bold())
        }
        (None, Some(error)) => println!("  {} {}", "Mailer error:".red().bold(), error),
    }
}

pub async fn mail_status(app: &App) -> Result<()> {
    let books = app.store.books();
    let total = books.count_all().await?;
    let undelivered = books.count_undelivered().await?;

    println!("{}", "Mail Status".cyan().bold());
    println!();
    println!("  {} {}", "Total:".bold(), total);
    println!("  {} {}", "Delivered:".bold(), total - undelivered);
    println!("  {} {}", "Undelivered:".bold(), undelivered);
    println!();

    if undelivered == 0 && total > 0 {
        println!("All books have been delivered.");
        println!("Use 'bookdigest mail reset' to make them eligible for redelivery.");
    } else if undelivered > 0 {
        println!("{} book(s) ready for next delivery.", undelivered);
    }
    Ok(())
}

pub async fn mail_reset(
    app: &App,
    job: Option<String>,
    since: Option<String>,
    yes: bool,
) -> Result<()> {
    let since_days = since.as_deref().map(parse_duration_days).transpose()?;
    let scope = ResetScope::from_selectors(job, since_days);

    let books = app.store.books();
    let total = books.count_all().await?;
    let undelivered = books.count_undelivered().await?;

    println!("{}", "Mail Reset".cyan().bold());
    println!();
    println!("  {} {}", "Total books:".bold(), total);
    println!("  {} {}", "Delivered:".bold(), total - undelivered);
    println!("  {} {}", "Undelivered:".bold(), undelivered);
    println!();
    println!("  {} {}", "Scope:".bold(), scope.describe());

    if !yes {
        println!();
        println!("This will mark these books as undelivered.");
        println!("They will be eligible for delivery again.");
        if !confirm("Are you sure you want to proceed?")? {
            println!("{}", "Aborted.".yellow());
            return Ok(());
        }
    }

    let report = ResetService::new(books).reset(scope).await?;

    println!();
    println!("{}", "✓ Reset complete".green().bold());
    println!("  {} {}", "Books reset:".bold(), report.reset_count);
    println!("  {} {}", "Undelivered now:".bold(), report.undelivered_after);
    Ok(())
}

#[derive(Tabled)]
struct BookTableRow {
    #[tabled(rename = "ISBN-13")]
    isbn13: String,
    title: String,
    authors: String,
    #[tabled(rename = "first seen")]
    first_seen: String,
    delivered: String,
}

impl BookTableRow {
    fn from_book(book: &Book, utc_offset_hours: i32) -> Self {
        Self {
            isbn13: book.isbn13.to_string(),
            title: truncate(&book.title, 50),
            authors: truncate(&book.authors.join(", "), 30),
            first_seen: format_millis(book.first_seen_at, utc_offset_hours),
            delivered: book
                .last_delivered_at
                .map(|at| format_millis(at, utc_offset_hours))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

pub async fn books_list(app: &App, undelivered: bool, limit: u32) -> Result<()> {
    let repo = app.store.books();
    let books = if undelivered {
        repo.list_undelivered(limit).await?
    } else {
        repo.list_recent(limit).await?
    };

    if books.is_empty() {
        println!("{}", "No books found".yellow());
        return Ok(());
    }

    let offset = app.settings.utc_offset_hours;
    let rows: Vec<BookTableRow> = books
        .iter()
        .map(|b| BookTableRow::from_book(b, offset))
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

pub async fn quota(app: &App) -> Result<()> {
    let line = app.quota()?.status_line(GOOGLE_BOOKS_PROVIDER).await?;
    println!("{}", line);
    Ok(())
}

pub async fn db_reset(app: App, yes: bool) -> Result<()> {
    let stats = app.store.maintenance().get_stats().await?;
    let location = app
        .store
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "in-memory".to_string());

    println!("{}", "Database Reset".red().bold());
    println!();
    println!("  {} {}", "Database:".bold(), location);
    println!("  {} {}", "Books:".bold(), stats.total_books);
    println!("  {} {}", "Deliveries:".bold(), stats.delivery_count);

    if !yes {
        println!();
        println!("This deletes every book, delivery record, job state and quota counter.");
        if !confirm("Are you sure you want to proceed?")? {
            println!("{}", "Aborted.".yellow());
            return Ok(());
        }
    }

    let (store, backup) = app.store.reset_database().await?;
    store.close().await;

    println!();
    println!("{}", "✓ Database reset".green().bold());
    if let Some(backup) = backup {
        println!("  {} {}", "Backup:".bold(), backup.display());
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone)]
pub struct Check {
    pub status: CheckStatus,
    pub message: String,
}

impl Check {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Pass,
            message: message.into(),
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Warn,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Fail,
            message: message.into(),
        }
    }
}

/// Report configuration, store and mail readiness. Fails when any check fails.
///
/// Runs without a pre-opened store so configuration and database-open
/// failures are reported instead of aborting.
pub async fn doctor(config: Option<&Path>) -> Result<()> {
    println!("{}", "Doctor".cyan().bold());
    println!();

    let checks = diagnose(config, Arc::new(SystemTimeProvider)).await;
    for check in &checks {
        let mark = match check.status {
            CheckStatus::Pass => "✓".green(),
            CheckStatus::Warn => "○".yellow(),
            CheckStatus::Fail => "✗".red(),
        };
        println!("  {} {}", mark, check.message);
    }

    if checks.iter().any(|c| c.status == CheckStatus::Fail) {
        bail!("Some checks failed");
    }
    Ok(())
}

pub async fn diagnose(config: Option<&Path>, time_provider: Arc<dyn TimeProvider>) -> Vec<Check> {
    let mut checks = Vec::new();

    let settings = match Settings::load(config) {
        Ok(settings) => {
            checks.push(Check::pass("configuration loaded"));
            settings
        }
        Err(e) => {
            checks.push(Check::fail(format!("configuration: {:#}", e)));
            return checks;
        }
    };

    let enabled = settings.jobs.iter().filter(|j| j.enabled).count();
    if enabled > 0 {
        checks.push(Check::pass(format!(
            "{} job(s) configured, {} enabled",
            settings.jobs.len(),
            enabled
        )));
    } else {
        checks.push(Check::fail("no enabled jobs configured"));
    }

    match MailBackend::from_settings(&settings, Arc::clone(&time_provider)).check() {
        Ok(target) => checks.push(Check::pass(target)),
        Err(e) => checks.push(Check::fail(e.to_string())),
    }

    if settings.google_books.api_key.is_none() {
        checks.push(Check::warn("no Google Books API key (anonymous quota)"));
    }

    let db_path = settings.db_path();
    let app = match App::open_with_clock(settings, time_provider).await {
        Ok(app) => app,
        Err(e) => {
            checks.push(Check::fail(format!(
                "database {}: {:#}",
                db_path.display(),
                e
            )));
            return checks;
        }
    };

    let maintenance = app.store.maintenance();
    match maintenance.health_check().await {
        Ok(()) => match maintenance.get_stats().await {
            Ok(stats) => checks.push(Check::pass(format!(
                "database OK ({} books, {:.2} MB)",
                stats.total_books,
                stats.db_size_bytes as f64 / (1024.0 * 1024.0)
            ))),
            Err(e) => checks.push(Check::fail(format!("database stats: {}", e))),
        },
        Err(e) => checks.push(Check::fail(format!("database: {}", e))),
    }

    let quota_line = match app.quota() {
        Ok(quota) => quota
            .status_line(GOOGLE_BOOKS_PROVIDER)
            .await
            .map_err(anyhow::Error::from),
        Err(e) => Err(e),
    };
    match quota_line {
        Ok(line) => checks.push(Check::pass(line)),
        Err(e) => checks.push(Check::fail(format!("quota: {:#}", e))),
    }

    app.store.close().await;
    checks
}

/// Parse `Nd`, `Nw` (×7) or `Nm` (×30) into a positive number of days
pub fn parse_duration_days(raw: &str) -> Result<u32> {
    let raw = raw.trim();
    let Some(unit) = raw.chars().last() else {
        bail!("Duration is empty (use e.g. 7d, 30d, 1w, 4w, 1m)");
    };
    let digits = &raw[..raw.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        bail!("Invalid duration format: {} (use e.g. 7d, 30d, 1w, 4w, 1m)", raw);
    }

    let value: u32 = digits
        .parse()
        .with_context(|| format!("Duration is too large: {}", raw))?;
    if value == 0 {
        bail!("Duration must be at least one day: {}", raw);
    }

    let days = match unit.to_ascii_lowercase() {
        'd' => Some(value),
        'w' => value.checked_mul(7),
        'm' => value.checked_mul(30),
        _ => bail!("Invalid duration unit in {} (use d, w or m)", raw),
    };
    days.with_context(|| format!("Duration is too large: {}", raw))
}

fn confirm(message: &str) -> Result<bool> {
    print!("{} (yes/no): ", message);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

/// Epoch ms as local `YYYY-MM-DD HH:MM`
fn format_millis(millis: i64, utc_offset_hours: i32) -> String {
    let Some(offset) = FixedOffset::east_opt(utc_offset_hours * 3600) else {
        return millis.to_string();
    };
    DateTime::from_timestamp_millis(millis)
        .map(|at| at.with_timezone(&offset).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}…", &text[..end]),
        None => text.to_string(),
    }
}
