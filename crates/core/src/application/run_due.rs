//! Run-due pipeline
//!
//! Flow: pick due jobs -> collect + upsert per job -> select -> deliver.
//! A failing job is logged and abandoned; the others still run and the
//! digest is still attempted. A mailer failure leaves every book undelivered
//! for the next cycle.

use crate::application::constants::COMBINED_JOB_LABEL;
use crate::application::delivery::{DeliveryOutcome, DeliveryService};
use crate::application::scheduling::DueScheduler;
use crate::application::selection::select_for_delivery;
use crate::error::{AppError, Result};
use crate::port::{BookRepository, Collector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// A configured collection job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub queries: Vec<String>,
    /// Overrides `RunDefaults::max_per_run` for this job
    pub max_per_run: Option<usize>,
}

fn default_enabled() -> bool {
    true
}

/// Limits applied to every run
#[derive(Debug, Clone, Copy)]
pub struct RunDefaults {
    pub mail_limit: u32,
    pub fallback_limit: u32,
    pub max_per_run: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Report due jobs without running them
    pub dry_run: bool,
    /// Run every enabled job regardless of due status
    pub force: bool,
    /// Send the digest even when the batch is empty
    pub force_mail: bool,
}

/// Per-job result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded {
        collected: usize,
        upserted: usize,
        rejected: usize,
        skipped: usize,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_name: String,
    pub outcome: JobOutcome,
}

/// Summary of one run-due invocation
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub enabled_jobs: usize,
    pub due_jobs: Vec<String>,
    pub jobs: Vec<JobReport>,
    /// (batch size, is_fallback) when selection ran
    pub selection: Option<(usize, bool)>,
    pub delivery: Option<DeliveryOutcome>,
    /// Mailer failure message; books stay undelivered
    pub delivery_error: Option<String>,
}

impl RunReport {
    pub fn failed_jobs(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| matches!(j.outcome, JobOutcome::Failed { .. }))
            .count()
    }
}

pub struct RunDueService {
    books: Arc<dyn BookRepository>,
    scheduler: Arc<DueScheduler>,
    collector: Arc<dyn Collector>,
    delivery: Arc<DeliveryService>,
    defaults: RunDefaults,
}

impl RunDueService {
    pub fn new(
        books: Arc<dyn BookRepository>,
        scheduler: Arc<DueScheduler>,
        collector: Arc<dyn Collector>,
        delivery: Arc<DeliveryService>,
        defaults: RunDefaults,
    ) -> Self {
        Self {
            books,
            scheduler,
            collector,
            delivery,
            defaults,
        }
    }

    /// Run all due jobs and send the digest
    ///
    /// # Errors
    /// Storage faults outside a job boundary and delivery inconsistencies.
    /// Collector and mailer faults are reported in the `RunReport` instead.
    pub async fn run(&self, jobs: &[JobSpec], options: RunOptions) -> Result<RunReport> {
        let mut report = RunReport::default();

        let enabled: Vec<&JobSpec> = jobs.iter().filter(|j| j.enabled).collect();
        report.enabled_jobs = enabled.len();

        if enabled.is_empty() {
            warn!("No enabled jobs found");
            return Ok(report);
        }
        info!(count = enabled.len(), "Found enabled jobs");

        let mut due = Vec::new();
        for job in enabled {
            if options.force || self.scheduler.is_due(&job.name).await? {
                due.push(job);
            }
        }
        report.due_jobs = due.iter().map(|j| j.name.clone()).collect();

        if due.is_empty() {
            info!("No jobs are due at this time");
            return Ok(report);
        }
        info!(jobs = ?report.due_jobs, "Jobs are due");

        if options.dry_run {
            info!("Dry run - not executing jobs");
            return Ok(report);
        }

        for job in due {
            let outcome = self.run_job(job).await;
            report.jobs.push(JobReport {
                job_name: job.name.clone(),
                outcome,
            });
        }

        info!(
            mail_limit = self.defaults.mail_limit,
            fallback_limit = self.defaults.fallback_limit,
            "Selecting books"
        );
        let selection = select_for_delivery(
            self.books.as_ref(),
            self.defaults.mail_limit,
            self.defaults.fallback_limit,
        )
        .await?;
        report.selection = Some((selection.books.len(), selection.is_fallback));

        if selection.is_empty() && !options.force_mail {
            info!("No books to send");
            return Ok(report);
        }

        match self
            .delivery
            .commit_delivery(COMBINED_JOB_LABEL, &selection.books, options.force_mail)
            .await
        {
            Ok(outcome) => report.delivery = Some(outcome),
            Err(AppError::Mailer(e)) => {
                error!(error = %e, "Mailer error, books remain undelivered");
                report.delivery_error = Some(e.to_string());
            }
            Err(e) => return Err(e),
        }

        Ok(report)
    }

    /// Collect and upsert for one job. Never returns an error: faults are
    /// caught here so the remaining jobs still run.
    async fn run_job(&self, job: &JobSpec) -> JobOutcome {
        info!(job = %job.name, "Processing job");

        match self.collect_and_store(job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                match &e {
                    AppError::Collector(ce) => {
                        error!(job = %job.name, error = %ce, "Collector error")
                    }
                    other => error!(job = %job.name, error = %other, "Error processing job"),
                }
                JobOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn collect_and_store(&self, job: &JobSpec) -> Result<JobOutcome> {
        self.scheduler.mark_run_started(&job.name).await?;

        let max_per_run = job.max_per_run.unwrap_or(self.defaults.max_per_run);
        info!(
            job = %job.name,
            queries = ?job.queries,
            max_per_run = max_per_run,
            "Collecting books"
        );

        let result = self.collector.collect(&job.queries, max_per_run).await?;
        info!(
            job = %job.name,
            collected = result.total_books,
            skipped = result.total_skipped,
            "Collection finished"
        );

        let mut upserted = 0;
        let mut rejected = 0;
        for query_result in result.results {
            for input in query_result.books {
                let raw = input.isbn.clone();
                match self.books.upsert(input).await {
                    Ok(_) => upserted += 1,
                    Err(AppError::Domain(e)) => {
                        warn!(job = %job.name, isbn = %raw, error = %e, "Rejected book");
                        rejected += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        info!(job = %job.name, upserted = upserted, rejected = rejected, "Upserted books");

        self.scheduler.mark_run_succeeded(&job.name).await?;

        Ok(JobOutcome::Succeeded {
            collected: result.total_books,
            upserted,
            rejected,
            skipped: result.total_skipped,
        })
    }
}
