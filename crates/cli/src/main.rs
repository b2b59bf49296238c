//! Book Digest CLI - collect book metadata and deliver digests

mod app;
mod commands;
mod settings;

use anyhow::{Context, Result};
use app::App;
use bookdigest_core::application::RunOptions;
use clap::{Parser, Subcommand};
use settings::Settings;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LIST_LIMIT: u32 = 20;

#[derive(Parser)]
#[command(name = "bookdigest")]
#[command(about = "Book metadata collector and digest mailer", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./bookdigest.toml when present)
    #[arg(long, global = true, env = "BOOKDIGEST_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all due jobs and send the book digest
    RunDue {
        /// Check which jobs are due without running them
        #[arg(long)]
        dry_run: bool,

        /// Run all enabled jobs regardless of due status
        #[arg(long)]
        force: bool,

        /// Send the digest even with 0 books
        #[arg(long)]
        force_mail: bool,
    },

    /// Mail delivery management
    Mail {
        #[command(subcommand)]
        command: MailCommands,
    },

    /// Book store queries
    Books {
        #[command(subcommand)]
        command: BooksCommands,
    },

    /// Show today's Google Books quota usage
    Quota,

    /// Database administration
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },

    /// Check configuration, database and mail settings
    Doctor,
}

#[derive(Subcommand)]
enum MailCommands {
    /// Show delivery status
    Status,

    /// Make delivered books eligible for delivery again
    Reset {
        /// Only books delivered by this job
        #[arg(long, conflicts_with = "since")]
        job: Option<String>,

        /// Only books delivered within this duration (e.g. 7d, 2w, 1m)
        #[arg(long)]
        since: Option<String>,

        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum BooksCommands {
    /// List stored books, most recently seen first
    List {
        /// Only undelivered books, newest first
        #[arg(long)]
        undelivered: bool,

        /// Maximum rows
        #[arg(short = 'n', long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: u32,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Delete all data (a timestamped backup is kept next to the database)
    Reset {
        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

fn init_logging() -> Result<()> {
    let log_format =
        std::env::var("BOOKDIGEST_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("bookdigest=info"))?;

    match log_format.as_str() {
        "json" => {
            // Machine-readable structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    if let Commands::Doctor = cli.command {
        return commands::doctor(cli.config.as_deref()).await;
    }

    let settings = Settings::load(cli.config.as_deref())
        .context("Run 'bookdigest doctor' to diagnose configuration issues")?;
    debug!(jobs = settings.jobs.len(), "Configuration loaded");

    let app = App::open(settings).await?;

    match cli.command {
        Commands::RunDue {
            dry_run,
            force,
            force_mail,
        } => {
            let options = RunOptions {
                dry_run,
                force,
                force_mail,
            };
            commands::run_due(&app, options).await?;
        }

        Commands::Mail { command } => match command {
            MailCommands::Status => commands::mail_status(&app).await?,
            MailCommands::Reset { job, since, yes } => {
                commands::mail_reset(&app, job, since, yes).await?
            }
        },

        Commands::Books { command } => match command {
            BooksCommands::List { undelivered, limit } => {
                commands::books_list(&app, undelivered, limit).await?
            }
        },

        Commands::Quota => commands::quota(&app).await?,

        Commands::Db { command } => match command {
            DbCommands::Reset { yes } => return commands::db_reset(app, yes).await,
        },

        Commands::Doctor => commands::doctor(cli.config.as_deref()).await?,
    }

    app.store.close().await;
    Ok(())
}
