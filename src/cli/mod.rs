//! clipforge command-line interface.
//!
//! `serve` runs the queue daemon (dispatcher + reaper); the remaining
//! commands are one-shot operations against the same database.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::analysis::{AnalysisClient, AnalysisService};
use crate::executor::{Executor, StoreUsageLedger, UsageLedger};
use crate::filestore::{FileStore, LocalFileStore};
use crate::job::OptimizationConfig;
use crate::metrics;
use crate::scheduler::{
    Admission, Detached, Lifecycle, QueueConfig, Reaper, ReaperConfig, Scheduler, SubmitRequest,
};
use crate::sources::{VideoSource, YoutubeClient};
use crate::storage::JobStore;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "clipforge", version, about = "Persisted job queue for AI video content optimization")]
pub struct Cli {
    /// Log level when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// SQLite database URL.
    #[arg(
        long,
        global = true,
        env = "CLIPFORGE_DATABASE_URL",
        default_value = "sqlite://clipforge.db"
    )]
    pub database_url: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the queue daemon.
    Serve {
        /// System-wide concurrency cap.
        #[arg(long, default_value_t = 5)]
        max_concurrent_jobs: u32,

        /// Per-user concurrency cap.
        #[arg(long, default_value_t = 5)]
        max_jobs_per_user: u32,

        /// Per-user active-job ceiling at submission.
        #[arg(long, default_value_t = 20)]
        max_queue_size: u32,

        /// Seconds between dispatch ticks.
        #[arg(long, default_value_t = 5)]
        tick_interval_secs: u64,

        /// Directory uploaded media is stored under.
        #[arg(long, env = "CLIPFORGE_MEDIA_DIR", default_value = "media")]
        media_dir: PathBuf,

        /// Public URL prefix the media directory is served from.
        #[arg(
            long,
            env = "CLIPFORGE_MEDIA_BASE_URL",
            default_value = "http://localhost:8080/media"
        )]
        media_base_url: String,

        /// Completed-job ceiling per user, rechecked at completion time.
        #[arg(long, default_value_t = 500)]
        usage_ceiling: u32,
    },

    /// Apply database migrations and exit.
    Migrate,

    /// Queue a YouTube video for optimization.
    Submit {
        /// Submitting user id.
        #[arg(long)]
        user: String,

        /// Video URL.
        url: String,
    },

    /// Show one job as JSON.
    Status {
        /// Requesting user id.
        #[arg(long)]
        user: String,

        /// Job id.
        job_id: Uuid,
    },

    /// List a user's recent jobs as JSON.
    List {
        /// Requesting user id.
        #[arg(long)]
        user: String,
    },
}

/// Parses command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Runs the selected command.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve {
            max_concurrent_jobs,
            max_jobs_per_user,
            max_queue_size,
            tick_interval_secs,
            media_dir,
            media_base_url,
            usage_ceiling,
        } => {
            serve(
                &cli.database_url,
                QueueConfig::default()
                    .with_max_concurrent_jobs(max_concurrent_jobs)
                    .with_max_jobs_per_user(max_jobs_per_user)
                    .with_max_total_queue_size(max_queue_size)
                    .with_tick_interval(Duration::from_secs(tick_interval_secs)),
                media_dir,
                media_base_url,
                usage_ceiling,
            )
            .await
        }
        Command::Migrate => {
            let store = JobStore::connect(&cli.database_url).await?;
            store.run_migrations().await?;
            info!("Migrations applied");
            Ok(())
        }
        Command::Submit { user, url } => {
            let store = Arc::new(connected_store(&cli.database_url).await?);
            let source: Arc<dyn VideoSource> =
                Arc::new(YoutubeClient::from_env().context("source API not configured")?);
            let admission = Admission::new(
                store,
                source,
                Arc::new(Detached),
                QueueConfig::default(),
            );

            let receipt = admission
                .submit(
                    &user,
                    SubmitRequest::Youtube {
                        url,
                        config: OptimizationConfig::default(),
                    },
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
            Ok(())
        }
        Command::Status { user, job_id } => {
            let store = Arc::new(connected_store(&cli.database_url).await?);
            let lifecycle = Lifecycle::new(store, Arc::new(Detached), QueueConfig::default());
            let view = lifecycle.get_status(job_id, &user).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        Command::List { user } => {
            let store = Arc::new(connected_store(&cli.database_url).await?);
            let lifecycle = Lifecycle::new(store, Arc::new(Detached), QueueConfig::default());
            let views = lifecycle.list_for_user(&user).await?;
            println!("{}", serde_json::to_string_pretty(&views)?);
            Ok(())
        }
    }
}

async fn connected_store(database_url: &str) -> anyhow::Result<JobStore> {
    let store = JobStore::connect(database_url).await?;
    store.run_migrations().await?;
    Ok(store)
}

async fn serve(
    database_url: &str,
    config: QueueConfig,
    media_dir: PathBuf,
    media_base_url: String,
    usage_ceiling: u32,
) -> anyhow::Result<()> {
    metrics::init_metrics().context("Failed to initialize metrics")?;

    let store = Arc::new(connected_store(database_url).await?);

    let source: Arc<dyn VideoSource> =
        Arc::new(YoutubeClient::from_env().context("source API not configured")?);
    let analysis: Arc<dyn AnalysisService> =
        Arc::new(AnalysisClient::from_env().context("analysis API not configured")?);
    let files: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(media_dir, media_base_url));
    let usage: Arc<dyn UsageLedger> =
        Arc::new(StoreUsageLedger::new(Arc::clone(&store), usage_ceiling));

    let executor = Arc::new(Executor::new(
        Arc::clone(&store),
        source,
        analysis,
        files,
        usage,
    ));
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&store),
        executor,
        config.clone(),
    ));
    let reaper = Arc::new(Reaper::new(Arc::clone(&store), ReaperConfig::default()));

    let (shutdown_tx, _) = broadcast::channel(1);
    let scheduler_handle = tokio::spawn(Arc::clone(&scheduler).run(shutdown_tx.subscribe()));
    let reaper_handle = tokio::spawn(Arc::clone(&reaper).run(shutdown_tx.subscribe()));

    info!("clipforge queue daemon running; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down");
    let _ = shutdown_tx.send(());
    scheduler_handle.await.context("Scheduler task panicked")?;
    reaper_handle.await.context("Reaper task panicked")?;

    Ok(())
}
