//! stride-sync binary entry point.
//!
//! Operator tool for inspecting and repairing the local sync queue.
//!
//! Usage:
//! ```bash
//! stride-sync --config stride-sync.toml pending --user runner-1
//! stride-sync jobs
//! stride-sync cancel-all
//! stride-sync run
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use stridelink_sync::config::Config;
use stridelink_sync::remote::{Offline, StaticSession};
use stridelink_sync::scheduler::{ScheduleOutcome, SyncIntent, SyncScheduler};
use stridelink_sync::storage::{JobQueue, PendingSyncStore, SqliteStorage};
use stridelink_sync::worker::run_worker;
use stridelink_sync::{SyncExecutor, UserId};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "stride-sync.toml";

/// Inspect and repair the StrideLink sync queue.
#[derive(Parser, Debug)]
#[command(name = "stride-sync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults apply when the default file is absent)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List pending creates and deletes of a user
    Pending {
        /// Owning user id
        #[arg(long, short)]
        user: String,
    },

    /// List the job queue
    Jobs,

    /// Cancel every queued job (pending entries are kept)
    CancelAll,

    /// Queue jobs for a user's pending entries that have none
    Requeue {
        /// Owning user id
        #[arg(long, short)]
        user: String,
    },

    /// Register the periodic fetch with the configured interval
    Fetch,

    /// Run the background worker until Ctrl+C
    ///
    /// No remote client is linked into this binary: the worker re-queues
    /// interrupted jobs and keeps network jobs waiting.
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    let storage = open_storage(&config).await.with_context(|| {
        format!("Failed to open database {}", config.storage.database.display())
    })?;

    match cli.command {
        Commands::Pending { user } => {
            let user = UserId::new(user);
            let creates = storage.pending_creates_for(&user).await?;
            let deletes = storage.pending_deletes_for(&user).await?;

            println!("Pending creates for {}: {}", user, creates.len());
            for entry in &creates {
                println!(
                    "  {}  {} m  {:?}  image {} bytes",
                    entry.run_id,
                    entry.run.distance_meters,
                    entry.run.duration,
                    entry.image.len()
                );
            }
            println!("Pending deletes for {}: {}", user, deletes.len());
            for entry in &deletes {
                println!("  {}", entry.run_id);
            }
        }
        Commands::Jobs => {
            let jobs = storage.list_jobs().await?;
            println!("{} jobs", jobs.len());
            for job in &jobs {
                let run = job
                    .run_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  #{:<5} {:<12} {:<9} attempts={} next_run_at={} run={}",
                    job.id, job.tag, job.state, job.attempts, job.next_run_at, run
                );
            }
        }
        Commands::CancelAll => {
            let scheduler = scheduler(&storage, StaticSession::signed_out(), &config);
            let cancelled = scheduler.cancel_all_syncs().await?;
            println!("Cancelled {} jobs", cancelled);
        }
        Commands::Requeue { user } => {
            let session = StaticSession::signed_in(UserId::new(user));
            let scheduler = scheduler(&storage, session, &config);
            let queued = scheduler.sync_pending_runs().await?;
            println!("Queued {} jobs", queued);
        }
        Commands::Fetch => {
            let scheduler = scheduler(&storage, StaticSession::signed_out(), &config);
            let interval = config.sync.fetch_interval();
            match scheduler.schedule_sync(SyncIntent::FetchRuns(interval)).await? {
                ScheduleOutcome::Enqueued(job) => {
                    println!("Scheduled fetch job #{} every {:?}", job.id, interval)
                }
                ScheduleOutcome::AlreadyScheduled => println!("Fetch already scheduled"),
                ScheduleOutcome::NoSession => println!("No session"),
            }
        }
        Commands::Run => {
            let executor = Arc::new(SyncExecutor::new(
                storage.clone(),
                Arc::new(Offline),
                Arc::new(Offline),
                config.sync.retry_policy(),
            ));
            println!("Sync worker running. Press Ctrl+C to stop.");
            run_worker(
                executor,
                storage,
                Arc::new(Offline),
                config.worker.clone(),
                tokio::signal::ctrl_c(),
            )
            .await
            .context("Failed to listen for Ctrl+C")?;
            println!("Done.");
        }
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> stridelink_sync::Result<Config> {
    match path {
        Some(path) => Ok(Config::from_file(&path)?),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG);
            if default.exists() {
                Ok(Config::from_file(&default)?)
            } else {
                tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG);
                Ok(Config::default())
            }
        }
    }
}

async fn open_storage(config: &Config) -> stridelink_sync::Result<Arc<SqliteStorage>> {
    Ok(Arc::new(SqliteStorage::new(&config.storage.database).await?))
}

fn scheduler(
    storage: &Arc<SqliteStorage>,
    session: StaticSession,
    config: &Config,
) -> SyncScheduler {
    SyncScheduler::new(storage.clone(), Arc::new(session), &config.sync)
}
