//! Sync job executor and background worker.
//!
//! The executor runs one job body against the remote collaborators and turns
//! the result into a [`JobOutcome`]. It then records that outcome in the
//! durable queue: one-shot jobs are removed on success and marked failed once
//! the attempt budget is spent, periodic jobs are re-armed for their next
//! period either way. Pending entries are only removed after the remote side
//! confirmed the change.

use crate::config::WorkerConfig;
use crate::error::{Result, StorageResult};
use crate::remote::{Connectivity, RemoteRunDataSource, RunRepository};
use crate::storage::{JobKind, JobQueue, JobRecord, PendingSyncStore, SqliteStorage};
use run_core::{JobOutcome, RetryPolicy};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Runs queued sync jobs.
pub struct SyncExecutor {
    storage: Arc<SqliteStorage>,
    remote: Arc<dyn RemoteRunDataSource>,
    repository: Arc<dyn RunRepository>,
    policy: RetryPolicy,
}

impl SyncExecutor {
    /// Create an executor with the given attempt budget.
    pub fn new(
        storage: Arc<SqliteStorage>,
        remote: Arc<dyn RemoteRunDataSource>,
        repository: Arc<dyn RunRepository>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            storage,
            remote,
            repository,
            policy,
        }
    }

    /// Run every due job whose network requirement is met.
    ///
    /// A storage error on one job is logged and the pass moves on to the
    /// next. Returns the number of jobs that ran.
    pub async fn run_due_jobs(
        &self,
        connectivity: &dyn Connectivity,
        now_ms: i64,
    ) -> StorageResult<usize> {
        let due = self.storage.due_jobs(now_ms).await?;
        let mut ran = 0;

        for job in due {
            if job.requires_network && !connectivity.is_connected() {
                tracing::debug!("Job {} waits for network", job.id);
                continue;
            }
            let id = job.id;
            match self.run_job(job, now_ms).await {
                Ok(Some(_)) => ran += 1,
                Ok(None) => {}
                Err(e) => tracing::warn!("Job {} skipped: {}", id, e),
            }
        }

        Ok(ran)
    }

    /// Claim and run one job, then record its outcome.
    ///
    /// Returns `None` when the job was claimed elsewhere or cancelled.
    pub async fn run_job(&self, job: JobRecord, now_ms: i64) -> StorageResult<Option<JobOutcome>> {
        if !self.storage.claim(job.id).await? {
            return Ok(None);
        }

        if self.policy.is_exhausted(job.attempts) {
            self.give_up(&job, job.attempts, now_ms).await?;
            return Ok(Some(JobOutcome::Failure));
        }

        let outcome = self.execute(&job).await;
        let attempts = job.attempts + 1;

        let recorded = match outcome {
            JobOutcome::Success => {
                match job.period_secs {
                    Some(period) => {
                        self.storage
                            .reschedule(job.id, 0, now_ms + period_ms(period))
                            .await?
                    }
                    None => self.storage.complete(job.id).await?,
                }
                tracing::info!("Job {} ({}) succeeded", job.id, job.kind);
                JobOutcome::Success
            }
            JobOutcome::Retry if !self.policy.is_exhausted(attempts) => {
                let delay = self.backoff_for(&job, attempts);
                self.storage
                    .reschedule(job.id, attempts, now_ms + delay.as_millis() as i64)
                    .await?;
                tracing::info!(
                    "Job {} ({}) attempt {} failed, retrying in {:?}",
                    job.id,
                    job.kind,
                    attempts,
                    delay
                );
                JobOutcome::Retry
            }
            JobOutcome::Retry | JobOutcome::Failure => {
                self.give_up(&job, attempts, now_ms).await?;
                JobOutcome::Failure
            }
        };

        Ok(Some(recorded))
    }

    /// Run a job body without touching the queue.
    pub async fn execute(&self, job: &JobRecord) -> JobOutcome {
        match job.kind {
            JobKind::CreateRun => self.create_run(job).await,
            JobKind::DeleteRun => self.delete_run(job).await,
            JobKind::FetchRuns => match self.repository.fetch_runs().await {
                Ok(()) => JobOutcome::Success,
                Err(e) => {
                    tracing::warn!("Fetching runs failed: {}", e);
                    JobOutcome::from_network_error(e)
                }
            },
        }
    }

    async fn create_run(&self, job: &JobRecord) -> JobOutcome {
        let Some(run_id) = job.run_id else {
            tracing::error!("Create job {} has no run id", job.id);
            return JobOutcome::Failure;
        };

        let entry = match self.storage.get_pending_create(&run_id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::warn!("No pending create for run {}", run_id);
                return JobOutcome::Failure;
            }
            Err(e) => {
                tracing::error!("Loading pending create {} failed: {}", run_id, e);
                return JobOutcome::Retry;
            }
        };

        match self.remote.create(&entry.run, &entry.image).await {
            Ok(_) => {
                if let Err(e) = self.storage.delete_pending_create(&run_id).await {
                    tracing::error!("Clearing pending create {} failed: {}", run_id, e);
                }
                JobOutcome::Success
            }
            Err(e) => {
                tracing::warn!("Uploading run {} failed: {}", run_id, e);
                JobOutcome::from_network_error(e)
            }
        }
    }

    async fn delete_run(&self, job: &JobRecord) -> JobOutcome {
        let Some(run_id) = job.run_id else {
            tracing::error!("Delete job {} has no run id", job.id);
            return JobOutcome::Failure;
        };

        match self.remote.delete_by_id(&run_id).await {
            Ok(()) => {
                if let Err(e) = self.storage.delete_pending_delete(&run_id).await {
                    tracing::error!("Clearing pending delete {} failed: {}", run_id, e);
                }
                JobOutcome::Success
            }
            Err(e) => {
                tracing::warn!("Deleting run {} remotely failed: {}", run_id, e);
                JobOutcome::from_network_error(e)
            }
        }
    }

    async fn give_up(&self, job: &JobRecord, attempts: u32, now_ms: i64) -> StorageResult<()> {
        match job.period_secs {
            Some(period) => {
                tracing::warn!(
                    "Job {} ({}) failed after {} attempts, waiting for next period",
                    job.id,
                    job.kind,
                    attempts
                );
                self.storage
                    .reschedule(job.id, 0, now_ms + period_ms(period))
                    .await
            }
            None => {
                tracing::warn!(
                    "Job {} ({}) failed permanently after {} attempts",
                    job.id,
                    job.kind,
                    attempts
                );
                self.storage.mark_failed(job.id, attempts).await
            }
        }
    }

    fn backoff_for(&self, job: &JobRecord, attempts: u32) -> Duration {
        RetryPolicy {
            base_delay: Duration::from_millis(job.backoff_base_ms),
            ..self.policy
        }
        .backoff(attempts)
    }
}

fn period_ms(period_secs: u64) -> i64 {
    (period_secs as i64).saturating_mul(1000)
}

/// Spawn the background worker.
///
/// Jobs left running by a previous process are re-queued first. Returns a
/// handle that can be used to abort the task.
pub fn spawn_worker(
    executor: Arc<SyncExecutor>,
    storage: Arc<SqliteStorage>,
    connectivity: Arc<dyn Connectivity>,
    config: WorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("Sync worker disabled");
            return;
        }

        match storage.requeue_running().await {
            Ok(0) => {}
            Ok(n) => tracing::info!("Re-queued {} interrupted jobs", n),
            Err(e) => tracing::error!("Re-queueing interrupted jobs failed: {}", e),
        }

        tracing::info!(
            "Sync worker started (poll interval: {}ms)",
            config.poll_interval_ms
        );
        let mut timer = interval(Duration::from_millis(config.poll_interval_ms.max(1)));

        loop {
            timer.tick().await;

            let now = SqliteStorage::current_timestamp_ms();
            match executor.run_due_jobs(connectivity.as_ref(), now).await {
                Ok(0) => tracing::trace!("Sync worker: no due jobs"),
                Ok(n) => tracing::debug!("Sync worker: ran {} jobs", n),
                Err(e) => tracing::error!("Sync worker error: {}", e),
            }
        }
    })
}

/// Run the background worker until `shutdown` resolves.
///
/// The worker task is aborted on the way out; an in-flight job is re-queued
/// by the next start.
pub async fn run_worker<F>(
    executor: Arc<SyncExecutor>,
    storage: Arc<SqliteStorage>,
    connectivity: Arc<dyn Connectivity>,
    config: WorkerConfig,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    let handle = spawn_worker(executor, storage, connectivity, config);
    let result = shutdown.await;
    handle.abort();
    tracing::info!("Sync worker stopped");
    Ok(result?)
}
