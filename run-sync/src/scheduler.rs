//! Sync scheduler: records local changes and queues the work that pushes
//! them to the remote service.
//!
//! A pending entry is always written before its job is queued, so a job
//! never observes a missing entry for a change that was scheduled.

use crate::config::SyncConfig;
use crate::error::StorageResult;
use crate::remote::SessionStorage;
use crate::storage::{
    JobKind, JobQueue, JobRecord, NewJob, PendingCreate, PendingDelete, PendingSyncStore,
    SqliteStorage,
};
use run_types::{Run, RunId, UserId};
use std::sync::Arc;
use std::time::Duration;

/// A change to propagate.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncIntent {
    /// Upload a finished run and its route picture.
    CreateRun {
        /// The run; an id is assigned when missing.
        run: Run,
        /// Rendered route picture.
        image: Vec<u8>,
    },
    /// Delete a run remotely.
    DeleteRun(RunId),
    /// Periodically pull remote runs.
    FetchRuns(Duration),
}

/// What `schedule_sync` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A job was queued.
    Enqueued(JobRecord),
    /// The periodic fetch is already registered.
    AlreadyScheduled,
    /// Nobody is signed in; nothing was recorded.
    NoSession,
}

/// Queues sync work in the durable job queue.
pub struct SyncScheduler {
    storage: Arc<SqliteStorage>,
    session: Arc<dyn SessionStorage>,
    backoff_base: Duration,
    fetch_initial_delay: Duration,
}

impl SyncScheduler {
    /// Create a scheduler over `storage`, resolving the owner through `session`.
    pub fn new(
        storage: Arc<SqliteStorage>,
        session: Arc<dyn SessionStorage>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            storage,
            session,
            backoff_base: config.backoff_base(),
            fetch_initial_delay: config.fetch_initial_delay(),
        }
    }

    /// Record the change and queue its job.
    pub async fn schedule_sync(&self, intent: SyncIntent) -> StorageResult<ScheduleOutcome> {
        match intent {
            SyncIntent::CreateRun { run, image } => self.schedule_create(run, image).await,
            SyncIntent::DeleteRun(run_id) => self.schedule_delete(run_id).await,
            SyncIntent::FetchRuns(interval) => self.schedule_fetch(interval).await,
        }
    }

    /// Drop every queued job. Pending entries are kept.
    pub async fn cancel_all_syncs(&self) -> StorageResult<u64> {
        let cancelled = self.storage.cancel_all().await?;
        tracing::info!("Cancelled {} sync jobs", cancelled);
        Ok(cancelled)
    }

    /// Queue a job for every pending entry of the current user that has none.
    ///
    /// Returns the number of jobs queued.
    pub async fn sync_pending_runs(&self) -> StorageResult<usize> {
        let Some(user_id) = self.current_user().await else {
            tracing::warn!("No session, skipping pending run sweep");
            return Ok(0);
        };

        let mut queued = 0;
        for entry in self.storage.pending_creates_for(&user_id).await? {
            if !self
                .storage
                .has_outstanding(JobKind::CreateRun, &entry.run_id)
                .await?
            {
                self.enqueue_one_shot(JobKind::CreateRun, entry.run_id).await?;
                queued += 1;
            }
        }
        for entry in self.storage.pending_deletes_for(&user_id).await? {
            if !self
                .storage
                .has_outstanding(JobKind::DeleteRun, &entry.run_id)
                .await?
            {
                self.enqueue_one_shot(JobKind::DeleteRun, entry.run_id).await?;
                queued += 1;
            }
        }

        if queued > 0 {
            tracing::info!("Re-queued {} pending syncs for {}", queued, user_id);
        }
        Ok(queued)
    }

    async fn schedule_create(&self, run: Run, image: Vec<u8>) -> StorageResult<ScheduleOutcome> {
        let Some(user_id) = self.current_user().await else {
            tracing::warn!("No session, dropping run upload");
            return Ok(ScheduleOutcome::NoSession);
        };

        let run_id = run.id.unwrap_or_default();
        let entry = PendingCreate {
            run_id,
            run: run.with_id(run_id),
            image,
            user_id,
        };
        self.storage.upsert_pending_create(&entry).await?;

        let job = self.enqueue_one_shot(JobKind::CreateRun, run_id).await?;
        tracing::debug!("Queued create for run {} (job {})", run_id, job.id);
        Ok(ScheduleOutcome::Enqueued(job))
    }

    async fn schedule_delete(&self, run_id: RunId) -> StorageResult<ScheduleOutcome> {
        let Some(user_id) = self.current_user().await else {
            tracing::warn!("No session, dropping run delete");
            return Ok(ScheduleOutcome::NoSession);
        };

        self.storage
            .upsert_pending_delete(&PendingDelete { run_id, user_id })
            .await?;

        let job = self.enqueue_one_shot(JobKind::DeleteRun, run_id).await?;
        tracing::debug!("Queued delete for run {} (job {})", run_id, job.id);
        Ok(ScheduleOutcome::Enqueued(job))
    }

    async fn schedule_fetch(&self, interval: Duration) -> StorageResult<ScheduleOutcome> {
        if !self
            .storage
            .outstanding_by_tag(JobKind::FetchRuns.tag())
            .await?
            .is_empty()
        {
            tracing::debug!("Periodic fetch already scheduled");
            return Ok(ScheduleOutcome::AlreadyScheduled);
        }

        let job = self
            .storage
            .enqueue(NewJob {
                kind: JobKind::FetchRuns,
                run_id: None,
                next_run_at: SqliteStorage::current_timestamp_ms()
                    + self.fetch_initial_delay.as_millis() as i64,
                period_secs: Some(interval.as_secs().max(1)),
                backoff_base_ms: self.backoff_base.as_millis() as u64,
                requires_network: true,
            })
            .await?;
        tracing::info!("Scheduled periodic fetch every {:?}", interval);
        Ok(ScheduleOutcome::Enqueued(job))
    }

    async fn enqueue_one_shot(&self, kind: JobKind, run_id: RunId) -> StorageResult<JobRecord> {
        self.storage
            .enqueue(NewJob {
                kind,
                run_id: Some(run_id),
                next_run_at: SqliteStorage::current_timestamp_ms(),
                period_secs: None,
                backoff_base_ms: self.backoff_base.as_millis() as u64,
                requires_network: true,
            })
            .await
    }

    async fn current_user(&self) -> Option<UserId> {
        self.session.get().await.map(|auth| auth.user_id)
    }
}
