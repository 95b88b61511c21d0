//! Storage layer for stride-sync.
//!
//! Two concerns share one SQLite database:
//! - the pending-sync store: local changes the remote service has not
//!   confirmed yet, keyed by run id and owned by a user
//! - the job queue: durable background work that survives restarts

mod sqlite;

pub use sqlite::SqliteStorage;

use crate::error::StorageError;
use async_trait::async_trait;
use run_types::{Run, RunId, UserId};
use std::fmt;
use std::str::FromStr;

/// A finished run that still has to be created remotely.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCreate {
    /// Key; equals `run.id`.
    pub run_id: RunId,
    /// The full run record.
    pub run: Run,
    /// Rendered route picture uploaded alongside the run.
    pub image: Vec<u8>,
    /// Account that owns the run.
    pub user_id: UserId,
}

/// A locally deleted run that still has to be deleted remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    /// Key.
    pub run_id: RunId,
    /// Account that owns the run.
    pub user_id: UserId,
}

/// Trait for pending-sync storage backends.
///
/// Entries are only removed once the remote side confirmed the change.
#[async_trait]
pub trait PendingSyncStore: Send + Sync {
    /// Insert or replace a pending create.
    async fn upsert_pending_create(&self, entry: &PendingCreate) -> Result<(), StorageError>;

    /// Get a pending create by run id.
    async fn get_pending_create(&self, run_id: &RunId)
        -> Result<Option<PendingCreate>, StorageError>;

    /// All pending creates of a user.
    async fn pending_creates_for(&self, user_id: &UserId)
        -> Result<Vec<PendingCreate>, StorageError>;

    /// Remove a pending create. Returns whether an entry existed.
    async fn delete_pending_create(&self, run_id: &RunId) -> Result<bool, StorageError>;

    /// Insert or replace a pending delete.
    async fn upsert_pending_delete(&self, entry: &PendingDelete) -> Result<(), StorageError>;

    /// Get a pending delete by run id.
    async fn get_pending_delete(&self, run_id: &RunId)
        -> Result<Option<PendingDelete>, StorageError>;

    /// All pending deletes of a user.
    async fn pending_deletes_for(&self, user_id: &UserId)
        -> Result<Vec<PendingDelete>, StorageError>;

    /// Remove a pending delete. Returns whether an entry existed.
    async fn delete_pending_delete(&self, run_id: &RunId) -> Result<bool, StorageError>;
}

/// Kind of background work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Upload a pending create.
    CreateRun,
    /// Propagate a pending delete.
    DeleteRun,
    /// Pull remote runs and merge them locally.
    FetchRuns,
}

impl JobKind {
    /// Tag under which jobs of this kind are registered.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::CreateRun => "create_work",
            Self::DeleteRun => "delete_work",
            Self::FetchRuns => "sync_work",
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::CreateRun => "create_run",
            Self::DeleteRun => "delete_run",
            Self::FetchRuns => "fetch_runs",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_run" => Ok(Self::CreateRun),
            "delete_run" => Ok(Self::DeleteRun),
            "fetch_runs" => Ok(Self::FetchRuns),
            _ => Err(StorageError::Corrupt {
                table: "jobs",
                column: "kind",
            }),
        }
    }
}

/// Lifecycle of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Waiting for `next_run_at`.
    Enqueued,
    /// Claimed by a worker.
    Running,
    /// Gave up; kept for inspection and recovery sweeps.
    Failed,
}

impl JobState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Enqueued => "enqueued",
            Self::Running => "running",
            Self::Failed => "failed",
        }
    }

    /// Whether the job still counts as scheduled.
    pub fn is_outstanding(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enqueued" => Ok(Self::Enqueued),
            "running" => Ok(Self::Running),
            "failed" => Ok(Self::Failed),
            _ => Err(StorageError::Corrupt {
                table: "jobs",
                column: "state",
            }),
        }
    }
}

/// Request to queue a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    /// What the job does.
    pub kind: JobKind,
    /// Run the job operates on (create and delete jobs only).
    pub run_id: Option<RunId>,
    /// Unix time in milliseconds of the first attempt.
    pub next_run_at: i64,
    /// Repeat period in seconds for periodic jobs.
    pub period_secs: Option<u64>,
    /// Backoff base delay in milliseconds.
    pub backoff_base_ms: u64,
    /// Only run while the device is online.
    pub requires_network: bool,
}

/// A job as stored in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    /// Queue-assigned id.
    pub id: i64,
    /// What the job does.
    pub kind: JobKind,
    /// Registry tag (see [`JobKind::tag`]).
    pub tag: String,
    /// Run the job operates on.
    pub run_id: Option<RunId>,
    /// Attempts made in the current cycle.
    pub attempts: u32,
    /// Unix time in milliseconds of the next attempt.
    pub next_run_at: i64,
    /// Repeat period in seconds for periodic jobs.
    pub period_secs: Option<u64>,
    /// Backoff base delay in milliseconds.
    pub backoff_base_ms: u64,
    /// Only run while the device is online.
    pub requires_network: bool,
    /// Lifecycle state.
    pub state: JobState,
}

impl JobRecord {
    /// Whether the job repeats after completing.
    pub fn is_periodic(&self) -> bool {
        self.period_secs.is_some()
    }
}

/// Trait for durable job queues.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Queue a job and return its record.
    async fn enqueue(&self, job: NewJob) -> Result<JobRecord, StorageError>;

    /// Enqueued jobs whose `next_run_at` is at or before `now_ms`, oldest first.
    async fn due_jobs(&self, now_ms: i64) -> Result<Vec<JobRecord>, StorageError>;

    /// Enqueued or running jobs registered under `tag`.
    async fn outstanding_by_tag(&self, tag: &str) -> Result<Vec<JobRecord>, StorageError>;

    /// Whether an enqueued or running job of `kind` exists for `run_id`.
    async fn has_outstanding(&self, kind: JobKind, run_id: &RunId)
        -> Result<bool, StorageError>;

    /// Move an enqueued job to running. Returns false when another worker
    /// claimed it first or it was cancelled.
    async fn claim(&self, id: i64) -> Result<bool, StorageError>;

    /// Remove a finished job.
    async fn complete(&self, id: i64) -> Result<(), StorageError>;

    /// Put a job back in the queue with a new attempt count and due time.
    async fn reschedule(&self, id: i64, attempts: u32, next_run_at: i64)
        -> Result<(), StorageError>;

    /// Mark a job as permanently failed.
    async fn mark_failed(&self, id: i64, attempts: u32) -> Result<(), StorageError>;

    /// Return jobs left running by a previous process to the queue.
    async fn requeue_running(&self) -> Result<u64, StorageError>;

    /// Drop every job. Returns the number removed.
    async fn cancel_all(&self) -> Result<u64, StorageError>;

    /// Every job in the queue, by id.
    async fn list_jobs(&self) -> Result<Vec<JobRecord>, StorageError>;
}
