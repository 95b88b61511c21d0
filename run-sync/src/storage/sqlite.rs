//! SQLite storage backend for stride-sync.

use super::{
    JobKind, JobQueue, JobRecord, JobState, NewJob, PendingCreate, PendingDelete,
    PendingSyncStore,
};
use crate::error::StorageError;
use async_trait::async_trait;
use run_types::{Run, RunId, UserId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// SQLite-backed pending-sync store and job queue.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage from a database path.
    ///
    /// Creates the database file if it doesn't exist.
    pub async fn new(path: &Path) -> Result<Self, StorageError> {
        let url = path.to_str().ok_or_else(|| StorageError::InvalidPath {
            path: path.to_path_buf(),
        })?;
        let options = SqliteConnectOptions::from_str(url)
            .map_err(StorageError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite storage (for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StorageError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_creates (
                run_id BLOB PRIMARY KEY,
                run BLOB NOT NULL,
                image BLOB NOT NULL,
                user_id TEXT NOT NULL,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_deletes (
                run_id BLOB PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                tag TEXT NOT NULL,
                run_id BLOB,
                attempts INTEGER NOT NULL DEFAULT 0,
                next_run_at INTEGER NOT NULL,
                period_secs INTEGER,
                backoff_base_ms INTEGER NOT NULL,
                requires_network INTEGER NOT NULL,
                state TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        // Create indexes
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_pending_creates_user ON pending_creates(user_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_pending_deletes_user ON pending_deletes(user_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_due ON jobs(state, next_run_at)")
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_tag ON jobs(tag)")
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(())
    }

    /// Current unix time in milliseconds.
    pub fn current_timestamp_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) async fn execute_raw(&self, sql: &str) -> Result<(), StorageError> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl PendingSyncStore for SqliteStorage {
    async fn upsert_pending_create(&self, entry: &PendingCreate) -> Result<(), StorageError> {
        let payload = entry.run.to_bytes()?;

        sqlx::query(
            r#"
            INSERT INTO pending_creates (run_id, run, image, user_id)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(run_id) DO UPDATE SET run = ?2, image = ?3, user_id = ?4
            "#,
        )
        .bind(entry.run_id.as_bytes())
        .bind(&payload)
        .bind(&entry.image)
        .bind(entry.user_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn get_pending_create(
        &self,
        run_id: &RunId,
    ) -> Result<Option<PendingCreate>, StorageError> {
        let row = sqlx::query_as::<_, PendingCreateRow>(
            "SELECT run_id, run, image, user_id FROM pending_creates WHERE run_id = ?1",
        )
        .bind(run_id.as_bytes())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        match row {
            Some(r) => Ok(Some(r.try_into()?)),
            None => Ok(None),
        }
    }

    async fn pending_creates_for(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PendingCreate>, StorageError> {
        let rows = sqlx::query_as::<_, PendingCreateRow>(
            r#"
            SELECT run_id, run, image, user_id
            FROM pending_creates
            WHERE user_id = ?1
            ORDER BY rowid ASC
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }

    async fn delete_pending_create(&self, run_id: &RunId) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM pending_creates WHERE run_id = ?1")
            .bind(run_id.as_bytes())
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn upsert_pending_delete(&self, entry: &PendingDelete) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO pending_deletes (run_id, user_id)
            VALUES (?1, ?2)
            ON CONFLICT(run_id) DO UPDATE SET user_id = ?2
            "#,
        )
        .bind(entry.run_id.as_bytes())
        .bind(entry.user_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn get_pending_delete(
        &self,
        run_id: &RunId,
    ) -> Result<Option<PendingDelete>, StorageError> {
        let row = sqlx::query_as::<_, PendingDeleteRow>(
            "SELECT run_id, user_id FROM pending_deletes WHERE run_id = ?1",
        )
        .bind(run_id.as_bytes())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        match row {
            Some(r) => Ok(Some(r.try_into()?)),
            None => Ok(None),
        }
    }

    async fn pending_deletes_for(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PendingDelete>, StorageError> {
        let rows = sqlx::query_as::<_, PendingDeleteRow>(
            r#"
            SELECT run_id, user_id
            FROM pending_deletes
            WHERE user_id = ?1
            ORDER BY rowid ASC
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }

    async fn delete_pending_delete(&self, run_id: &RunId) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM pending_deletes WHERE run_id = ?1")
            .bind(run_id.as_bytes())
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}

const JOB_COLUMNS: &str = "id, kind, tag, run_id, attempts, next_run_at, period_secs, \
                           backoff_base_ms, requires_network, state";

#[async_trait]
impl JobQueue for SqliteStorage {
    async fn enqueue(&self, job: NewJob) -> Result<JobRecord, StorageError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO jobs (kind, tag, run_id, attempts, next_run_at, period_secs,
                              backoff_base_ms, requires_network, state)
            VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7, ?8)
            RETURNING id
            "#,
        )
        .bind(job.kind.to_string())
        .bind(job.kind.tag())
        .bind(job.run_id.as_ref().map(|id| id.as_bytes().to_vec()))
        .bind(job.next_run_at)
        .bind(job.period_secs.map(|p| p as i64))
        .bind(job.backoff_base_ms as i64)
        .bind(job.requires_network)
        .bind(JobState::Enqueued.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(JobRecord {
            id,
            kind: job.kind,
            tag: job.kind.tag().to_string(),
            run_id: job.run_id,
            attempts: 0,
            next_run_at: job.next_run_at,
            period_secs: job.period_secs,
            backoff_base_ms: job.backoff_base_ms,
            requires_network: job.requires_network,
            state: JobState::Enqueued,
        })
    }

    async fn due_jobs(&self, now_ms: i64) -> Result<Vec<JobRecord>, StorageError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE state = 'enqueued' AND next_run_at <= ?1 \
             ORDER BY next_run_at ASC, id ASC"
        ))
        .bind(now_ms)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }

    async fn outstanding_by_tag(&self, tag: &str) -> Result<Vec<JobRecord>, StorageError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE tag = ?1 AND state != 'failed' \
             ORDER BY id ASC"
        ))
        .bind(tag)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }

    async fn has_outstanding(&self, kind: JobKind, run_id: &RunId) -> Result<bool, StorageError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM jobs
            WHERE kind = ?1 AND run_id = ?2 AND state != 'failed'
            "#,
        )
        .bind(kind.to_string())
        .bind(run_id.as_bytes())
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(count > 0)
    }

    async fn claim(&self, id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'running' WHERE id = ?1 AND state = 'enqueued'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete(&self, id: i64) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM jobs WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn reschedule(
        &self,
        id: i64,
        attempts: u32,
        next_run_at: i64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            UPDATE jobs SET state = 'enqueued', attempts = ?2, next_run_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(attempts as i64)
        .bind(next_run_at)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn mark_failed(&self, id: i64, attempts: u32) -> Result<(), StorageError> {
        sqlx::query("UPDATE jobs SET state = 'failed', attempts = ?2 WHERE id = ?1")
            .bind(id)
            .bind(attempts as i64)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn requeue_running(&self) -> Result<u64, StorageError> {
        let result = sqlx::query("UPDATE jobs SET state = 'enqueued' WHERE state = 'running'")
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(result.rows_affected())
    }

    async fn cancel_all(&self) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM jobs")
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(result.rows_affected())
    }

    async fn list_jobs(&self) -> Result<Vec<JobRecord>, StorageError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }
}

fn run_id_from(bytes: &[u8], table: &'static str) -> Result<RunId, StorageError> {
    RunId::from_bytes(bytes).ok_or(StorageError::Corrupt {
        table,
        column: "run_id",
    })
}

/// Internal row types for SQLite queries.
#[derive(sqlx::FromRow)]
struct PendingCreateRow {
    run_id: Vec<u8>,
    run: Vec<u8>,
    image: Vec<u8>,
    user_id: String,
}

impl TryFrom<PendingCreateRow> for PendingCreate {
    type Error = StorageError;

    fn try_from(row: PendingCreateRow) -> Result<Self, Self::Error> {
        Ok(PendingCreate {
            run_id: run_id_from(&row.run_id, "pending_creates")?,
            run: Run::from_bytes(&row.run)?,
            image: row.image,
            user_id: UserId::new(row.user_id),
        })
    }
}

#[derive(sqlx::FromRow)]
struct PendingDeleteRow {
    run_id: Vec<u8>,
    user_id: String,
}

impl TryFrom<PendingDeleteRow> for PendingDelete {
    type Error = StorageError;

    fn try_from(row: PendingDeleteRow) -> Result<Self, Self::Error> {
        Ok(PendingDelete {
            run_id: run_id_from(&row.run_id, "pending_deletes")?,
            user_id: UserId::new(row.user_id),
        })
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    kind: String,
    tag: String,
    run_id: Option<Vec<u8>>,
    attempts: i64,
    next_run_at: i64,
    period_secs: Option<i64>,
    backoff_base_ms: i64,
    requires_network: bool,
    state: String,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = StorageError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(JobRecord {
            id: row.id,
            kind: row.kind.parse()?,
            tag: row.tag,
            run_id: row
                .run_id
                .as_deref()
                .map(|bytes| run_id_from(bytes, "jobs"))
                .transpose()?,
            attempts: row.attempts as u32,
            next_run_at: row.next_run_at,
            period_secs: row.period_secs.map(|p| p as u64),
            backoff_base_ms: row.backoff_base_ms as u64,
            requires_network: row.requires_network,
            state: row.state.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use run_types::Position;
    use std::time::Duration;

    fn make_run(id: RunId, distance_meters: u32) -> Run {
        Run {
            id: Some(id),
            duration: Duration::from_secs(1_800),
            started_at: 1_700_000_000,
            distance_meters,
            location: Position::new(52.52, 13.40, 34.0),
            max_speed_kmh: 15.1,
            total_elevation_meters: 12,
            avg_heart_rate: Some(148),
            max_heart_rate: Some(171),
            map_picture_url: None,
        }
    }

    fn make_create(user: &str, distance_meters: u32) -> PendingCreate {
        let run_id = RunId::new();
        PendingCreate {
            run_id,
            run: make_run(run_id, distance_meters),
            image: vec![0x89, b'P', b'N', b'G'],
            user_id: UserId::new(user),
        }
    }

    fn one_shot(kind: JobKind, run_id: RunId, next_run_at: i64) -> NewJob {
        NewJob {
            kind,
            run_id: Some(run_id),
            next_run_at,
            period_secs: None,
            backoff_base_ms: 2000,
            requires_network: true,
        }
    }

    #[tokio::test]
    async fn pending_create_roundtrips_payload() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let entry = make_create("user-1", 5_000);

        storage.upsert_pending_create(&entry).await.unwrap();

        let stored = storage.get_pending_create(&entry.run_id).await.unwrap();
        assert_eq!(stored, Some(entry));
    }

    #[tokio::test]
    async fn upsert_replaces_same_run() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let mut entry = make_create("user-1", 5_000);
        storage.upsert_pending_create(&entry).await.unwrap();

        entry.run.distance_meters = 6_000;
        storage.upsert_pending_create(&entry).await.unwrap();

        let all = storage
            .pending_creates_for(&UserId::new("user-1"))
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].run.distance_meters, 6_000);
    }

    #[tokio::test]
    async fn pending_entries_are_scoped_by_user() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let a1 = make_create("alice", 1_000);
        let a2 = make_create("alice", 2_000);
        let b1 = make_create("bob", 3_000);
        for entry in [&a1, &a2, &b1] {
            storage.upsert_pending_create(entry).await.unwrap();
        }
        storage
            .upsert_pending_delete(&PendingDelete {
                run_id: RunId::new(),
                user_id: UserId::new("bob"),
            })
            .await
            .unwrap();

        let alice = storage
            .pending_creates_for(&UserId::new("alice"))
            .await
            .unwrap();
        assert_eq!(alice, vec![a1, a2]);
        assert!(storage
            .pending_deletes_for(&UserId::new("alice"))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            storage
                .pending_deletes_for(&UserId::new("bob"))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn delete_reports_whether_entry_existed() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let entry = PendingDelete {
            run_id: RunId::new(),
            user_id: UserId::new("user-1"),
        };
        storage.upsert_pending_delete(&entry).await.unwrap();
        assert_eq!(
            storage.get_pending_delete(&entry.run_id).await.unwrap(),
            Some(entry.clone())
        );

        assert!(storage.delete_pending_delete(&entry.run_id).await.unwrap());
        assert!(!storage.delete_pending_delete(&entry.run_id).await.unwrap());
        assert!(storage
            .get_pending_delete(&entry.run_id)
            .await
            .unwrap()
            .is_none());
        assert!(!storage.delete_pending_create(&entry.run_id).await.unwrap());
    }

    #[tokio::test]
    async fn due_jobs_respect_time_and_state() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let run_id = RunId::new();
        let early = storage
            .enqueue(one_shot(JobKind::CreateRun, run_id, 1_000))
            .await
            .unwrap();
        let late = storage
            .enqueue(one_shot(JobKind::DeleteRun, run_id, 5_000))
            .await
            .unwrap();

        let due = storage.due_jobs(1_000).await.unwrap();
        assert_eq!(due, vec![early.clone()]);

        assert!(storage.claim(early.id).await.unwrap());
        assert!(!storage.claim(early.id).await.unwrap());
        assert_eq!(storage.due_jobs(10_000).await.unwrap(), vec![late]);
    }

    #[tokio::test]
    async fn reschedule_and_fail_update_record() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let run_id = RunId::new();
        let job = storage
            .enqueue(one_shot(JobKind::CreateRun, run_id, 0))
            .await
            .unwrap();

        storage.claim(job.id).await.unwrap();
        storage.reschedule(job.id, 1, 2_000).await.unwrap();
        let jobs = storage.list_jobs().await.unwrap();
        assert_eq!(jobs[0].attempts, 1);
        assert_eq!(jobs[0].next_run_at, 2_000);
        assert_eq!(jobs[0].state, JobState::Enqueued);

        storage.mark_failed(job.id, 5).await.unwrap();
        let jobs = storage.list_jobs().await.unwrap();
        assert_eq!(jobs[0].state, JobState::Failed);
        assert_eq!(jobs[0].attempts, 5);
        assert!(!storage
            .has_outstanding(JobKind::CreateRun, &run_id)
            .await
            .unwrap());
        assert!(storage.due_jobs(i64::MAX).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn outstanding_lookups_by_tag_and_run() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let run_id = RunId::new();
        storage
            .enqueue(NewJob {
                kind: JobKind::FetchRuns,
                run_id: None,
                next_run_at: 0,
                period_secs: Some(1_800),
                backoff_base_ms: 2000,
                requires_network: true,
            })
            .await
            .unwrap();
        storage
            .enqueue(one_shot(JobKind::DeleteRun, run_id, 0))
            .await
            .unwrap();

        let fetch = storage.outstanding_by_tag("sync_work").await.unwrap();
        assert_eq!(fetch.len(), 1);
        assert!(fetch[0].is_periodic());
        assert!(fetch[0].run_id.is_none());

        assert!(storage
            .has_outstanding(JobKind::DeleteRun, &run_id)
            .await
            .unwrap());
        assert!(!storage
            .has_outstanding(JobKind::CreateRun, &run_id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn running_jobs_return_to_queue_after_restart() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let job = storage
            .enqueue(one_shot(JobKind::CreateRun, RunId::new(), 0))
            .await
            .unwrap();
        storage.claim(job.id).await.unwrap();
        assert!(storage.due_jobs(i64::MAX).await.unwrap().is_empty());

        assert_eq!(storage.requeue_running().await.unwrap(), 1);
        assert_eq!(storage.due_jobs(i64::MAX).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancel_all_is_idempotent() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        for _ in 0..3 {
            storage
                .enqueue(one_shot(JobKind::CreateRun, RunId::new(), 0))
                .await
                .unwrap();
        }

        assert_eq!(storage.cancel_all().await.unwrap(), 3);
        assert_eq!(storage.cancel_all().await.unwrap(), 0);
        assert!(storage.list_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.db");
        let entry = make_create("user-1", 4_200);

        {
            let storage = SqliteStorage::new(&path).await.unwrap();
            storage.upsert_pending_create(&entry).await.unwrap();
            storage
                .enqueue(one_shot(JobKind::CreateRun, entry.run_id, 0))
                .await
                .unwrap();
        }

        let storage = SqliteStorage::new(&path).await.unwrap();
        assert_eq!(
            storage.get_pending_create(&entry.run_id).await.unwrap(),
            Some(entry.clone())
        );
        assert!(storage
            .has_outstanding(JobKind::CreateRun, &entry.run_id)
            .await
            .unwrap());
    }
}
