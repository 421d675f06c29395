//! SQLite-backed job store.
//!
//! The jobs table is the single coordination medium for the whole queue:
//! admission inserts into it, the dispatcher claims from it, executors
//! write progress and terminal states into it, and the reaper deletes from
//! it. Every state transition is a conditional UPDATE so concurrent
//! writers resolve races at the row level instead of in process memory.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

use crate::job::{Job, JobPayload, JobStatus, JobType, OptimizationResult};

use super::migrations::{MigrationError, MigrationRunner};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection to the database failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// Serialization/deserialization of a JSON column failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    /// A persisted value could not be interpreted.
    #[error("Corrupt row: bad {column} value '{value}'")]
    Corrupt { column: &'static str, value: String },
}

/// Fields required to insert a new job row.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Owner of the job.
    pub user_id: String,
    /// Human-readable title shown in job listings.
    pub title: String,
    /// Type-specific input.
    pub payload: JobPayload,
}

const JOB_COLUMNS: &str = "id, user_id, job_type, status, title, payload, progress, result, \
     error_message, error_code, retried_as, reclaims, created_at, started_at, completed_at";

/// SQLite job store.
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    /// Connects to the database and returns a new store.
    ///
    /// The database file is created if missing.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Creates a migrated in-memory store.
    ///
    /// A single connection keeps every caller on the same in-memory
    /// database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Creates a store from an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Runs database migrations.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        MigrationRunner::new(self.pool.clone())
            .run_migrations()
            .await?;
        Ok(())
    }

    // =========================================================================
    // Inserts and reads
    // =========================================================================

    /// Inserts a new pending job and returns the stored row.
    pub async fn insert(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let payload_json = serde_json::to_string(&new_job.payload)?;
        let job_type = new_job.payload.job_type();

        sqlx::query(
            r#"
            INSERT INTO jobs (id, user_id, job_type, status, title, payload,
                              progress, reclaims, created_at)
            VALUES (?, ?, ?, 'pending', ?, ?, 0, 0, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&new_job.user_id)
        .bind(job_type.as_str())
        .bind(&new_job.title)
        .bind(&payload_json)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Job {
            id,
            user_id: new_job.user_id,
            job_type,
            status: JobStatus::Pending,
            title: new_job.title,
            payload: new_job.payload,
            progress: 0,
            result: None,
            error_message: None,
            error_code: None,
            retried_as: None,
            reclaims: 0,
            created_at,
            started_at: None,
            completed_at: None,
        })
    }

    /// Fetches a job by id.
    pub async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_job).transpose()
    }

    /// Lists a user's jobs, most recent first.
    pub async fn list_for_user(&self, user_id: &str, limit: u32) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM jobs WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
            JOB_COLUMNS
        ))
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_job).collect()
    }

    /// Loads the oldest pending jobs, FIFO by creation time.
    pub async fn load_pending(&self, limit: u32) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM jobs WHERE status = 'pending' ORDER BY created_at ASC LIMIT ?",
            JOB_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_job).collect()
    }

    /// Loads processing jobs whose run started before `cutoff`.
    pub async fn load_stale_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM jobs WHERE status = 'processing' \
             AND started_at IS NOT NULL AND started_at < ?",
            JOB_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_job).collect()
    }

    // =========================================================================
    // Counts
    // =========================================================================

    /// Counts a user's pending and processing jobs.
    pub async fn count_active_for_user(&self, user_id: &str) -> Result<u32, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE user_id = ? AND status IN ('pending', 'processing')",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }

    /// Counts a user's pending jobs.
    pub async fn count_pending_for_user(&self, user_id: &str) -> Result<u32, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE user_id = ? AND status = 'pending'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }

    /// Counts a user's completed jobs.
    pub async fn count_completed_for_user(&self, user_id: &str) -> Result<u32, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE user_id = ? AND status = 'completed'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }

    /// Counts all pending jobs.
    pub async fn count_pending(&self) -> Result<u32, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u32)
    }

    /// Counts all processing jobs.
    pub async fn count_processing(&self) -> Result<u32, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = 'processing'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u32)
    }

    /// Returns processing counts grouped by user.
    pub async fn processing_counts_by_user(&self) -> Result<HashMap<String, u32>, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT user_id, COUNT(*) FROM jobs WHERE status = 'processing' GROUP BY user_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user, count)| (user, count as u32))
            .collect())
    }

    // =========================================================================
    // State transitions
    // =========================================================================

    /// Claims a pending job for execution.
    ///
    /// The claim is a single conditional UPDATE, so when several dispatch
    /// passes race for the same row exactly one of them wins. Returns
    /// whether this caller won.
    pub async fn claim(&self, id: Uuid, started_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'processing', started_at = ?, progress = 10 \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(started_at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Advances the progress indicator.
    ///
    /// No-ops (returns false) once the row left `processing`, so a late
    /// executor write after a cancel changes nothing.
    pub async fn set_progress(&self, id: Uuid, progress: u8) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE jobs SET progress = ? WHERE id = ? AND status = 'processing'")
                .bind(progress as i64)
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Persists a successful terminal state.
    ///
    /// Conditional on the row still being `processing`; returns false when
    /// the result was discarded because the job was cancelled meanwhile.
    pub async fn complete(
        &self,
        id: Uuid,
        result: &OptimizationResult,
    ) -> Result<bool, StoreError> {
        let result_json = serde_json::to_string(result)?;
        let outcome = sqlx::query(
            "UPDATE jobs SET status = 'completed', progress = 100, result = ?, completed_at = ? \
             WHERE id = ? AND status = 'processing'",
        )
        .bind(&result_json)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected() == 1)
    }

    /// Persists a failed terminal state. Same conditionality as
    /// [`JobStore::complete`].
    pub async fn fail(
        &self,
        id: Uuid,
        error_message: &str,
        error_code: &str,
    ) -> Result<bool, StoreError> {
        let outcome = sqlx::query(
            "UPDATE jobs SET status = 'failed', error_message = ?, error_code = ?, \
             completed_at = ? WHERE id = ? AND status = 'processing'",
        )
        .bind(error_message)
        .bind(error_code)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected() == 1)
    }

    /// Cancels a job that has not reached a terminal state yet.
    ///
    /// Idempotent: a second call finds no matching row and returns false.
    pub async fn cancel(&self, id: Uuid) -> Result<bool, StoreError> {
        let outcome = sqlx::query(
            "UPDATE jobs SET status = 'cancelled', completed_at = ? \
             WHERE id = ? AND status IN ('pending', 'processing')",
        )
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected() == 1)
    }

    /// Resets a failed or cancelled job back to pending on the same row.
    pub async fn restart(&self, id: Uuid) -> Result<bool, StoreError> {
        let outcome = sqlx::query(
            "UPDATE jobs SET status = 'pending', progress = 0, result = NULL, \
             error_message = NULL, error_code = NULL, started_at = NULL, completed_at = NULL \
             WHERE id = ? AND status IN ('failed', 'cancelled')",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected() == 1)
    }

    /// Annotates a job with the id of its retry sibling.
    pub async fn mark_retried(&self, id: Uuid, new_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE jobs SET retried_as = ? WHERE id = ?")
            .bind(new_id.to_string())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns a stale processing job to the pending queue, counting the
    /// reclaim.
    pub async fn reclaim(&self, id: Uuid) -> Result<bool, StoreError> {
        let outcome = sqlx::query(
            "UPDATE jobs SET status = 'pending', started_at = NULL, progress = 0, \
             reclaims = reclaims + 1 WHERE id = ? AND status = 'processing'",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected() == 1)
    }

    // =========================================================================
    // Retention
    // =========================================================================

    /// Deletes terminal jobs of the given status completed before `cutoff`.
    ///
    /// Non-terminal statuses are refused outright: a stuck processing row
    /// is a signal, not garbage.
    pub async fn delete_terminal_before(
        &self,
        status: JobStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        if !status.is_terminal() {
            return Ok(0);
        }

        let outcome = sqlx::query(
            "DELETE FROM jobs WHERE status = ? AND completed_at IS NOT NULL AND completed_at < ?",
        )
        .bind(status.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected())
    }
}

fn row_to_job(row: SqliteRow) -> Result<Job, StoreError> {
    let id_text: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| StoreError::Corrupt {
        column: "id",
        value: id_text.clone(),
    })?;

    let type_text: String = row.try_get("job_type")?;
    let job_type = JobType::parse(&type_text).ok_or_else(|| StoreError::Corrupt {
        column: "job_type",
        value: type_text.clone(),
    })?;

    let status_text: String = row.try_get("status")?;
    let status = JobStatus::parse(&status_text).ok_or_else(|| StoreError::Corrupt {
        column: "status",
        value: status_text.clone(),
    })?;

    let payload_json: String = row.try_get("payload")?;
    let payload: JobPayload = serde_json::from_str(&payload_json)?;

    let result_json: Option<String> = row.try_get("result")?;
    let result: Option<OptimizationResult> = result_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;

    let retried_text: Option<String> = row.try_get("retried_as")?;
    let retried_as = retried_text
        .map(|text| {
            Uuid::parse_str(&text).map_err(|_| StoreError::Corrupt {
                column: "retried_as",
                value: text.clone(),
            })
        })
        .transpose()?;

    Ok(Job {
        id,
        user_id: row.try_get("user_id")?,
        job_type,
        status,
        title: row.try_get("title")?,
        payload,
        progress: row.try_get::<i64, _>("progress")? as u8,
        result,
        error_message: row.try_get("error_message")?,
        error_code: row.try_get("error_code")?,
        retried_as,
        reclaims: row.try_get::<i64, _>("reclaims")? as u32,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::OptimizationConfig;
    use chrono::Duration as ChronoDuration;

    fn transcript_job(user_id: &str) -> NewJob {
        NewJob {
            user_id: user_id.to_string(),
            title: "Pasted transcript".to_string(),
            payload: JobPayload::Transcript {
                text: "hello world".to_string(),
                config: OptimizationConfig::default(),
            },
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_roundtrip() {
        let store = JobStore::in_memory().await.expect("store");
        let inserted = store.insert(transcript_job("user-1")).await.expect("insert");

        let fetched = store
            .get(inserted.id)
            .await
            .expect("get")
            .expect("job exists");

        assert_eq!(fetched.id, inserted.id);
        assert_eq!(fetched.user_id, "user-1");
        assert_eq!(fetched.payload, inserted.payload);
        assert_eq!(fetched.title, inserted.title);
        assert_eq!(fetched.status, JobStatus::Pending);
        assert_eq!(fetched.progress, 0);
        assert!(fetched.started_at.is_none());
        assert!(fetched.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_get_unknown_id() {
        let store = JobStore::in_memory().await.expect("store");
        assert!(store.get(Uuid::new_v4()).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = JobStore::in_memory().await.expect("store");
        let job = store.insert(transcript_job("user-1")).await.expect("insert");

        assert!(store.claim(job.id, Utc::now()).await.expect("first claim"));
        assert!(!store.claim(job.id, Utc::now()).await.expect("second claim"));

        let row = store.get(job.id).await.expect("get").expect("exists");
        assert_eq!(row.status, JobStatus::Processing);
        assert_eq!(row.progress, 10);
        assert!(row.started_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let store = JobStore::in_memory().await.expect("store");
        let job = store.insert(transcript_job("user-1")).await.expect("insert");

        assert!(store.cancel(job.id).await.expect("first cancel"));
        assert!(!store.cancel(job.id).await.expect("second cancel"));

        let row = store.get(job.id).await.expect("get").expect("exists");
        assert_eq!(row.status, JobStatus::Cancelled);
        assert!(row.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_write_after_cancel_is_noop() {
        let store = JobStore::in_memory().await.expect("store");
        let job = store.insert(transcript_job("user-1")).await.expect("insert");

        assert!(store.claim(job.id, Utc::now()).await.expect("claim"));
        assert!(store.cancel(job.id).await.expect("cancel"));

        let result = OptimizationResult::default();
        assert!(!store.complete(job.id, &result).await.expect("complete"));
        assert!(!store.fail(job.id, "boom", "pipeline").await.expect("fail"));

        let row = store.get(job.id).await.expect("get").expect("exists");
        assert_eq!(row.status, JobStatus::Cancelled);
        assert!(row.result.is_none());
        assert!(row.error_message.is_none());
    }

    #[tokio::test]
    async fn test_restart_resets_row() {
        let store = JobStore::in_memory().await.expect("store");
        let job = store.insert(transcript_job("user-1")).await.expect("insert");

        assert!(store.claim(job.id, Utc::now()).await.expect("claim"));
        assert!(store.fail(job.id, "boom", "pipeline").await.expect("fail"));

        assert!(store.restart(job.id).await.expect("restart"));

        let row = store.get(job.id).await.expect("get").expect("exists");
        assert_eq!(row.status, JobStatus::Pending);
        assert_eq!(row.progress, 0);
        assert!(row.error_message.is_none());
        assert!(row.error_code.is_none());
        assert!(row.started_at.is_none());
        assert!(row.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_restart_requires_terminal_failure() {
        let store = JobStore::in_memory().await.expect("store");
        let job = store.insert(transcript_job("user-1")).await.expect("insert");

        // Pending and processing rows are not restartable.
        assert!(!store.restart(job.id).await.expect("restart pending"));
        assert!(store.claim(job.id, Utc::now()).await.expect("claim"));
        assert!(!store.restart(job.id).await.expect("restart processing"));
    }

    #[tokio::test]
    async fn test_reclaim_counts_and_requeues() {
        let store = JobStore::in_memory().await.expect("store");
        let job = store.insert(transcript_job("user-1")).await.expect("insert");

        let stale_start = Utc::now() - ChronoDuration::hours(2);
        assert!(store.claim(job.id, stale_start).await.expect("claim"));

        let stale = store
            .load_stale_processing(Utc::now() - ChronoDuration::hours(1))
            .await
            .expect("stale scan");
        assert_eq!(stale.len(), 1);

        assert!(store.reclaim(job.id).await.expect("reclaim"));
        let row = store.get(job.id).await.expect("get").expect("exists");
        assert_eq!(row.status, JobStatus::Pending);
        assert_eq!(row.reclaims, 1);
        assert!(row.started_at.is_none());
    }

    #[tokio::test]
    async fn test_delete_terminal_refuses_active_rows() {
        let store = JobStore::in_memory().await.expect("store");
        let job = store.insert(transcript_job("user-1")).await.expect("insert");
        store.claim(job.id, Utc::now()).await.expect("claim");

        let far_future = Utc::now() + ChronoDuration::days(3650);
        assert_eq!(
            store
                .delete_terminal_before(JobStatus::Pending, far_future)
                .await
                .expect("pending delete"),
            0
        );
        assert_eq!(
            store
                .delete_terminal_before(JobStatus::Processing, far_future)
                .await
                .expect("processing delete"),
            0
        );
        assert!(store.get(job.id).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn test_delete_terminal_respects_cutoff() {
        let store = JobStore::in_memory().await.expect("store");
        let job = store.insert(transcript_job("user-1")).await.expect("insert");
        store.claim(job.id, Utc::now()).await.expect("claim");
        store
            .complete(job.id, &OptimizationResult::default())
            .await
            .expect("complete");

        // Not old enough yet.
        let old_cutoff = Utc::now() - ChronoDuration::hours(1);
        assert_eq!(
            store
                .delete_terminal_before(JobStatus::Completed, old_cutoff)
                .await
                .expect("delete"),
            0
        );

        // Past the retention window.
        let future_cutoff = Utc::now() + ChronoDuration::hours(1);
        assert_eq!(
            store
                .delete_terminal_before(JobStatus::Completed, future_cutoff)
                .await
                .expect("delete"),
            1
        );
        assert!(store.get(job.id).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_counts_by_user() {
        let store = JobStore::in_memory().await.expect("store");
        let a1 = store.insert(transcript_job("alice")).await.expect("insert");
        store.insert(transcript_job("alice")).await.expect("insert");
        store.insert(transcript_job("bob")).await.expect("insert");

        assert_eq!(store.count_active_for_user("alice").await.expect("count"), 2);
        assert_eq!(store.count_pending_for_user("alice").await.expect("count"), 2);
        assert_eq!(store.count_pending().await.expect("count"), 3);

        store.claim(a1.id, Utc::now()).await.expect("claim");
        assert_eq!(store.count_processing().await.expect("count"), 1);
        assert_eq!(store.count_pending_for_user("alice").await.expect("count"), 1);
        assert_eq!(store.count_active_for_user("alice").await.expect("count"), 2);

        let by_user = store.processing_counts_by_user().await.expect("grouped");
        assert_eq!(by_user.get("alice"), Some(&1));
        assert_eq!(by_user.get("bob"), None);
    }

    #[tokio::test]
    async fn test_list_for_user_is_recent_first_and_bounded() {
        let store = JobStore::in_memory().await.expect("store");
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(store.insert(transcript_job("alice")).await.expect("insert").id);
            // Distinct created_at values keep the ordering deterministic.
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        store.insert(transcript_job("bob")).await.expect("insert");

        let listed = store.list_for_user("alice", 2).await.expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, ids[2]);
        assert_eq!(listed[1].id, ids[1]);
    }
}
