//! Lifecycle operations: status, cancel, retry, restart, listing.
//!
//! Every operation takes the requester's id and checks it against the
//! stored owner; authorization beyond that equality lives outside the
//! core.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::job::{Job, JobStatus, JobView};
use crate::storage::{JobStore, NewJob};

use super::dispatcher::SchedulerHandle;
use super::QueueConfig;

/// Status queries and the cancel/retry/restart side channels.
pub struct Lifecycle {
    store: Arc<JobStore>,
    scheduler: Arc<dyn SchedulerHandle>,
    config: QueueConfig,
}

impl Lifecycle {
    /// Creates a new lifecycle manager.
    pub fn new(
        store: Arc<JobStore>,
        scheduler: Arc<dyn SchedulerHandle>,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            scheduler,
            config,
        }
    }

    /// Returns the job if it exists and belongs to the requester.
    pub async fn get_status(
        &self,
        job_id: Uuid,
        requester_id: &str,
    ) -> Result<JobView, LifecycleError> {
        Ok(self.load_owned(job_id, requester_id).await?.into_view())
    }

    /// Cancels a pending or processing job.
    ///
    /// Idempotent: returns whether this call changed the row. A job that
    /// is already terminal reports `false`. Cancelling a running job does
    /// not interrupt its executor; the late terminal write is absorbed by
    /// the row's conditional updates.
    pub async fn cancel(&self, job_id: Uuid, requester_id: &str) -> Result<bool, LifecycleError> {
        let job = self.load_owned(job_id, requester_id).await?;
        if job.status.is_terminal() {
            return Ok(false);
        }

        let cancelled = self.store.cancel(job_id).await?;
        if cancelled {
            if self.scheduler.is_running(job_id).await {
                info!(job_id = %job_id, "Cancelled running job; in-flight result will be discarded");
            } else {
                info!(job_id = %job_id, "Cancelled queued job");
            }
        }
        Ok(cancelled)
    }

    /// Queues a fresh job with the same payload as a failed or cancelled
    /// one. The original row is left untouched apart from a breadcrumb
    /// pointing at the new id.
    pub async fn retry(&self, job_id: Uuid, requester_id: &str) -> Result<Uuid, LifecycleError> {
        let job = self.load_owned(job_id, requester_id).await?;
        require_retriable(&job, "retry")?;

        let active = self.store.count_active_for_user(requester_id).await?;
        if active >= self.config.max_total_queue_size {
            return Err(LifecycleError::QuotaExceeded {
                active,
                limit: self.config.max_total_queue_size,
            });
        }

        let new_job = self
            .store
            .insert(NewJob {
                user_id: job.user_id.clone(),
                title: job.title.clone(),
                payload: job.payload.clone(),
            })
            .await?;
        self.store.mark_retried(job_id, new_job.id).await?;

        info!(
            job_id = %job_id,
            new_job_id = %new_job.id,
            "Retried job as new submission"
        );
        self.scheduler.request_tick();

        Ok(new_job.id)
    }

    /// Resets a failed or cancelled job back to pending on the same row.
    ///
    /// Returns whether the row was reset; `false` means the status
    /// changed between the precondition check and the update.
    pub async fn restart(&self, job_id: Uuid, requester_id: &str) -> Result<bool, LifecycleError> {
        let job = self.load_owned(job_id, requester_id).await?;
        require_retriable(&job, "restart")?;

        let restarted = self.store.restart(job_id).await?;
        if restarted {
            info!(job_id = %job_id, "Restarted job");
            self.scheduler.request_tick();
        }
        Ok(restarted)
    }

    /// Lists the requester's jobs, most recent first, bounded.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<JobView>, LifecycleError> {
        let jobs = self
            .store
            .list_for_user(user_id, self.config.list_limit)
            .await?;
        Ok(jobs.into_iter().map(Job::into_view).collect())
    }

    async fn load_owned(&self, job_id: Uuid, requester_id: &str) -> Result<Job, LifecycleError> {
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or(LifecycleError::NotFound(job_id))?;
        if job.user_id != requester_id {
            return Err(LifecycleError::Unauthorized(job_id));
        }
        Ok(job)
    }
}

fn require_retriable(job: &Job, op: &'static str) -> Result<(), LifecycleError> {
    match job.status {
        JobStatus::Failed | JobStatus::Cancelled => Ok(()),
        from => Err(LifecycleError::InvalidState { from, op }),
    }
}
