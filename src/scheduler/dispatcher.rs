//! Dispatch tick: fairness-aware selection of pending jobs.
//!
//! The scheduler runs a periodic, mutually exclusive tick that claims
//! eligible pending rows and hands them to the executor. Claiming is a
//! single conditional UPDATE, so overlapping ticks or multiple scheduler
//! instances race at the row and exactly one wins.
//!
//! Selection is round-robin across users with FIFO inside each user: the
//! oldest submitter goes first, but no user's backlog can starve the rest
//! of the concurrency budget.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, Mutex, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::executor::Executor;
use crate::job::Job;
use crate::metrics;
use crate::storage::{JobStore, StoreError};

use super::{to_chrono, QueueConfig};

/// Handle other components use to nudge the scheduler.
///
/// Submission and retry want work to start promptly instead of waiting
/// for the next periodic tick; cancel wants to know whether a job is
/// actively running in this process. Offline tools (one-shot CLI
/// commands) plug in [`Detached`] instead of a live scheduler.
#[async_trait]
pub trait SchedulerHandle: Send + Sync {
    /// Requests a best-effort immediate dispatch tick.
    fn request_tick(&self);

    /// Returns whether an executor in this process currently owns the job.
    async fn is_running(&self, job_id: Uuid) -> bool;
}

/// Handle for processes without a running scheduler. Ticks are left to
/// the daemon's periodic schedule.
pub struct Detached;

#[async_trait]
impl SchedulerHandle for Detached {
    fn request_tick(&self) {}

    async fn is_running(&self, _job_id: Uuid) -> bool {
        false
    }
}

/// The dispatch scheduler.
pub struct Scheduler {
    store: Arc<JobStore>,
    executor: Arc<Executor>,
    config: QueueConfig,
    /// Re-entrancy guard: set while a tick runs.
    tick_running: AtomicBool,
    /// Job ids owned by executor tasks spawned from this process.
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
    poke: Notify,
}

impl Scheduler {
    /// Creates a new scheduler.
    pub fn new(store: Arc<JobStore>, executor: Arc<Executor>, config: QueueConfig) -> Self {
        Self {
            store,
            executor,
            config,
            tick_running: AtomicBool::new(false),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            poke: Notify::new(),
        }
    }

    /// Requests an immediate tick without blocking the caller.
    pub fn poke(&self) {
        self.poke.notify_one();
    }

    /// Returns whether the job is owned by a live executor task.
    pub async fn is_in_flight(&self, job_id: Uuid) -> bool {
        self.in_flight.lock().await.contains(&job_id)
    }

    /// Runs the tick loop until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            tick_interval_secs = self.config.tick_interval.as_secs(),
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            "Scheduler started"
        );

        let mut interval = tokio::time::interval(self.config.tick_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.poke.notified() => {}
                _ = shutdown.recv() => break,
            }
            self.tick().await;
        }

        info!("Scheduler stopped");
    }

    /// One dispatch pass. No-ops when another tick is still running.
    pub async fn tick(&self) {
        if self
            .tick_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Tick already running; skipping");
            return;
        }

        if let Err(e) = self.tick_inner().await {
            // No row was mutated destructively; the next period retries.
            warn!(error = %e, "Dispatch tick failed; retrying next period");
        }

        self.tick_running.store(false, Ordering::SeqCst);
    }

    async fn tick_inner(&self) -> Result<(), StoreError> {
        self.reclaim_stale().await?;

        let processing = self.store.count_processing().await?;
        let pending_count = self.store.count_pending().await?;
        metrics::set_queue_gauges(pending_count, processing);

        if pending_count > self.config.high_queue_depth {
            warn!(pending = pending_count, "High queue depth");
        }

        let mut slots = self.config.max_concurrent_jobs.saturating_sub(processing);
        if slots == 0 {
            return Ok(());
        }

        let pending = self.store.load_pending(self.config.scan_limit).await?;
        if pending.is_empty() {
            return Ok(());
        }

        let mut counts = self.store.processing_counts_by_user().await?;

        // Group candidates per user, preserving the order users first
        // appear in the FIFO scan.
        let mut user_order: Vec<String> = Vec::new();
        let mut queues: HashMap<String, VecDeque<Job>> = HashMap::new();
        for job in pending {
            if !queues.contains_key(&job.user_id) {
                user_order.push(job.user_id.clone());
            }
            queues.entry(job.user_id.clone()).or_default().push_back(job);
        }

        // Round-robin: one job per user per round, oldest user first,
        // FIFO inside each user's queue.
        let mut admitted = 0u32;
        'rounds: loop {
            let mut progressed = false;
            for user in &user_order {
                if slots == 0 {
                    break 'rounds;
                }
                if counts.get(user.as_str()).copied().unwrap_or(0)
                    >= self.config.max_jobs_per_user
                {
                    continue;
                }
                let Some(queue) = queues.get_mut(user.as_str()) else {
                    continue;
                };
                let Some(job) = queue.pop_front() else {
                    continue;
                };
                progressed = true;
                if self.dispatch(job).await? {
                    *counts.entry(user.clone()).or_insert(0) += 1;
                    slots -= 1;
                    admitted += 1;
                }
            }
            if !progressed {
                break;
            }
        }

        if admitted > 0 {
            debug!(admitted = admitted, "Dispatch tick admitted jobs");
        }
        Ok(())
    }

    /// Claims one job and spawns its executor task. Returns whether the
    /// claim was won.
    async fn dispatch(&self, job: Job) -> Result<bool, StoreError> {
        let job_id = job.id;
        if !self.store.claim(job_id, Utc::now()).await? {
            // Another dispatcher got here first.
            debug!(job_id = %job_id, "Claim lost; skipping");
            return Ok(false);
        }

        self.in_flight.lock().await.insert(job_id);

        let executor = Arc::clone(&self.executor);
        let in_flight = Arc::clone(&self.in_flight);
        tokio::spawn(async move {
            executor.run(job).await;
            in_flight.lock().await.remove(&job_id);
        });

        Ok(true)
    }

    /// Requeues processing rows whose run died with the process.
    ///
    /// A row is stale when its run started longer than `stale_after` ago
    /// and no executor task in this process owns it. Rows that keep
    /// coming back are failed after `max_reclaims` requeues.
    async fn reclaim_stale(&self) -> Result<(), StoreError> {
        let cutoff = Utc::now() - to_chrono(self.config.stale_after);
        let stale = self.store.load_stale_processing(cutoff).await?;

        for job in stale {
            if self.is_in_flight(job.id).await {
                // Long-running but alive; the executor's own timeout
                // bounds it.
                continue;
            }

            if job.reclaims >= self.config.max_reclaims {
                if self
                    .store
                    .fail(job.id, "Job abandoned after repeated reclaims", "stale")
                    .await?
                {
                    warn!(
                        job_id = %job.id,
                        reclaims = job.reclaims,
                        "Stale job failed after reclaim limit"
                    );
                }
            } else if self.store.reclaim(job.id).await? {
                warn!(
                    job_id = %job.id,
                    reclaims = job.reclaims + 1,
                    "Reclaimed stale processing job"
                );
            }
        }

        Ok(())
    }
}

#[async_trait]
impl SchedulerHandle for Scheduler {
    fn request_tick(&self) {
        self.poke();
    }

    async fn is_running(&self, job_id: Uuid) -> bool {
        self.is_in_flight(job_id).await
    }
}
