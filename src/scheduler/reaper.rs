//! Retention sweep over terminal job rows.
//!
//! Completed jobs are short-lived (the caller has fetched the result);
//! failed and cancelled rows are kept longer for debugging and retry.
//! Pending and processing rows are never touched: a stuck processing row
//! is a signal of a stuck worker, not garbage.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::job::JobStatus;
use crate::metrics;
use crate::storage::{JobStore, StoreError};

use super::to_chrono;

/// Configuration for the retention sweep.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Period between sweeps.
    pub interval: Duration,
    /// How long completed rows are kept.
    pub completed_retention: Duration,
    /// How long failed and cancelled rows are kept.
    pub failed_retention: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            completed_retention: Duration::from_secs(60 * 60),
            failed_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl ReaperConfig {
    /// Sets the sweep period.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the completed-row retention window.
    pub fn with_completed_retention(mut self, retention: Duration) -> Self {
        self.completed_retention = retention;
        self
    }

    /// Sets the failed/cancelled retention window.
    pub fn with_failed_retention(mut self, retention: Duration) -> Self {
        self.failed_retention = retention;
        self
    }
}

/// Counts removed by one sweep, per bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl ReapReport {
    /// Total rows removed.
    pub fn total(&self) -> u64 {
        self.completed + self.failed + self.cancelled
    }
}

/// Periodic deletion of old terminal jobs.
pub struct Reaper {
    store: Arc<JobStore>,
    config: ReaperConfig,
}

impl Reaper {
    /// Creates a new reaper.
    pub fn new(store: Arc<JobStore>, config: ReaperConfig) -> Self {
        Self { store, config }
    }

    /// Runs the sweep loop until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Reaper started"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.recv() => break,
            }
            if let Err(e) = self.sweep().await {
                warn!(error = %e, "Reaper sweep failed; retrying next period");
            }
        }

        info!("Reaper stopped");
    }

    /// Runs one sweep against the current clock.
    pub async fn sweep(&self) -> Result<ReapReport, StoreError> {
        self.sweep_at(Utc::now()).await
    }

    /// Runs one sweep as of `now`. Split out so tests can move the clock.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<ReapReport, StoreError> {
        let completed_cutoff = now - to_chrono(self.config.completed_retention);
        let failed_cutoff = now - to_chrono(self.config.failed_retention);

        let report = ReapReport {
            completed: self
                .store
                .delete_terminal_before(JobStatus::Completed, completed_cutoff)
                .await?,
            failed: self
                .store
                .delete_terminal_before(JobStatus::Failed, failed_cutoff)
                .await?,
            cancelled: self
                .store
                .delete_terminal_before(JobStatus::Cancelled, failed_cutoff)
                .await?,
        };

        metrics::add_reaped("completed", report.completed);
        metrics::add_reaped("failed", report.failed);
        metrics::add_reaped("cancelled", report.cancelled);

        if report.total() > 0 {
            info!(
                completed = report.completed,
                failed = report.failed,
                cancelled = report.cancelled,
                "Reaped terminal jobs"
            );
        } else {
            debug!("Reaper sweep removed nothing");
        }

        Ok(report)
    }
}
