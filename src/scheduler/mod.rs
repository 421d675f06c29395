//! Job scheduling over the persisted queue.
//!
//! This module contains everything between "a job row exists" and "an
//! executor owns it":
//!
//! - **Admission**: validates and inserts new jobs, enforcing quota
//! - **Scheduler**: the periodic dispatch tick with fairness and caps
//! - **Lifecycle**: status, cancel, retry and restart operations
//! - **Reaper**: retention sweep over terminal rows
//!
//! # Architecture
//!
//! ```text
//!      ┌────────────┐   insert    ┌──────────────┐
//!      │ Admission  ├────────────►│              │
//!      └─────┬──────┘             │              │
//!            │ poke               │   jobs       │
//!      ┌─────▼──────┐   claim     │   table      │
//!      │ Scheduler  ├────────────►│  (SQLite)    │
//!      └─────┬──────┘             │              │
//!            │ spawn              │              │
//!      ┌─────▼──────┐  progress/  │              │
//!      │ Executor   ├────────────►│              │
//!      └────────────┘  terminal   └──▲────────▲──┘
//!                                    │        │
//!                        Lifecycle ──┘        └── Reaper
//! ```
//!
//! The table is the single source of truth; the only process-local state
//! is the in-flight token set, rebuilt empty on restart.

pub mod admission;
pub mod dispatcher;
pub mod lifecycle;
pub mod reaper;

use std::time::Duration;

pub use admission::{Admission, SubmitRequest};
pub use dispatcher::{Detached, Scheduler, SchedulerHandle};
pub use lifecycle::Lifecycle;
pub use reaper::{ReapReport, Reaper, ReaperConfig};

/// Configuration for admission and dispatch.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// System-wide ceiling on concurrently processing jobs.
    pub max_concurrent_jobs: u32,
    /// Per-user ceiling on concurrently processing jobs.
    pub max_jobs_per_user: u32,
    /// Per-user ceiling on pending + processing jobs at submission.
    pub max_total_queue_size: u32,
    /// Period between dispatch ticks.
    pub tick_interval: Duration,
    /// How many pending rows one tick scans.
    pub scan_limit: u32,
    /// Average job duration used for wait estimates.
    pub average_job_minutes: u32,
    /// Pending count above which the tick warns.
    pub high_queue_depth: u32,
    /// Age after which a processing row with no live run is reclaimed.
    pub stale_after: Duration,
    /// Reclaims after which a stale row is failed instead of requeued.
    pub max_reclaims: u32,
    /// Maximum rows returned by a user listing.
    pub list_limit: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 5,
            max_jobs_per_user: 5,
            max_total_queue_size: 20,
            tick_interval: Duration::from_secs(5),
            scan_limit: 50,
            average_job_minutes: 3,
            high_queue_depth: 20,
            stale_after: Duration::from_secs(30 * 60),
            max_reclaims: 3,
            list_limit: 50,
        }
    }
}

impl QueueConfig {
    /// Sets the global concurrency cap.
    pub fn with_max_concurrent_jobs(mut self, max: u32) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    /// Sets the per-user concurrency cap.
    pub fn with_max_jobs_per_user(mut self, max: u32) -> Self {
        self.max_jobs_per_user = max;
        self
    }

    /// Sets the per-user submission ceiling.
    pub fn with_max_total_queue_size(mut self, max: u32) -> Self {
        self.max_total_queue_size = max;
        self
    }

    /// Sets the dispatch tick period.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the stale-processing threshold.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Sets the reclaim ceiling.
    pub fn with_max_reclaims(mut self, max: u32) -> Self {
        self.max_reclaims = max;
        self
    }
}

/// Converts a std duration to chrono, saturating instead of failing.
pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::max_value())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.max_concurrent_jobs, 5);
        assert_eq!(config.max_jobs_per_user, 5);
        assert_eq!(config.max_total_queue_size, 20);
        assert_eq!(config.tick_interval, Duration::from_secs(5));
        assert_eq!(config.max_reclaims, 3);
    }

    #[test]
    fn test_config_builder() {
        let config = QueueConfig::default()
            .with_max_concurrent_jobs(8)
            .with_max_jobs_per_user(2)
            .with_max_total_queue_size(50)
            .with_tick_interval(Duration::from_secs(1))
            .with_stale_after(Duration::from_secs(60))
            .with_max_reclaims(1);

        assert_eq!(config.max_concurrent_jobs, 8);
        assert_eq!(config.max_jobs_per_user, 2);
        assert_eq!(config.max_total_queue_size, 50);
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.stale_after, Duration::from_secs(60));
        assert_eq!(config.max_reclaims, 1);
    }

    #[test]
    fn test_to_chrono_saturates() {
        assert_eq!(
            to_chrono(Duration::from_secs(60)),
            chrono::Duration::seconds(60)
        );
        assert_eq!(to_chrono(Duration::MAX), chrono::Duration::max_value());
    }
}
