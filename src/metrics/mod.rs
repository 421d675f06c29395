//! Prometheus-based monitoring for the queue.
//!
//! # Example
//!
//! ```ignore
//! use clipforge::metrics::{init_metrics, export_metrics};
//!
//! // Initialize metrics on daemon startup
//! init_metrics().expect("Failed to initialize metrics");
//!
//! // Export metrics for Prometheus scraping
//! let metrics_text = export_metrics();
//! ```

pub mod prometheus;

// Re-export recording helpers for call sites inside the queue.
pub use prometheus::{
    add_reaped, export_metrics, inc_submitted, init_metrics, observe_job, set_queue_gauges,
};

// Re-export metric statics for direct access when needed.
pub use prometheus::{
    JOBS_FINISHED, JOBS_IN_PROGRESS, JOBS_REAPED, JOBS_SUBMITTED, JOB_DURATION, QUEUE_DEPTH,
    REGISTRY,
};
