//! Prometheus metrics registration and export.
//!
//! Defines all queue metrics and provides functions for initializing,
//! recording and exporting them. Recording helpers silently no-op until
//! `init_metrics` has run, so library consumers and tests pay nothing.

use std::sync::OnceLock;
use std::time::Duration;

use prometheus::{
    CounterVec, Encoder, Gauge, HistogramVec, Opts, Registry, TextEncoder,
};

/// Global Prometheus registry for all clipforge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Jobs submitted, labeled by job type.
pub static JOBS_SUBMITTED: OnceLock<CounterVec> = OnceLock::new();

/// Jobs finished, labeled by terminal status and job type.
pub static JOBS_FINISHED: OnceLock<CounterVec> = OnceLock::new();

/// Job execution duration in seconds, labeled by job type.
pub static JOB_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Number of pending jobs, sampled each dispatch tick.
pub static QUEUE_DEPTH: OnceLock<Gauge> = OnceLock::new();

/// Number of processing jobs, sampled each dispatch tick.
pub static JOBS_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

/// Terminal rows removed by the reaper, labeled by bucket.
pub static JOBS_REAPED: OnceLock<CounterVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at daemon startup.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically
/// due to duplicate metric names.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let jobs_submitted = CounterVec::new(
        Opts::new("clipforge_jobs_submitted_total", "Jobs accepted by admission"),
        &["job_type"],
    )?;

    let jobs_finished = CounterVec::new(
        Opts::new("clipforge_jobs_finished_total", "Jobs reaching a terminal state"),
        &["status", "job_type"],
    )?;

    let job_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "clipforge_job_duration_seconds",
            "Job execution duration in seconds",
        )
        .buckets(vec![5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0]),
        &["job_type"],
    )?;

    let queue_depth = Gauge::new("clipforge_queue_depth", "Number of pending jobs")?;

    let jobs_in_progress = Gauge::new(
        "clipforge_jobs_in_progress",
        "Number of jobs currently processing",
    )?;

    let jobs_reaped = CounterVec::new(
        Opts::new("clipforge_jobs_reaped_total", "Terminal rows removed by the reaper"),
        &["bucket"],
    )?;

    registry.register(Box::new(jobs_submitted.clone()))?;
    registry.register(Box::new(jobs_finished.clone()))?;
    registry.register(Box::new(job_duration.clone()))?;
    registry.register(Box::new(queue_depth.clone()))?;
    registry.register(Box::new(jobs_in_progress.clone()))?;
    registry.register(Box::new(jobs_reaped.clone()))?;

    let _ = JOBS_SUBMITTED.set(jobs_submitted);
    let _ = JOBS_FINISHED.set(jobs_finished);
    let _ = JOB_DURATION.set(job_duration);
    let _ = QUEUE_DEPTH.set(queue_depth);
    let _ = JOBS_IN_PROGRESS.set(jobs_in_progress);
    let _ = JOBS_REAPED.set(jobs_reaped);
    let _ = REGISTRY.set(registry);

    Ok(())
}

/// Exports all metrics in the Prometheus text format.
///
/// Returns an empty string when metrics were never initialized.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return String::new();
    };

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&registry.gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Records a job submission.
pub fn inc_submitted(job_type: &str) {
    if let Some(counter) = JOBS_SUBMITTED.get() {
        counter.with_label_values(&[job_type]).inc();
    }
}

/// Records a job reaching a terminal state, with its run duration.
pub fn observe_job(status: &str, job_type: &str, duration: Duration) {
    if let Some(counter) = JOBS_FINISHED.get() {
        counter.with_label_values(&[status, job_type]).inc();
    }
    if let Some(histogram) = JOB_DURATION.get() {
        histogram
            .with_label_values(&[job_type])
            .observe(duration.as_secs_f64());
    }
}

/// Updates the per-tick queue gauges.
pub fn set_queue_gauges(pending: u32, processing: u32) {
    if let Some(gauge) = QUEUE_DEPTH.get() {
        gauge.set(pending as f64);
    }
    if let Some(gauge) = JOBS_IN_PROGRESS.get() {
        gauge.set(processing as f64);
    }
}

/// Records rows removed by a reaper sweep.
pub fn add_reaped(bucket: &str, count: u64) {
    if count == 0 {
        return;
    }
    if let Some(counter) = JOBS_REAPED.get() {
        counter.with_label_values(&[bucket]).inc_by(count as f64);
    }
}
