//! Job execution.
//!
//! The executor runs one job's type-specific pipeline, delegating the
//! actual fetching/generation to collaborators and keeping the row's
//! progress and terminal state current. Runs are fire-and-forget: the
//! outcome is persisted, never returned.
//!
//! Every row write is conditional on the job still being `processing`, so
//! a job cancelled mid-flight absorbs the late writes instead of being
//! resurrected.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::prelude::*;
use futures::try_join;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analysis::AnalysisService;
use crate::error::ExecuteError;
use crate::filestore::FileStore;
use crate::job::{Chapter, Job, JobPayload, OptimizationConfig, OptimizationResult};
use crate::metrics;
use crate::sources::VideoSource;
use crate::storage::{JobStore, StoreError};

/// Default wall-clock ceiling for a single run.
const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Usage accounting consulted right before a job completes.
///
/// Submission-time quota can be stale by the time a long-queued job
/// finishes; this ledger is the completion-time recheck. The outer
/// application can plug in a billing-aware implementation.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Records one completed analysis for the user and returns the new
    /// usage count, including the job being completed.
    async fn record_completion(&self, user_id: &str) -> Result<u32, StoreError>;

    /// Usage ceiling applied at completion time.
    fn ceiling(&self) -> u32;
}

/// Ledger backed by the job table itself: usage is the number of
/// completed jobs.
pub struct StoreUsageLedger {
    store: Arc<JobStore>,
    ceiling: u32,
}

impl StoreUsageLedger {
    /// Creates a ledger with the given completion ceiling.
    pub fn new(store: Arc<JobStore>, ceiling: u32) -> Self {
        Self { store, ceiling }
    }
}

#[async_trait]
impl UsageLedger for StoreUsageLedger {
    async fn record_completion(&self, user_id: &str) -> Result<u32, StoreError> {
        // The completing job has not reached `completed` yet, hence +1.
        Ok(self.store.count_completed_for_user(user_id).await? + 1)
    }

    fn ceiling(&self) -> u32 {
        self.ceiling
    }
}

/// Runs job pipelines and persists their outcomes.
pub struct Executor {
    store: Arc<JobStore>,
    source: Arc<dyn VideoSource>,
    analysis: Arc<dyn AnalysisService>,
    files: Arc<dyn FileStore>,
    usage: Arc<dyn UsageLedger>,
    job_timeout: Duration,
}

impl Executor {
    /// Creates a new executor.
    pub fn new(
        store: Arc<JobStore>,
        source: Arc<dyn VideoSource>,
        analysis: Arc<dyn AnalysisService>,
        files: Arc<dyn FileStore>,
        usage: Arc<dyn UsageLedger>,
    ) -> Self {
        Self {
            store,
            source,
            analysis,
            files,
            usage,
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }

    /// Sets the wall-clock timeout for a single run.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Runs a claimed job to a persisted terminal state.
    ///
    /// The caller must have won the claim already; this method assumes the
    /// row is `processing`.
    pub async fn run(&self, job: Job) {
        let job_id = job.id;
        let job_type = job.job_type;
        let start = Instant::now();

        info!(job_id = %job_id, job_type = %job_type, user_id = %job.user_id, "Executing job");

        let outcome = tokio::time::timeout(self.job_timeout, self.execute(&job)).await;
        let duration = start.elapsed();

        match outcome {
            Ok(Ok(mut result)) => {
                self.apply_usage_check(&job, &mut result).await;
                match self.store.complete(job_id, &result).await {
                    Ok(true) => {
                        metrics::observe_job("completed", job_type.as_str(), duration);
                        info!(
                            job_id = %job_id,
                            duration_ms = duration.as_millis() as u64,
                            "Job completed"
                        );
                    }
                    Ok(false) => {
                        // Cancelled while we were running; the work is dropped.
                        info!(job_id = %job_id, "Job no longer processing; result discarded");
                    }
                    Err(e) => {
                        warn!(job_id = %job_id, error = %e, "Failed to persist job result");
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(job_id = %job_id, error = %e, "Job failed");
                self.persist_failure(job_id, &e.to_string(), e.code(), job_type.as_str(), duration)
                    .await;
            }
            Err(_) => {
                let message = format!(
                    "Execution exceeded {} seconds",
                    self.job_timeout.as_secs()
                );
                warn!(job_id = %job_id, timeout_secs = self.job_timeout.as_secs(), "Job timed out");
                self.persist_failure(job_id, &message, "timeout", job_type.as_str(), duration)
                    .await;
            }
        }
    }

    async fn persist_failure(
        &self,
        job_id: Uuid,
        message: &str,
        code: &str,
        job_type: &str,
        duration: Duration,
    ) {
        match self.store.fail(job_id, message, code).await {
            Ok(true) => metrics::observe_job("failed", job_type, duration),
            Ok(false) => {
                info!(job_id = %job_id, "Job no longer processing; failure discarded");
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Failed to persist job failure");
            }
        }
    }

    /// Completion-time quota recheck. The job completes either way; a
    /// breach only flags the result and warns.
    async fn apply_usage_check(&self, job: &Job, result: &mut OptimizationResult) {
        match self.usage.record_completion(&job.user_id).await {
            Ok(count) => {
                let ceiling = self.usage.ceiling();
                if count > ceiling {
                    warn!(
                        job_id = %job.id,
                        user_id = %job.user_id,
                        usage = count,
                        ceiling = ceiling,
                        "Usage ceiling exceeded at completion; flagging result"
                    );
                    result.quota_flagged = true;
                }
            }
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    error = %e,
                    "Usage ledger unavailable; completing unflagged"
                );
            }
        }
    }

    async fn execute(&self, job: &Job) -> Result<OptimizationResult, ExecuteError> {
        match &job.payload {
            JobPayload::Youtube { url, config, .. } => self.run_youtube(job, url, config).await,
            JobPayload::Upload {
                file_name,
                content_type,
                data_base64,
                config,
            } => {
                self.run_upload(job, file_name, content_type, data_base64, config)
                    .await
            }
            JobPayload::Transcript { text, config } => {
                self.run_transcript(job, text, config).await
            }
        }
    }

    async fn run_youtube(
        &self,
        job: &Job,
        url: &str,
        config: &OptimizationConfig,
    ) -> Result<OptimizationResult, ExecuteError> {
        let transcript = self.source.fetch_transcript(url).await?;
        self.checkpoint(job.id, 20).await;

        let (titles, description, keywords, chapters) =
            self.run_analyses(&transcript, config).await?;
        self.checkpoint(job.id, 80).await;

        let thumbnail_ideas = self.thumbnails_best_effort(&job.title, &description).await;
        self.checkpoint(job.id, 90).await;

        Ok(OptimizationResult {
            titles,
            description,
            keywords,
            chapters,
            summary: None,
            thumbnail_ideas,
            source_url: None,
            quota_flagged: false,
        })
    }

    async fn run_upload(
        &self,
        job: &Job,
        file_name: &str,
        content_type: &str,
        data_base64: &str,
        config: &OptimizationConfig,
    ) -> Result<OptimizationResult, ExecuteError> {
        let bytes = BASE64_STANDARD
            .decode(data_base64)
            .map_err(|e| ExecuteError::InvalidPayload(format!("upload bytes: {}", e)))?;

        let stored = self
            .files
            .store(&job.user_id, &bytes, content_type, file_name)
            .await?;
        self.checkpoint(job.id, 20).await;

        // Scoped transcription copy; deleted on drop no matter how this
        // function exits.
        let suffix = Path::new(file_name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let temp = tempfile::Builder::new()
            .prefix("clipforge-")
            .suffix(&suffix)
            .tempfile()?;
        tokio::fs::write(temp.path(), &bytes).await?;
        self.checkpoint(job.id, 30).await;

        let transcript = self.analysis.transcribe(temp.path()).await?;
        self.checkpoint(job.id, 40).await;

        let summary = self.analysis.summarize(&transcript, config).await?;
        self.checkpoint(job.id, 60).await;

        let (titles, description, keywords, chapters) =
            self.run_analyses(&transcript, config).await?;
        self.checkpoint(job.id, 80).await;

        let thumbnail_ideas = self.thumbnails_best_effort(&job.title, &description).await;
        self.checkpoint(job.id, 90).await;

        Ok(OptimizationResult {
            titles,
            description,
            keywords,
            chapters,
            summary: Some(summary),
            thumbnail_ideas,
            source_url: Some(stored.public_url),
            quota_flagged: false,
        })
    }

    async fn run_transcript(
        &self,
        job: &Job,
        text: &str,
        config: &OptimizationConfig,
    ) -> Result<OptimizationResult, ExecuteError> {
        let summary = self.analysis.summarize(text, config).await?;
        self.checkpoint(job.id, 40).await;

        let (titles, description, keywords, chapters) = self.run_analyses(text, config).await?;
        self.checkpoint(job.id, 80).await;

        let thumbnail_ideas = self.thumbnails_best_effort(&job.title, &description).await;
        self.checkpoint(job.id, 90).await;

        Ok(OptimizationResult {
            titles,
            description,
            keywords,
            chapters,
            summary: Some(summary),
            thumbnail_ideas,
            source_url: None,
            quota_flagged: false,
        })
    }

    /// The four core analyses, run concurrently. All-or-nothing: one
    /// failure fails the batch.
    async fn run_analyses(
        &self,
        transcript: &str,
        config: &OptimizationConfig,
    ) -> Result<(Vec<String>, String, Vec<String>, Vec<Chapter>), ExecuteError> {
        let (titles, description, keywords, chapters) = try_join!(
            self.analysis.suggest_titles(transcript, config),
            self.analysis.write_description(transcript, config),
            self.analysis.extract_keywords(transcript, config),
            self.analysis.segment_chapters(transcript, config),
        )?;

        Ok((titles, description, keywords, chapters))
    }

    /// Thumbnail concepts are allowed to fail without failing the job.
    async fn thumbnails_best_effort(&self, title: &str, description: &str) -> Vec<String> {
        match self.analysis.thumbnail_ideas(title, description).await {
            Ok(ideas) => ideas,
            Err(e) => {
                warn!(error = %e, "Thumbnail idea generation failed; continuing without");
                Vec::new()
            }
        }
    }

    async fn checkpoint(&self, job_id: Uuid, progress: u8) {
        match self.store.set_progress(job_id, progress).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(job_id = %job_id, progress = progress, "Progress write skipped; job no longer processing");
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Failed to persist progress");
            }
        }
    }
}
